//! # Amadeus
//!
//! Runs JSON scripts of host calls against the Amadeus playback registry,
//! backed by the simulated engine.

use log::error;

mod cli;
mod controls;
mod error;
mod logging;
mod runner;
mod script;
mod ui;

fn main() {
    dotenv::dotenv().ok();
    let log_buffer = logging::init();
    let args = cli::args::build_cli().get_matches();

    let code = match runner::run(&args, log_buffer) {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err.to_string().to_lowercase());
            eprintln!("error: {}", err);
            -1
        }
    };

    std::process::exit(code)
}
