//! CLI argument definitions for `amadeus`.

use clap::{value_parser, Arg, ArgAction, Command};

/// Build the CLI argument parser and command definitions.
pub fn build_cli() -> Command {
    Command::new("amadeus")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run scripted host calls against the Amadeus playback registry")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Execute a JSON script of host calls")
                .arg(
                    Arg::new("SCRIPT")
                        .help("Path to the script JSON file")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("quiet")
                        .long("quiet")
                        .short('q')
                        .action(ArgAction::SetTrue)
                        .help("Suppress per-step output and the final slot table"),
                )
                .arg(
                    Arg::new("watch")
                        .long("watch")
                        .short('w')
                        .action(ArgAction::SetTrue)
                        .help("Keep ticking in a live slot monitor after the script ends"),
                )
                .arg(
                    Arg::new("tick-ms")
                        .long("tick-ms")
                        .value_name("MS")
                        .default_value("50")
                        .value_parser(value_parser!(u64))
                        .help("Wall-clock interval between monitor ticks"),
                ),
        )
        .subcommand(
            Command::new("create")
                .about("Emit example JSON payloads")
                .subcommand_required(true)
                .subcommand(
                    Command::new("script-json").about("Print an example script JSON payload"),
                ),
        )
}
