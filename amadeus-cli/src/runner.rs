use std::{io, path::Path, time::Duration};

use amadeus_lib::{Amadeus, SimulatedEngine};
use clap::ArgMatches;
use crossterm::{
    cursor, execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{info, warn};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::{
    controls,
    error::CliError,
    logging::{self, LogBuffer},
    script::{self, Script},
    ui,
};

pub fn run(args: &ArgMatches, log_buffer: LogBuffer) -> Result<i32, CliError> {
    match args.subcommand() {
        Some(("run", run_args)) => run_script(run_args, &log_buffer),
        Some(("create", create_args)) => match create_args.subcommand() {
            Some(("script-json", _)) => {
                println!("{}", serde_json::to_string_pretty(&script::example())?);
                Ok(0)
            }
            _ => Ok(-1),
        },
        _ => Ok(-1),
    }
}

fn run_script(args: &ArgMatches, log_buffer: &LogBuffer) -> Result<i32, CliError> {
    let Some(path) = args.get_one::<String>("SCRIPT") else {
        return Ok(-1);
    };
    let quiet = args.get_flag("quiet");
    let watch = args.get_flag("watch");
    let tick = Duration::from_millis(args.get_one::<u64>("tick-ms").copied().unwrap_or(50));

    let script = Script::from_path(Path::new(path))?;
    info!("running {} ({} steps)", path, script.steps.len());
    let mut amadeus = script.open()?;

    let mut failures = 0;
    for (index, step) in script.steps.iter().enumerate() {
        let line = match step.apply(&mut amadeus) {
            Ok(outcome) => outcome.to_string(),
            Err(err) => {
                failures += 1;
                warn!("step {} ({}) failed: {}", index, step.label(), err);
                format!("error: {}", err)
            }
        };
        if !quiet {
            println!("{:>3}  {:<40} {}", index, step.label(), line);
        }
    }

    if watch {
        monitor(&mut amadeus, tick, log_buffer)?;
    }

    if !quiet {
        print_slot_table(&amadeus)?;
        println!("{} steps, {} failed", script.steps.len(), failures);
    }

    amadeus.shutdown()?;
    Ok(0)
}

fn print_slot_table(amadeus: &Amadeus<SimulatedEngine>) -> Result<(), CliError> {
    let rows = controls::slot_rows(amadeus)?;
    println!("slots:");
    if rows.is_empty() {
        println!("  all slots empty");
    }
    for row in rows {
        println!("  {}", row);
    }
    Ok(())
}

/// Keep ticking in a terminal monitor until every slot is empty or the
/// user quits.
fn monitor(
    amadeus: &mut Amadeus<SimulatedEngine>,
    tick: Duration,
    log_buffer: &LogBuffer,
) -> Result<(), CliError> {
    let _raw_mode = RawModeGuard::enable().ok();
    let mut stdout = io::stdout();
    let _ = execute!(stdout, EnterAlternateScreen, cursor::Hide);
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let sample_rate = amadeus.engine().sample_rate_hz() as f64;
    let mut state = controls::MonitorState::default();
    let result = loop {
        if !state.paused {
            match amadeus.tick() {
                Ok(report) => state.record(&report),
                Err(err) => break Err(err.into()),
            }
        }

        let rows = match controls::slot_rows(amadeus) {
            Ok(rows) => rows,
            Err(err) => break Err(err.into()),
        };
        if rows.is_empty() || state.quit {
            break Ok(());
        }

        let status = controls::status_text(controls::StatusArgs {
            clock_seconds: amadeus.engine().clock() as f64 / sample_rate,
            ticks: state.ticks,
            paused: state.paused,
            reclaimed_channels: state.reclaimed_channels,
            reclaimed_events: state.reclaimed_events,
            occupied: rows.len(),
        });
        ui::draw_monitor(&mut terminal, &status, &rows, &logging::snapshot(log_buffer));

        controls::handle_key_event(&mut state, tick);
    };

    // Restore the terminal state before printing the summary.
    let _ = terminal.show_cursor();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show);

    info!(
        "monitor stopped after {} ticks ({} channels, {} events reclaimed)",
        state.ticks, state.reclaimed_channels, state.reclaimed_events
    );
    result
}

struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}
