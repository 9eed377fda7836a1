use std::fmt::{Display, Formatter};
use std::time::Duration;

use amadeus_lib::{Amadeus, EventPhase, ReconcileReport, SimulatedEngine, SlotPool};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};

pub struct StatusSnapshot {
    pub text: String,
}

/// Monitor loop state driven by the keyboard.
#[derive(Debug, Default)]
pub struct MonitorState {
    pub paused: bool,
    pub quit: bool,
    pub ticks: u64,
    pub reclaimed_channels: usize,
    pub reclaimed_events: usize,
}

impl MonitorState {
    pub fn record(&mut self, report: &ReconcileReport) {
        self.ticks += 1;
        self.reclaimed_channels += report.reclaimed_channels.len();
        self.reclaimed_events += report.reclaimed_events.len();
    }
}

/// One occupied slot as shown by the monitor and the final table.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotRow {
    pub pool: SlotPool,
    pub id: usize,
    pub state: &'static str,
    pub gain: Option<f32>,
}

impl Display for SlotRow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<8}{:>3}  {:<9}",
            self.pool.to_string(),
            self.id,
            self.state
        )?;
        match self.gain {
            Some(gain) => write!(f, "gain {:.2}", gain),
            None => write!(f, "-"),
        }
    }
}

/// Occupied slots of both pools, as recorded by the registry.
pub fn slot_rows(amadeus: &Amadeus<SimulatedEngine>) -> amadeus_lib::Result<Vec<SlotRow>> {
    let engine = amadeus.engine();
    let mut rows = Vec::new();

    for id in 0..amadeus.channel_capacity() {
        if let Some(channel) = amadeus.channel(id)? {
            rows.push(SlotRow {
                pool: SlotPool::Channel,
                id,
                state: "playing",
                gain: engine.effective_gain(channel.into()),
            });
        }
    }

    for id in 0..amadeus.event_capacity() {
        let Some(event) = amadeus.event(id)? else {
            continue;
        };
        let state = match event.phase() {
            EventPhase::Empty => continue,
            EventPhase::Loaded => "loaded",
            EventPhase::Starting => "starting",
            EventPhase::Playing => "playing",
        };
        rows.push(SlotRow {
            pool: SlotPool::Event,
            id,
            state,
            gain: event
                .group()
                .and_then(|group| engine.effective_gain(group.into())),
        });
    }

    Ok(rows)
}

pub struct StatusArgs {
    pub clock_seconds: f64,
    pub ticks: u64,
    pub paused: bool,
    pub reclaimed_channels: usize,
    pub reclaimed_events: usize,
    pub occupied: usize,
}

pub fn status_text(args: StatusArgs) -> StatusSnapshot {
    let state = if args.paused { "⏸ Paused" } else { "▶ Ticking" };
    let text = format!(
        "{}   engine time {}   ticks: {}\nOccupied slots: {} | reclaimed channels: {} events: {}",
        state,
        format_time(args.clock_seconds * 1000.0),
        args.ticks,
        args.occupied,
        args.reclaimed_channels,
        args.reclaimed_events
    );

    StatusSnapshot { text }
}

/// Wait up to `timeout` for a key and apply it to `monitor`.
pub fn handle_key_event(monitor: &mut MonitorState, timeout: Duration) {
    if event::poll(timeout).unwrap_or(false) {
        if let Ok(Event::Key(key)) = event::read() {
            if key.kind != KeyEventKind::Press {
                return;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => monitor.quit = true,
                KeyCode::Char(' ') => monitor.paused = !monitor.paused,
                _ => {}
            }
        }
    }
}

fn format_time(time: f64) -> String {
    let millis = time.max(0.0) as u64;
    let seconds = millis / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    format!(
        "{:02}:{:02}:{:02}.{:03}",
        hours,
        minutes % 60,
        seconds % 60,
        millis % 1000
    )
}
