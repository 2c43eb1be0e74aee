//! Display loop.
//!
//! Runs on the main thread, concurrent with and independent of the sampling
//! loop. Each cycle clears the screen, collapses + snapshots every histogram
//! table, renders the top rows for the current terminal geometry, then waits
//! up to the refresh interval for a keypress. `q` ends the loop, and with
//! it the process; the sampler thread has no cancellation path of its own.
//! Raw mode is scoped to an RAII guard so the terminal is restored on every
//! exit path, panics included.

pub mod format;

use std::io::{self, Write};
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};

use crate::context::{SharedContext, TermGeometry};

const REFRESH_INTERVAL: Duration = Duration::from_secs(2);

/// Scoped raw-mode acquisition: keypresses arrive unbuffered and unechoed
/// while the guard lives, and the original discipline is restored on drop.
struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// What one observed terminal event means for the loop. Deciding is pure:
/// quitting touches neither the tables nor the sampler.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Quit,
    Resize(TermGeometry),
    Ignore,
}

pub fn handle_event(event: &Event) -> Action {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press && key.code == KeyCode::Char('q') => {
            Action::Quit
        }
        Event::Resize(cols, rows) => Action::Resize(TermGeometry { rows: *rows, cols: *cols }),
        _ => Action::Ignore,
    }
}

pub fn run(ctx: &SharedContext) -> Result<()> {
    let _guard = RawModeGuard::enter()?;
    loop {
        render(ctx)?;
        if event::poll(REFRESH_INTERVAL)? {
            match handle_event(&event::read()?) {
                Action::Quit => break,
                Action::Resize(geometry) => ctx.set_geometry(geometry),
                Action::Ignore => {}
            }
        }
    }
    Ok(())
}

fn render(ctx: &SharedContext) -> Result<()> {
    let geometry = ctx.geometry();
    let data_rows = usize::from(geometry.rows.saturating_sub(3));
    let max_cols = usize::from(geometry.cols);

    let mut out = io::stdout().lock();
    execute!(out, Clear(ClearType::All), cursor::MoveTo(0, 0))?;

    for slot in &ctx.tables {
        let (header, lines) = {
            let mut table = slot.table.lock().expect("histogram lock poisoned");
            table.collapse_and_resort(&ctx.sort);
            let snap = table.snapshot(data_rows);
            let header = format!(
                "{}: {} samples, {} entries, total {}",
                slot.name,
                table.nr_samples(),
                table.nr_entries(),
                table.total_period
            );
            (header, format::format_entries(&snap, table.total_period, data_rows, max_cols))
        };

        // raw mode: explicit carriage returns
        write!(out, "{header}\r\n")?;
        for line in &lines {
            write!(out, "{line}\r\n")?;
        }
        write!(out, "\r\n")?;
    }
    out.flush()?;
    Ok(())
}
