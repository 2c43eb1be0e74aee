//! Pre-flight checks for ptop
//!
//! Validates the environment before counters are negotiated, and reports the
//! kernel's perf_event access policy for privilege-error hints.

#![allow(unsafe_code)] // isatty() requires unsafe

use anyhow::{bail, Result};

const PARANOID_PATH: &str = "/proc/sys/kernel/perf_event_paranoid";

/// Run all pre-flight checks before negotiating counters.
pub fn run_preflight_checks() -> Result<()> {
    check_tty()?;
    check_proc_mounted()?;
    Ok(())
}

/// The display loop needs a real terminal for raw mode and geometry.
fn check_tty() -> Result<()> {
    if unsafe { libc::isatty(libc::STDOUT_FILENO) } == 1 {
        return Ok(());
    }
    bail!(
        "stdout is not a terminal.\n\n\
         ptop renders a live top-N view and reads single keypresses;\n\
         run it in an interactive terminal."
    )
}

/// Symbol resolution and the process inventory both live on /proc.
fn check_proc_mounted() -> Result<()> {
    if std::path::Path::new("/proc/self").exists() {
        return Ok(());
    }
    bail!("/proc is not mounted; process inventory and symbols are unavailable")
}

/// Current `perf_event_paranoid` level, for the privilege remediation hint.
/// Returns "unknown" when the sysctl cannot be read.
pub fn paranoid_level() -> String {
    std::fs::read_to_string(PARANOID_PATH)
        .map_or_else(|_| "unknown".to_string(), |s| s.trim().to_string())
}
