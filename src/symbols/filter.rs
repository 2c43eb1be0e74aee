//! Symbol filter: tags samples that should never reach the histogram.
//!
//! Two families of noise get dropped: idle/halt routines (a system-wide
//! profile is otherwise dominated by the idle loop) and section/linker
//! markers that are not real functions.

/// Idle and housekeeping symbols whose samples are skipped.
const SKIP_SYMBOLS: &[&str] = &[
    "default_idle",
    "native_safe_halt",
    "cpu_idle",
    "enter_idle",
    "exit_idle",
    "mwait_idle",
    "mwait_idle_with_hints",
    "poll_idle",
    "ppc64_runlatch_off",
    "pseries_dedicated_idle_sleep",
];

/// True when a resolved symbol should be dropped before aggregation.
///
/// ppc64 uses function descriptors and prefixes every text symbol with a
/// '.'; that is stripped before matching.
pub fn is_ignorable(raw: &str) -> bool {
    let name = raw.strip_prefix('.').unwrap_or(raw);

    if name == "_text"
        || name == "_etext"
        || name == "_sinittext"
        || name.starts_with("init_module")
        || name.starts_with("cleanup_module")
        || name.contains("_text_start")
        || name.contains("_text_end")
    {
        return true;
    }

    SKIP_SYMBOLS.contains(&name)
}
