//! Structured error types for ptop
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Everything here is fatal to startup; recoverable decode errors live in
//! [`crate::sample::DecodeError`] and never surface past the sampling loop.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error(
        "insufficient privileges to open performance counters (errno {errno}).\n\
         Consider raising your capabilities (CAP_PERFMON / root) or lowering\n\
         /proc/sys/kernel/perf_event_paranoid (currently {paranoid})"
    )]
    Privilege { errno: i32, paranoid: String },

    #[error("the {name} event is not supported by this kernel")]
    UnsupportedEvent { name: String },

    #[error("frequency and period are both zero, nothing to sample")]
    InvalidConfiguration,

    #[error("out of resources opening counters (errno {errno}); raise the fd limit or lower -m")]
    ResourceExhausted { errno: i32 },

    #[error("failed to mmap ring buffer: {0}")]
    Mapping(#[source] std::io::Error),

    #[error("perf_event_open failed with {errno} ({message}); no CONFIG_PERF_EVENTS kernel support?")]
    Open { errno: i32, message: String },

    #[error("unknown event selector \"{0}\"")]
    UnknownEvent(String),

    #[error("unknown sort key \"{0}\" (expected pid, comm, dso or symbol)")]
    UnknownSortKey(String),
}
