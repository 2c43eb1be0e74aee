//! # ptop - Live Counter-Sampling Profiler
//!
//! ptop continuously samples hardware/software performance counters through
//! `perf_event_open(2)`, decodes the kernel's binary sample stream, and
//! renders a ranked top-N view of where the machine is spending its events.
//!
//! ## Architecture Overview
//!
//! ```text
//!  ┌────────────────────────────────────────────────────────────┐
//!  │                     Kernel (perf subsystem)                │
//!  │   counters per CPU ──► per-fd mmap'd ring buffers          │
//!  └──────────────────────────┬─────────────────────────────────┘
//!                             │ records
//!                             ▼
//!  ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌─────────────┐
//!  │  events  │──►│  ring   │──►│  sample  │──►│    hist     │
//!  │ (open +  │   │ (drain) │   │ (decode +│   │ (rank by    │
//!  │ fallback)│   │         │   │  resolve)│   │  weight)    │
//!  └──────────┘   └─────────┘   └──────────┘   └──────┬──────┘
//!                                      ▲               │ snapshot
//!                               ┌──────┴──────┐        ▼
//!                               │   symbols   │  ┌───────────┐
//!                               │ + session   │  │  display  │
//!                               └─────────────┘  └───────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`events`]: descriptor selection, kernel negotiation with the one-shot
//!   cycles→cpu-clock fallback, and the raw ABI surface
//! - [`ring`]: non-blocking consumption of the kernel's mmap'd ring buffers
//! - [`sample`]: field-presence decoding of SAMPLE records
//! - [`symbols`]: kernel + user address resolution and the idle-symbol filter
//! - [`session`]: process/thread inventory backing symbol context
//! - [`hist`]: weighted histogram tables with collapse/resort/snapshot
//! - [`sampler`]: the foreground sampling loop
//! - [`display`]: the concurrent render/keyboard loop
//! - [`context`]: shared state handed to both loops
//! - [`cli`], [`domain`], [`preflight`]: arguments, newtypes/errors, checks
//!
//! ## Concurrency
//!
//! Two threads for the life of the process: the sampler (spawned, unbounded)
//! and the display loop (main thread, 2 s cadence, quits on `q`). They share
//! the histogram tables and the terminal geometry through
//! [`context::SharedContext`]; quitting the display ends the process, which
//! is the sampler's only cancellation path.

pub mod cli;
pub mod context;
pub mod display;
pub mod domain;
pub mod events;
pub mod hist;
pub mod preflight;
pub mod ring;
pub mod sample;
pub mod sampler;
pub mod session;
pub mod symbols;
