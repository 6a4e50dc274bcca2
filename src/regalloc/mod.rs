//! Register allocation support: liveness, live ranges, register usage
//! statistics, a linear-scan pressure probe, and spill insertion.
//!
//! This module does not itself assign physical registers to every
//! virtual register in a function (that is left to a caller-supplied
//! allocator, or to `regalloc::linear_scan` for the local-scratch-
//! register case); it computes the information an allocator needs and
//! rewrites a function once spill decisions have been made.

pub mod linear_scan;
pub mod live_range;
pub mod liveness;
pub mod pos;
pub mod reg_stats;
pub mod spill;

pub use live_range::LiveRange;
pub use liveness::compute_liveness;
pub use pos::Pos;
