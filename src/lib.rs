//! Laned equi-join over 32-bit integer keys.
//!
//! A hash join between a build relation `R` and a probe relation `S`,
//! runnable under several execution strategies over the same core algorithm:
//!
//! - a single-threaded bucket join ([`oracle::naive_join`]),
//! - a `HashMap`-backed reference join ([`oracle::map_join`]),
//! - a lane-parallel join driven by [`sch::Scheduler`], which splits the
//!   workload across independent execution lanes according to a configurable
//!   work ratio.
//!
//! ```text
//!   R ──► build ──► HashTable ──► probe(S) ──► JoinedTuple stream
//!                                   │
//!                      oracle joins ┴──► validator (multiset compare)
//! ```
//!
//! The laned engine supports two table policies: a shared table built once
//! and probed concurrently by every lane (always correct), and an
//! experimental partitioned mode where each lane builds a private table from
//! its own `R` slice (incomplete for arbitrary key distributions; see
//! [`sch`]).
//!
//! [`report::run`] drives a full invocation: laned join, optional oracle
//! cross-checks, optional work-ratio sweep, and a final pass/fail report.

pub mod config;
pub mod datagen;
pub mod engine;
pub mod error;
pub mod oracle;
pub mod report;
pub mod sch;
pub mod sweep;
pub mod table;

pub use config::{ExecutionPolicy, JoinConfig, RunFlags};
pub use error::JoinError;
pub use report::{RunReport, run};

/// One input row. `rid` is an opaque row identifier, only meaningful within
/// its own relation; duplicates are legal on both sides.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tuple {
    pub key: u32,
    pub rid: u32,
}

/// One output row per matching (R-row, S-row) pair sharing `key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JoinedTuple {
    pub key: u32,
    pub rid_r: u32,
    pub rid_s: u32,
}
