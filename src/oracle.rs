//! Reference joins and the output validator.
//!
//! Two independent single-lane implementations of the same join cross-check
//! the scheduled engine: [`map_join`] swaps the collision-resolution structure
//! for `HashMap` (catches bucket/hash-table bugs), [`naive_join`] is the exact
//! bucket engine run unpartitioned (catches scheduling/concurrency bugs).
//!
//! [`validate`] compares outputs as multisets of full `(key, rid_r, rid_s)`
//! triples. Per-key counts alone are not enough — two outputs can agree on
//! every key's count while pairing different rids — so the triple multiset is
//! the property checked, with per-key counts used only to localize a failure.

use std::collections::HashMap;

use log::warn;

use crate::config::JoinConfig;
use crate::engine::{self, ResultBuffer};
use crate::error::JoinError;
use crate::table::HashTable;
use crate::{JoinedTuple, Tuple};

/// Hash-map join: key → R rid list in one pass over R, then one pass over S.
/// Infallible; the map and output grow as needed.
pub fn map_join(r: &[Tuple], s: &[Tuple]) -> Vec<JoinedTuple> {
    let mut index: HashMap<u32, Vec<u32>> = HashMap::with_capacity(r.len());
    for t in r {
        index.entry(t.key).or_default().push(t.rid);
    }
    let mut out = Vec::new();
    for t in s {
        if let Some(rids) = index.get(&t.key) {
            for &rid_r in rids {
                out.push(JoinedTuple {
                    key: t.key,
                    rid_r,
                    rid_s: t.rid,
                });
            }
        }
    }
    out
}

/// Unpartitioned single-threaded run of the bucket build/probe engine.
pub fn naive_join(
    config: &JoinConfig,
    r: &[Tuple],
    s: &[Tuple],
) -> Result<Vec<JoinedTuple>, JoinError> {
    let mut table = HashTable::new(config)?;
    engine::build(&mut table, r)?;
    let mut out = ResultBuffer::with_capacity(config.lane_result_capacity);
    engine::probe(&table, s, &mut out)?;
    Ok(out.into_vec())
}

/// Surplus occurrences of one key on either side of a failed comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMismatch {
    pub key: u32,
    /// Triples present only (or extra) on the left side.
    pub left_surplus: u64,
    /// Triples present only (or extra) on the right side.
    pub right_surplus: u64,
}

/// Outcome of one multiset comparison. Recorded, never raised: the run keeps
/// going so that every enabled comparison gets reported.
#[derive(Debug, Clone)]
pub struct Validation {
    pub left_total: usize,
    pub right_total: usize,
    /// Keys whose triple counts differ, sorted by key.
    pub mismatches: Vec<KeyMismatch>,
}

impl Validation {
    pub fn passed(&self) -> bool {
        self.left_total == self.right_total && self.mismatches.is_empty()
    }
}

/// Compare two join outputs as multisets of `(key, rid_r, rid_s)` triples.
pub fn validate(left: &[JoinedTuple], right: &[JoinedTuple]) -> Validation {
    let mut diff: HashMap<(u32, u32, u32), i64> = HashMap::with_capacity(left.len());
    for t in left {
        *diff.entry((t.key, t.rid_r, t.rid_s)).or_default() += 1;
    }
    for t in right {
        *diff.entry((t.key, t.rid_r, t.rid_s)).or_default() -= 1;
    }

    let mut per_key: HashMap<u32, (u64, u64)> = HashMap::new();
    for (&(key, _, _), &delta) in &diff {
        if delta > 0 {
            per_key.entry(key).or_default().0 += delta as u64;
        } else if delta < 0 {
            per_key.entry(key).or_default().1 += delta.unsigned_abs();
        }
    }
    let mut mismatches: Vec<KeyMismatch> = per_key
        .into_iter()
        .map(|(key, (left_surplus, right_surplus))| KeyMismatch {
            key,
            left_surplus,
            right_surplus,
        })
        .collect();
    mismatches.sort_by_key(|m| m.key);

    for m in &mismatches {
        warn!(
            "join mismatch at key {}: +{} left, +{} right",
            m.key, m.left_surplus, m.right_surplus
        );
    }

    Validation {
        left_total: left.len(),
        right_total: right.len(),
        mismatches,
    }
}
