//! Build and probe engines.
//!
//! [`build`] and [`probe`] are the sequential per-tuple loops: every execution
//! strategy in this crate is some arrangement of these two over index ranges.
//! Build tuples are independent except that tuples hashing to the same bucket
//! must be serialized against each other; a lane processing its range
//! sequentially satisfies that for free. Probe is read-only against the table
//! and safe to parallelize unconditionally.
//!
//! [`build_staged`] and [`probe_staged`] run the same loops as whole-range
//! passes, with the four heavyweight steps assignable to execution lanes via a
//! [`StepPlan`]: key-list management and rid insertion on the build side, key
//! search and tuple emission on the probe side. Hashing and the bucket-header
//! check are cheap and always stay on the caller's lane. The step-assignment
//! sweep in [`crate::sweep`] walks every assignment.

use std::panic;
use std::thread;

use crate::error::JoinError;
use crate::table::{HashTable, bucket_id};
use crate::{JoinedTuple, Tuple};

/// Pre-sized output region for one lane. Capacity is fixed at construction;
/// running out is an error, never a silent truncation.
pub struct ResultBuffer {
    tuples: Vec<JoinedTuple>,
    capacity: usize,
}

impl ResultBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tuples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn push(&mut self, tuple: JoinedTuple) -> Result<(), JoinError> {
        if self.tuples.len() == self.capacity {
            return Err(JoinError::CapacityExceeded {
                resource: "result buffer",
                limit: self.capacity,
            });
        }
        self.tuples.push(tuple);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn as_slice(&self) -> &[JoinedTuple] {
        &self.tuples
    }

    pub fn into_vec(self) -> Vec<JoinedTuple> {
        self.tuples
    }
}

/// Populate `table` from the build-side tuples. Order of `r` does not affect
/// the resulting per-key rid multisets.
pub fn build(table: &mut HashTable, r: &[Tuple]) -> Result<(), JoinError> {
    for t in r {
        table.insert(t.key, t.rid)?;
    }
    Ok(())
}

/// Probe `table` with the probe-side tuples, emitting one [`JoinedTuple`] per
/// stored build rid of each matched key. Output cardinality for one S tuple is
/// the matched key's rid-list length, 0 when unmatched.
pub fn probe(table: &HashTable, s: &[Tuple], out: &mut ResultBuffer) -> Result<(), JoinError> {
    for t in s {
        for &rid_r in table.matches(t.key) {
            out.push(JoinedTuple {
                key: t.key,
                rid_r,
                rid_s: t.rid,
            })?;
        }
    }
    Ok(())
}

/// Lane assignment for the four step-assignable passes. Lane 0 is the
/// distinguished lane (the caller's thread); any other lane runs as a
/// separate thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPlan {
    /// Build: key-list management (find or append the key entry).
    pub build_keys: usize,
    /// Build: rid insertion at the resolved key slot.
    pub build_rids: usize,
    /// Probe: key-list scan.
    pub search: usize,
    /// Probe: joined-tuple emission.
    pub emit: usize,
}

impl StepPlan {
    /// Everything on the caller's lane.
    pub const SINGLE_LANE: Self = Self {
        build_keys: 0,
        build_rids: 0,
        search: 0,
        emit: 0,
    };

    /// Every assignment of the four steps to `lanes` lanes.
    pub fn assignments(lanes: usize) -> impl Iterator<Item = Self> {
        (0..lanes).flat_map(move |build_keys| {
            (0..lanes).flat_map(move |build_rids| {
                (0..lanes).flat_map(move |search| {
                    (0..lanes).map(move |emit| Self {
                        build_keys,
                        build_rids,
                        search,
                        emit,
                    })
                })
            })
        })
    }
}

/// Run `f` on the caller's thread for lane 0, or on a freshly scoped thread
/// for any other lane. Passes depend on each other's outputs, so this models
/// lane placement, not pass overlap.
fn run_on<T, F>(lane: usize, f: F) -> T
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    if lane == 0 {
        return f();
    }
    thread::scope(|scope| match scope.spawn(f).join() {
        Ok(value) => value,
        Err(payload) => panic::resume_unwind(payload),
    })
}

/// Staged build: the same contract as [`build`], executed as whole-range
/// passes. Key-list management and rid insertion are placed on lanes by
/// `plan`; hashing stays on the caller's lane.
pub fn build_staged(
    table: &mut HashTable,
    r: &[Tuple],
    plan: StepPlan,
) -> Result<(), JoinError> {
    let buckets: Vec<u32> = r
        .iter()
        .map(|t| bucket_id(t.key, table.bucket_count()))
        .collect();

    // Key-list management: resolve each tuple's key slot, appending new key
    // entries in tuple order.
    let slots: Vec<usize> = run_on(plan.build_keys, || {
        r.iter()
            .zip(&buckets)
            .map(|(t, &bucket)| table.insert_key(bucket, t.key))
            .collect::<Result<_, _>>()
    })?;

    // Rid insertion at the resolved slots, again in tuple order.
    run_on(plan.build_rids, || {
        r.iter()
            .zip(&slots)
            .try_for_each(|(t, &slot)| table.append_rid(slot, t.rid))
    })
}

/// Staged probe: the same contract as [`probe`], executed as whole-range
/// passes. Key search and emission are placed on lanes by `plan`; hashing and
/// the bucket-header check stay on the caller's lane. Produces the identical
/// output sequence.
pub fn probe_staged(
    table: &HashTable,
    s: &[Tuple],
    plan: StepPlan,
    out: &mut ResultBuffer,
) -> Result<(), JoinError> {
    let buckets: Vec<u32> = s
        .iter()
        .map(|t| bucket_id(t.key, table.bucket_count()))
        .collect();

    // An empty bucket ends the tuple's probe early.
    let occupied: Vec<bool> = buckets.iter().map(|&b| table.total_num(b) > 0).collect();

    // Key-slot search within the precomputed bucket.
    let slots: Vec<Option<usize>> = run_on(plan.search, || {
        s.iter()
            .zip(buckets.iter().zip(&occupied))
            .map(|(t, (&bucket, &occ))| {
                if occ {
                    table.find_key_in(bucket, t.key)
                } else {
                    None
                }
            })
            .collect()
    });

    // Emission.
    run_on(plan.emit, move || {
        for (t, slot) in s.iter().zip(&slots) {
            let Some(slot) = *slot else { continue };
            for &rid_r in table.rids_for_slot(slot) {
                out.push(JoinedTuple {
                    key: t.key,
                    rid_r,
                    rid_s: t.rid,
                })?;
            }
        }
        Ok(())
    })
}
