//! Lane scheduler.
//!
//! Drives the build/probe engines across a small fixed set of execution
//! lanes. Each lane is an independent sequential stream over a contiguous
//! index range; the only synchronization points are the two barriers:
//!
//! ```text
//!  Init ─► Build ─► BuildBarrier ─► Probe ─► ProbeBarrier ─► Collect ─► Done
//! ```
//!
//! Under [`ExecutionPolicy::SharedTable`] a single lane builds one table from
//! all of R, the build barrier freezes it, and every lane then probes a
//! disjoint S sub-range against the read-only table into its own pre-sized
//! buffer — no locking, no cross-lane output contention.
//!
//! Under [`ExecutionPolicy::PartitionedTable`] R and S are both ratio-split
//! and every lane owns a private table for its R slice. No sharing, no races,
//! but also no completeness guarantee: an S row's key may only have matching
//! R rows in *another* lane's partition, and there is no fallback lookup.
//! The policy is kept as an explicit experiment; `join_is_complete` on the
//! output says which guarantee applies.
//!
//! Collect concatenates per-lane buffers in lane order. No other output
//! ordering is guaranteed; only total cardinality and the per-key counts are
//! deterministic across runs.

use std::ops::Range;
use std::panic;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::config::{ExecutionPolicy, JoinConfig};
use crate::engine::{self, ResultBuffer};
use crate::error::JoinError;
use crate::table::HashTable;
use crate::{JoinedTuple, Tuple};

/// Phases of one scheduled run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Build,
    BuildBarrier,
    Probe,
    ProbeBarrier,
    Collect,
    Done,
}

/// Wall time spent in each phase. Informational only.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhaseTimings {
    pub build: Duration,
    pub probe: Duration,
    pub collect: Duration,
}

/// Merged result of one scheduled run.
#[derive(Debug)]
pub struct JoinOutput {
    /// All joined tuples, ordered lane-then-position.
    pub tuples: Vec<JoinedTuple>,
    /// Tuples produced per lane, in lane order.
    pub lane_counts: Vec<usize>,
    pub timings: PhaseTimings,
    /// False only for the partitioned-table policy, which can miss matches.
    pub join_is_complete: bool,
}

pub struct Scheduler<'a> {
    config: &'a JoinConfig,
}

impl<'a> Scheduler<'a> {
    pub fn new(config: &'a JoinConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, r: &[Tuple], s: &[Tuple]) -> Result<JoinOutput, JoinError> {
        self.config.validate()?;
        debug!("phase {:?}: policy {:?}", Phase::Init, self.config.policy);
        let output = match self.config.policy {
            ExecutionPolicy::SharedTable => self.run_shared(r, s),
            ExecutionPolicy::PartitionedTable => self.run_partitioned(r, s),
        }?;
        debug!("phase {:?}", Phase::Done);
        Ok(output)
    }

    /// Per-lane contiguous sub-ranges of `[0, len)`. Lane 0 takes
    /// `work_ratio` percent, the rest is split evenly over the other lanes.
    /// A single lane takes everything regardless of the ratio.
    fn lane_ranges(&self, len: usize) -> Vec<Range<usize>> {
        let lanes = self.config.lane_count;
        if lanes == 1 {
            return vec![0..len];
        }
        let head = len * self.config.work_ratio as usize / 100;
        let mut ranges = Vec::with_capacity(lanes);
        ranges.push(0..head);
        let rest = len - head;
        let per_lane = rest / (lanes - 1);
        let extra = rest % (lanes - 1);
        let mut start = head;
        for lane in 0..lanes - 1 {
            let take = per_lane + usize::from(lane < extra);
            ranges.push(start..start + take);
            start += take;
        }
        ranges
    }

    fn run_shared(&self, r: &[Tuple], s: &[Tuple]) -> Result<JoinOutput, JoinError> {
        let mut timings = PhaseTimings::default();

        // One lane builds the entire table.
        debug!("phase {:?}: {} build tuples", Phase::Build, r.len());
        let mut table = HashTable::new(self.config)?;
        let started = Instant::now();
        engine::build(&mut table, r)?;
        timings.build = started.elapsed();

        // Build barrier: from here the table is shared read-only.
        debug!("phase {:?}", Phase::BuildBarrier);
        let table = &table;

        let ranges = self.lane_ranges(s.len());
        debug!(
            "phase {:?}: {} probe tuples over {} lanes",
            Phase::Probe,
            s.len(),
            ranges.len()
        );
        let capacity = self.config.lane_result_capacity;
        let started = Instant::now();
        let lane_results: Vec<Result<ResultBuffer, JoinError>> = thread::scope(|scope| {
            let handles: Vec<_> = ranges
                .iter()
                .cloned()
                .map(|range| {
                    scope.spawn(move || {
                        let mut out = ResultBuffer::with_capacity(capacity);
                        engine::probe(table, &s[range], &mut out)?;
                        Ok(out)
                    })
                })
                .collect();
            // Probe barrier: joining every lane before touching any output.
            handles.into_iter().map(join_lane).collect()
        });
        timings.probe = started.elapsed();
        debug!("phase {:?}", Phase::ProbeBarrier);

        let started = Instant::now();
        let (tuples, lane_counts) = collect(lane_results)?;
        timings.collect = started.elapsed();
        info!(
            "shared-table join: {} tuples across {} lanes (build {:?}, probe {:?})",
            tuples.len(),
            lane_counts.len(),
            timings.build,
            timings.probe,
        );
        Ok(JoinOutput {
            tuples,
            lane_counts,
            timings,
            join_is_complete: true,
        })
    }

    fn run_partitioned(&self, r: &[Tuple], s: &[Tuple]) -> Result<JoinOutput, JoinError> {
        let mut timings = PhaseTimings::default();
        let r_ranges = self.lane_ranges(r.len());
        let s_ranges = self.lane_ranges(s.len());
        let capacity = self.config.lane_result_capacity;
        let config = self.config;

        debug!(
            "phase {:?}: private tables, {} lanes",
            Phase::Build,
            r_ranges.len()
        );
        // Each lane owns its table for both phases, so the cross-lane build
        // barrier is vacuous: the only table a lane probes is the one it just
        // finished building.
        let started = Instant::now();
        let lane_results: Vec<Result<ResultBuffer, JoinError>> = thread::scope(|scope| {
            let handles: Vec<_> = r_ranges
                .iter()
                .cloned()
                .zip(s_ranges.iter().cloned())
                .map(|(r_range, s_range)| {
                    scope.spawn(move || {
                        let mut table = HashTable::new(config)?;
                        engine::build(&mut table, &r[r_range])?;
                        let mut out = ResultBuffer::with_capacity(capacity);
                        engine::probe(&table, &s[s_range], &mut out)?;
                        Ok(out)
                    })
                })
                .collect();
            handles.into_iter().map(join_lane).collect()
        });
        // Build and probe are fused per lane here, so the probe figure covers
        // both phases.
        timings.probe = started.elapsed();
        debug!("phase {:?}", Phase::ProbeBarrier);

        let started = Instant::now();
        let (tuples, lane_counts) = collect(lane_results)?;
        timings.collect = started.elapsed();
        info!(
            "partitioned-table join: {} tuples across {} lanes (matches crossing lanes are missed)",
            tuples.len(),
            lane_counts.len(),
        );
        Ok(JoinOutput {
            tuples,
            lane_counts,
            timings,
            join_is_complete: false,
        })
    }
}

fn join_lane<T>(handle: thread::ScopedJoinHandle<'_, T>) -> T {
    match handle.join() {
        Ok(value) => value,
        Err(payload) => panic::resume_unwind(payload),
    }
}

/// Collect phase: merge lane buffers in lane order, surfacing the first lane
/// error if any.
fn collect(
    lane_results: Vec<Result<ResultBuffer, JoinError>>,
) -> Result<(Vec<JoinedTuple>, Vec<usize>), JoinError> {
    debug!("phase {:?}", Phase::Collect);
    let mut tuples = Vec::new();
    let mut lane_counts = Vec::with_capacity(lane_results.len());
    for result in lane_results {
        let buffer = result?;
        lane_counts.push(buffer.len());
        tuples.extend_from_slice(buffer.as_slice());
    }
    Ok((tuples, lane_counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle;

    fn tuples(pairs: &[(u32, u32)]) -> Vec<Tuple> {
        pairs.iter().map(|&(key, rid)| Tuple { key, rid }).collect()
    }

    fn workload() -> (Vec<Tuple>, Vec<Tuple>) {
        let r: Vec<Tuple> = (0..200)
            .map(|i| Tuple {
                key: i % 50,
                rid: i,
            })
            .collect();
        let s: Vec<Tuple> = (0..500)
            .map(|i| Tuple {
                key: i % 70,
                rid: 10_000 + i,
            })
            .collect();
        (r, s)
    }

    #[test]
    fn lane_ranges_cover_and_are_disjoint() {
        let config = JoinConfig::default().with_lanes(3).with_ratio(40);
        let sched = Scheduler::new(&config);
        let ranges = sched.lane_ranges(1000);
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0], 0..400);
        let mut covered = 0;
        let mut next = 0;
        for range in &ranges {
            assert_eq!(range.start, next);
            covered += range.len();
            next = range.end;
        }
        assert_eq!(covered, 1000);
    }

    #[test]
    fn lane_ranges_single_lane_takes_all() {
        let config = JoinConfig::default().with_lanes(1).with_ratio(0);
        assert_eq!(Scheduler::new(&config).lane_ranges(17), vec![0..17]);
    }

    #[test]
    fn shared_policy_matches_map_oracle_across_ratios() {
        let (r, s) = workload();
        let expected = oracle::map_join(&r, &s);
        for ratio in [0, 13, 50, 87, 100] {
            let config = JoinConfig::default().with_ratio(ratio);
            let out = Scheduler::new(&config).run(&r, &s).unwrap();
            assert!(out.join_is_complete);
            assert_eq!(
                out.lane_counts.iter().sum::<usize>(),
                out.tuples.len(),
                "ratio {ratio}"
            );
            let check = oracle::validate(&out.tuples, &expected);
            assert!(check.passed(), "ratio {ratio}: {:?}", check.mismatches);
        }
    }

    #[test]
    fn shared_policy_many_lanes() {
        let (r, s) = workload();
        let expected = oracle::map_join(&r, &s);
        let config = JoinConfig::default().with_lanes(4).with_ratio(25);
        let out = Scheduler::new(&config).run(&r, &s).unwrap();
        assert_eq!(out.lane_counts.len(), 4);
        assert!(oracle::validate(&out.tuples, &expected).passed());
    }

    #[test]
    fn shared_policy_empty_inputs() {
        let config = JoinConfig::default();
        let sched = Scheduler::new(&config);
        assert!(sched.run(&[], &tuples(&[(1, 1)])).unwrap().tuples.is_empty());
        assert!(sched.run(&tuples(&[(1, 1)]), &[]).unwrap().tuples.is_empty());
    }

    #[test]
    fn partitioned_policy_complete_when_keys_stay_in_lane() {
        // Both of key 7's build rows and probe rows fall in lane 0's slices,
        // key 9's in lane 1's: the partitioned join happens to be complete.
        let r = tuples(&[(7, 1), (7, 2), (9, 3), (9, 4)]);
        let s = tuples(&[(7, 100), (7, 101), (9, 102), (9, 103)]);
        let config = JoinConfig::default()
            .with_policy(ExecutionPolicy::PartitionedTable)
            .with_ratio(50);
        let out = Scheduler::new(&config).run(&r, &s).unwrap();
        assert!(!out.join_is_complete);
        let expected = oracle::map_join(&r, &s);
        assert!(oracle::validate(&out.tuples, &expected).passed());
    }

    #[test]
    fn partitioned_policy_misses_cross_lane_matches() {
        // Key 1's only build row lands in lane 0's R slice, but its probe row
        // lands in lane 1's S slice (and vice versa for key 2). The private
        // tables cannot see across lanes, so both matches are missed.
        let r = tuples(&[(1, 10), (2, 20)]);
        let s = tuples(&[(2, 100), (1, 200)]);
        let config = JoinConfig::default()
            .with_policy(ExecutionPolicy::PartitionedTable)
            .with_ratio(50);
        let out = Scheduler::new(&config).run(&r, &s).unwrap();
        assert!(out.tuples.is_empty());

        // The shared-table policy finds both.
        let shared = JoinConfig::default().with_ratio(50);
        let out = Scheduler::new(&shared).run(&r, &s).unwrap();
        assert_eq!(out.tuples.len(), 2);
    }

    #[test]
    fn partitioned_policy_degenerates_correctly_at_full_ratio() {
        // Ratio 100 puts everything on lane 0: one private table covering all
        // of R, probed by all of S. Equivalent to the shared single lane run.
        let (r, s) = workload();
        let config = JoinConfig::default()
            .with_policy(ExecutionPolicy::PartitionedTable)
            .with_ratio(100);
        let out = Scheduler::new(&config).run(&r, &s).unwrap();
        let expected = oracle::map_join(&r, &s);
        assert!(oracle::validate(&out.tuples, &expected).passed());
    }

    #[test]
    fn lane_capacity_error_propagates() {
        let (r, s) = workload();
        let config = JoinConfig::default().with_result_capacity(3);
        let err = Scheduler::new(&config).run(&r, &s).unwrap_err();
        assert!(matches!(err, JoinError::CapacityExceeded { .. }));
    }

    #[test]
    fn build_order_does_not_change_output_multiset() {
        use rand::prelude::*;
        use rand_chacha::ChaCha8Rng;

        let (r, s) = workload();
        let config = JoinConfig::default();
        let baseline = Scheduler::new(&config).run(&r, &s).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let mut shuffled = r.clone();
        shuffled.shuffle(&mut rng);
        let reordered = Scheduler::new(&config).run(&shuffled, &s).unwrap();

        assert!(oracle::validate(&baseline.tuples, &reordered.tuples).passed());
    }
}
