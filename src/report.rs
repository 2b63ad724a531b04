//! Run driver and final report.
//!
//! [`run`] executes one full invocation: the laned join, each enabled oracle
//! with its cross-check, and the optional work-ratio sweep. Capacity and
//! configuration errors abort the strategy they hit (a bad configuration
//! aborts everything, since every strategy shares it); validation mismatches
//! are recorded and the remaining comparisons still run. The report never
//! claims overall success while any enabled comparison failed.

use std::fmt;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::Tuple;
use crate::config::{JoinConfig, RunFlags};
use crate::error::JoinError;
use crate::oracle::{self, Validation};
use crate::sch::{PhaseTimings, Scheduler};
use crate::sweep::{self, RatioRange, RatioSample};

/// What one execution strategy produced: a tuple count, or the error that
/// aborted it.
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub name: &'static str,
    pub tuples: Option<usize>,
    pub error: Option<JoinError>,
    pub elapsed: Duration,
}

impl StrategyOutcome {
    fn succeeded(name: &'static str, tuples: usize, elapsed: Duration) -> Self {
        Self {
            name,
            tuples: Some(tuples),
            error: None,
            elapsed,
        }
    }

    fn aborted(name: &'static str, error: JoinError, elapsed: Duration) -> Self {
        Self {
            name,
            tuples: None,
            error: Some(error),
            elapsed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub laned: StrategyOutcome,
    /// Per-lane output counts from the laned run, when it succeeded.
    pub lane_counts: Vec<usize>,
    pub timings: Option<PhaseTimings>,
    pub map_oracle: Option<StrategyOutcome>,
    pub map_check: Option<Validation>,
    pub naive_oracle: Option<StrategyOutcome>,
    pub naive_check: Option<Validation>,
    pub best_ratio: Option<RatioSample>,
}

impl RunReport {
    /// Overall verdict. False whenever a strategy aborted or any enabled
    /// comparison found a mismatch.
    pub fn passed(&self) -> bool {
        self.laned.error.is_none()
            && self
                .map_oracle
                .as_ref()
                .is_none_or(|o| o.error.is_none())
            && self
                .naive_oracle
                .as_ref()
                .is_none_or(|o| o.error.is_none())
            && self.map_check.as_ref().is_none_or(Validation::passed)
            && self.naive_check.as_ref().is_none_or(Validation::passed)
    }
}

fn fmt_strategy(f: &mut fmt::Formatter<'_>, outcome: &StrategyOutcome) -> fmt::Result {
    match (&outcome.tuples, &outcome.error) {
        (Some(tuples), _) => writeln!(
            f,
            "{:<14} {} tuples in {:?}",
            outcome.name, tuples, outcome.elapsed
        ),
        (None, Some(error)) => writeln!(f, "{:<14} aborted: {}", outcome.name, error),
        (None, None) => writeln!(f, "{:<14} not run", outcome.name),
    }
}

fn fmt_check(f: &mut fmt::Formatter<'_>, name: &str, check: &Validation) -> fmt::Result {
    if check.passed() {
        writeln!(f, "{name:<14} PASS")
    } else {
        writeln!(
            f,
            "{:<14} FAIL ({} vs {} tuples, {} mismatched keys)",
            name,
            check.left_total,
            check.right_total,
            check.mismatches.len()
        )
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== join report ===")?;
        fmt_strategy(f, &self.laned)?;
        if let Some(oracle) = &self.map_oracle {
            fmt_strategy(f, oracle)?;
        }
        if let Some(oracle) = &self.naive_oracle {
            fmt_strategy(f, oracle)?;
        }
        if let Some(check) = &self.map_check {
            fmt_check(f, "vs map", check)?;
        }
        if let Some(check) = &self.naive_check {
            fmt_check(f, "vs naive", check)?;
        }
        if let Some(best) = &self.best_ratio {
            writeln!(f, "{:<14} {}% in {:?}", "best ratio", best.ratio, best.elapsed)?;
        }
        writeln!(
            f,
            "{:<14} {}",
            "verdict",
            if self.passed() { "PASS" } else { "FAIL" }
        )
    }
}

/// Run the laned engine plus everything `flags` enables, over one (R, S).
pub fn run(
    config: &JoinConfig,
    flags: &RunFlags,
    r: &[Tuple],
    s: &[Tuple],
) -> Result<RunReport, JoinError> {
    config.validate()?;

    let started = Instant::now();
    let laned_result = Scheduler::new(config).run(r, s);
    let elapsed = started.elapsed();

    let (laned, lane_counts, timings, laned_tuples) = match laned_result {
        Ok(output) => (
            StrategyOutcome::succeeded("laned join", output.tuples.len(), elapsed),
            output.lane_counts,
            Some(output.timings),
            Some(output.tuples),
        ),
        Err(error) => {
            warn!("laned join aborted: {error}");
            (
                StrategyOutcome::aborted("laned join", error, elapsed),
                Vec::new(),
                None,
                None,
            )
        }
    };

    let mut map_oracle = None;
    let mut map_check = None;
    if flags.map_oracle {
        let started = Instant::now();
        let mapped = oracle::map_join(r, s);
        map_oracle = Some(StrategyOutcome::succeeded(
            "map oracle",
            mapped.len(),
            started.elapsed(),
        ));
        if let Some(tuples) = &laned_tuples {
            map_check = Some(oracle::validate(tuples, &mapped));
        }
    }

    let mut naive_oracle = None;
    let mut naive_check = None;
    if flags.naive_oracle {
        let started = Instant::now();
        match oracle::naive_join(config, r, s) {
            Ok(naive) => {
                naive_oracle = Some(StrategyOutcome::succeeded(
                    "naive oracle",
                    naive.len(),
                    started.elapsed(),
                ));
                if let Some(tuples) = &laned_tuples {
                    naive_check = Some(oracle::validate(tuples, &naive));
                }
            }
            Err(error) => {
                warn!("naive oracle aborted: {error}");
                naive_oracle = Some(StrategyOutcome::aborted(
                    "naive oracle",
                    error,
                    started.elapsed(),
                ));
            }
        }
    }

    let mut best_ratio = None;
    if flags.ratio_sweep {
        match sweep::sweep_ratio(config, r, s, RatioRange::default()) {
            Ok(swept) => best_ratio = Some(swept.best),
            // The sweep is informational; a failing sweep must not take the
            // correctness report down with it.
            Err(error) => warn!("ratio sweep aborted: {error}"),
        }
    }

    let report = RunReport {
        laned,
        lane_counts,
        timings,
        map_oracle,
        map_check,
        naive_oracle,
        naive_check,
        best_ratio,
    };
    info!(
        "run finished: {}",
        if report.passed() { "PASS" } else { "FAIL" }
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datagen;

    fn workload() -> (Vec<Tuple>, Vec<Tuple>) {
        let r = datagen::generate_r(64, 3);
        let s = datagen::generate_s(&r, 512, 3);
        (r, s)
    }

    #[test]
    fn full_run_passes() {
        let (r, s) = workload();
        let report = run(&JoinConfig::default(), &RunFlags::default(), &r, &s).unwrap();
        assert!(report.passed());
        assert!(report.map_check.unwrap().passed());
        assert!(report.naive_check.unwrap().passed());
        assert_eq!(report.lane_counts.len(), 2);
    }

    #[test]
    fn bad_config_aborts_everything() {
        let (r, s) = workload();
        let err = run(&JoinConfig::new(0), &RunFlags::default(), &r, &s).unwrap_err();
        assert!(matches!(err, JoinError::Configuration { .. }));
    }

    #[test]
    fn capacity_abort_is_reported_not_raised() {
        let (r, s) = workload();
        let config = JoinConfig::default().with_result_capacity(1);
        let report = run(&config, &RunFlags::default(), &r, &s).unwrap();
        assert!(!report.passed());
        assert!(matches!(
            report.laned.error,
            Some(JoinError::CapacityExceeded { .. })
        ));
        // The map oracle still ran and is reported.
        assert!(report.map_oracle.unwrap().error.is_none());
        // No laned output, so no comparisons.
        assert!(report.map_check.is_none());
    }

    #[test]
    fn disabled_oracles_are_skipped() {
        let (r, s) = workload();
        let flags = RunFlags {
            map_oracle: false,
            naive_oracle: false,
            ratio_sweep: false,
        };
        let report = run(&JoinConfig::default(), &flags, &r, &s).unwrap();
        assert!(report.passed());
        assert!(report.map_oracle.is_none());
        assert!(report.naive_check.is_none());
    }

    #[test]
    fn sweep_flag_records_best_ratio() {
        let (r, s) = workload();
        let flags = RunFlags {
            ratio_sweep: true,
            ..RunFlags::default()
        };
        let report = run(&JoinConfig::default(), &flags, &r, &s).unwrap();
        let best = report.best_ratio.unwrap();
        assert!((20..=50).contains(&best.ratio));
    }

    #[test]
    fn report_display_names_the_verdict() {
        let (r, s) = workload();
        let report = run(&JoinConfig::default(), &RunFlags::default(), &r, &s).unwrap();
        let text = report.to_string();
        assert!(text.contains("verdict"));
        assert!(text.contains("PASS"));
        assert!(!text.contains("FAIL"));
    }
}
