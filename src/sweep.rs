//! Configuration sweeps.
//!
//! Brute-force search over a small discrete configuration space, kept apart
//! from the join engine: [`measure_ratio`] is the pure
//! `(configuration) → measured time` function, and the sweep drivers walk it
//! over either the work-ratio range or all step-plan lane assignments,
//! reporting the fastest configuration found.

use std::time::{Duration, Instant};

use log::{debug, info};

use crate::Tuple;
use crate::config::JoinConfig;
use crate::engine::{self, ResultBuffer, StepPlan};
use crate::error::JoinError;
use crate::sch::Scheduler;
use crate::table::HashTable;

/// Inclusive work-ratio window walked by [`sweep_ratio`].
#[derive(Debug, Clone, Copy)]
pub struct RatioRange {
    pub start: u8,
    pub end: u8,
    pub step: u8,
}

impl RatioRange {
    pub fn new(start: u8, end: u8, step: u8) -> Self {
        Self { start, end, step }
    }

    fn validate(&self) -> Result<(), JoinError> {
        if self.step == 0 {
            return Err(JoinError::config("ratio sweep step must be > 0"));
        }
        if self.start > self.end || self.end > 100 {
            return Err(JoinError::config(format!(
                "ratio sweep window {}..={} out of range",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

impl Default for RatioRange {
    fn default() -> Self {
        Self::new(20, 50, 2)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RatioSample {
    pub ratio: u8,
    pub elapsed: Duration,
    pub tuples: usize,
}

#[derive(Debug, Clone)]
pub struct RatioSweep {
    pub samples: Vec<RatioSample>,
    pub best: RatioSample,
}

/// Time one full scheduled run at `ratio`. No state carries over between
/// measurements; every call builds its own table.
pub fn measure_ratio(
    config: &JoinConfig,
    r: &[Tuple],
    s: &[Tuple],
    ratio: u8,
) -> Result<RatioSample, JoinError> {
    let config = config.clone().with_ratio(ratio);
    let started = Instant::now();
    let output = Scheduler::new(&config).run(r, s)?;
    Ok(RatioSample {
        ratio,
        elapsed: started.elapsed(),
        tuples: output.tuples.len(),
    })
}

/// Walk the ratio window and report the fastest split.
pub fn sweep_ratio(
    config: &JoinConfig,
    r: &[Tuple],
    s: &[Tuple],
    range: RatioRange,
) -> Result<RatioSweep, JoinError> {
    range.validate()?;
    config.validate()?;

    let mut samples = Vec::new();
    let mut best: Option<RatioSample> = None;
    let mut ratio = range.start;
    loop {
        let sample = measure_ratio(config, r, s, ratio)?;
        debug!(
            "ratio {:>3}%: {:?}, {} tuples",
            sample.ratio, sample.elapsed, sample.tuples
        );
        if best.is_none_or(|b| sample.elapsed < b.elapsed) {
            best = Some(sample);
        }
        samples.push(sample);

        let next = ratio.saturating_add(range.step);
        if next > range.end {
            break;
        }
        ratio = next;
    }

    // The window is non-empty, so at least one sample was taken.
    let best = best.ok_or_else(|| JoinError::config("empty ratio sweep window"))?;
    info!(
        "ratio sweep: best {}% in {:?} over {} samples",
        best.ratio,
        best.elapsed,
        samples.len()
    );
    Ok(RatioSweep { samples, best })
}

#[derive(Debug, Clone, Copy)]
pub struct PlanSample {
    pub plan: StepPlan,
    pub elapsed: Duration,
    pub tuples: usize,
}

#[derive(Debug, Clone)]
pub struct PlanSweep {
    pub samples: Vec<PlanSample>,
    pub best: PlanSample,
}

/// Time the staged join under every assignment of the four step-assignable
/// passes (build key-list management, build rid insertion, probe key search,
/// probe emission) to two lanes. Each assignment runs against a fresh table,
/// since the two build steps are part of the measured work.
pub fn sweep_step_plan(
    config: &JoinConfig,
    r: &[Tuple],
    s: &[Tuple],
) -> Result<PlanSweep, JoinError> {
    config.validate()?;

    let mut samples = Vec::new();
    let mut best: Option<PlanSample> = None;
    for plan in StepPlan::assignments(2) {
        let mut table = HashTable::new(config)?;
        let mut out = ResultBuffer::with_capacity(config.lane_result_capacity);
        let started = Instant::now();
        engine::build_staged(&mut table, r, plan)?;
        engine::probe_staged(&table, s, plan, &mut out)?;
        let sample = PlanSample {
            plan,
            elapsed: started.elapsed(),
            tuples: out.len(),
        };
        debug!("plan {:?}: {:?}", sample.plan, sample.elapsed);
        if best.is_none_or(|b| sample.elapsed < b.elapsed) {
            best = Some(sample);
        }
        samples.push(sample);
    }

    let best = best.ok_or_else(|| JoinError::config("empty plan sweep"))?;
    info!(
        "step-plan sweep: best {:?} in {:?}",
        best.plan, best.elapsed
    );
    Ok(PlanSweep { samples, best })
}
