//! Join configuration.
//!
//! All knobs for one invocation live in [`JoinConfig`]. The bucket count is a
//! free parameter, never derived from the input sizes; hash quality against it
//! decides per-bucket key-list length and therefore probe cost.

use crate::error::JoinError;

/// How the scheduler distributes the hash table across lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPolicy {
    /// One lane builds a single table from all of R; every lane probes it.
    /// Correctness-preserving for any input.
    SharedTable,
    /// Each lane builds a private table from its own R slice and probes only
    /// its own S slice. Incomplete in general: a key's build rows and probe
    /// rows can land on different lanes with no fallback lookup.
    PartitionedTable,
}

#[derive(Debug, Clone)]
pub struct JoinConfig {
    /// Number of hash buckets. Fixed for the lifetime of a table.
    pub bucket_count: u32,
    /// Distinct-key slots per bucket.
    pub keys_per_bucket: u32,
    /// Build-rid slots per distinct key.
    pub rids_per_key: u32,
    /// Number of execution lanes.
    pub lane_count: usize,
    /// Percentage of the tuple range assigned to lane 0; the remainder is
    /// split evenly over the other lanes. 0 and 100 degenerate to a single
    /// active lane and must still join correctly.
    pub work_ratio: u8,
    pub policy: ExecutionPolicy,
    /// Pre-sized output slots per lane. Never grows during a run.
    pub lane_result_capacity: usize,
}

impl JoinConfig {
    pub const DEFAULT_BUCKET_COUNT: u32 = 16;
    pub const DEFAULT_KEYS_PER_BUCKET: u32 = 64;
    pub const DEFAULT_RIDS_PER_KEY: u32 = 256;

    pub fn new(bucket_count: u32) -> Self {
        Self {
            bucket_count,
            ..Self::default()
        }
    }

    pub fn with_ratio(mut self, work_ratio: u8) -> Self {
        self.work_ratio = work_ratio;
        self
    }

    pub fn with_lanes(mut self, lane_count: usize) -> Self {
        self.lane_count = lane_count;
        self
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_table_capacities(mut self, keys_per_bucket: u32, rids_per_key: u32) -> Self {
        self.keys_per_bucket = keys_per_bucket;
        self.rids_per_key = rids_per_key;
        self
    }

    pub fn with_result_capacity(mut self, lane_result_capacity: usize) -> Self {
        self.lane_result_capacity = lane_result_capacity;
        self
    }

    pub fn validate(&self) -> Result<(), JoinError> {
        if self.bucket_count == 0 {
            return Err(JoinError::config("bucket count must be > 0"));
        }
        if self.keys_per_bucket == 0 {
            return Err(JoinError::config("keys per bucket must be > 0"));
        }
        if self.rids_per_key == 0 {
            return Err(JoinError::config("rids per key must be > 0"));
        }
        if self.lane_count == 0 {
            return Err(JoinError::config("lane count must be > 0"));
        }
        if self.work_ratio > 100 {
            return Err(JoinError::config(format!(
                "work ratio {}% out of range 0..=100",
                self.work_ratio
            )));
        }
        Ok(())
    }
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            bucket_count: Self::DEFAULT_BUCKET_COUNT,
            keys_per_bucket: Self::DEFAULT_KEYS_PER_BUCKET,
            rids_per_key: Self::DEFAULT_RIDS_PER_KEY,
            lane_count: 2,
            work_ratio: 50,
            policy: ExecutionPolicy::SharedTable,
            lane_result_capacity: 1 << 20,
        }
    }
}

/// Which optional pieces a [`crate::report::run`] invocation executes.
#[derive(Debug, Clone, Copy)]
pub struct RunFlags {
    pub map_oracle: bool,
    pub naive_oracle: bool,
    pub ratio_sweep: bool,
}

impl Default for RunFlags {
    fn default() -> Self {
        Self {
            map_oracle: true,
            naive_oracle: true,
            ratio_sweep: false,
        }
    }
}
