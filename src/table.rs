//! Bucketed hash table for the build side.
//!
//! Fixed bucket array addressed by a Knuth multiplicative hash. Instead of
//! nested growable lists (bucket → key list → rid list), key entries and rid
//! lists live in flat arenas with fixed per-bucket and per-key capacities:
//!
//! ```text
//!  key_counts[b]           keys / rid_counts (bucket-major)     rids
//! ┌───────────┐          ┌──────────────────────────────┐   ┌───────────────┐
//! │ bucket 0: 2│────────►│ slot 0..keys_per_bucket      │──►│ rids_per_key  │
//! │ bucket 1: 0│         │ slot 0..keys_per_bucket      │   │ slots per key │
//! │ ...        │         │ ...                          │   │ ...           │
//! └───────────┘          └──────────────────────────────┘   └───────────────┘
//! ```
//!
//! A key slot's global index is `bucket * keys_per_bucket + j`; its rid region
//! starts at `slot * rids_per_key`. Rid order is insertion order and rids are
//! never deduplicated. The per-bucket distinct-key count is maintained by the
//! single append path in [`HashTable::insert`], so it always equals the
//! occupied key-slot count (there is no separately mutated counter to drift).
//!
//! The table is mutated only during build and read-only during probe; one
//! instance lives for exactly one join invocation.

use crate::config::JoinConfig;
use crate::error::JoinError;

/// Knuth's 32-bit multiplicative hash constant.
pub const GOLDEN_RATIO_32: u32 = 2_654_435_769;

/// Bucket index for `key`. Unsigned wraparound on the multiply is intentional.
#[inline(always)]
pub fn bucket_id(key: u32, bucket_count: u32) -> u32 {
    key.wrapping_mul(GOLDEN_RATIO_32) % bucket_count
}

pub struct HashTable {
    bucket_count: u32,
    keys_per_bucket: u32,
    rids_per_key: u32,
    /// Distinct keys seen so far, per bucket.
    key_counts: Vec<u32>,
    /// Key arena, `bucket_count * keys_per_bucket` slots.
    keys: Vec<u32>,
    /// Occupied rid slots per key slot.
    rid_counts: Vec<u32>,
    /// Rid arena, `rids_per_key` slots per key slot.
    rids: Vec<u32>,
}

impl HashTable {
    pub fn new(config: &JoinConfig) -> Result<Self, JoinError> {
        config.validate()?;
        let key_slots = config.bucket_count as usize * config.keys_per_bucket as usize;
        Ok(Self {
            bucket_count: config.bucket_count,
            keys_per_bucket: config.keys_per_bucket,
            rids_per_key: config.rids_per_key,
            key_counts: vec![0; config.bucket_count as usize],
            keys: vec![0; key_slots],
            rid_counts: vec![0; key_slots],
            rids: vec![0; key_slots * config.rids_per_key as usize],
        })
    }

    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    /// Distinct keys stored in `bucket` (the legacy `totalNum`). Derived from
    /// the occupied slot count, never incremented independently.
    #[inline]
    pub fn total_num(&self, bucket: u32) -> u32 {
        self.key_counts[bucket as usize]
    }

    #[inline]
    fn key_base(&self, bucket: u32) -> usize {
        bucket as usize * self.keys_per_bucket as usize
    }

    /// Insert one build tuple: hash, scan the bucket's key list, append a new
    /// key entry if absent, then append the rid. Touches exactly one bucket.
    pub fn insert(&mut self, key: u32, rid: u32) -> Result<(), JoinError> {
        let bucket = bucket_id(key, self.bucket_count);
        let slot = self.insert_key(bucket, key)?;
        self.append_rid(slot, rid)
    }

    /// Key-list management half of an insert: scan `bucket` for `key`, append
    /// a new key entry if absent, and return the global key-slot index.
    pub fn insert_key(&mut self, bucket: u32, key: u32) -> Result<usize, JoinError> {
        let base = self.key_base(bucket);
        let count = self.key_counts[bucket as usize] as usize;

        for slot in 0..count {
            if self.keys[base + slot] == key {
                return Ok(base + slot);
            }
        }
        if count == self.keys_per_bucket as usize {
            return Err(JoinError::CapacityExceeded {
                resource: "bucket key slots",
                limit: self.keys_per_bucket as usize,
            });
        }
        self.keys[base + count] = key;
        self.key_counts[bucket as usize] += 1;
        Ok(base + count)
    }

    /// Rid-insertion half of an insert: append `rid` to the list at `slot`,
    /// as previously returned by [`HashTable::insert_key`].
    pub fn append_rid(&mut self, slot: usize, rid: u32) -> Result<(), JoinError> {
        let rid_count = self.rid_counts[slot] as usize;
        if rid_count == self.rids_per_key as usize {
            return Err(JoinError::CapacityExceeded {
                resource: "rid slots",
                limit: self.rids_per_key as usize,
            });
        }
        self.rids[slot * self.rids_per_key as usize + rid_count] = rid;
        self.rid_counts[slot] += 1;
        Ok(())
    }

    /// Linear-scan `bucket` for `key`, returning its global key-slot index.
    /// The empty-bucket check short-circuits the scan.
    #[inline]
    pub fn find_key_in(&self, bucket: u32, key: u32) -> Option<usize> {
        let count = self.key_counts[bucket as usize] as usize;
        if count == 0 {
            return None;
        }
        let base = self.key_base(bucket);
        (base..base + count).find(|&slot| self.keys[slot] == key)
    }

    /// Key-slot index for `key`, if it was inserted during build.
    #[inline]
    pub fn find_key(&self, key: u32) -> Option<usize> {
        self.find_key_in(bucket_id(key, self.bucket_count), key)
    }

    /// Build rids stored at `slot`, in insertion order.
    #[inline]
    pub fn rids_for_slot(&self, slot: usize) -> &[u32] {
        let start = slot * self.rids_per_key as usize;
        &self.rids[start..start + self.rid_counts[slot] as usize]
    }

    /// Build rids matching `key`; empty both for an empty bucket and for a
    /// populated bucket that never saw the key.
    #[inline]
    pub fn matches(&self, key: u32) -> &[u32] {
        match self.find_key(key) {
            Some(slot) => self.rids_for_slot(slot),
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> JoinConfig {
        JoinConfig::new(16)
    }

    // -- Hash tests ---------------------------------------------------------

    #[test]
    fn hash_zero_maps_to_bucket_zero() {
        assert_eq!(bucket_id(0, 16), 0);
    }

    #[test]
    fn hash_is_pure() {
        for key in [1_u32, 7, 1024, u32::MAX] {
            assert_eq!(bucket_id(key, 16), bucket_id(key, 16));
        }
    }

    #[test]
    fn hash_stays_in_range() {
        for count in [1_u32, 2, 16, 1000, 4096] {
            for key in (0..10_000).chain([u32::MAX - 1, u32::MAX]) {
                assert!(bucket_id(key, count) < count);
            }
        }
    }

    #[test]
    fn hash_spreads_sequential_keys() {
        // Sequential keys should not pile into a few buckets.
        let count = 64_u32;
        let mut histogram = vec![0_usize; count as usize];
        for key in 0..6400_u32 {
            histogram[bucket_id(key, count) as usize] += 1;
        }
        let max = histogram.iter().copied().max().unwrap();
        assert!(max < 300, "worst bucket holds {max} of 6400 keys");
    }

    // -- Insert / lookup ----------------------------------------------------

    #[test]
    fn insert_then_match() {
        let mut table = HashTable::new(&small_config()).unwrap();
        table.insert(42, 7).unwrap();
        assert_eq!(table.matches(42), &[7]);
        assert_eq!(table.matches(43), &[] as &[u32]);
    }

    #[test]
    fn rid_order_is_insertion_order() {
        let mut table = HashTable::new(&small_config()).unwrap();
        for rid in [5_u32, 3, 9, 3] {
            table.insert(10, rid).unwrap();
        }
        // Duplicated rids are kept, never deduplicated.
        assert_eq!(table.matches(10), &[5, 3, 9, 3]);
    }

    #[test]
    fn key_appears_in_exactly_one_slot() {
        let mut table = HashTable::new(&small_config()).unwrap();
        for i in 0..100_u32 {
            table.insert(i % 10, i).unwrap();
        }
        let mut slots = std::collections::HashSet::new();
        for key in 0..10_u32 {
            let slot = table.find_key(key).expect("key inserted");
            assert!(slots.insert(slot), "key {key} shares a slot");
            assert_eq!(table.rids_for_slot(slot).len(), 10);
        }
    }

    #[test]
    fn total_num_tracks_distinct_keys() {
        let mut table = HashTable::new(&small_config()).unwrap();
        let key = 77_u32;
        let bucket = bucket_id(key, table.bucket_count());
        assert_eq!(table.total_num(bucket), 0);
        table.insert(key, 1).unwrap();
        table.insert(key, 2).unwrap();
        // Re-inserting an existing key must not bump the distinct count.
        assert_eq!(table.total_num(bucket), 1);
    }

    #[test]
    fn colliding_keys_share_a_bucket() {
        // With a single bucket every key collides; the key list must keep
        // them distinct.
        let config = JoinConfig::new(1);
        let mut table = HashTable::new(&config).unwrap();
        for key in 0..20_u32 {
            table.insert(key, key * 100).unwrap();
        }
        assert_eq!(table.total_num(0), 20);
        for key in 0..20_u32 {
            assert_eq!(table.matches(key), &[key * 100]);
        }
    }

    // -- Capacity -----------------------------------------------------------

    #[test]
    fn key_slot_exhaustion_reported() {
        let config = JoinConfig::new(1).with_table_capacities(4, 4);
        let mut table = HashTable::new(&config).unwrap();
        for key in 0..4_u32 {
            table.insert(key, 0).unwrap();
        }
        let err = table.insert(4, 0).unwrap_err();
        assert_eq!(
            err,
            JoinError::CapacityExceeded {
                resource: "bucket key slots",
                limit: 4
            }
        );
    }

    #[test]
    fn rid_slot_exhaustion_reported() {
        let config = JoinConfig::new(16).with_table_capacities(4, 2);
        let mut table = HashTable::new(&config).unwrap();
        table.insert(9, 0).unwrap();
        table.insert(9, 1).unwrap();
        let err = table.insert(9, 2).unwrap_err();
        assert_eq!(
            err,
            JoinError::CapacityExceeded {
                resource: "rid slots",
                limit: 2
            }
        );
    }

    #[test]
    fn invalid_config_rejected_at_construction() {
        assert!(HashTable::new(&JoinConfig::new(0)).is_err());
    }
}
