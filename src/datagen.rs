//! Reproducible workload generation.
//!
//! Seeded ChaCha RNG throughout so every dataset is replayable from its seed.
//! [`generate_r`]/[`generate_s`] mirror the shape of the experiment datasets
//! this engine is tuned against: R with uniform random keys, S drawing its
//! keys evenly from R's distinct key set. [`Workload`] exposes the
//! selectivity/multiplicity knobs the benchmarks sweep.

use std::collections::HashSet;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::Tuple;

/// Build side: `len` tuples with uniform random u32 keys and rids.
pub fn generate_r(len: usize, seed: u64) -> Vec<Tuple> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..len)
        .map(|_| Tuple {
            key: rng.random(),
            rid: rng.random(),
        })
        .collect()
}

/// Probe side: R's distinct keys spread as evenly as possible over `len`
/// tuples (each key appears ⌊len/U⌋ or ⌈len/U⌉ times), then shuffled. An
/// empty R yields `len` zeroed tuples, which join to nothing.
pub fn generate_s(r: &[Tuple], len: usize, seed: u64) -> Vec<Tuple> {
    let mut keys: Vec<u32> = {
        let uniq: HashSet<u32> = r.iter().map(|t| t.key).collect();
        uniq.into_iter().collect()
    };
    if keys.is_empty() {
        return vec![Tuple::default(); len];
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ 0x9e37_79b9);
    // Shuffle so the keys receiving the remainder are picked fairly.
    keys.shuffle(&mut rng);

    let base = len / keys.len();
    let mut remainder = len % keys.len();
    let mut s = Vec::with_capacity(len);
    for &key in &keys {
        let mut count = base;
        if remainder > 0 {
            count += 1;
            remainder -= 1;
        }
        for _ in 0..count {
            s.push(Tuple {
                key,
                rid: rng.random(),
            });
        }
    }
    s.shuffle(&mut rng);
    s
}

/// A parameterized join workload.
///
/// - `build_keys`: distinct keys on the build side
/// - `multiplicity`: build duplicates per key (total build = keys × mult)
/// - `probe_count`: probe tuples
/// - `selectivity`: fraction of probe tuples whose key exists in R
pub struct Workload {
    pub r: Vec<Tuple>,
    pub s: Vec<Tuple>,
    pub label: String,
}

impl Workload {
    pub fn generate(
        build_keys: usize,
        multiplicity: usize,
        probe_count: usize,
        selectivity: f64,
        seed: u64,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        // Build side: keys 0..build_keys, each repeated `multiplicity` times,
        // shuffled to simulate unordered input.
        let mut r = Vec::with_capacity(build_keys * multiplicity);
        for key in 0..build_keys as u32 {
            for dup in 0..multiplicity as u32 {
                r.push(Tuple {
                    key,
                    rid: key * 1000 + dup,
                });
            }
        }
        r.shuffle(&mut rng);

        // Probe side: selectivity% of keys hit, the rest miss (offset past
        // the build key range). With no build keys every probe tuple misses.
        let matching = if build_keys == 0 {
            0
        } else {
            (probe_count as f64 * selectivity) as usize
        };
        let mut s = Vec::with_capacity(probe_count);
        for _ in 0..matching {
            s.push(Tuple {
                key: rng.random_range(0..build_keys as u32),
                rid: rng.random(),
            });
        }
        let miss_base = build_keys as u32;
        let miss_span = miss_base.max(1);
        for _ in 0..probe_count - matching {
            s.push(Tuple {
                key: miss_base + rng.random_range(0..miss_span),
                rid: rng.random(),
            });
        }
        s.shuffle(&mut rng);

        let total_build = build_keys * multiplicity;
        let label =
            format!("build={total_build}/probe={probe_count}/sel={selectivity}/mul={multiplicity}");

        Self { r, s, label }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn generate_r_is_deterministic() {
        assert_eq!(generate_r(64, 42), generate_r(64, 42));
        assert_ne!(generate_r(64, 42), generate_r(64, 43));
    }

    #[test]
    fn generate_s_keys_come_from_r() {
        let r = generate_r(50, 7);
        let s = generate_s(&r, 400, 7);
        let r_keys: HashSet<u32> = r.iter().map(|t| t.key).collect();
        assert_eq!(s.len(), 400);
        assert!(s.iter().all(|t| r_keys.contains(&t.key)));
    }

    #[test]
    fn generate_s_spreads_keys_evenly() {
        let r = generate_r(50, 11);
        let s = generate_s(&r, 403, 11);
        let uniq: HashSet<u32> = r.iter().map(|t| t.key).collect();
        let mut counts: HashMap<u32, usize> = HashMap::new();
        for t in &s {
            *counts.entry(t.key).or_default() += 1;
        }
        assert_eq!(counts.len(), uniq.len());
        let base = 403 / uniq.len();
        for &count in counts.values() {
            assert!(count == base || count == base + 1, "count {count}");
        }
    }

    #[test]
    fn generate_s_empty_r() {
        let s = generate_s(&[], 8, 1);
        assert_eq!(s.len(), 8);
        assert!(s.iter().all(|t| *t == Tuple::default()));
    }

    #[test]
    fn workload_with_no_build_keys_misses_everywhere() {
        let w = Workload::generate(0, 3, 100, 1.0, 7);
        assert!(w.r.is_empty());
        assert_eq!(w.s.len(), 100);
        assert!(crate::oracle::map_join(&w.r, &w.s).is_empty());
    }

    #[test]
    fn workload_shapes() {
        let w = Workload::generate(100, 3, 1000, 0.5, 42);
        assert_eq!(w.r.len(), 300);
        assert_eq!(w.s.len(), 1000);
        let hits = w.s.iter().filter(|t| t.key < 100).count();
        assert_eq!(hits, 500);
    }
}
