//! Timing side-channel check for key matching.
//!
//! Welch's t-test over two classes of presented keys, both mismatching the
//! stored key: class A differs in the first byte, class B only in the last.
//! An early-exit comparison would make class A measurably faster. Samples are
//! interleaved to cancel drift and each sample times a batch of calls to rise
//! above timer resolution. |t| above 4.5 would indicate a leak.

use std::time::Instant;
use tokenlock_core::crypto::Secret;
use tokenlock_core::matcher::find_owner;
use tokenlock_core::store::KeyMap;

const KEY_SIZE: usize = 2048;
const SAMPLES: usize = 2_000;
const BATCH: usize = 20;
const T_THRESHOLD: f64 = 4.5;

#[allow(clippy::cast_precision_loss)]
fn welch_t_statistic(a: &[f64], b: &[f64]) -> f64 {
    let n_a = a.len() as f64;
    let n_b = b.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n_a;
    let mean_b = b.iter().sum::<f64>() / n_b;
    let var_a = a.iter().map(|x| (x - mean_a).powi(2)).sum::<f64>() / (n_a - 1.0);
    let var_b = b.iter().map(|x| (x - mean_b).powi(2)).sum::<f64>() / (n_b - 1.0);
    let denominator = (var_a / n_a + var_b / n_b).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }
    (mean_a - mean_b) / denominator
}

/// Drop the slowest 5% of samples; scheduler preemption only ever adds time.
fn trim(mut samples: Vec<f64>) -> Vec<f64> {
    samples.sort_by(|x, y| x.total_cmp(y));
    samples.truncate(samples.len() * 95 / 100);
    samples
}

#[inline(never)]
fn timed_batch(presented: &Secret, keys: &KeyMap) -> f64 {
    let start = Instant::now();
    for _ in 0..BATCH {
        std::hint::black_box(find_owner(std::hint::black_box(presented), keys));
    }
    start.elapsed().as_nanos() as f64
}

#[test]
fn mismatch_position_does_not_affect_match_time() {
    let stored = Secret::generate(KEY_SIZE);
    let mut keys = KeyMap::new();
    keys.insert("alice".to_string(), stored.to_hex().to_string());

    let mut early = stored.as_bytes().to_vec();
    early[0] ^= 0xff;
    let early = Secret::from_bytes(early);
    let mut late = stored.as_bytes().to_vec();
    late[KEY_SIZE - 1] ^= 0xff;
    let late = Secret::from_bytes(late);

    for _ in 0..200 {
        timed_batch(&early, &keys);
        timed_batch(&late, &keys);
    }

    let mut times_early = Vec::with_capacity(SAMPLES);
    let mut times_late = Vec::with_capacity(SAMPLES);
    for i in 0..SAMPLES {
        if i % 2 == 0 {
            times_early.push(timed_batch(&early, &keys));
            times_late.push(timed_batch(&late, &keys));
        } else {
            times_late.push(timed_batch(&late, &keys));
            times_early.push(timed_batch(&early, &keys));
        }
    }

    let t = welch_t_statistic(&trim(times_early), &trim(times_late));
    assert!(
        t.abs() < T_THRESHOLD,
        "timing difference between first-byte and last-byte mismatches: |t| = {:.2}",
        t.abs()
    );
}
