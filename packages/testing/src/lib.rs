#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing, benchmarking and demonstrating callgauge.
//!
//! Besides the watchdog that keeps hanging tests from stalling the build, this provides
//! workloads with predictable timing characteristics: [`spin()`] keeps the calling thread
//! busy for a given amount of wall time, while [`burn_cpu()`] performs a fixed amount of
//! processor work regardless of how long it takes.

use std::hint::black_box;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Runs a test with a timeout to prevent infinite hangs.
///
/// If the test takes longer than the timeout to complete, the watchdog panics so that
/// the build does not hang. The timeout is 10 seconds under normal conditions and 60
/// seconds under Miri, where thread synchronization primitives are significantly slower.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog
/// is disabled and the test function is executed directly. This allows mutation
/// testing to properly detect hanging mutations.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode) or if the
/// test itself panics.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// with_watchdog(|| {
///     assert_eq!(2 + 2, 4);
/// });
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the receiver has already timed out.
        drop(tx.send(result));
    });

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("Test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("Test exceeded the {timeout:?} timeout");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("Test thread disconnected unexpectedly"),
            Err(e) => std::panic::resume_unwind(e),
        },
    }
}

/// Keeps the calling thread busy until `duration` of wall time has passed.
///
/// The thread never sleeps or yields, so on an otherwise idle machine the processor
/// time consumed is close to `duration`.
pub fn spin(duration: Duration) {
    let started = Instant::now();

    while started.elapsed() < duration {
        black_box(started);
    }
}

/// Performs a fixed amount of processor work, scaled by `rounds`.
///
/// Each round computes a large factorial modulo a prime.
pub fn burn_cpu(rounds: u32) {
    const MODULUS: u64 = 1_000_000_007;

    let mut checksum = 0_u64;

    for round in 0..rounds {
        let mut factorial = 1_u64;

        for factor in 1..=black_box(10_000_u64) {
            factorial = factorial.wrapping_mul(factor) % MODULUS;
        }

        checksum = checksum.wrapping_add(factorial ^ u64::from(round));
    }

    black_box(checksum);
}
