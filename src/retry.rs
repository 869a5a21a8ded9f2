//! Retry classification and backoff schedule
//!
//! Archives are retried as a whole: a failed attempt throws away everything it
//! read and the next attempt streams the archive again from the start. This
//! module decides which failures deserve another attempt ([`IsRetryable`]) and
//! how long to wait before it ([`Backoff`]).
//!
//! # Example
//!
//! ```
//! use ccfetch::config::RetryConfig;
//! use ccfetch::retry::Backoff;
//! use std::time::Duration;
//!
//! let config = RetryConfig {
//!     initial_delay: Duration::from_millis(100),
//!     jitter: false,
//!     ..RetryConfig::default()
//! };
//! let mut backoff = Backoff::new(&config);
//! assert_eq!(backoff.next_delay(), Duration::from_millis(100));
//! assert_eq!(backoff.next_delay(), Duration::from_millis(200));
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (dropped connections, truncated streams, content that
/// did not match) should return `true`. Failures that another attempt cannot
/// fix (bad configuration, cancellation, a broken output file) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the archive should be attempted again
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // A missing archive will stay missing; everything else on the wire is transient
            Error::Network(e) => match e.status() {
                Some(status) if status.is_client_error() => {
                    status.as_u16() == 408 || status.as_u16() == 429
                }
                _ => true,
            },
            // Reads from a dropped or truncated stream surface as I/O errors
            Error::Io(_) => true,
            Error::MalformedArchive { .. } => true,
            Error::Extraction(_) => true,
            // The archive may have been misread; a fresh pass can yield matching content
            Error::HashMismatch { .. } => true,
            Error::WantedIdsNotFound { .. } => true,
            Error::Serialization(_) => false,
            Error::Config { .. } => false,
            Error::Output { .. } => false,
            Error::Cancelled => false,
            Error::Other(_) => false,
        }
    }
}

/// Exponential backoff schedule between archive attempts
///
/// The first call to [`next_delay`](Backoff::next_delay) returns the configured
/// initial delay; each later call multiplies it by `backoff_multiplier`, capped at
/// `max_delay`. With the default zero initial delay, attempts follow each other
/// immediately and the attempt budget is the only limit.
#[derive(Debug, Clone)]
pub struct Backoff {
    delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Backoff {
    /// Create a schedule from retry configuration
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            delay: config.initial_delay,
            max_delay: config.max_delay,
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }

    /// Delay to wait before the next attempt, advancing the schedule
    pub fn next_delay(&mut self) -> Duration {
        let current = self.delay;
        self.delay = Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .map_or(self.max_delay, |next| next.min(self.max_delay));

        if self.jitter && !current.is_zero() {
            stretch(current, &mut rand::thread_rng())
        } else {
            current
        }
    }
}

/// Stretch `delay` by a random factor in `[1, 2]` so instances that failed
/// together do not retry in lockstep
fn stretch(delay: Duration, rng: &mut impl Rng) -> Duration {
    delay.mul_f64(rng.gen_range(1.0..=2.0))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::path::PathBuf;

    fn config(initial_ms: u64, max_ms: u64, multiplier: f64) -> RetryConfig {
        RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            backoff_multiplier: multiplier,
            jitter: false,
        }
    }

    #[test]
    fn backoff_grows_exponentially() {
        let mut backoff = Backoff::new(&config(10, 1000, 2.0));

        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
        assert_eq!(backoff.next_delay(), Duration::from_millis(20));
        assert_eq!(backoff.next_delay(), Duration::from_millis(40));
    }

    #[test]
    fn backoff_is_capped_at_max_delay() {
        let mut backoff = Backoff::new(&config(50, 200, 10.0));

        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
    }

    #[test]
    fn overflowing_multiplier_saturates_at_max_delay() {
        let mut backoff = Backoff::new(&config(1000, 5000, f64::MAX));

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn zero_initial_delay_never_sleeps() {
        let mut backoff = Backoff::new(&RetryConfig::default());

        for _ in 0..5 {
            assert_eq!(backoff.next_delay(), Duration::ZERO);
        }
    }

    #[test]
    fn jitter_stays_within_double_the_delay() {
        let delay = Duration::from_millis(100);

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let stretched = stretch(delay, &mut rng);
            assert!(stretched >= delay && stretched <= delay * 2, "{stretched:?}");
        }
    }

    #[test]
    fn content_and_stream_failures_are_retryable() {
        assert!(Error::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof")).is_retryable());
        assert!(
            Error::MalformedArchive {
                archive: "f1.warc.gz".into(),
                message: "bad header".to_string(),
            }
            .is_retryable()
        );
        assert!(
            Error::HashMismatch {
                id: "a1".into(),
                language: "zho".into(),
                expected: "H1".to_string(),
                got: "H2".to_string(),
            }
            .is_retryable()
        );
        assert!(
            Error::WantedIdsNotFound {
                archive: "f1.warc.gz".into(),
                found: 0,
                wanted: 1,
            }
            .is_retryable()
        );
        assert!(Error::Extraction("bad html".to_string()).is_retryable());
    }

    #[test]
    fn run_level_failures_are_not_retryable() {
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::config("bad", "workers").is_retryable());
        assert!(
            !Error::Output {
                path: PathBuf::from("zho/docs.jsonl"),
                source: std::io::Error::other("disk full"),
            }
            .is_retryable()
        );
    }

    // reqwest::Error has no public constructor; network classification is
    // exercised through the HTTP archive source tests.
}
