//! Retry classification and fixed-delay retry.
//!
//! The provider reports "object busy" conditions as ordinary errors with a
//! return code. Which codes are worth waiting out depends on the call site,
//! so each call site carries its own [`RetryPolicy`].

use crate::clock::Clock;
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::time::Duration;

/// Set of provider return codes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeSet(BTreeSet<String>);

impl CodeSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `code` is in the set.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add a code. Empty codes are ignored.
    pub fn insert(&mut self, code: impl Into<String>) {
        let code = code.into();
        if !code.is_empty() {
            self.0.insert(code);
        }
    }

    /// Iterate over the codes in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for CodeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for code in iter {
            set.insert(code);
        }
        set
    }
}

/// Outcome of classifying a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Same call may be re-issued.
    Retryable,
    /// Give up and surface the error.
    Fatal,
}

/// Classify a provider error against the codes known to be transient.
///
/// Only errors carrying a structured return code can be retryable.
#[must_use]
pub fn classify(error: &apiclient::Error, known: &CodeSet) -> RetryClass {
    match error.code() {
        Some(code) if known.contains(code) => RetryClass::Retryable,
        _ => RetryClass::Fatal,
    }
}

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed(Duration),
    /// Single attempt.
    None,
}

impl Backoff {
    /// Delay before the next attempt, or `None` when no retry is allowed.
    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::Fixed(d) if !d.is_zero() => Some(*d),
            _ => None,
        }
    }
}

/// Retry policy for one call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Name used in logs and errors.
    pub name: String,
    /// Codes worth retrying.
    pub retryable_codes: CodeSet,
    /// Total time budget for retry sleeps.
    pub max_wait: Duration,
    /// Delay schedule.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Fixed-delay policy.
    pub fn fixed<I, S>(
        name: impl Into<String>,
        codes: I,
        delay: Duration,
        max_wait: Duration,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            retryable_codes: codes.into_iter().collect(),
            max_wait,
            backoff: Backoff::Fixed(delay),
        }
    }

    /// Single-attempt policy.
    pub fn no_retry(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            retryable_codes: CodeSet::new(),
            max_wait: Duration::ZERO,
            backoff: Backoff::None,
        }
    }

    /// Classify an error under this policy.
    #[must_use]
    pub fn classify(&self, error: &apiclient::Error) -> RetryClass {
        classify(error, &self.retryable_codes)
    }
}

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called before sleeping ahead of attempt `attempt + 1`.
    fn on_retry(&self, policy: &str, attempt: u32, error: &apiclient::Error, delay: Duration);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _policy: &str, _attempt: u32, _error: &apiclient::Error, _delay: Duration) {}
}

/// Callback that logs each retry at warn level.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, policy: &str, attempt: u32, error: &apiclient::Error, delay: Duration) {
        log::warn!(
            "{policy}: attempt {attempt} failed: {error}. Retrying in {}s",
            delay.as_secs()
        );
    }
}

/// Execute an operation, re-issuing it while it fails with a retryable code.
///
/// Only [`Error::Provider`] failures are classified; any other error is
/// returned as-is. A retryable error that would push total sleep past
/// `max_wait` ends the loop with [`Error::TransientProvider`].
pub fn with_retry<T, F>(
    clock: &dyn Clock,
    policy: &RetryPolicy,
    callback: &dyn RetryCallback,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempts: u32 = 0;
    let mut waited = Duration::ZERO;

    loop {
        attempts += 1;
        let source = match operation() {
            Ok(value) => return Ok(value),
            Err(Error::Provider(e)) if policy.classify(&e) == RetryClass::Retryable => e,
            Err(e) => return Err(e),
        };

        let Some(delay) = policy.backoff.delay().filter(|d| waited + *d <= policy.max_wait) else {
            if attempts > 1 || policy.backoff.delay().is_some() {
                return Err(Error::TransientProvider {
                    policy: policy.name.clone(),
                    attempts,
                    source,
                });
            }
            return Err(Error::Provider(source));
        };

        callback.on_retry(&policy.name, attempts, &source, delay);
        clock.sleep(delay);
        waited += delay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::cell::Cell;

    fn busy() -> Error {
        Error::Provider(apiclient::Error::api("25033", "Server is in operation."))
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::fixed(
            "server_busy",
            ["25033"],
            Duration::from_secs(2),
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_classify_known_codes() {
        let known: CodeSet = ["23006", "25033"].into_iter().collect();
        assert_eq!(
            classify(&apiclient::Error::api("23006", "x"), &known),
            RetryClass::Retryable
        );
        assert_eq!(
            classify(&apiclient::Error::api("25033", "x"), &known),
            RetryClass::Retryable
        );
        assert_eq!(
            classify(&apiclient::Error::api("10", "x"), &known),
            RetryClass::Fatal
        );
    }

    #[test]
    fn test_classify_unstructured_is_fatal() {
        let known: CodeSet = ["23006"].into_iter().collect();
        assert_eq!(classify(&apiclient::Error::api("", "x"), &known), RetryClass::Fatal);
        assert_eq!(
            classify(&apiclient::Error::Transport("reset".into()), &known),
            RetryClass::Fatal
        );
        assert_eq!(
            classify(
                &apiclient::Error::Http {
                    status: 503,
                    message: "23006".into()
                },
                &known
            ),
            RetryClass::Fatal
        );
    }

    #[test]
    fn test_code_set_ignores_empty() {
        let set: CodeSet = ["", "1300"].into_iter().collect();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["1300"]);
        assert!(!set.contains(""));
    }

    #[test]
    fn test_with_retry_success_first_try() {
        let clock = ManualClock::new();
        let result = with_retry(&clock, &policy(), &NoCallback, || Ok(42));
        assert_eq!(result.unwrap(), 42);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_with_retry_eventual_success() {
        let clock = ManualClock::new();
        let attempts = Cell::new(0);
        let result = with_retry(&clock, &policy(), &LogCallback, || {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 { Err(busy()) } else { Ok("done") }
        });
        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.get(), 3);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2); 2]);
    }

    #[test]
    fn test_with_retry_fatal_code_returns_immediately() {
        let clock = ManualClock::new();
        let attempts = Cell::new(0);
        let result: Result<()> = with_retry(&clock, &policy(), &NoCallback, || {
            attempts.set(attempts.get() + 1);
            Err(Error::Provider(apiclient::Error::api("1", "denied")))
        });
        assert!(matches!(result, Err(Error::Provider(_))));
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_with_retry_non_provider_error_not_classified() {
        let clock = ManualClock::new();
        let result: Result<()> = with_retry(&clock, &policy(), &NoCallback, || {
            Err(Error::lookup("zone", "KR-9"))
        });
        assert!(matches!(result, Err(Error::Lookup { .. })));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_with_retry_budget_exhausted() {
        let clock = ManualClock::new();
        let attempts = Cell::new(0);
        let result: Result<()> = with_retry(&clock, &policy(), &NoCallback, || {
            attempts.set(attempts.get() + 1);
            Err(busy())
        });
        match result {
            Err(Error::TransientProvider {
                policy,
                attempts: n,
                source,
            }) => {
                assert_eq!(policy, "server_busy");
                assert_eq!(n, 6);
                assert_eq!(source.code(), Some("25033"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(attempts.get(), 6);
        assert_eq!(clock.total_slept(), Duration::from_secs(10));
    }

    #[test]
    fn test_no_retry_policy_single_attempt() {
        let clock = ManualClock::new();
        let attempts = Cell::new(0);
        let result: Result<()> =
            with_retry(&clock, &RetryPolicy::no_retry("read"), &NoCallback, || {
                attempts.set(attempts.get() + 1);
                Err(busy())
            });
        assert!(matches!(result, Err(Error::Provider(_))));
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_zero_fixed_delay_means_single_attempt() {
        assert_eq!(Backoff::Fixed(Duration::ZERO).delay(), None);
        assert_eq!(Backoff::None.delay(), None);
    }
}
