//! Retry policy and backoff
//!
//! Backoff is an explicit state machine: [`Backoff::next`] looks at a
//! failure and decides whether to retry and after which delay. Sleeping is
//! delegated to a [`Sleeper`] so tests can record delays instead of waiting.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::{Gateway, GatewayError, Page};
use crate::domain::{FieldChanges, Item, ItemId, ListFilter, Revision};

/// Bounds for retrying transient failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after `RateLimited` responses
    pub rate_limit_retries: u32,

    /// First backoff delay
    pub initial_backoff: Duration,

    /// Upper bound for a single delay
    pub max_backoff: Duration,

    /// Retries allowed after transport failures
    pub transport_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_retries: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            transport_retries: 1,
        }
    }
}

impl RetryPolicy {
    /// Never retries
    pub fn none() -> Self {
        Self {
            rate_limit_retries: 0,
            transport_retries: 0,
            ..Self::default()
        }
    }

    /// Starts a fresh backoff sequence for one operation
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            rate_limited: 0,
            transport_failures: 0,
            last_delay: None,
        }
    }
}

/// What to do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry(Duration),
    GiveUp,
}

/// Backoff state for one logical operation
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    rate_limited: u32,
    transport_failures: u32,
    last_delay: Option<Duration>,
}

impl Backoff {
    /// Number of retries granted so far
    pub fn retries(&self) -> u32 {
        self.rate_limited + self.transport_failures
    }

    /// Delay of the last rate-limit retry
    pub fn last_delay(&self) -> Option<Duration> {
        self.last_delay
    }

    /// Decides how to proceed after `err`
    ///
    /// Rate-limit delays double from `initial_backoff` up to `max_backoff`.
    /// The server's `Retry-After` is a floor, even above the cap.
    pub fn next(&mut self, err: &GatewayError) -> Decision {
        match err {
            GatewayError::RateLimited { retry_after } => {
                if self.rate_limited >= self.policy.rate_limit_retries {
                    return Decision::GiveUp;
                }
                self.rate_limited += 1;

                let doubled = self
                    .last_delay
                    .map(|d| d.saturating_mul(2))
                    .unwrap_or(self.policy.initial_backoff);
                let floor = retry_after.unwrap_or(Duration::ZERO);
                let delay = doubled
                    .max(self.policy.initial_backoff)
                    .min(self.policy.max_backoff)
                    .max(floor);

                self.last_delay = Some(delay);
                Decision::Retry(delay)
            }
            GatewayError::Transport(_) => {
                if self.transport_failures >= self.policy.transport_retries {
                    return Decision::GiveUp;
                }
                self.transport_failures += 1;
                Decision::Retry(self.policy.initial_backoff)
            }
            _ => Decision::GiveUp,
        }
    }
}

/// A sleep was cut short by Ctrl-C
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("interrupted")]
pub struct Interrupted;

/// Waits between attempts
pub trait Sleeper {
    fn sleep(&self, delay: Duration) -> Result<(), Interrupted>;

    /// Returns true once the user asked to stop
    fn interrupted(&self) -> bool {
        false
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, delay: Duration) -> Result<(), Interrupted> {
        (**self).sleep(delay)
    }

    fn interrupted(&self) -> bool {
        (**self).interrupted()
    }
}

/// Process-wide Ctrl-C flag
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a Ctrl-C handler that raises the returned flag
    ///
    /// The first Ctrl-C lets an in-flight request finish and stops before the
    /// next one; a second Ctrl-C exits immediately.
    pub fn install() -> Result<Self, ctrlc::Error> {
        let interrupt = Self::new();
        let flag = interrupt.0.clone();
        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                std::process::exit(130);
            }
        })?;
        Ok(interrupt)
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sleeps on the current thread in short slices, watching the interrupt flag
#[derive(Debug, Clone)]
pub struct ThreadSleeper {
    interrupt: Interrupt,
    slice: Duration,
}

impl ThreadSleeper {
    pub fn new(interrupt: Interrupt) -> Self {
        Self {
            interrupt,
            slice: Duration::from_millis(50),
        }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration) -> Result<(), Interrupted> {
        let mut remaining = delay;
        while !remaining.is_zero() {
            if self.interrupt.is_raised() {
                return Err(Interrupted);
            }
            let step = remaining.min(self.slice);
            thread::sleep(step);
            remaining -= step;
        }
        if self.interrupt.is_raised() {
            return Err(Interrupted);
        }
        Ok(())
    }

    fn interrupted(&self) -> bool {
        self.interrupt.is_raised()
    }
}

/// Records requested delays without sleeping
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: RefCell<Vec<Duration>>,
    interrupt_after: Option<usize>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports an interrupt once `sleeps` delays have been recorded
    pub fn interrupting_after(sleeps: usize) -> Self {
        Self {
            delays: RefCell::new(Vec::new()),
            interrupt_after: Some(sleeps),
        }
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration) -> Result<(), Interrupted> {
        let mut delays = self.delays.borrow_mut();
        if self.interrupt_after.is_some_and(|limit| delays.len() >= limit) {
            return Err(Interrupted);
        }
        delays.push(delay);
        Ok(())
    }

    fn interrupted(&self) -> bool {
        self.interrupt_after
            .is_some_and(|limit| self.delays.borrow().len() >= limit)
    }
}

/// Gateway decorator that retries transient failures
pub struct Retrying<G, S> {
    inner: G,
    policy: RetryPolicy,
    sleeper: S,
}

impl<G: Gateway, S: Sleeper> Retrying<G, S> {
    pub fn new(inner: G, policy: RetryPolicy, sleeper: S) -> Self {
        Self {
            inner,
            policy,
            sleeper,
        }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    fn run<T>(
        &self,
        operation: &'static str,
        mut call: impl FnMut(&G) -> Result<T, GatewayError>,
    ) -> Result<T, GatewayError> {
        let mut backoff = self.policy.backoff();

        loop {
            if self.sleeper.interrupted() {
                return Err(GatewayError::Interrupted);
            }

            let err = match call(&self.inner) {
                Ok(value) => {
                    if backoff.retries() > 0 {
                        debug!(operation, retries = backoff.retries(), "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            match backoff.next(&err) {
                Decision::Retry(delay) => {
                    warn!(
                        operation,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        attempt = backoff.retries(),
                        "retrying remote call"
                    );
                    self.sleeper
                        .sleep(delay)
                        .map_err(|_| GatewayError::Interrupted)?;
                }
                Decision::GiveUp => return Err(err),
            }
        }
    }
}

impl<G: Gateway, S: Sleeper> Gateway for Retrying<G, S> {
    fn create(&self, item: &Item) -> Result<Item, GatewayError> {
        self.run("create", |g| g.create(item))
    }

    fn fetch(&self, id: &ItemId) -> Result<Item, GatewayError> {
        self.run("fetch", |g| g.fetch(id))
    }

    fn update(
        &self,
        id: &ItemId,
        changes: &FieldChanges,
        expected: Option<&Revision>,
    ) -> Result<Item, GatewayError> {
        self.run("update", |g| g.update(id, changes, expected))
    }

    fn delete(&self, id: &ItemId) -> Result<(), GatewayError> {
        self.run("delete", |g| g.delete(id))
    }

    fn query_page(
        &self,
        filter: &ListFilter,
        cursor: Option<&str>,
    ) -> Result<Page, GatewayError> {
        self.run("query", |g| g.query_page(filter, cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{InMemoryGateway, Operation};

    fn rate_limited() -> GatewayError {
        GatewayError::RateLimited { retry_after: None }
    }

    #[test]
    fn rate_limit_delays_double() {
        let mut backoff = RetryPolicy::default().backoff();
        let delays: Vec<_> = (0..4)
            .map(|_| match backoff.next(&rate_limited()) {
                Decision::Retry(d) => d,
                Decision::GiveUp => panic!("gave up early"),
            })
            .collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
            ]
        );
    }

    #[test]
    fn rate_limit_retries_are_bounded() {
        let policy = RetryPolicy {
            rate_limit_retries: 2,
            ..RetryPolicy::default()
        };
        let mut backoff = policy.backoff();
        assert!(matches!(backoff.next(&rate_limited()), Decision::Retry(_)));
        assert!(matches!(backoff.next(&rate_limited()), Decision::Retry(_)));
        assert_eq!(backoff.next(&rate_limited()), Decision::GiveUp);
    }

    #[test]
    fn retry_after_is_a_floor() {
        let mut backoff = RetryPolicy::default().backoff();
        let err = GatewayError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(backoff.next(&err), Decision::Retry(Duration::from_secs(3)));
        // Doubling continues from the honoured delay
        assert_eq!(
            backoff.next(&rate_limited()),
            Decision::Retry(Duration::from_secs(6))
        );
    }

    #[test]
    fn retry_after_beyond_the_cap_is_honoured() {
        let mut backoff = RetryPolicy::default().backoff();
        let err = GatewayError::RateLimited {
            retry_after: Some(Duration::from_secs(60)),
        };
        assert_eq!(backoff.next(&err), Decision::Retry(Duration::from_secs(60)));
        assert_eq!(
            backoff.next(&rate_limited()),
            Decision::Retry(Duration::from_secs(30))
        );
    }

    #[test]
    fn delays_are_capped() {
        let policy = RetryPolicy {
            rate_limit_retries: 10,
            max_backoff: Duration::from_secs(2),
            ..RetryPolicy::default()
        };
        let mut backoff = policy.backoff();
        let mut last = Duration::ZERO;
        for _ in 0..10 {
            if let Decision::Retry(d) = backoff.next(&rate_limited()) {
                assert!(d <= Duration::from_secs(2));
                last = d;
            }
        }
        assert_eq!(last, Duration::from_secs(2));
    }

    #[test]
    fn transport_is_retried_once() {
        let mut backoff = RetryPolicy::default().backoff();
        let err = GatewayError::Transport("connection reset".into());
        assert!(matches!(backoff.next(&err), Decision::Retry(_)));
        assert_eq!(backoff.next(&err), Decision::GiveUp);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let mut backoff = RetryPolicy::default().backoff();
        for err in [
            GatewayError::NotFound("x".into()),
            GatewayError::Stale("x".into()),
            GatewayError::Rejected {
                status: 400,
                message: "bad".into(),
            },
        ] {
            assert_eq!(backoff.next(&err), Decision::GiveUp);
        }
    }

    #[test]
    fn retrying_gateway_recovers_from_rate_limits() {
        let inner = InMemoryGateway::new();
        for _ in 0..3 {
            inner.fail_next(Operation::Create, rate_limited());
        }
        let gateway = Retrying::new(inner, RetryPolicy::default(), RecordingSleeper::new());

        let item = gateway.create(&Item::draft("Eventually")).unwrap();
        assert!(item.is_synced());
        assert_eq!(gateway.inner().calls(Operation::Create), 4);

        let delays = gateway.sleeper().delays();
        assert_eq!(delays.len(), 3);
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn retrying_gateway_does_not_retry_not_found() {
        let gateway = Retrying::new(
            InMemoryGateway::new(),
            RetryPolicy::default(),
            RecordingSleeper::new(),
        );
        let id: ItemId = "missing".parse().unwrap();

        assert!(matches!(gateway.fetch(&id), Err(GatewayError::NotFound(_))));
        assert_eq!(gateway.inner().calls(Operation::Fetch), 1);
        assert!(gateway.sleeper().delays().is_empty());
    }

    #[test]
    fn interrupted_sleep_stops_retrying() {
        let inner = InMemoryGateway::new();
        for _ in 0..3 {
            inner.fail_next(Operation::Create, rate_limited());
        }
        let gateway = Retrying::new(
            inner,
            RetryPolicy::default(),
            RecordingSleeper::interrupting_after(1),
        );

        assert!(matches!(
            gateway.create(&Item::draft("Stop")),
            Err(GatewayError::Interrupted)
        ));
        assert_eq!(gateway.inner().calls(Operation::Create), 1);
        assert!(gateway.inner().is_empty());
    }

    #[test]
    fn thread_sleeper_returns_early_when_interrupted() {
        let interrupt = Interrupt::new();
        interrupt.raise();
        let sleeper = ThreadSleeper::new(interrupt);
        assert_eq!(sleeper.sleep(Duration::from_secs(60)), Err(Interrupted));
        assert!(sleeper.interrupted());
    }
}
