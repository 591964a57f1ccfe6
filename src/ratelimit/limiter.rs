//! Core rate limiter implementation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::memory::MemoryStore;
use super::store::{QuotaHit, QuotaStore, StoreError};
use super::strategy::{Strategy, WindowEvaluation, WindowLayout};
use super::window::RateWindowSpec;
use crate::clock::{Clock, Sleeper, SystemClock};
use crate::error::{ExhaustedWindow, OrbitTrackError, Result};

/// Key prefix used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "orbittrack";
/// Name of the per-minute window.
pub const MINUTE_WINDOW: &str = "minute";
/// Name of the per-hour window.
pub const HOUR_WINDOW: &str = "hour";

/// Space-Track's documented per-minute allowance.
pub fn default_minute_limit() -> RateWindowSpec {
    RateWindowSpec::per_minute(30)
}

/// Space-Track's documented per-hour allowance.
pub fn default_hourly_limit() -> RateWindowSpec {
    RateWindowSpec::per_hour(300)
}

/// What an acquisition does when a window has no headroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitMode {
    /// Wait as long as it takes.
    #[default]
    Wait,
    /// Wait, but give up once the total wait would exceed the bound.
    WaitAtMost(Duration),
    /// Fail immediately with `RateLimitExceeded`.
    NoWait,
}

/// Remaining headroom of one window after a granted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowUsage {
    pub name: String,
    pub spec: RateWindowSpec,
    pub used: u64,
    pub remaining: u64,
}

/// Proof that a request was counted against every configured window.
#[derive(Debug, Clone)]
pub struct Permit {
    pub windows: Vec<WindowUsage>,
    /// Time spent waiting for headroom before the grant.
    pub waited: Duration,
}

/// Configuration snapshot. Never mutated in place: updates build a new
/// snapshot, so a check always sees one consistent version.
#[derive(Debug, Clone)]
struct LimiterState {
    windows: BTreeMap<String, RateWindowSpec>,
    store: Arc<dyn QuotaStore>,
    strategy: Strategy,
    wait_mode: WaitMode,
    namespace: String,
}

/// Outcome of evaluating every window once.
enum Evaluation {
    Ready {
        layouts: Vec<WindowLayout>,
        evaluations: Vec<WindowEvaluation>,
    },
    Exhausted(Vec<ExhaustedWindow>),
}

/// Multi-window rate limiter backed by a pluggable quota store.
///
/// Windows are evaluated conjunctively: a request is granted only when every
/// window has headroom, and the grant increments every window or none.
pub struct RateLimiter {
    state: RwLock<Arc<LimiterState>>,
    clock: Arc<dyn Clock>,
    /// Waiting callers queue here in arrival order.
    queue: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("state", &*self.state.read())
            .finish()
    }
}

impl RateLimiter {
    /// Create a rate limiter with Space-Track's default windows and an
    /// in-memory store.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Same as [`new`](Self::new), reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let mut windows = BTreeMap::new();
        windows.insert(MINUTE_WINDOW.to_string(), default_minute_limit());
        windows.insert(HOUR_WINDOW.to_string(), default_hourly_limit());

        Self {
            state: RwLock::new(Arc::new(LimiterState {
                windows,
                store: Arc::new(MemoryStore::with_clock(clock.clone())),
                strategy: Strategy::default(),
                wait_mode: WaitMode::default(),
                namespace: DEFAULT_NAMESPACE.to_string(),
            })),
            clock,
            queue: tokio::sync::Mutex::new(()),
        }
    }

    fn snapshot(&self) -> Arc<LimiterState> {
        self.state.read().clone()
    }

    fn update(&self, f: impl FnOnce(&mut LimiterState)) {
        let mut current = self.state.write();
        let mut next = LimiterState::clone(&current);
        f(&mut next);
        *current = Arc::new(next);
    }

    /// Register or replace a named window.
    pub fn set_window(&self, name: impl Into<String>, spec: RateWindowSpec) {
        let name = name.into();
        debug!(window = %name, spec = %spec, "Setting rate window");
        self.update(|state| {
            state.windows.insert(name, spec);
        });
    }

    /// Register or replace a named window from `"<N>/<unit>"` shorthand.
    pub fn set_window_str(&self, name: impl Into<String>, spec: &str) -> Result<()> {
        let spec: RateWindowSpec = spec.parse()?;
        self.set_window(name, spec);
        Ok(())
    }

    /// Register or replace a named window, refusing specs that allow a
    /// higher average rate than `ceiling`.
    pub fn set_window_within(
        &self,
        name: impl Into<String>,
        spec: RateWindowSpec,
        ceiling: RateWindowSpec,
    ) -> Result<()> {
        if spec.rate_per_second() > ceiling.rate_per_second() {
            return Err(OrbitTrackError::RateLimitAboveCeiling {
                requested: spec.to_string(),
                ceiling: ceiling.to_string(),
            });
        }
        self.set_window(name, spec);
        Ok(())
    }

    /// Replace every window at once.
    pub fn set_windows(&self, windows: BTreeMap<String, RateWindowSpec>) {
        self.update(|state| state.windows = windows);
    }

    pub fn remove_window(&self, name: &str) -> Option<RateWindowSpec> {
        let mut removed = None;
        self.update(|state| removed = state.windows.remove(name));
        removed
    }

    pub fn window(&self, name: &str) -> Option<RateWindowSpec> {
        self.snapshot().windows.get(name).copied()
    }

    pub fn windows(&self) -> BTreeMap<String, RateWindowSpec> {
        self.snapshot().windows.clone()
    }

    /// Swap the quota store. Existing counters are not migrated.
    pub fn set_storage(&self, store: Arc<dyn QuotaStore>) {
        debug!(store = ?store, "Setting quota store");
        self.update(|state| state.store = store);
    }

    pub fn set_strategy(&self, strategy: Strategy) {
        self.update(|state| state.strategy = strategy);
    }

    pub fn strategy(&self) -> Strategy {
        self.snapshot().strategy
    }

    pub fn set_wait_mode(&self, wait_mode: WaitMode) {
        self.update(|state| state.wait_mode = wait_mode);
    }

    pub fn wait_mode(&self) -> WaitMode {
        self.snapshot().wait_mode
    }

    /// Prefix for store keys; processes sharing a store and a namespace
    /// share quota.
    pub fn set_namespace(&self, namespace: impl Into<String>) {
        let namespace = namespace.into();
        self.update(|state| state.namespace = namespace);
    }

    /// Current usage of every window, without consuming quota.
    pub async fn usage(&self) -> Result<Vec<WindowUsage>> {
        let state = self.snapshot();
        let now = self.clock.now();
        let (layouts, evaluations) = Self::read_windows(&state, now).await?;
        Ok(layouts
            .iter()
            .zip(&evaluations)
            .map(|(layout, eval)| WindowUsage {
                name: layout.name.clone(),
                spec: layout.spec,
                used: eval.used,
                remaining: layout.spec.limit().saturating_sub(eval.used),
            })
            .collect())
    }

    /// Wait for headroom in every window and count one request against each.
    ///
    /// `sleeper` decides how waiting happens; the decisions are the same for
    /// every sleeper. Nothing is counted until all windows grant, so dropping
    /// the future while it waits leaves the counters untouched.
    ///
    /// The wait mode is read once on entry. Its bound covers the whole call,
    /// including time spent queued behind other waiters, and `NoWait` callers
    /// never queue.
    pub async fn acquire(&self, sleeper: &dyn Sleeper) -> Result<Permit> {
        let started = self.clock.now();
        let wait_mode = self.snapshot().wait_mode;
        let _turn = match wait_mode {
            WaitMode::NoWait => None,
            WaitMode::Wait => Some(self.queue.lock().await),
            WaitMode::WaitAtMost(max_wait) => Some(self.queue_within(sleeper, max_wait).await?),
        };
        let mut contended = 0u32;

        loop {
            let state = self.snapshot();
            let waited = self.clock.now().saturating_sub(started);
            if state.windows.is_empty() {
                return Ok(Permit {
                    windows: Vec::new(),
                    waited,
                });
            }

            let now = self.clock.now();
            let wait = match Self::evaluate(&state, now).await? {
                Evaluation::Ready {
                    layouts,
                    evaluations,
                } => {
                    let hits: Vec<QuotaHit> = evaluations.iter().map(|e| e.hit.clone()).collect();
                    let statuses = state
                        .store
                        .increment_all(&hits)
                        .await
                        .map_err(OrbitTrackError::RateLimiterUnavailable)?;

                    if statuses.len() == hits.len() && statuses.iter().all(|s| s.allowed) {
                        let windows = layouts
                            .into_iter()
                            .zip(&statuses)
                            .map(|(layout, status)| WindowUsage {
                                used: layout.spec.limit().saturating_sub(status.remaining),
                                remaining: status.remaining,
                                name: layout.name,
                                spec: layout.spec,
                            })
                            .collect();
                        trace!(waited_ms = waited.as_millis() as u64, "Rate limit permit granted");
                        return Ok(Permit { windows, waited });
                    }

                    // Another client sharing the store took the headroom
                    // between our read and our commit.
                    contended += 1;
                    debug!(attempt = contended, "Quota commit denied, re-evaluating");
                    if contended < 3 {
                        continue;
                    }
                    contended = 0;
                    Self::check_budget(wait_mode, waited, Duration::from_secs(1), Vec::new())?;
                    Duration::from_secs(1)
                }
                Evaluation::Exhausted(exhausted) => {
                    let wait = exhausted
                        .iter()
                        .map(|w| w.retry_after)
                        .min()
                        .unwrap_or(Duration::from_secs(1));
                    Self::check_budget(wait_mode, waited, wait, exhausted)?;
                    wait
                }
            };

            debug!(wait_secs = wait.as_secs(), "Waiting for rate limit headroom");
            sleeper.sleep(wait).await;
        }
    }

    /// Take a turn in the queue, giving up after `max_wait`.
    async fn queue_within(
        &self,
        sleeper: &dyn Sleeper,
        max_wait: Duration,
    ) -> Result<tokio::sync::MutexGuard<'_, ()>> {
        if let Ok(turn) = self.queue.try_lock() {
            return Ok(turn);
        }

        tokio::select! {
            biased;
            turn = self.queue.lock() => return Ok(turn),
            _ = sleeper.sleep(max_wait) => {}
        }

        debug!(max_wait_secs = max_wait.as_secs(), "Gave up waiting behind queued callers");
        let state = self.snapshot();
        let (windows, retry_after) = match Self::evaluate(&state, self.clock.now()).await? {
            Evaluation::Exhausted(windows) => {
                let retry_after = windows
                    .iter()
                    .map(|w| w.retry_after)
                    .min()
                    .unwrap_or(Duration::from_secs(1));
                (windows, retry_after)
            }
            Evaluation::Ready { .. } => (Vec::new(), Duration::from_secs(1)),
        };
        Err(OrbitTrackError::RateLimitExceeded {
            windows,
            retry_after,
        })
    }

    fn check_budget(
        wait_mode: WaitMode,
        waited: Duration,
        wait: Duration,
        windows: Vec<ExhaustedWindow>,
    ) -> Result<()> {
        let exceeded = match wait_mode {
            WaitMode::Wait => false,
            WaitMode::WaitAtMost(max_wait) => waited + wait > max_wait,
            WaitMode::NoWait => true,
        };
        if exceeded {
            debug!(
                windows = ?windows.iter().map(|w| w.name.as_str()).collect::<Vec<_>>(),
                retry_after_secs = wait.as_secs(),
                "Rate limit exceeded"
            );
            return Err(OrbitTrackError::RateLimitExceeded {
                windows,
                retry_after: wait,
            });
        }
        Ok(())
    }

    async fn evaluate(state: &LimiterState, now: Duration) -> Result<Evaluation> {
        let (layouts, evaluations) = Self::read_windows(state, now).await?;

        let exhausted: Vec<ExhaustedWindow> = layouts
            .iter()
            .zip(&evaluations)
            .filter_map(|(layout, eval)| {
                eval.retry_after.map(|retry_after| ExhaustedWindow {
                    name: layout.name.clone(),
                    retry_after,
                })
            })
            .collect();

        if exhausted.is_empty() {
            Ok(Evaluation::Ready {
                layouts,
                evaluations,
            })
        } else {
            Ok(Evaluation::Exhausted(exhausted))
        }
    }

    async fn read_windows(
        state: &LimiterState,
        now: Duration,
    ) -> Result<(Vec<WindowLayout>, Vec<WindowEvaluation>)> {
        let layouts: Vec<WindowLayout> = state
            .windows
            .iter()
            .map(|(name, spec)| state.strategy.layout(&state.namespace, name, spec, now))
            .collect();

        let keys: Vec<String> = layouts.iter().flat_map(|l| l.keys.iter().cloned()).collect();
        let counts = state
            .store
            .get_many(&keys)
            .await
            .map_err(OrbitTrackError::RateLimiterUnavailable)?;
        if counts.len() != keys.len() {
            return Err(OrbitTrackError::RateLimiterUnavailable(StoreError::Backend(
                format!("expected {} counters, got {}", keys.len(), counts.len()),
            )));
        }

        let mut offset = 0;
        let evaluations = layouts
            .iter()
            .map(|layout| {
                let slice = &counts[offset..offset + layout.keys.len()];
                offset += layout.keys.len();
                let eval = layout.evaluate(slice);
                trace!(
                    window = %layout.name,
                    spec = %layout.spec,
                    used = eval.used,
                    exhausted = eval.retry_after.is_some(),
                    "Evaluated rate window"
                );
                eval
            })
            .collect();

        Ok((layouts, evaluations))
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::clock::TokioSleeper;
    use crate::testing::{FailingStore, PendingSleeper, TokioClock};
    use tokio::time::Instant;

    const T0: Duration = Duration::from_secs(1_700_000_040);

    fn limiter_with(windows: &[(&str, &str)]) -> (RateLimiter, ManualClock) {
        let clock = ManualClock::new(T0);
        let limiter = RateLimiter::with_clock(Arc::new(clock.clone()));
        limiter.set_windows(BTreeMap::new());
        for (name, spec) in windows {
            limiter.set_window_str(*name, spec).unwrap();
        }
        (limiter, clock)
    }

    fn used(usage: &[WindowUsage], name: &str) -> u64 {
        usage.iter().find(|w| w.name == name).map(|w| w.used).unwrap()
    }

    #[tokio::test]
    async fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.window(MINUTE_WINDOW), Some(default_minute_limit()));
        assert_eq!(limiter.window(HOUR_WINDOW), Some(default_hourly_limit()));
        assert_eq!(limiter.strategy(), Strategy::SlidingWindow);
        assert_eq!(limiter.wait_mode(), WaitMode::Wait);
    }

    #[tokio::test]
    async fn test_requests_up_to_cap_do_not_wait() {
        let (limiter, clock) = limiter_with(&[("minute", "5/minute")]);

        for i in 1..=5 {
            let permit = limiter.acquire(&clock).await.unwrap();
            assert_eq!(permit.waited, Duration::ZERO);
            assert_eq!(permit.windows[0].remaining, 5 - i);
        }
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_no_wait_mode_reports_retry_after() {
        let (limiter, clock) = limiter_with(&[("minute", "2/minute")]);
        limiter.set_wait_mode(WaitMode::NoWait);

        limiter.acquire(&clock).await.unwrap();
        limiter.acquire(&clock).await.unwrap();
        clock.advance(Duration::from_secs(5));

        let err = limiter.acquire(&clock).await.unwrap_err();
        match err {
            OrbitTrackError::RateLimitExceeded {
                windows,
                retry_after,
            } => {
                assert_eq!(windows.len(), 1);
                assert_eq!(windows[0].name, "minute");
                // 60s minus the 5s already elapsed, plus at most one slot
                assert!(retry_after >= Duration::from_secs(55));
                assert!(retry_after <= Duration::from_secs(56));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(clock.sleeps().is_empty());
        assert_eq!(used(&limiter.usage().await.unwrap(), "minute"), 2);
    }

    #[tokio::test]
    async fn test_wait_mode_returns_after_window_frees() {
        let (limiter, clock) = limiter_with(&[("minute", "2/minute")]);

        limiter.acquire(&clock).await.unwrap();
        limiter.acquire(&clock).await.unwrap();

        let permit = limiter.acquire(&clock).await.unwrap();
        assert!(permit.waited >= Duration::from_secs(60));
        assert!(permit.waited <= Duration::from_secs(61));
        assert_eq!(clock.now() - T0, permit.waited);
    }

    #[tokio::test]
    async fn test_fixed_window_resets_at_boundary() {
        let (limiter, clock) = limiter_with(&[("minute", "2/minute")]);
        limiter.set_strategy(Strategy::FixedWindow);
        clock.advance(Duration::from_secs(50));

        limiter.acquire(&clock).await.unwrap();
        limiter.acquire(&clock).await.unwrap();

        let permit = limiter.acquire(&clock).await.unwrap();
        assert_eq!(permit.waited, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_wait_at_most_gives_up_without_sleeping() {
        let (limiter, clock) = limiter_with(&[("minute", "1/minute")]);
        limiter.set_wait_mode(WaitMode::WaitAtMost(Duration::from_secs(10)));

        limiter.acquire(&clock).await.unwrap();
        let err = limiter.acquire(&clock).await.unwrap_err();

        assert!(matches!(err, OrbitTrackError::RateLimitExceeded { .. }));
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_each_window_counts_once_per_request() {
        let (limiter, clock) = limiter_with(&[("minute", "10/minute"), ("hour", "100/hour")]);

        for _ in 0..4 {
            limiter.acquire(&clock).await.unwrap();
        }

        let usage = limiter.usage().await.unwrap();
        assert_eq!(used(&usage, "minute"), 4);
        assert_eq!(used(&usage, "hour"), 4);
    }

    #[tokio::test]
    async fn test_exhausted_window_blocks_every_window() {
        let (limiter, clock) = limiter_with(&[("minute", "10/minute"), ("hour", "2/hour")]);
        limiter.set_wait_mode(WaitMode::NoWait);

        limiter.acquire(&clock).await.unwrap();
        limiter.acquire(&clock).await.unwrap();
        let err = limiter.acquire(&clock).await.unwrap_err();

        match err {
            OrbitTrackError::RateLimitExceeded { windows, .. } => {
                let names: Vec<&str> = windows.iter().map(|w| w.name.as_str()).collect();
                assert_eq!(names, vec!["hour"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let usage = limiter.usage().await.unwrap();
        assert_eq!(used(&usage, "minute"), 2);
        assert_eq!(used(&usage, "hour"), 2);
    }

    #[tokio::test]
    async fn test_waits_for_earliest_window_then_reevaluates() {
        let (limiter, clock) = limiter_with(&[("short", "1/10 seconds"), ("minute", "2/minute")]);

        limiter.acquire(&clock).await.unwrap();
        // Short window frees after ~10s; the minute window still has room
        let second = limiter.acquire(&clock).await.unwrap();
        assert!(second.waited >= Duration::from_secs(10));
        assert!(second.waited <= Duration::from_secs(11));

        // Now the minute window is the one that is exhausted
        let third = limiter.acquire(&clock).await.unwrap();
        assert!(third.waited >= Duration::from_secs(49));
        assert!(clock.now() - T0 >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let (limiter, clock) = limiter_with(&[("minute", "2/minute")]);
        limiter.set_storage(Arc::new(FailingStore));

        let err = limiter.acquire(&clock).await.unwrap_err();
        assert!(matches!(err, OrbitTrackError::RateLimiterUnavailable(_)));
    }

    #[tokio::test]
    async fn test_snapshot_is_not_torn_by_replacement() {
        let (limiter, _) = limiter_with(&[("minute", "2/minute"), ("hour", "20/hour")]);
        let before = limiter.snapshot();

        let mut replacement = BTreeMap::new();
        replacement.insert("minute".to_string(), RateWindowSpec::per_minute(5));
        replacement.insert("hour".to_string(), RateWindowSpec::per_hour(50));
        limiter.set_windows(replacement.clone());

        assert_eq!(before.windows["minute"], RateWindowSpec::per_minute(2));
        assert_eq!(before.windows["hour"], RateWindowSpec::per_hour(20));
        assert_eq!(limiter.windows(), replacement);
    }

    #[tokio::test]
    async fn test_cancelled_wait_consumes_nothing() {
        let (limiter, clock) = limiter_with(&[("minute", "2/minute")]);
        limiter.acquire(&clock).await.unwrap();
        limiter.acquire(&clock).await.unwrap();

        let sleeper = PendingSleeper;
        {
            let mut waiting = tokio_test::task::spawn(limiter.acquire(&sleeper));
            assert!(waiting.poll().is_pending());
        }

        assert_eq!(used(&limiter.usage().await.unwrap(), "minute"), 2);
        clock.advance(Duration::from_secs(61));
        assert_eq!(used(&limiter.usage().await.unwrap(), "minute"), 0);

        limiter.acquire(&clock).await.unwrap();
        let permit = limiter.acquire(&clock).await.unwrap();
        assert_eq!(permit.waited, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_ceiling_rejects_faster_specs() {
        let (limiter, _) = limiter_with(&[]);

        let err = limiter
            .set_window_within("minute", RateWindowSpec::per_minute(100), default_minute_limit())
            .unwrap_err();
        assert!(matches!(err, OrbitTrackError::RateLimitAboveCeiling { .. }));
        assert_eq!(limiter.window("minute"), None);

        limiter
            .set_window_within("minute", RateWindowSpec::per_minute(20), default_minute_limit())
            .unwrap();
        assert_eq!(limiter.window("minute"), Some(RateWindowSpec::per_minute(20)));
    }

    #[tokio::test]
    async fn test_no_windows_means_unlimited() {
        let (limiter, clock) = limiter_with(&[]);
        for _ in 0..100 {
            limiter.acquire(&clock).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_concurrent_waiters_all_proceed() {
        let (limiter, clock) = limiter_with(&[("minute", "2/minute")]);
        let limiter = Arc::new(limiter);

        let tasks = (0..6).map(|_| {
            let limiter = limiter.clone();
            let clock = clock.clone();
            async move { limiter.acquire(&clock).await }
        });
        let results = futures::future::join_all(tasks).await;

        assert!(results.iter().all(|r| r.is_ok()));
        // Six requests at two per minute need at least two full waits
        assert!(clock.now() - T0 >= Duration::from_secs(120));
    }

    /// A limiter on paused tokio time whose one-per-minute window is already
    /// used up, plus a caller queued behind it in `Wait` mode.
    async fn limiter_with_queued_waiter() -> (
        Arc<RateLimiter>,
        tokio::task::JoinHandle<Result<Permit>>,
    ) {
        let limiter = Arc::new(RateLimiter::with_clock(Arc::new(TokioClock::new(T0))));
        limiter.set_windows(BTreeMap::new());
        limiter.set_window_str("minute", "1/minute").unwrap();
        limiter.set_strategy(Strategy::FixedWindow);
        limiter.acquire(&TokioSleeper).await.unwrap();

        let waiter = tokio::spawn({
            let limiter = limiter.clone();
            async move { limiter.acquire(&TokioSleeper).await }
        });
        // Lets the waiter take the queue and start its sleep
        tokio::time::sleep(Duration::from_secs(1)).await;
        (limiter, waiter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_fails_fast_behind_queued_waiter() {
        let (limiter, waiter) = limiter_with_queued_waiter().await;
        limiter.set_wait_mode(WaitMode::NoWait);

        let before = Instant::now();
        let err = limiter.acquire(&TokioSleeper).await.unwrap_err();

        assert_eq!(Instant::now(), before);
        match err {
            OrbitTrackError::RateLimitExceeded {
                windows,
                retry_after,
            } => {
                assert_eq!(windows[0].name, "minute");
                assert_eq!(retry_after, Duration::from_secs(59));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let permit = waiter.await.unwrap().unwrap();
        assert!(permit.waited >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_at_most_bounds_time_in_queue() {
        let (limiter, waiter) = limiter_with_queued_waiter().await;
        limiter.set_wait_mode(WaitMode::WaitAtMost(Duration::from_secs(10)));

        let before = Instant::now();
        let err = limiter.acquire(&TokioSleeper).await.unwrap_err();

        let elapsed = before.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
        assert!(matches!(err, OrbitTrackError::RateLimitExceeded { .. }));

        waiter.await.unwrap().unwrap();
        assert_eq!(used(&limiter.usage().await.unwrap(), "minute"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_at_most_counts_time_spent_queued() {
        let (limiter, waiter) = limiter_with_queued_waiter().await;
        limiter.set_wait_mode(WaitMode::WaitAtMost(Duration::from_secs(90)));

        // Queued for ~59s, then the next window is another 60s away
        let before = Instant::now();
        let err = limiter.acquire(&TokioSleeper).await.unwrap_err();

        let elapsed = before.elapsed();
        assert!(elapsed >= Duration::from_secs(59) && elapsed < Duration::from_secs(61));
        assert!(matches!(err, OrbitTrackError::RateLimitExceeded { .. }));

        let permit = waiter.await.unwrap().unwrap();
        assert!(permit.waited >= Duration::from_secs(60));
        assert!(permit.waited < Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waited_includes_time_in_queue() {
        let (limiter, waiter) = limiter_with_queued_waiter().await;

        let permit = limiter.acquire(&TokioSleeper).await.unwrap();

        // Queued behind the first waiter for ~59s, then a full window
        assert!(permit.waited >= Duration::from_secs(119));
        waiter.await.unwrap().unwrap();
    }
}
