//! Window bucketing strategies.
//!
//! Both strategies reduce to counting requests in fixed-size slots:
//!
//! - `FixedWindow` uses one slot per window. The counter resets at every
//!   window boundary, so up to twice the cap can pass across a boundary.
//! - `SlidingWindow` splits the window into [`SLIDING_SLOTS`] slots and counts
//!   the current slot plus enough preceding slots to cover a full window.
//!   The covered span is at most one slot longer than the window, so the
//!   count may include up to `window / SLIDING_SLOTS` of extra history but
//!   never misses a request inside the window. The cap is therefore never
//!   exceeded over any sliding interval, at the cost of waits up to one slot
//!   longer than strictly necessary.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::store::QuotaHit;
use super::window::RateWindowSpec;

/// Number of slots a sliding window is divided into.
pub const SLIDING_SLOTS: u64 = 60;

/// Rate-limiting strategy applied to every configured window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    FixedWindow,
    #[default]
    SlidingWindow,
}

impl Strategy {
    fn tag(&self) -> &'static str {
        match self {
            Strategy::FixedWindow => "fixed",
            Strategy::SlidingWindow => "sliding",
        }
    }

    fn slots(&self, spec: &RateWindowSpec) -> (u64, u64) {
        let window_ms = (spec.window().as_millis() as u64).max(1);
        match self {
            Strategy::FixedWindow => (window_ms, 0),
            Strategy::SlidingWindow => {
                let slot_ms = (window_ms / SLIDING_SLOTS).max(1);
                (slot_ms, window_ms.div_ceil(slot_ms))
            }
        }
    }

    /// Lay out the store keys one window needs at `now`.
    pub(crate) fn layout(
        &self,
        namespace: &str,
        name: &str,
        spec: &RateWindowSpec,
        now: Duration,
    ) -> WindowLayout {
        let (slot_ms, history) = self.slots(spec);
        let now_ms = now.as_millis() as u64;
        let current = now_ms / slot_ms;
        let first = current.saturating_sub(history);

        let keys = (first..=current)
            .map(|slot| format!("{}:{}:{}:{}:{}", namespace, name, spec, self.tag(), slot))
            .collect();

        WindowLayout {
            name: name.to_string(),
            spec: *spec,
            keys,
            first_slot: first,
            slot_ms,
            history,
            now_ms,
        }
    }
}

/// Store keys covering one window at one instant, oldest slot first. The
/// last key is the current slot, the only one a request increments.
#[derive(Debug, Clone)]
pub(crate) struct WindowLayout {
    pub name: String,
    pub spec: RateWindowSpec,
    pub keys: Vec<String>,
    first_slot: u64,
    slot_ms: u64,
    history: u64,
    now_ms: u64,
}

/// Headroom of one window given the counts read for its layout.
#[derive(Debug, Clone)]
pub(crate) struct WindowEvaluation {
    pub used: u64,
    /// Increment to commit if every window has headroom.
    pub hit: QuotaHit,
    /// Set when the window is exhausted: how long until a slot frees up.
    pub retry_after: Option<Duration>,
}

impl WindowLayout {
    pub(crate) fn evaluate(&self, counts: &[u64]) -> WindowEvaluation {
        let limit = self.spec.limit();
        let (past, current) = counts.split_at(counts.len().saturating_sub(1));
        let past_sum: u64 = past.iter().sum();
        let used = past_sum + current.iter().sum::<u64>();

        let hit = QuotaHit {
            key: self.keys.last().cloned().unwrap_or_default(),
            expiry: Duration::from_millis(self.slot_ms * (self.history + 1)),
            max_count: limit.saturating_sub(past_sum),
        };

        let retry_after = (used >= limit).then(|| self.retry_after(counts, used + 1 - limit));

        WindowEvaluation {
            used,
            hit,
            retry_after,
        }
    }

    /// Time until at least `excess` counted requests have aged out.
    fn retry_after(&self, counts: &[u64], excess: u64) -> Duration {
        let mut dropped = 0;
        let mut release_slot = self.first_slot + counts.len().saturating_sub(1) as u64;
        for (offset, count) in counts.iter().enumerate() {
            dropped += count;
            if dropped >= excess {
                release_slot = self.first_slot + offset as u64;
                break;
            }
        }
        // Slot j leaves the counted span once `history + 1` slots have passed.
        let release_ms = (release_slot + self.history + 1) * self.slot_ms;
        ceil_to_secs(release_ms.saturating_sub(self.now_ms))
    }
}

/// Round a millisecond wait up to whole seconds, never below one second.
fn ceil_to_secs(ms: u64) -> Duration {
    Duration::from_secs(ms.div_ceil(1000).max(1))
}
