//! Space-Track clients.
//!
//! [`SpaceTrack`] suspends the calling task while it waits for rate-limit
//! headroom; [`BlockingSpaceTrack`] blocks the calling thread. Both drive the
//! same [`Dispatcher`], so sessions, throttling and errors behave identically.

mod blocking;

use std::future::Future;
use std::panic::{resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::NaiveDate;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::clock::{Clock, Sleeper, SystemClock, TokioSleeper};
use crate::config::ClientConfig;
use crate::dispatch::{Dispatcher, Payload};
use crate::error::Result;
use crate::models::{Announcement, GpRecord};
use crate::query;
use crate::ratelimit::{
    default_hourly_limit, default_minute_limit, QuotaStore, RateLimiter, RateWindowSpec, Strategy,
    WaitMode, HOUR_WINDOW, MINUTE_WINDOW,
};
use crate::session::Credentials;
use crate::transport::{HttpRequest, ReqwestTransport, Transport};

pub use blocking::{BlockingSpaceTrack, SessionGuard};

/// Asynchronous Space-Track client.
///
/// Clones share the session and the rate limiter.
#[derive(Debug, Clone)]
pub struct SpaceTrack {
    dispatcher: Arc<Dispatcher>,
    sleeper: Arc<dyn Sleeper>,
}

impl SpaceTrack {
    /// Client with the default configuration.
    pub fn new(identity: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        Self::from_config(Credentials::new(identity, password), &ClientConfig::default())
    }

    pub fn from_config(credentials: Credentials, config: &ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::from_config(&config.api)?;
        let limiter = limiter_from_config(config, Arc::new(SystemClock));
        Ok(Self::with_parts(
            credentials,
            Arc::new(limiter),
            Arc::new(transport),
            Arc::new(TokioSleeper),
        ))
    }

    /// Assemble a client from its parts. Passing the same limiter to several
    /// clients makes them share quota.
    pub fn with_parts(
        credentials: Credentials,
        limiter: Arc<RateLimiter>,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(credentials, limiter, transport)),
            sleeper,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.dispatcher.limiter()
    }

    /// Log in unless already authenticated.
    pub async fn login(&self) -> Result<()> {
        self.dispatcher.login().await
    }

    /// End the session. Never fails; remote errors are logged.
    pub async fn logout(&self) {
        self.dispatcher.logout().await
    }

    /// Log out and drop this handle.
    pub async fn close(self) {
        self.logout().await;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.dispatcher.is_authenticated().await
    }

    /// Log in, run `body`, and log out afterwards, also on error or panic.
    pub async fn scoped<'a, F, Fut, T>(&'a self, body: F) -> Result<T>
    where
        F: FnOnce(&'a SpaceTrack) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.login().await?;
        let outcome = AssertUnwindSafe(body(self)).catch_unwind().await;
        self.logout().await;
        match outcome {
            Ok(result) => result,
            Err(panic) => resume_unwind(panic),
        }
    }

    pub fn set_window(&self, name: impl Into<String>, spec: RateWindowSpec) {
        self.limiter().set_window(name, spec);
    }

    pub fn set_window_str(&self, name: impl Into<String>, spec: &str) -> Result<()> {
        self.limiter().set_window_str(name, spec)
    }

    pub fn remove_window(&self, name: &str) -> Option<RateWindowSpec> {
        self.limiter().remove_window(name)
    }

    /// Replace the per-minute window. Anything faster than 30/minute is
    /// rejected.
    pub fn set_minute_rate_limit(&self, spec: &str) -> Result<()> {
        self.limiter()
            .set_window_within(MINUTE_WINDOW, spec.parse()?, default_minute_limit())
    }

    /// Replace the per-hour window. Anything faster than 300/hour is
    /// rejected.
    pub fn set_hourly_rate_limit(&self, spec: &str) -> Result<()> {
        self.limiter()
            .set_window_within(HOUR_WINDOW, spec.parse()?, default_hourly_limit())
    }

    pub fn set_storage(&self, store: Arc<dyn QuotaStore>) {
        self.limiter().set_storage(store);
    }

    pub fn set_strategy(&self, strategy: Strategy) {
        self.limiter().set_strategy(strategy);
    }

    pub fn set_wait_mode(&self, wait_mode: WaitMode) {
        self.limiter().set_wait_mode(wait_mode);
    }

    /// Latest GP element sets for objects matching `filter = value`.
    pub async fn gp(&self, filter: &str, value: &str) -> Result<Vec<GpRecord>> {
        self.query(query::gp(filter, value)?).await
    }

    /// Every historical GP element set for the matching objects.
    pub async fn all_gp_history(&self, filter: &str, value: &str) -> Result<Vec<GpRecord>> {
        self.query(query::all_gp_history(filter, value)?).await
    }

    /// Historical GP element sets with epochs in `start..=end`.
    pub async fn gp_history(
        &self,
        filter: &str,
        value: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<GpRecord>> {
        self.query(query::gp_history(filter, value, start, end)?).await
    }

    pub async fn announcements(&self) -> Result<Vec<Announcement>> {
        self.query(query::announcements()).await
    }

    /// Any query path; the body is returned undecoded.
    pub async fn custom_query(&self, path: &str) -> Result<Payload> {
        self.dispatcher
            .dispatch_raw(query::custom(path)?, self.sleeper.as_ref())
            .await
    }

    /// Send a prepared request and decode its records.
    pub async fn query<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<Vec<T>> {
        self.dispatcher
            .dispatch_raw(request, self.sleeper.as_ref())
            .await?
            .records()
    }
}

pub(crate) fn limiter_from_config(config: &ClientConfig, clock: Arc<dyn Clock>) -> RateLimiter {
    let limiter = RateLimiter::with_clock(clock);
    config.rate_limiting.apply(&limiter);
    debug!(
        windows = ?config.rate_limiting.windows,
        strategy = ?config.rate_limiting.strategy,
        "Rate limiter configured"
    );
    limiter
}
