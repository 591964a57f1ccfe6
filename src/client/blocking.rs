use std::ops::Deref;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use tokio::runtime::{Builder, Runtime};

use super::{limiter_from_config, SpaceTrack};
use crate::clock::{Sleeper, SystemClock, TokioSleeper};
use crate::config::ClientConfig;
use crate::dispatch::Payload;
use crate::error::Result;
use crate::models::{Announcement, GpRecord};
use crate::ratelimit::{QuotaStore, RateLimiter, RateWindowSpec, Strategy, WaitMode};
use crate::session::Credentials;
use crate::transport::{HttpRequest, ReqwestTransport, Transport};

/// Blocking Space-Track client.
///
/// Runs the async client on a private current-thread runtime and waits for
/// rate-limit headroom by blocking the calling thread. Must not be used from
/// inside an async runtime.
#[derive(Debug)]
pub struct BlockingSpaceTrack {
    inner: SpaceTrack,
    runtime: Runtime,
}

impl BlockingSpaceTrack {
    pub fn new(identity: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        Self::from_config(Credentials::new(identity, password), &ClientConfig::default())
    }

    pub fn from_config(credentials: Credentials, config: &ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::from_config(&config.api)?;
        let limiter = limiter_from_config(config, Arc::new(SystemClock));
        Self::with_parts(
            credentials,
            Arc::new(limiter),
            Arc::new(transport),
            Arc::new(TokioSleeper),
        )
    }

    pub fn with_parts(
        credentials: Credentials,
        limiter: Arc<RateLimiter>,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            inner: SpaceTrack::with_parts(credentials, limiter, transport, sleeper),
            runtime,
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.inner.limiter()
    }

    pub fn login(&self) -> Result<()> {
        self.runtime.block_on(self.inner.login())
    }

    pub fn logout(&self) {
        self.runtime.block_on(self.inner.logout())
    }

    pub fn close(self) {
        self.logout();
    }

    pub fn is_authenticated(&self) -> bool {
        self.runtime.block_on(self.inner.is_authenticated())
    }

    /// Log in and return a guard that logs out when dropped.
    pub fn session(&self) -> Result<SessionGuard<'_>> {
        self.login()?;
        Ok(SessionGuard { client: self })
    }

    /// Log in, run `body`, and log out afterwards, also on error or panic.
    pub fn scoped<T>(&self, body: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let session = self.session()?;
        body(&session)
    }

    pub fn set_window(&self, name: impl Into<String>, spec: RateWindowSpec) {
        self.inner.set_window(name, spec);
    }

    pub fn set_window_str(&self, name: impl Into<String>, spec: &str) -> Result<()> {
        self.inner.set_window_str(name, spec)
    }

    pub fn remove_window(&self, name: &str) -> Option<RateWindowSpec> {
        self.inner.remove_window(name)
    }

    pub fn set_minute_rate_limit(&self, spec: &str) -> Result<()> {
        self.inner.set_minute_rate_limit(spec)
    }

    pub fn set_hourly_rate_limit(&self, spec: &str) -> Result<()> {
        self.inner.set_hourly_rate_limit(spec)
    }

    pub fn set_storage(&self, store: Arc<dyn QuotaStore>) {
        self.inner.set_storage(store);
    }

    pub fn set_strategy(&self, strategy: Strategy) {
        self.inner.set_strategy(strategy);
    }

    pub fn set_wait_mode(&self, wait_mode: WaitMode) {
        self.inner.set_wait_mode(wait_mode);
    }

    pub fn gp(&self, filter: &str, value: &str) -> Result<Vec<GpRecord>> {
        self.runtime.block_on(self.inner.gp(filter, value))
    }

    pub fn all_gp_history(&self, filter: &str, value: &str) -> Result<Vec<GpRecord>> {
        self.runtime.block_on(self.inner.all_gp_history(filter, value))
    }

    pub fn gp_history(
        &self,
        filter: &str,
        value: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<GpRecord>> {
        self.runtime
            .block_on(self.inner.gp_history(filter, value, start, end))
    }

    pub fn announcements(&self) -> Result<Vec<Announcement>> {
        self.runtime.block_on(self.inner.announcements())
    }

    pub fn custom_query(&self, path: &str) -> Result<Payload> {
        self.runtime.block_on(self.inner.custom_query(path))
    }

    pub fn query<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<Vec<T>> {
        self.runtime.block_on(self.inner.query(request))
    }
}

/// An open session that ends when dropped.
#[derive(Debug)]
pub struct SessionGuard<'a> {
    client: &'a BlockingSpaceTrack,
}

impl Deref for SessionGuard<'_> {
    type Target = BlockingSpaceTrack;

    fn deref(&self) -> &Self::Target {
        self.client
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.client.logout();
    }
}
