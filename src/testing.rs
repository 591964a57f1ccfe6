//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::clock::{Clock, Sleeper};
use crate::error::{OrbitTrackError, Result};
use crate::ratelimit::{QuotaStatus, QuotaStore, StoreError};
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// A store whose backend is always down.
#[derive(Debug, Default)]
pub(crate) struct FailingStore;

#[async_trait]
impl QuotaStore for FailingStore {
    async fn increment_and_check(
        &self,
        _key: &str,
        _expiry: Duration,
        _max_count: u64,
    ) -> std::result::Result<QuotaStatus, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn get(&self, _key: &str) -> std::result::Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn decrement(&self, _key: &str) -> std::result::Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

/// Wall clock that follows tokio's timer, so paused test time moves it.
#[derive(Debug, Clone)]
pub(crate) struct TokioClock {
    base: Duration,
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.base + self.origin.elapsed()
    }
}

/// A sleeper that never wakes up.
#[derive(Debug, Default)]
pub(crate) struct PendingSleeper;

#[async_trait]
impl Sleeper for PendingSleeper {
    async fn sleep(&self, _duration: Duration) {
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Respond(HttpResponse),
    Fail(String),
}

#[derive(Debug)]
struct Route {
    prefix: String,
    script: VecDeque<Scripted>,
}

/// Transport answering from per-path scripts.
///
/// Each route replays its responses in order and keeps repeating the last
/// one. Requests matching no route get a 404.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, prefix: &str, step: Scripted) -> Self {
        {
            let mut routes = self.routes.lock();
            match routes.iter_mut().find(|r| r.prefix == prefix) {
                Some(route) => route.script.push_back(step),
                None => routes.push(Route {
                    prefix: prefix.to_string(),
                    script: VecDeque::from([step]),
                }),
            }
        }
        self
    }

    pub fn on(self, prefix: &str, response: HttpResponse) -> Self {
        self.push(prefix, Scripted::Respond(response))
    }

    pub fn fail_on(self, prefix: &str, message: &str) -> Self {
        self.push(prefix, Scripted::Fail(message.to_string()))
    }

    /// Accept logins, handing out `cookie` as the session.
    pub fn with_login(self, cookie: &str) -> Self {
        self.on("/ajaxauth/login", login_ok(cookie))
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn calls_to(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let path = request.path.clone();
        self.requests.lock().push(request);

        let step = {
            let mut routes = self.routes.lock();
            routes
                .iter_mut()
                .find(|r| path.starts_with(&r.prefix))
                .and_then(|route| {
                    if route.script.len() > 1 {
                        route.script.pop_front()
                    } else {
                        route.script.front().cloned()
                    }
                })
        };

        match step {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(OrbitTrackError::transport(message)),
            None => Ok(HttpResponse::new(404, "not found")),
        }
    }
}

/// A successful login response carrying `cookie`.
pub(crate) fn login_ok(cookie: &str) -> HttpResponse {
    HttpResponse::new(200, "\"\"").with_header("Set-Cookie", format!("{cookie}; path=/; secure"))
}
