//! The request path shared by the async and blocking clients.
//!
//! Every call goes through the same steps: make sure the session is valid,
//! take a permit from the rate limiter, send, then classify the response.
//! A `401` expires the session, logs in again and resends once under the
//! same permit.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::clock::Sleeper;
use crate::error::{OrbitTrackError, Result};
use crate::ratelimit::RateLimiter;
use crate::session::{AuthSession, Credentials, SessionState};
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// Body of a successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub status: u16,
    pub body: String,
}

impl Payload {
    /// Decode the whole body as `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|source| OrbitTrackError::Decode {
            shape: std::any::type_name::<T>(),
            source,
        })
    }

    /// Decode a list of records. A single object is treated as a list of one.
    pub fn records<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let value: serde_json::Value = self.decode()?;
        let value = match value {
            serde_json::Value::Array(_) => value,
            other => serde_json::Value::Array(vec![other]),
        };
        serde_json::from_value(value).map_err(|source| OrbitTrackError::Decode {
            shape: std::any::type_name::<Vec<T>>(),
            source,
        })
    }

    pub fn text(&self) -> &str {
        &self.body
    }
}

/// Session, limiter and transport wired together.
#[derive(Debug)]
pub struct Dispatcher {
    session: Mutex<AuthSession>,
    limiter: Arc<RateLimiter>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(
        credentials: Credentials,
        limiter: Arc<RateLimiter>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            session: Mutex::new(AuthSession::new(credentials)),
            limiter,
            transport,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Log in unless a valid session already exists.
    pub async fn login(&self) -> Result<()> {
        self.session
            .lock()
            .await
            .ensure_valid(self.transport.as_ref())
            .await
            .map(|_| ())
    }

    pub async fn logout(&self) {
        self.session
            .lock()
            .await
            .logout(self.transport.as_ref())
            .await;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.lock().await.is_authenticated()
    }

    pub async fn session_state(&self) -> SessionState {
        self.session.lock().await.state()
    }

    /// Send `request` and return the body of a successful response.
    #[instrument(
        skip(self, request, sleeper),
        fields(path = %request.path, request_id = %Uuid::new_v4())
    )]
    pub async fn dispatch_raw(
        &self,
        request: HttpRequest,
        sleeper: &dyn Sleeper,
    ) -> Result<Payload> {
        // The lock is held only while the session is checked or refreshed,
        // never while waiting for quota or talking to the query endpoint.
        let mut ticket = {
            let mut session = self.session.lock().await;
            session.ensure_valid(self.transport.as_ref()).await?
        };

        // One permit covers the request, including its re-authenticated retry.
        let permit = self.limiter.acquire(sleeper).await?;
        if !permit.waited.is_zero() {
            debug!(waited_secs = permit.waited.as_secs(), "Rate limit wait finished");
        }

        let mut reauthenticated = false;
        loop {
            let response = self
                .transport
                .send(request.clone().with_cookie(ticket.token.as_str()))
                .await?;

            match response.status {
                401 => {
                    let mut session = self.session.lock().await;
                    session.mark_expired(ticket.generation);
                    if reauthenticated {
                        warn!("Session rejected again after re-authentication");
                        return Err(OrbitTrackError::SessionExpiredRetryExhausted { status: 401 });
                    }
                    debug!("Session rejected, re-authenticating");
                    reauthenticated = true;
                    ticket = session.ensure_valid(self.transport.as_ref()).await?;
                }
                429 => {
                    let retry_after = retry_after(&response);
                    warn!(
                        retry_after_secs = ?retry_after.map(|d| d.as_secs()),
                        "Throttled by Space-Track"
                    );
                    return Err(OrbitTrackError::RemoteRateLimitExceeded {
                        status: response.status,
                        retry_after,
                        body: response.body,
                    });
                }
                status if response.is_success() => {
                    debug!(status, bytes = response.body.len(), "Request succeeded");
                    return Ok(Payload {
                        status,
                        body: response.body,
                    });
                }
                status => {
                    return Err(OrbitTrackError::Transport {
                        status: Some(status),
                        message: response.body,
                    });
                }
            }
        }
    }

    /// Send `request` and decode the body as `T`.
    pub async fn dispatch<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
        sleeper: &dyn Sleeper,
    ) -> Result<T> {
        self.dispatch_raw(request, sleeper).await?.decode()
    }
}

/// `Retry-After` as delay-seconds or an HTTP date.
fn retry_after(response: &HttpResponse) -> Option<Duration> {
    let value = response.header("retry-after")?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}
