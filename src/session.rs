//! Authentication lifecycle against the Space-Track login endpoints.

use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::error::{OrbitTrackError, Result};
use crate::transport::{HttpRequest, HttpResponse, Transport};

pub const LOGIN_PATH: &str = "/ajaxauth/login";
pub const LOGOUT_PATH: &str = "/ajaxauth/logout";

/// Account identity and password. The password never appears in `Debug`.
#[derive(Debug)]
pub struct Credentials {
    identity: String,
    password: SecretString,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    fn login_form(&self) -> Vec<(String, String)> {
        vec![
            ("identity".to_string(), self.identity.clone()),
            ("password".to_string(), self.password.expose_secret().to_string()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    /// The remote rejected the token; the next request logs in again.
    Expired,
}

/// Session cookies as sent back in the `Cookie` header.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Collect the `name=value` part of every `Set-Cookie` header.
    fn from_response(response: &HttpResponse) -> Option<Self> {
        let cookies: Vec<&str> = response
            .headers_named("set-cookie")
            .filter_map(|c| c.split(';').next())
            .map(str::trim)
            .filter(|c| c.contains('='))
            .collect();

        if cookies.is_empty() {
            None
        } else {
            Some(Self(cookies.join("; ")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

/// A token together with the login that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTicket {
    pub token: SessionToken,
    pub generation: u64,
}

/// One logical session with the remote service.
///
/// Each successful login bumps the generation. Expiry is reported against a
/// generation, so a request that failed with an old token cannot throw away
/// a session another request has already refreshed.
#[derive(Debug)]
pub struct AuthSession {
    credentials: Credentials,
    state: SessionState,
    token: Option<SessionToken>,
    acquired_at: Option<DateTime<Utc>>,
    generation: u64,
}

impl AuthSession {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: SessionState::Unauthenticated,
            token: None,
            acquired_at: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// When the current token was obtained.
    pub fn acquired_at(&self) -> Option<DateTime<Utc>> {
        self.acquired_at
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn identity(&self) -> &str {
        self.credentials.identity()
    }

    /// Log in, replacing any current token.
    pub async fn authenticate(&mut self, transport: &dyn Transport) -> Result<SessionTicket> {
        debug!(identity = %self.credentials.identity(), "Logging in");
        let request = HttpRequest::post_form(LOGIN_PATH, self.credentials.login_form());

        match transport.send(request).await.and_then(Self::accept_login) {
            Ok(token) => {
                self.generation += 1;
                self.state = SessionState::Authenticated;
                self.token = Some(token.clone());
                self.acquired_at = Some(Utc::now());
                info!(
                    identity = %self.credentials.identity(),
                    generation = self.generation,
                    "Authenticated with Space-Track"
                );
                Ok(SessionTicket {
                    token,
                    generation: self.generation,
                })
            }
            Err(e) => {
                self.clear(SessionState::Unauthenticated);
                warn!(identity = %self.credentials.identity(), error = %e, "Login failed");
                Err(match e {
                    OrbitTrackError::Authentication(_) => e,
                    other => OrbitTrackError::Authentication(other.to_string()),
                })
            }
        }
    }

    fn accept_login(response: HttpResponse) -> Result<SessionToken> {
        if !response.is_success() {
            return Err(OrbitTrackError::Authentication(format!(
                "login endpoint returned status {}",
                response.status
            )));
        }

        // Bad credentials still come back as 200 with this body.
        if let Ok(serde_json::Value::Object(body)) =
            serde_json::from_str::<serde_json::Value>(&response.body)
        {
            if body.get("Login").and_then(|v| v.as_str()) == Some("Failed") {
                return Err(OrbitTrackError::Authentication(
                    "credentials rejected".to_string(),
                ));
            }
        }

        SessionToken::from_response(&response).ok_or_else(|| {
            OrbitTrackError::Authentication("login response carried no session cookie".to_string())
        })
    }

    /// Current ticket, logging in first unless already authenticated.
    pub async fn ensure_valid(&mut self, transport: &dyn Transport) -> Result<SessionTicket> {
        if self.state == SessionState::Authenticated {
            if let Some(token) = &self.token {
                return Ok(SessionTicket {
                    token: token.clone(),
                    generation: self.generation,
                });
            }
        }
        self.authenticate(transport).await
    }

    /// Mark the session expired if `generation` is still the current login.
    /// Returns whether the state changed.
    pub fn mark_expired(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state != SessionState::Authenticated {
            debug!(
                stale = generation,
                current = self.generation,
                "Ignoring expiry of a superseded session"
            );
            return false;
        }
        info!(generation, "Session expired");
        self.clear(SessionState::Expired);
        true
    }

    /// End the session. Local state is cleared before the remote call, and a
    /// failing remote call is only logged.
    pub async fn logout(&mut self, transport: &dyn Transport) {
        let token = self.token.take();
        self.clear(SessionState::Unauthenticated);

        let Some(token) = token else {
            return;
        };

        let request = HttpRequest::get(LOGOUT_PATH).with_cookie(token.as_str());
        match transport.send(request).await {
            Ok(response) if response.is_success() => {
                info!(identity = %self.credentials.identity(), "Logged out of Space-Track");
            }
            Ok(response) => {
                warn!(status = response.status, "Logout was not acknowledged");
            }
            Err(e) => {
                warn!(error = %e, "Logout request failed");
            }
        }
    }

    fn clear(&mut self, state: SessionState) {
        self.state = state;
        self.token = None;
        self.acquired_at = None;
    }
}
