//! OrbitTrack - Space-Track API Client
//!
//! This crate implements a client for the Space-Track orbital data API. Every
//! request goes through one dispatch path that keeps the login session valid
//! and enforces client-side rate limits across any number of named windows,
//! backed by a pluggable quota store so several processes can share quota.
//!
//! ```no_run
//! # async fn run() -> orbittrack::Result<()> {
//! let client = orbittrack::SpaceTrack::new("user@example.com", "password")?;
//! let iss = client
//!     .scoped(|c| async move { c.gp("norad_cat_id", "25544").await })
//!     .await?;
//! println!("{:?}", iss.first().and_then(|r| r.tle()));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod query;
pub mod ratelimit;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{BlockingSpaceTrack, SessionGuard, SpaceTrack};
pub use config::ClientConfig;
pub use dispatch::Payload;
pub use error::{ErrorCategory, OrbitTrackError, Result};
pub use models::{Announcement, GpRecord};
pub use ratelimit::{RateWindowSpec, Strategy, WaitMode};
pub use session::Credentials;
