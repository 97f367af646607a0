#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Practice API Library
//!
//! HTTP surface for practice subscriptions: the Stripe webhook receiver,
//! authenticated checkout and cancellation endpoints, and health probes.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::ApiError;
pub use state::AppState;
