//! Built-in policies
//!
//! Each policy is a [`tower::Layer`] over an [`HttpService`](crate::pipeline::HttpService).
//! Throttling and provider registration live in their own top-level modules
//! because they carry shared state beyond a single request.

mod cookie;
mod credentials;
mod decoding;
mod logging;
mod retry;
mod user_agent;

pub use cookie::{CookieJar, CookieLayer, CookiePolicy};
pub use credentials::{CredentialsLayer, CredentialsPolicy};
pub use decoding::{DecodingLayer, DecodingPolicy};
pub use logging::{HttpLoggingLayer, HttpLoggingPolicy};
pub use retry::{RetryLayer, RetryPolicy};
pub use user_agent::{UserAgentLayer, UserAgentPolicy};
