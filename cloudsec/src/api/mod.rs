//! CloudSec REST API client

pub mod appsec;
pub mod client;
pub mod cloudonboarding;
pub mod common;
pub mod cwp;
pub mod error;
pub mod platform;

pub use client::{AuthType, Client, ClientConfig, RetryConfig};
pub use common::Filter;
pub use error::ApiError;
