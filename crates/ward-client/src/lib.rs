//! HTTP client for the clinical records server.
//!
//! [`HttpChartServer`] implements [`ward_core::remote::ChartServer`] on top of
//! `reqwest`. It attaches credentials and deserialises responses; caching and
//! merging live in `ward-sync`.

mod client;

pub mod error;

pub use client::{HttpChartServer, ServerConfig};
pub use error::{Error, Result};
