//! Core types and trait definitions for the Ward offline clinical client.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! local cache (`ward-store-sqlite`) and the server client (`ward-client`)
//! implement the traits defined here; `ward-sync` drives both through them.

// Trait methods spell out `Send` futures; impls use plain `async fn`.
#![allow(async_fn_in_trait)]

pub mod chart;
pub mod concept;
pub mod error;
pub mod location;
pub mod observation;
pub mod patient;
pub mod remote;
pub mod store;
pub mod sync_state;

pub use error::{Error, Result};
