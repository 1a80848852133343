//! Transport layer for the inbox notifications API.
//!
//! This crate defines the server-owned entity types (threads and inbox
//! notifications), the [`InboxApi`] capability consumed by the sync engine,
//! and an HTTP implementation of it.

mod client;
mod error;
mod types;

pub use client::{HttpInboxClient, InboxApi};
pub use error::ApiError;
pub use types::*;
