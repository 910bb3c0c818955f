//! # WPI Common Library
//!
//! Shared code for the workplace inspection service:
//! - Data model (workplaces, models, training images, analyses)
//! - Category resolver and the other pure inspection computations
//! - Event types and the SSE event bus
//! - Configuration loading
//! - Database schema initialization

pub mod candidates;
pub mod category;
pub mod completion;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod domain;
pub mod error;
pub mod events;
pub mod performance;
pub mod sse;

pub use error::{Error, Result};
