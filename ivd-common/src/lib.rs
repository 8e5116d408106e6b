//! # IVD Common Library
//!
//! Shared code for the interview duration services including:
//! - The submission record data type
//! - Bootstrap configuration loading
//! - Logging initialisation
//! - Database bootstrap

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod logging;
pub mod models;

pub use error::{Error, Result};
pub use models::SubmissionRecord;
