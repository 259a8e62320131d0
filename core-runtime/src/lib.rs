//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the sync workspace:
//! - Logging and tracing infrastructure
//! - Configuration management (credentials, sync tuning, data paths)
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that other modules depend on.
//! It establishes the logging conventions, configuration validation and event
//! broadcasting used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
