//! Bootstrap helpers for the relay binary
//!
//! This module handles:
//! - Configuration loading
//! - Database initialization

pub mod config;
pub mod database;

pub use config::load_config;
pub use database::init_database;
