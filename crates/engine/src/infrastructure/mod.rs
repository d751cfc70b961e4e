//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod app_settings;
pub mod clock;
pub mod config;
pub mod dryrun;
pub mod file_store;
pub mod gemini;
pub mod persistence;
pub mod ports;
pub mod provider_gateway;
pub mod resilient_provider;
pub mod settings;
