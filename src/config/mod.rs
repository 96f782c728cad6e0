//! Configuration module for sieve.
//!
//! Handles compiler options, schema location, logging level and environment
//! variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, CompilerSettings, LoggingSettings, SchemaSettings, Settings, SettingsError,
};
