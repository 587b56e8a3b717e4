//! Configuration module for policy-router
//!
//! This module provides configuration types and loading utilities.
//!
//! # Example
//!
//! ```no_run
//! use policy_router::config::{load_config, Config};
//!
//! let config = load_config("/etc/policy-router/config.json").unwrap();
//! println!("Mode: {}", config.mode);
//! ```

mod loader;
mod types;

pub use loader::{
    apply_env_overrides, create_default_config, load_config, load_config_str, load_config_with_env,
};
pub use types::{
    Config, GateConfig, InternetProtocol, LogConfig, OperatingMode, TogglesConfig, TunnelConfig,
};
