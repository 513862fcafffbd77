//! Configuration module for tun-dns
//!
//! This module provides configuration types and loading utilities.
//!
//! # Example
//!
//! ```no_run
//! use tun_dns::config::{load_config, Config};
//!
//! let config = load_config("/etc/tun-dns/config.json").unwrap();
//! println!("DNS mode: {}", config.dns.mode);
//! ```

mod loader;
mod types;

pub use loader::{
    create_default_config, load_config, load_config_str, load_config_with_env, ENV_LISTEN_ADDR,
    ENV_LOG_LEVEL, ENV_MODE, ENV_UPSTREAM,
};
pub use types::{Config, LogConfig};
