//! Service Configuration Module
//!
//! ## Loading Order
//!
//! 1. `MSMS_CONFIG` environment variable (path to TOML file)
//! 2. `msms_config.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! Environment overrides (`ML_API_HOST`, `ML_API_PORT`, `AGG_INTERVAL`,
//! `N_JOBS`, `DEFAULT_MODEL`, `MSMS_DATA_DIR`, `MSMS_MODELS_DIR`) are applied
//! last. The loaded config is passed explicitly to the components that need
//! it; there is no global instance.

pub mod defaults;
mod service_config;

pub use service_config::*;
