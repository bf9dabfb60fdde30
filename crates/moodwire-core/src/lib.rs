//! Shared configuration and domain primitives for moodwire.
//!
//! Holds the env-driven [`AppConfig`] used by every binary and the mood
//! vocabulary mapping aggregate sentiment to a descriptive label.

pub mod app_config;
pub mod config;
pub mod mood;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env, ConfigError};
pub use mood::{mood_label, MOOD_VOCABULARY};
