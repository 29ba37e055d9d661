//! Configuration management for the arena service

pub mod app;

pub use app::{
    validate_config, AppConfig, DispatchSettings, EvaluationSettings, GameSettings,
    ServiceSettings,
};
