//! Main application configuration
//!
//! This module defines the primary configuration structures for the arena
//! service, including environment variable loading, TOML file loading and
//! validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::types::BoardParams;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub game: GameSettings,
    pub dispatch: DispatchSettings,
    pub evaluation: EvaluationSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Board and simulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub board_width: u32,
    pub board_height: u32,
    /// Apples kept on the board at all times
    pub apple_count: u32,
    /// Hard cap on rounds per match
    pub max_rounds: u32,
    /// First score to reach this target ends the match
    pub apple_target: u32,
    /// Hard per-move-request timeout in milliseconds
    pub move_timeout_ms: u64,
}

/// Dispatch layer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Number of concurrent match workers
    pub workers: usize,
    /// Maximum retry attempts for transient failures
    pub max_retry_attempts: u32,
    /// Base retry delay in milliseconds (doubled per attempt, plus jitter)
    pub retry_delay_ms: u64,
    /// Minutes after which an idle in-progress match is considered stale
    pub stale_after_minutes: i64,
    /// Interval between stale-match sweeps in seconds
    pub sweep_interval_seconds: u64,
}

/// Evaluation/placement settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    /// Maximum onboarding agents handled per sweep
    pub max_agents_per_sweep: usize,
    /// Placement match budget per onboarding agent
    pub max_games: u32,
    /// Interval between evaluation sweeps in seconds
    pub sweep_interval_seconds: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "snake-arena".to_string(),
            log_level: "info".to_string(),
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            board_width: 10,
            board_height: 10,
            apple_count: 5,
            max_rounds: 100,
            apple_target: 10,
            move_timeout_ms: 30_000,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            max_retry_attempts: 3,
            retry_delay_ms: 5000,
            stale_after_minutes: 30,
            sweep_interval_seconds: 600,
        }
    }
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            max_agents_per_sweep: 5,
            max_games: 10,
            sweep_interval_seconds: 3600,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Game settings
        if let Ok(width) = env::var("BOARD_WIDTH") {
            config.game.board_width = width
                .parse()
                .map_err(|_| anyhow!("Invalid BOARD_WIDTH value: {}", width))?;
        }
        if let Ok(height) = env::var("BOARD_HEIGHT") {
            config.game.board_height = height
                .parse()
                .map_err(|_| anyhow!("Invalid BOARD_HEIGHT value: {}", height))?;
        }
        if let Ok(apples) = env::var("APPLE_COUNT") {
            config.game.apple_count = apples
                .parse()
                .map_err(|_| anyhow!("Invalid APPLE_COUNT value: {}", apples))?;
        }
        if let Ok(rounds) = env::var("MAX_ROUNDS") {
            config.game.max_rounds = rounds
                .parse()
                .map_err(|_| anyhow!("Invalid MAX_ROUNDS value: {}", rounds))?;
        }
        if let Ok(target) = env::var("APPLE_TARGET") {
            config.game.apple_target = target
                .parse()
                .map_err(|_| anyhow!("Invalid APPLE_TARGET value: {}", target))?;
        }
        if let Ok(timeout) = env::var("MOVE_TIMEOUT_MS") {
            config.game.move_timeout_ms = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid MOVE_TIMEOUT_MS value: {}", timeout))?;
        }

        // Dispatch settings
        if let Ok(workers) = env::var("DISPATCH_WORKERS") {
            config.dispatch.workers = workers
                .parse()
                .map_err(|_| anyhow!("Invalid DISPATCH_WORKERS value: {}", workers))?;
        }
        if let Ok(retries) = env::var("MAX_RETRY_ATTEMPTS") {
            config.dispatch.max_retry_attempts = retries
                .parse()
                .map_err(|_| anyhow!("Invalid MAX_RETRY_ATTEMPTS value: {}", retries))?;
        }
        if let Ok(delay) = env::var("RETRY_DELAY_MS") {
            config.dispatch.retry_delay_ms = delay
                .parse()
                .map_err(|_| anyhow!("Invalid RETRY_DELAY_MS value: {}", delay))?;
        }
        if let Ok(stale) = env::var("STALE_AFTER_MINUTES") {
            config.dispatch.stale_after_minutes = stale
                .parse()
                .map_err(|_| anyhow!("Invalid STALE_AFTER_MINUTES value: {}", stale))?;
        }
        if let Ok(sweep) = env::var("SWEEP_INTERVAL_SECONDS") {
            config.dispatch.sweep_interval_seconds = sweep
                .parse()
                .map_err(|_| anyhow!("Invalid SWEEP_INTERVAL_SECONDS value: {}", sweep))?;
        }

        // Evaluation settings
        if let Ok(max_agents) = env::var("EVAL_MAX_AGENTS") {
            config.evaluation.max_agents_per_sweep = max_agents
                .parse()
                .map_err(|_| anyhow!("Invalid EVAL_MAX_AGENTS value: {}", max_agents))?;
        }
        if let Ok(max_games) = env::var("EVAL_MAX_GAMES") {
            config.evaluation.max_games = max_games
                .parse()
                .map_err(|_| anyhow!("Invalid EVAL_MAX_GAMES value: {}", max_games))?;
        }
        if let Ok(interval) = env::var("EVAL_SWEEP_INTERVAL_SECONDS") {
            config.evaluation.sweep_interval_seconds = interval
                .parse()
                .map_err(|_| anyhow!("Invalid EVAL_SWEEP_INTERVAL_SECONDS value: {}", interval))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Board params for a newly dispatched match with the given seed
    pub fn board_params(&self, seed: u64) -> BoardParams {
        BoardParams {
            width: self.game.board_width,
            height: self.game.board_height,
            apple_count: self.game.apple_count,
            max_rounds: self.game.max_rounds,
            apple_target: self.game.apple_target,
            seed,
        }
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get per-move timeout as Duration
    pub fn move_timeout(&self) -> Duration {
        Duration::from_millis(self.game.move_timeout_ms)
    }

    /// Get base retry delay as Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch.retry_delay_ms)
    }

    /// Get stale sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch.sweep_interval_seconds)
    }

    /// Get evaluation sweep interval as Duration
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation.sweep_interval_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    // Validate board geometry
    if config.game.board_width < 3 || config.game.board_height < 3 {
        return Err(anyhow!("Board must be at least 3x3"));
    }
    if config.game.apple_count == 0 {
        return Err(anyhow!("Apple count must be greater than 0"));
    }
    let cells = config.game.board_width as u64 * config.game.board_height as u64;
    if config.game.apple_count as u64 + 2 > cells {
        return Err(anyhow!(
            "Board too small for {} apples and two agents",
            config.game.apple_count
        ));
    }
    if config.game.max_rounds == 0 {
        return Err(anyhow!("Max rounds must be greater than 0"));
    }
    if config.game.apple_target == 0 {
        return Err(anyhow!("Apple target must be greater than 0"));
    }
    if config.game.move_timeout_ms == 0 {
        return Err(anyhow!("Move timeout must be greater than 0"));
    }

    // Validate dispatch settings
    if config.dispatch.workers == 0 {
        return Err(anyhow!("Worker count must be greater than 0"));
    }
    if config.dispatch.stale_after_minutes <= 0 {
        return Err(anyhow!("Stale threshold must be greater than 0"));
    }
    if config.dispatch.sweep_interval_seconds == 0 {
        return Err(anyhow!("Sweep interval must be greater than 0"));
    }

    // Validate evaluation settings
    if config.evaluation.max_agents_per_sweep == 0 {
        return Err(anyhow!("Max agents per sweep must be greater than 0"));
    }
    if config.evaluation.max_games == 0 {
        return Err(anyhow!("Max evaluation games must be greater than 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.game.board_width, 10);
        assert_eq!(config.evaluation.max_games, 10);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_tiny_board_rejected() {
        let mut config = AppConfig::default();
        config.game.board_width = 2;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_board_too_small_for_apples() {
        let mut config = AppConfig::default();
        config.game.board_width = 3;
        config.game.board_height = 3;
        config.game.apple_count = 8;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_board_params_carry_seed() {
        let config = AppConfig::default();
        let params = config.board_params(42);
        assert_eq!(params.seed, 42);
        assert_eq!(params.width, config.game.board_width);
        assert_eq!(params.apple_target, config.game.apple_target);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.game.max_rounds, config.game.max_rounds);
        assert_eq!(parsed.dispatch.workers, config.dispatch.workers);
    }
}
