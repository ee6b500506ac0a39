use crate::errors::{EngineError, EngineResult};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub data_dir: PathBuf,
    pub default_sample_budget: usize,
    pub default_stage_count: usize,
    pub max_sample_budget: usize,
    /// Upper bound on stages per run. Work grows with budget * stages.
    pub max_stage_count: usize,
    /// Pacing between trajectory stages, for chart animation. Zero means no delay.
    pub stage_delay_ms: u64,
    /// Fixed seed for every run that does not supply its own.
    pub simulation_seed: Option<u64>,
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();

        let server_port = env_var_or("SERVER_PORT", "3001")
            .parse::<u16>()
            .map_err(|e| EngineError::Config(format!("SERVER_PORT: {e}")))?;

        let default_sample_budget = env_var_or("DEFAULT_SAMPLE_BUDGET", "5000")
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("DEFAULT_SAMPLE_BUDGET: {e}")))?;

        let default_stage_count = env_var_or("DEFAULT_STAGE_COUNT", "20")
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("DEFAULT_STAGE_COUNT: {e}")))?;

        let max_sample_budget = env_var_or("MAX_SAMPLE_BUDGET", "1000000")
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("MAX_SAMPLE_BUDGET: {e}")))?;

        let max_stage_count = env_var_or("MAX_STAGE_COUNT", "200")
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("MAX_STAGE_COUNT: {e}")))?;

        let stage_delay_ms = env_var_or("STAGE_DELAY_MS", "0")
            .parse::<u64>()
            .map_err(|e| EngineError::Config(format!("STAGE_DELAY_MS: {e}")))?;

        let simulation_seed = match std::env::var("SIMULATION_SEED") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                raw.trim()
                    .parse::<u64>()
                    .map_err(|e| EngineError::Config(format!("SIMULATION_SEED: {e}")))?,
            ),
            _ => None,
        };

        let cfg = Self {
            server_port,
            data_dir: PathBuf::from(env_var_or("DATA_DIR", "data")),
            default_sample_budget,
            default_stage_count,
            max_sample_budget,
            max_stage_count,
            stage_delay_ms,
            simulation_seed,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> EngineResult<()> {
        if self.default_stage_count == 0 {
            return Err(EngineError::Config("DEFAULT_STAGE_COUNT must be >= 1".into()));
        }
        if self.default_sample_budget < self.default_stage_count {
            return Err(EngineError::Config(
                "DEFAULT_SAMPLE_BUDGET must be >= DEFAULT_STAGE_COUNT".into(),
            ));
        }
        if self.default_stage_count > self.max_stage_count {
            return Err(EngineError::Config(
                "DEFAULT_STAGE_COUNT exceeds MAX_STAGE_COUNT".into(),
            ));
        }
        if self.default_sample_budget > self.max_sample_budget {
            return Err(EngineError::Config(
                "DEFAULT_SAMPLE_BUDGET exceeds MAX_SAMPLE_BUDGET".into(),
            ));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 3001,
            data_dir: PathBuf::from("data"),
            default_sample_budget: 5000,
            default_stage_count: 20,
            max_sample_budget: 1_000_000,
            max_stage_count: 200,
            stage_delay_ms: 0,
            simulation_seed: None,
        }
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
