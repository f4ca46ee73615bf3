use std::path::PathBuf;

/// Errors raised while deriving statistics from an action trace.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("action trace contains no WAIT action")]
    NoWait,

    #[error("action trace of length {0} has no COMMIT or FINISH")]
    Unscoreable(usize),
}

/// Errors raised by the decision episode runner.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("batch has {sources} sources but {targets} targets")]
    BatchMismatch { sources: usize, targets: usize },

    #[error("statistics error: {0}")]
    Stats(#[from] StatsError),
}

/// Errors raised when (de)serializing policy state.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to encode policy state: {0}")]
    Json(#[from] serde_json::Error),

    #[error("policy state does not match this policy: {0}")]
    Mismatch(String),

    #[error("invalid policy configuration: {0}")]
    Config(String),
}

/// Errors raised by corpus readers.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("failed to read corpus file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parallel files differ in length: {source_lines} source lines vs {target_lines} target lines")]
    LineCountMismatch {
        source_lines: usize,
        target_lines: usize,
    },

    #[error("batch size must be > 0")]
    ZeroBatchSize,
}

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to read {path}: {source}")]
    MetadataRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    MetadataParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("policy state error: {0}")]
    Policy(#[from] PolicyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during training.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("NaN/INF detected in {field}: ID={run_id}")]
    Divergence { field: String, run_id: String },

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("remote display failed: {0}")]
    Monitor(std::io::Error),
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divergence_error_names_field_and_run() {
        let err = TrainingError::Divergence {
            field: "R".to_string(),
            run_id: "run-7".to_string(),
        };
        assert_eq!(err.to_string(), "NaN/INF detected in R: ID=run-7");
    }

    #[test]
    fn test_stats_error_display() {
        assert_eq!(
            StatsError::NoWait.to_string(),
            "action trace contains no WAIT action"
        );
        assert_eq!(
            StatsError::Unscoreable(3).to_string(),
            "action trace of length 3 has no COMMIT or FINISH"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("training.save_freq must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "config validation error: training.save_freq must be > 0"
        );
    }
}
