mod manager;
mod metadata;

pub use manager::{
    load_run_config, save_run_config, CheckpointData, CheckpointManager, CheckpointManagerConfig,
};
pub use metadata::{CheckpointMetadata, HistoryEntry, TrainingState, CHECKPOINT_VERSION};
