use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::checkpoint::metadata::{CheckpointMetadata, TrainingState, CHECKPOINT_VERSION};
use crate::config::{AppConfig, Workspace};
use crate::error::CheckpointError;
use crate::policy::Policy;

/// Configuration for the checkpoint manager.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CheckpointManagerConfig {
    pub keep_last_n: usize,
    pub keep_best_n: usize,
}

impl Default for CheckpointManagerConfig {
    fn default() -> Self {
        CheckpointManagerConfig {
            keep_last_n: 3,
            keep_best_n: 1,
        }
    }
}

/// A checkpoint read back from disk. The policy deserializes its own state.
#[derive(Debug)]
pub struct CheckpointData {
    pub path: PathBuf,
    pub metadata: CheckpointMetadata,
    pub state: TrainingState,
    pub policy_json: String,
}

/// Manages saving, loading, listing, and pruning the checkpoints of one run.
pub struct CheckpointManager {
    dir: PathBuf,
    config: CheckpointManagerConfig,
}

fn read_file(path: &Path) -> Result<String, CheckpointError> {
    fs::read_to_string(path).map_err(|e| CheckpointError::MetadataRead {
        path: path.to_path_buf(),
        source: e,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CheckpointError> {
    let json = read_file(path)?;
    serde_json::from_str(&json).map_err(|e| CheckpointError::MetadataParse {
        path: path.to_path_buf(),
        source: e,
    })
}

impl CheckpointManager {
    /// Checkpoints go to `<workspace>/.policy/<run_id>/`.
    pub fn new(workspace: &Workspace, run_id: &str, config: CheckpointManagerConfig) -> Self {
        CheckpointManager {
            dir: workspace.policy_dir().join(run_id),
            config,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save the training state and the policy's learnable state.
    pub fn save(
        &self,
        state: &TrainingState,
        policy: &dyn Policy,
    ) -> Result<PathBuf, CheckpointError> {
        let dir_name = format!("checkpoint_{:07}", state.iteration);
        let tmp_dir = self.dir.join(format!("{}.tmp", dir_name));
        let final_dir = self.dir.join(&dir_name);

        fs::create_dir_all(&tmp_dir)?;

        fs::write(tmp_dir.join("policy.json"), policy.training_state_json()?)?;
        fs::write(
            tmp_dir.join("history.json"),
            serde_json::to_string(state)?,
        )?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let metadata = CheckpointMetadata {
            version: CHECKPOINT_VERSION,
            iteration: state.iteration,
            timestamp,
            policy: policy.name().to_string(),
            validation: state.last_validation().cloned(),
        };
        fs::write(
            tmp_dir.join("metadata.json"),
            serde_json::to_string_pretty(&metadata)?,
        )?;

        // Atomic rename
        if final_dir.exists() {
            fs::remove_dir_all(&final_dir)?;
        }
        fs::rename(&tmp_dir, &final_dir)?;

        self.update_latest_symlink(&dir_name)?;
        self.prune_old_checkpoints()?;

        info!(path = %final_dir.display(), iteration = state.iteration, "saved checkpoint");
        Ok(final_dir)
    }

    /// Load one checkpoint directory.
    pub fn load_checkpoint(&self, dir: &Path) -> Result<CheckpointData, CheckpointError> {
        let metadata: CheckpointMetadata = read_json(&dir.join("metadata.json"))?;
        let state: TrainingState = read_json(&dir.join("history.json"))?;
        let policy_json = read_file(&dir.join("policy.json"))?;

        Ok(CheckpointData {
            path: dir.to_path_buf(),
            metadata,
            state,
            policy_json,
        })
    }

    /// Load the checkpoint `latest` points at, or `None` if the run has none.
    pub fn load(&self) -> Result<Option<CheckpointData>, CheckpointError> {
        let latest_link = self.dir.join("latest");
        if !latest_link.exists() {
            return Ok(None);
        }
        let resolved = fs::read_link(&latest_link)?;
        let target = if resolved.is_relative() {
            self.dir.join(resolved)
        } else {
            resolved
        };
        self.load_checkpoint(&target).map(Some)
    }

    /// Restore `policy` from the latest checkpoint and return its training
    /// state. Missing or unreadable checkpoints give a fresh state.
    pub fn load_or_fresh(&self, policy: &mut dyn Policy) -> TrainingState {
        let restored = self.load().and_then(|data| match data {
            Some(data) => {
                policy.restore_training_state_json(&data.policy_json)?;
                Ok(Some(data))
            }
            None => Ok(None),
        });
        match restored {
            Ok(Some(data)) => {
                info!(
                    path = %data.path.display(),
                    iteration = data.state.iteration,
                    "resuming from checkpoint"
                );
                data.state
            }
            Ok(None) => {
                debug!(dir = %self.dir.display(), "no checkpoint found, starting fresh");
                TrainingState::fresh()
            }
            Err(e) => {
                warn!(error = %e, "failed to load checkpoint, starting fresh");
                TrainingState::fresh()
            }
        }
    }

    /// List all checkpoints sorted by iteration (ascending).
    pub fn list_checkpoints(
        &self,
    ) -> Result<Vec<(PathBuf, CheckpointMetadata)>, CheckpointError> {
        let mut results = Vec::new();
        if !self.dir.exists() {
            return Ok(results);
        }
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() || path.is_symlink() {
                continue;
            }
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if !name_str.starts_with("checkpoint_") || name_str.ends_with(".tmp") {
                continue;
            }
            let meta_path = path.join("metadata.json");
            if meta_path.exists() {
                let metadata: CheckpointMetadata = read_json(&meta_path)?;
                results.push((path, metadata));
            }
        }
        results.sort_by_key(|(_, m)| m.iteration);
        Ok(results)
    }

    /// Prune old checkpoints, keeping the union of the last N and the best N
    /// by validation quality.
    fn prune_old_checkpoints(&self) -> Result<(), CheckpointError> {
        let checkpoints = self.list_checkpoints()?;
        if checkpoints.len() <= self.config.keep_last_n {
            return Ok(());
        }

        let total = checkpoints.len();
        let mut keep: HashSet<usize> =
            (total.saturating_sub(self.config.keep_last_n)..total).collect();

        let mut by_quality: Vec<(usize, f32)> = checkpoints
            .iter()
            .enumerate()
            .filter(|(_, (_, m))| m.validation.is_some())
            .map(|(i, (_, m))| (i, m.validation_quality()))
            .collect();
        by_quality.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        for (i, _) in by_quality.iter().take(self.config.keep_best_n) {
            keep.insert(*i);
        }

        for (i, (path, _)) in checkpoints.iter().enumerate() {
            if !keep.contains(&i) {
                debug!(path = %path.display(), "pruning checkpoint");
                fs::remove_dir_all(path)?;
            }
        }

        Ok(())
    }

    /// Point the `latest` symlink at the given checkpoint directory name.
    fn update_latest_symlink(&self, dir_name: &str) -> Result<(), CheckpointError> {
        let link_path = self.dir.join("latest");
        if link_path.symlink_metadata().is_ok() {
            fs::remove_file(&link_path)?;
        }
        std::os::unix::fs::symlink(dir_name, &link_path)?;
        Ok(())
    }
}

/// Store the merged configuration of a run under `<workspace>/.config/`.
pub fn save_run_config(
    workspace: &Workspace,
    run_id: &str,
    config: &AppConfig,
) -> Result<PathBuf, CheckpointError> {
    let path = workspace.run_config_path(run_id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, serde_json::to_string_pretty(config)?)?;
    Ok(path)
}

/// The stored configuration of a run, if one was saved.
pub fn load_run_config(
    workspace: &Workspace,
    run_id: &str,
) -> Result<Option<AppConfig>, CheckpointError> {
    let path = workspace.run_config_path(run_id);
    if !path.exists() {
        return Ok(None);
    }
    read_json(&path).map(Some)
}
