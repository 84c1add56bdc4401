//! On-disk persistence for run records and training checkpoints
//!
//! Each completed (or aborted) run is written as one JSON file named by
//! pipeline identity plus a monotonic sequence number; `latest` feeds the
//! replay mode. Checkpoints are opaque JSON blobs written wherever the
//! caller points `train` at.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::CadreError;
use crate::executor::PipelineRun;

/// Default state directory, relative to the working directory
pub const DEFAULT_STATE_DIR: &str = ".cadre/runs";

/// File-per-run store keyed by pipeline name + sequence number
#[derive(Debug, Clone)]
pub struct RunStore {
    dir: PathBuf,
}

impl RunStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a run, assigning it the next sequence number for its pipeline
    pub fn save(&self, run: &mut PipelineRun) -> Result<u64, CadreError> {
        fs::create_dir_all(&self.dir)?;
        let sequence = self.next_sequence(&run.pipeline)?;
        run.sequence = sequence;

        let path = self.record_path(&run.pipeline, sequence);
        let json = serde_json::to_string_pretty(run).map_err(|e| {
            CadreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        fs::write(&path, json)?;
        debug!(path = %path.display(), "run record saved");
        Ok(sequence)
    }

    /// The most recent run record for a pipeline, if any
    pub fn latest(&self, pipeline: &str) -> Result<Option<PipelineRun>, CadreError> {
        let Some(sequence) = self.max_sequence(pipeline)? else {
            return Ok(None);
        };
        let path = self.record_path(pipeline, sequence);
        let json = fs::read_to_string(&path)?;
        let run: PipelineRun = serde_json::from_str(&json).map_err(|e| {
            CadreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        Ok(Some(run))
    }

    fn record_path(&self, pipeline: &str, sequence: u64) -> PathBuf {
        self.dir
            .join(format!("{}-{sequence:06}.run.json", file_key(pipeline)))
    }

    fn next_sequence(&self, pipeline: &str) -> Result<u64, CadreError> {
        Ok(self.max_sequence(pipeline)?.map_or(1, |s| s + 1))
    }

    fn max_sequence(&self, pipeline: &str) -> Result<Option<u64>, CadreError> {
        if !self.dir.exists() {
            return Ok(None);
        }
        let prefix = format!("{}-", file_key(pipeline));
        let mut max = None;
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            let Some(digits) = rest.strip_suffix(".run.json") else {
                continue;
            };
            if let Ok(sequence) = digits.parse::<u64>() {
                max = Some(max.map_or(sequence, |m: u64| m.max(sequence)));
            }
        }
        Ok(max)
    }
}

/// Reduce a pipeline name to a safe file-name key
fn file_key(pipeline: &str) -> String {
    pipeline
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Write an opaque checkpoint blob; errors here surface before any worker
/// is invoked when called as `train`'s writability probe
pub fn write_checkpoint<T: Serialize>(path: &Path, state: &T) -> Result<(), CadreError> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| CadreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    fs::write(path, json)?;
    Ok(())
}

/// Read a checkpoint blob back
pub fn read_checkpoint<T: DeserializeOwned>(path: &Path) -> Result<T, CadreError> {
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json)
        .map_err(|e| CadreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}
