//! Persisted thresholds record
//!
//! The only state carried between runs. Shape:
//!
//! ```json
//! {
//!   "default":  { "min_fps_p50": 51.0, "max_frame_ms_p95": 22.0, ... },
//!   "entities": { "arena": { "min_fps_p50": 54.0, ... } },
//!   "meta":     { "generated_at_unix_ms": 0, "method": "...",
//!                 "max_adjust_pct": 0.25, "prune_missing": false }
//! }
//! ```
//!
//! Hand-written thresholds files use the same shape without `meta`. Reads and
//! writes are not locked; callers serialize concurrent invocations.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::thresholds::{ThresholdStore, Thresholds};
use crate::{Error, Result};

/// Provenance of a calibrated record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// When the record was written
    pub generated_at_unix_ms: i64,
    /// Calibration method tag
    pub method: String,
    /// Ratio the record was calibrated with
    pub max_adjust_pct: f64,
    /// Whether missing entities were pruned
    #[serde(alias = "prune_missing_examples")]
    pub prune_missing: bool,
}

/// Default thresholds, per-entity thresholds, and metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// Global default bounds
    #[serde(default)]
    pub default: Thresholds,
    /// Per-entity bounds
    #[serde(default, alias = "examples")]
    pub entities: BTreeMap<String, Thresholds>,
    /// Present on calibrated records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RecordMeta>,
}

impl CalibrationRecord {
    /// Parse a record from JSON text
    pub fn from_json(path: &Path, text: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| Error::malformed(path, e.to_string()))?;
        if !value.is_object() {
            return Err(Error::malformed(path, "expected a JSON object"));
        }
        serde_json::from_value(value).map_err(|e| Error::malformed(path, e.to_string()))
    }

    /// Load a record; a missing file yields an empty record
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No thresholds record yet, starting empty");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let record = Self::from_json(path, &text)?;
        debug!(
            path = %path.display(),
            entities = record.entities.len(),
            "Loaded thresholds record"
        );
        Ok(record)
    }

    /// Load the first candidate path that exists, or an empty record
    pub fn load_first_existing<'a>(candidates: impl IntoIterator<Item = &'a Path>) -> Result<Self> {
        match candidates.into_iter().find(|p| p.exists()) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Atomically replace `path` with this record
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)?;
        info!(path = %path.display(), entities = self.entities.len(), "Wrote thresholds record");
        Ok(())
    }

    /// File layers as a threshold store (no ad-hoc overrides)
    #[must_use]
    pub fn store(&self) -> ThresholdStore {
        ThresholdStore::new(self.default, self.entities.clone())
    }
}

/// Serialize `value` as pretty JSON into a sibling temp file, then rename it
/// over `path`. Parent directories are created as needed.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
