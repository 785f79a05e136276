//! Per-stage completion records
//!
//! One JSON file per stage under `output/cache/stages/`. A record is written
//! to a temporary file and renamed into place, so a crash never leaves a
//! partial record that parses as valid.

use crate::error::{UbiqError, UbiqResult};
use crate::stage::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Last successful completion of a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub stage: String,
    pub fingerprint: String,
    pub completed_at: DateTime<Utc>,
    pub artifacts: Vec<PathBuf>,
}

/// Decides which stages must re-run
#[derive(Debug)]
pub struct CacheManager {
    dir: PathBuf,
    records: HashMap<String, CacheRecord>,
    degraded: bool,
}

impl CacheManager {
    /// Load every record under `dir`.
    ///
    /// A malformed record is discarded and switches the manager into
    /// rebuild-everything mode for this run.
    pub async fn open(dir: impl Into<PathBuf>) -> UbiqResult<Self> {
        let dir = dir.into();
        let mut manager = Self {
            dir,
            records: HashMap::new(),
            degraded: false,
        };

        if !manager.dir.exists() {
            return Ok(manager);
        }

        let mut entries = fs::read_dir(&manager.dir)
            .await
            .map_err(|e| UbiqError::io(format!("reading cache {}", manager.dir.display()), e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| UbiqError::io("reading cache entry", e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                manager.load_record(&path).await;
            }
        }

        if manager.degraded {
            warn!("Build cache is corrupt; every stage will be rebuilt");
            manager.records.clear();
        }
        Ok(manager)
    }

    async fn load_record(&mut self, path: &Path) {
        let parsed = match fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str::<CacheRecord>(&content).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match parsed {
            Ok(record) => {
                debug!("Loaded cache record for {}", record.stage);
                self.records.insert(record.stage.clone(), record);
            }
            Err(reason) => {
                warn!("Discarding cache record {}: {}", path.display(), reason);
                self.degraded = true;
                let _ = fs::remove_file(path).await;
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a corrupt record forced a full rebuild
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn record(&self, stage: &str) -> Option<&CacheRecord> {
        self.records.get(stage)
    }

    /// True if an output is missing or the recorded fingerprint differs
    pub fn needs_rebuild(&self, stage: &Stage, fingerprint: &str) -> bool {
        if !stage.missing_outputs().is_empty() {
            return true;
        }
        match self.records.get(&stage.id) {
            Some(record) => record.fingerprint != fingerprint,
            None => true,
        }
    }

    /// Record a successful completion.
    ///
    /// Refuses if any declared output is absent.
    pub async fn commit(&mut self, stage: &Stage, fingerprint: &str) -> UbiqResult<()> {
        if let Some(missing) = stage.missing_outputs().first() {
            return Err(UbiqError::MissingArtifact {
                stage: stage.id.clone(),
                path: missing.path.clone(),
            });
        }

        let record = CacheRecord {
            stage: stage.id.clone(),
            fingerprint: fingerprint.to_string(),
            completed_at: Utc::now(),
            artifacts: stage.outputs.iter().map(|a| a.path.clone()).collect(),
        };

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| UbiqError::io(format!("creating cache {}", self.dir.display()), e))?;

        let path = self.record_path(&stage.id);
        let tmp = self.dir.join(format!(".{}.json.tmp", stage.id));
        let content = serde_json::to_string_pretty(&record)?;
        fs::write(&tmp, content)
            .await
            .map_err(|e| UbiqError::io(format!("writing cache record {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| UbiqError::io(format!("committing cache record {}", path.display()), e))?;

        debug!("Committed cache record for {}", stage.id);
        self.records.insert(stage.id.clone(), record);
        Ok(())
    }

    /// Drop a stage's record so it rebuilds next time
    pub async fn invalidate(&mut self, stage: &str) -> UbiqResult<()> {
        self.records.remove(stage);
        let path = self.record_path(stage);
        if path.exists() {
            fs::remove_file(&path)
                .await
                .map_err(|e| UbiqError::io(format!("removing cache record {}", path.display()), e))?;
        }
        Ok(())
    }

    fn record_path(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("{}.json", stage))
    }
}
