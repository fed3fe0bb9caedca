// src/output/mod.rs
// =============================================================================
// Persisting crawl results.
//
// Each target's records are written once, after its crawl finishes, as one
// pretty-printed JSON array in `<dir>/<name>_out.json`. Field order inside a
// record is the declaration order; absent values are written as null.
// =============================================================================

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use crate::extract::Record;

/// Output directory used when none is given.
pub const DEFAULT_OUTPUT_DIR: &str = "data_output";

const OUTPUT_SUFFIX: &str = "_out.json";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize records for '{target}': {source}")]
    Serialize {
        target: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Somewhere finished record lists can go.
pub trait RecordSink {
    /// Stores all records of one target. Returns where they went.
    fn write(&self, target: &str, records: &[Record]) -> Result<PathBuf, SinkError>;
}

/// Writes one JSON file per target into a directory.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, target: &str) -> PathBuf {
        self.dir.join(format!("{}{}", target, OUTPUT_SUFFIX))
    }

    /// Removes earlier output files of the given targets. Returns how many
    /// were deleted.
    pub fn clean<'a>(&self, targets: impl IntoIterator<Item = &'a str>) -> Result<usize, SinkError> {
        let mut removed = 0;
        for target in targets {
            let path = self.path_for(target);
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Removed stale output {}", path.display());
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(SinkError::Io { path, source }),
            }
        }
        Ok(removed)
    }
}

impl RecordSink for JsonFileSink {
    fn write(&self, target: &str, records: &[Record]) -> Result<PathBuf, SinkError> {
        fs::create_dir_all(&self.dir).map_err(|source| SinkError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let json = serde_json::to_string_pretty(records).map_err(|source| SinkError::Serialize {
            target: target.to_string(),
            source,
        })?;

        // Written next to the destination, then renamed over it, so a
        // reader never sees half a file.
        let path = self.path_for(target);
        let partial = path.with_extension("json.partial");
        fs::write(&partial, json).map_err(|source| SinkError::Io {
            path: partial.clone(),
            source,
        })?;
        fs::rename(&partial, &path).map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;

        info!("Wrote {} records to {}", records.len(), path.display());
        Ok(path)
    }
}
