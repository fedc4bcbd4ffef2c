//! Result store: one JSON file per trial, keyed by [`TrialKey::id`].
//!
//! Results are written once. A write goes to a temporary file which is then
//! hard-linked into place, so readers never see a partial result and an
//! existing entry is never overwritten.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::trial::{TrialKey, TrialResult, SCHEMA_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("corrupt result {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("result for {key} already exists")]
    Collision { key: String },

    #[error("result {path} has schema version {found}, newer than supported {supported}")]
    SchemaVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    /// Open a store rooted at `dir`, creating it if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn contains(&self, key: &TrialKey) -> bool {
        self.path(key).exists()
    }

    pub fn get(&self, key: &TrialKey) -> Result<Option<TrialResult>, StoreError> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        read_result(&path).map(Some)
    }

    /// Persist a result. Fails with [`StoreError::Collision`] if the key exists.
    pub fn put(&self, result: &TrialResult) -> Result<(), StoreError> {
        let id = result.key.id();
        let path = self.path(&result.key);
        let tmp = self.dir.join(format!("{id}.json.tmp"));

        let json = serde_json::to_string_pretty(result).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&tmp, json).map_err(io_err(&tmp))?;

        let linked = fs::hard_link(&tmp, &path);
        let _ = fs::remove_file(&tmp);
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::Collision { key: id })
            }
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Every stored result, ordered by key id.
    pub fn load_all(&self) -> Result<Vec<TrialResult>, StoreError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err(&self.dir))? {
            let path = entry.map_err(io_err(&self.dir))?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();
        paths.iter().map(|p| read_result(p)).collect()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.load_all()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    fn path(&self, key: &TrialKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.id()))
    }
}

fn read_result(path: &Path) -> Result<TrialResult, StoreError> {
    let json = fs::read_to_string(path).map_err(io_err(path))?;
    let result: TrialResult = serde_json::from_str(&json).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if result.schema_version > SCHEMA_VERSION {
        return Err(StoreError::SchemaVersion {
            path: path.to_path_buf(),
            found: result.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(result)
}
