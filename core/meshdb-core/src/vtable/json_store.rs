//! JSON file persistence shared by the virtual tables.

use crate::error::MeshResult;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::PathBuf;

/// A JSON file holding a list of records, guarded by one mutex that is
/// held across the disk I/O.
pub struct JsonFileStore<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load, mutate, persist — all under the file lock. The mutation's
    /// return value is handed back to the caller.
    pub fn with_records<R>(
        &self,
        f: impl FnOnce(&mut Vec<T>) -> MeshResult<(R, bool)>,
    ) -> MeshResult<R> {
        let _guard = self.lock.lock();
        let mut records = self.load_unlocked()?;
        let (out, dirty) = f(&mut records)?;
        if dirty {
            self.save_unlocked(&records)?;
        }
        Ok(out)
    }

    /// Read-only access under the lock.
    pub fn read_records<R>(&self, f: impl FnOnce(&[T]) -> R) -> MeshResult<R> {
        let _guard = self.lock.lock();
        let records = self.load_unlocked()?;
        Ok(f(&records))
    }

    fn load_unlocked(&self) -> MeshResult<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read(&self.path)?;
        if data.is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&data)?)
    }

    /// Write-then-rename so a crash mid-write never corrupts the file.
    fn save_unlocked(&self, records: &[T]) -> MeshResult<()> {
        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&tmp, serde_json::to_vec_pretty(records)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
