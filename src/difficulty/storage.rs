//! Persistence for learned model weights

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Opaque blob store for a serialized model
pub trait ModelStorage {
    /// `Ok(None)` when nothing has been saved yet
    fn read(&self) -> io::Result<Option<String>>;
    fn write(&mut self, data: &str) -> io::Result<()>;
}

/// Keeps the model in memory; used by tests and headless runs
#[derive(Debug, Default, Clone)]
pub struct MemoryModelStorage {
    data: Option<String>,
}

impl MemoryModelStorage {
    pub fn with_data(data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }
}

impl ModelStorage for MemoryModelStorage {
    fn read(&self) -> io::Result<Option<String>> {
        Ok(self.data.clone())
    }

    fn write(&mut self, data: &str) -> io::Result<()> {
        self.data = Some(data.to_owned());
        Ok(())
    }
}

/// JSON file on disk
#[derive(Debug, Clone)]
pub struct JsonFileModelStorage {
    path: PathBuf,
}

impl JsonFileModelStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModelStorage for JsonFileModelStorage {
    fn read(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, data: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, data)?;
        log::debug!("Model saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage() {
        let mut s = MemoryModelStorage::default();
        assert_eq!(s.read().unwrap(), None);
        s.write("{}").unwrap();
        assert_eq!(s.read().unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_file_storage_missing_then_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = JsonFileModelStorage::new(dir.path().join("models/difficulty.json"));
        assert_eq!(s.read().unwrap(), None);

        s.write("[1,2,3]").unwrap();
        assert_eq!(s.read().unwrap().as_deref(), Some("[1,2,3]"));
        assert!(s.path().exists());
    }
}
