//! Persisted last-modified side-channel.
//!
//! The registry's own timestamps track lifecycle transitions, not the source
//! file, so the bootstrap scanner keeps the file's modification time in
//! `<id>.internal.lastModified` inside the module's private data area: exactly
//! 8 bytes, big-endian `i64` milliseconds since the Unix epoch.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::registry::{Module, ModuleRegistry};

pub const TIMESTAMP_FILE_SUFFIX: &str = ".internal.lastModified";

pub fn encode(millis: i64) -> [u8; 8] {
    millis.to_be_bytes()
}

/// Anything other than exactly 8 bytes is unknown.
pub fn decode(bytes: &[u8]) -> Option<i64> {
    let bytes: [u8; 8] = bytes.try_into().ok()?;
    Some(i64::from_be_bytes(bytes))
}

pub(crate) struct TimestampStore {
    registry: Arc<dyn ModuleRegistry>,
}

impl TimestampStore {
    pub fn new(registry: Arc<dyn ModuleRegistry>) -> Self {
        Self { registry }
    }

    pub fn path(&self, module: &Module) -> Result<PathBuf> {
        self.registry
            .data_file(module.id, &format!("{}{}", module.id.0, TIMESTAMP_FILE_SUFFIX))
    }

    /// Last persisted modification time. Missing or unreadable reads as `None`.
    pub fn read(&self, module: &Module) -> Option<i64> {
        let path = self.path(module).ok()?;
        let bytes = std::fs::read(path).ok()?;
        decode(&bytes)
    }

    pub fn write(&self, module: &Module, millis: i64) -> Result<()> {
        std::fs::write(self.path(module)?, encode(millis))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::testing::FakeRegistry;
    use crate::registry::ModuleState;

    #[test]
    fn test_encoding_is_big_endian() {
        assert_eq!(encode(1), [0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(decode(&[0, 0, 1, 0x8f, 0x7a, 0x3c, 0x11, 0x20]), Some(0x0000_018f_7a3c_1120));
    }

    #[test]
    fn test_short_or_long_is_unknown() {
        assert_eq!(decode(&[1, 2, 3]), None);
        assert_eq!(decode(&[0; 9]), None);
        assert_eq!(decode(&[]), None);
    }

    #[test]
    fn test_store_read_write() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(FakeRegistry::new(dir.path()));
        let module = registry.preinstall("file:///system/a.pkg", ModuleState::Active);
        let store = TimestampStore::new(registry);

        assert_eq!(store.read(&module), None);
        store.write(&module, 1_717_000_000_123).unwrap();
        assert_eq!(store.read(&module), Some(1_717_000_000_123));

        let path = store.path(&module).unwrap();
        assert!(path.ends_with(format!("{}{}", module.id.0, TIMESTAMP_FILE_SUFFIX)));
        assert_eq!(std::fs::read(&path).unwrap().len(), 8);
    }
}
