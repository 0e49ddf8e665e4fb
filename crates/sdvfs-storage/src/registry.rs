//! Provider registry
//!
//! The engine looks providers up by name, or takes the default when it
//! is given none. The default is always the first entry.

use crate::driver::Filesystem;
use crate::provider::{SdVfs, Vfs};
use parking_lot::RwLock;
use sdvfs_common::VfsConfig;
use std::sync::Arc;
use tracing::info;

/// Registered VFS providers, default first
#[derive(Default)]
pub struct VfsRegistry {
    providers: RwLock<Vec<Arc<dyn Vfs>>>,
}

impl VfsRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider.
    ///
    /// A provider already registered under the same name is replaced. The
    /// new provider becomes the default when `make_default` is set or when
    /// the registry was empty; otherwise it is placed right after the
    /// default.
    pub fn register(&self, vfs: Arc<dyn Vfs>, make_default: bool) {
        let mut providers = self.providers.write();
        providers.retain(|p| p.name() != vfs.name());

        let name = vfs.name().to_string();
        let is_default = make_default || providers.is_empty();
        if is_default {
            providers.insert(0, vfs);
        } else {
            providers.insert(1, vfs);
        }
        info!(name, is_default, "registered VFS");
    }

    /// Remove a provider by name.
    ///
    /// Removing the default promotes the next provider.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Vfs>> {
        let mut providers = self.providers.write();
        let idx = providers.iter().position(|p| p.name() == name)?;
        info!(name, "unregistered VFS");
        Some(providers.remove(idx))
    }

    /// Find a provider by name, or the default for `None`
    pub fn find(&self, name: Option<&str>) -> Option<Arc<dyn Vfs>> {
        let providers = self.providers.read();
        match name {
            Some(name) => providers.iter().find(|p| p.name() == name).cloned(),
            None => providers.first().cloned(),
        }
    }

    /// Get the registered names, default first
    pub fn names(&self) -> Vec<String> {
        self.providers
            .read()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn default_name(&self) -> Option<String> {
        self.providers.read().first().map(|p| p.name().to_string())
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }
}

impl std::fmt::Debug for VfsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

/// Create the SD card provider over `filesystem` and make it the default
pub fn install<FS>(
    registry: &VfsRegistry,
    filesystem: &Arc<FS>,
    config: Arc<VfsConfig>,
) -> Arc<SdVfs<FS>>
where
    FS: Filesystem + 'static,
    FS::File: 'static,
{
    let vfs = Arc::new(SdVfs::new(filesystem, config));
    registry.register(Arc::clone(&vfs) as Arc<dyn Vfs>, true);
    vfs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryFilesystem;
    use sdvfs_common::VFS_NAME;

    fn provider(fs: &Arc<MemoryFilesystem>, name: &str) -> Arc<dyn Vfs> {
        Arc::new(SdVfs::new(fs, Arc::new(VfsConfig::new())).with_name(name))
    }

    #[test]
    fn test_first_registration_becomes_default() {
        let fs = Arc::new(MemoryFilesystem::new());
        let registry = VfsRegistry::new();
        assert!(registry.find(None).is_none());

        registry.register(provider(&fs, "a"), false);
        registry.register(provider(&fs, "b"), false);
        assert_eq!(registry.default_name().as_deref(), Some("a"));
        assert_eq!(registry.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_make_default_moves_to_front() {
        let fs = Arc::new(MemoryFilesystem::new());
        let registry = VfsRegistry::new();
        registry.register(provider(&fs, "a"), false);
        registry.register(provider(&fs, "b"), false);
        registry.register(provider(&fs, "c"), true);

        assert_eq!(registry.names(), vec!["c", "a", "b"]);
        assert_eq!(registry.find(None).unwrap().name(), "c");
        assert_eq!(registry.find(Some("a")).unwrap().name(), "a");
        assert!(registry.find(Some("zz")).is_none());
    }

    #[test]
    fn test_reregister_replaces() {
        let fs = Arc::new(MemoryFilesystem::new());
        let registry = VfsRegistry::new();
        registry.register(provider(&fs, "a"), false);
        registry.register(provider(&fs, "b"), false);
        registry.register(provider(&fs, "b"), true);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["b", "a"]);
    }

    #[test]
    fn test_unregister_promotes_next() {
        let fs = Arc::new(MemoryFilesystem::new());
        let registry = VfsRegistry::new();
        registry.register(provider(&fs, "a"), true);
        registry.register(provider(&fs, "b"), false);

        assert!(registry.unregister("a").is_some());
        assert_eq!(registry.default_name().as_deref(), Some("b"));
        assert!(registry.unregister("a").is_none());
        assert!(registry.unregister("b").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_install_registers_default() {
        let fs = Arc::new(MemoryFilesystem::new());
        let registry = VfsRegistry::new();
        registry.register(provider(&fs, "other"), true);

        let vfs = install(&registry, &fs, Arc::new(VfsConfig::new()));
        assert_eq!(vfs.name(), VFS_NAME);
        assert_eq!(registry.default_name().as_deref(), Some(VFS_NAME));
    }
}
