//! Extension Registry
//!
//! In-memory store of available extensions plus the ordered enabled-set,
//! persisted as `enabled_extensions.json` (a JSON array of ids).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{PlusNotesError, Result};
use crate::extension::types::{DynExtension, ExtensionDescriptor};

/// A descriptor together with its live implementation (if it could be loaded)
pub struct RegisteredExtension {
    pub descriptor: ExtensionDescriptor,
    pub(crate) instance: Option<DynExtension>,
}

impl RegisteredExtension {
    pub fn new(descriptor: ExtensionDescriptor, instance: Option<DynExtension>) -> Self {
        Self {
            descriptor,
            instance,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.instance.is_some()
    }
}

/// Extension Registry - available extensions and the persisted enabled-set
pub struct ExtensionRegistry {
    enabled_file: PathBuf,
    /// Insertion order: built-ins first, then discovery order
    available: Vec<RegisteredExtension>,
    /// Enabled ids in the order they were enabled
    enabled: Vec<String>,
}

impl ExtensionRegistry {
    /// Create an empty registry persisting to `enabled_file`
    pub fn new(enabled_file: PathBuf) -> Self {
        Self {
            enabled_file,
            available: Vec::new(),
            enabled: Vec::new(),
        }
    }

    pub fn enabled_file(&self) -> &Path {
        &self.enabled_file
    }

    // ========== Queries ==========

    /// All available extensions in registration order
    pub fn list_available(&self) -> Vec<&ExtensionDescriptor> {
        self.available.iter().map(|e| &e.descriptor).collect()
    }

    /// Enabled extensions in persisted order
    pub fn list_enabled(&self) -> Vec<&ExtensionDescriptor> {
        self.enabled.iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn enabled_ids(&self) -> &[String] {
        &self.enabled
    }

    pub fn get(&self, id: &str) -> Option<&ExtensionDescriptor> {
        self.entry(id).map(|e| &e.descriptor)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entry(id).is_some()
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.enabled.iter().any(|e| e == id)
    }

    pub fn len(&self) -> usize {
        self.available.len()
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }

    pub(crate) fn entry(&self, id: &str) -> Option<&RegisteredExtension> {
        self.available.iter().find(|e| e.descriptor.id == id)
    }

    pub(crate) fn entry_mut(&mut self, id: &str) -> Option<&mut RegisteredExtension> {
        self.available.iter_mut().find(|e| e.descriptor.id == id)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &RegisteredExtension> {
        self.available.iter()
    }

    // ========== Mutation ==========

    /// Register an extension.
    ///
    /// Re-registering the same id from the same source replaces the entry in
    /// place; the same id from a different source is a `DuplicateId`.
    pub fn register(
        &mut self,
        descriptor: ExtensionDescriptor,
        instance: Option<DynExtension>,
    ) -> Result<()> {
        if let Some(existing) = self.entry_mut(&descriptor.id) {
            if existing.descriptor.source_location != descriptor.source_location {
                return Err(PlusNotesError::DuplicateId {
                    id: descriptor.id,
                    existing: existing.descriptor.source_location.clone(),
                });
            }

            debug!("Replacing registration of {}", descriptor.id);
            *existing = RegisteredExtension::new(descriptor, instance);
            return Ok(());
        }

        debug!(
            "Registered {} from {}",
            descriptor.id, descriptor.source_location
        );
        self.available
            .push(RegisteredExtension::new(descriptor, instance));
        Ok(())
    }

    /// Remove an extension (and its enabled-set membership).
    ///
    /// Built-ins are never removed.
    pub fn remove(&mut self, id: &str) -> Result<RegisteredExtension> {
        let index = self
            .available
            .iter()
            .position(|e| e.descriptor.id == id)
            .ok_or_else(|| PlusNotesError::ExtensionNotFound { id: id.to_string() })?;

        if self.available[index].descriptor.is_built_in {
            return Err(PlusNotesError::BuiltInExtension { id: id.to_string() });
        }

        self.enabled.retain(|e| e != id);
        Ok(self.available.remove(index))
    }

    /// Drop every non-built-in entry for which `keep` returns false
    pub(crate) fn retain_discovered<F>(&mut self, keep: F) -> Vec<RegisteredExtension>
    where
        F: Fn(&ExtensionDescriptor) -> bool,
    {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.available.len());

        for entry in self.available.drain(..) {
            if entry.descriptor.is_built_in || keep(&entry.descriptor) {
                kept.push(entry);
            } else {
                removed.push(entry);
            }
        }

        self.available = kept;
        let available = &self.available;
        self.enabled
            .retain(|id| available.iter().any(|e| &e.descriptor.id == id));

        removed
    }

    pub(crate) fn mark_enabled(&mut self, id: &str) {
        if !self.is_enabled(id) {
            self.enabled.push(id.to_string());
        }
    }

    pub(crate) fn mark_disabled(&mut self, id: &str) {
        self.enabled.retain(|e| e != id);
    }

    // ========== Persistence ==========

    /// Write the enabled-set, propagating failures
    pub fn try_persist_enabled(&self) -> Result<()> {
        if let Some(parent) = self.enabled_file.parent() {
            fs::create_dir_all(parent)?;
        }

        let content =
            serde_json::to_string_pretty(&self.enabled).map_err(|e| PlusNotesError::Json {
                path: self.enabled_file.clone(),
                message: e.to_string(),
            })?;

        fs::write(&self.enabled_file, content)?;
        Ok(())
    }

    /// Write the enabled-set.
    ///
    /// Failures are logged and swallowed: the in-memory state stays
    /// authoritative for this run.
    pub fn persist_enabled(&self) {
        if let Err(e) = self.try_persist_enabled() {
            warn!(
                "Failed to save enabled extensions to {}: {}",
                self.enabled_file.display(),
                e
            );
        }
    }

    /// Replace the enabled-set with the persisted one.
    ///
    /// Ids with no available extension are dropped silently; a missing or
    /// unreadable file means nothing is enabled.
    pub fn load_enabled(&mut self) {
        self.enabled.clear();

        if !self.enabled_file.exists() {
            return;
        }

        let ids: Vec<String> = match fs::read_to_string(&self.enabled_file)
            .map_err(PlusNotesError::from)
            .and_then(|content| {
                serde_json::from_str(&content).map_err(|e| PlusNotesError::Json {
                    path: self.enabled_file.clone(),
                    message: e.to_string(),
                })
            }) {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Ignoring enabled extensions file: {}", e);
                return;
            }
        };

        for id in ids {
            if self.contains(&id) {
                self.mark_enabled(&id);
            } else {
                debug!("Dropping enabled id with no available extension: {}", id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::types::ExtensionMetadata;
    use tempfile::TempDir;

    fn create_test_registry() -> (ExtensionRegistry, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let registry = ExtensionRegistry::new(temp_dir.path().join("enabled_extensions.json"));
        (registry, temp_dir)
    }

    fn descriptor(id: &str, source: &str) -> ExtensionDescriptor {
        ExtensionDescriptor::from_metadata(ExtensionMetadata::new(id, id.to_uppercase()), source)
    }

    #[test]
    fn test_register_and_list_in_order() {
        let (mut registry, _temp) = create_test_registry();

        registry.register(descriptor("b", "/b.so"), None).unwrap();
        registry.register(descriptor("a", "/a.so"), None).unwrap();

        let ids: Vec<_> = registry.list_available().iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_register_same_source_replaces() {
        let (mut registry, _temp) = create_test_registry();

        registry.register(descriptor("a", "/a.so"), None).unwrap();
        let mut updated = descriptor("a", "/a.so");
        updated.version = Some("2.0.0".to_string());
        registry.register(updated, None).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().version.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_register_duplicate_id() {
        let (mut registry, _temp) = create_test_registry();

        registry.register(descriptor("a", "/a.so"), None).unwrap();
        let result = registry.register(descriptor("a", "/other/a.so"), None);

        assert!(matches!(result, Err(PlusNotesError::DuplicateId { .. })));
        assert_eq!(registry.get("a").unwrap().source_location, "/a.so");
    }

    #[test]
    fn test_remove_built_in_refused() {
        let (mut registry, _temp) = create_test_registry();

        registry
            .register(
                ExtensionDescriptor::built_in(ExtensionMetadata::new("core", "Core")),
                None,
            )
            .unwrap();

        assert!(matches!(
            registry.remove("core"),
            Err(PlusNotesError::BuiltInExtension { .. })
        ));
        assert!(registry.contains("core"));
    }

    #[test]
    fn test_remove_drops_enabled() {
        let (mut registry, _temp) = create_test_registry();

        registry.register(descriptor("a", "/a.so"), None).unwrap();
        registry.mark_enabled("a");
        registry.remove("a").unwrap();

        assert!(!registry.is_enabled("a"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_persist_and_load_preserve_order() {
        let (mut registry, _temp) = create_test_registry();

        for id in ["c", "a", "b"] {
            registry
                .register(descriptor(id, &format!("/{}.so", id)), None)
                .unwrap();
        }
        registry.mark_enabled("b");
        registry.mark_enabled("c");
        registry.mark_enabled("a");
        registry.persist_enabled();

        registry.load_enabled();
        assert_eq!(registry.enabled_ids(), ["b", "c", "a"]);

        let names: Vec<_> = registry.list_enabled().iter().map(|d| d.id.clone()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_load_drops_unknown_ids() {
        let (mut registry, _temp) = create_test_registry();

        registry.register(descriptor("a", "/a.so"), None).unwrap();
        fs::write(registry.enabled_file(), r#"["gone", "a", "a"]"#).unwrap();

        registry.load_enabled();
        assert_eq!(registry.enabled_ids(), ["a"]);
    }

    #[test]
    fn test_load_corrupt_file_enables_nothing() {
        let (mut registry, _temp) = create_test_registry();

        registry.register(descriptor("a", "/a.so"), None).unwrap();
        registry.mark_enabled("a");
        fs::write(registry.enabled_file(), "not json").unwrap();

        registry.load_enabled();
        assert!(registry.enabled_ids().is_empty());
    }

    #[test]
    fn test_persist_failure_is_swallowed() {
        let temp = TempDir::new().unwrap();
        // Parent "directory" is a regular file, so the write must fail
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let mut registry = ExtensionRegistry::new(blocker.join("enabled.json"));
        registry.register(descriptor("a", "/a.so"), None).unwrap();
        registry.mark_enabled("a");

        assert!(registry.try_persist_enabled().is_err());
        registry.persist_enabled();
        assert_eq!(registry.enabled_ids(), ["a"]);
    }

    #[test]
    fn test_retain_discovered_keeps_built_ins() {
        let (mut registry, _temp) = create_test_registry();

        registry
            .register(
                ExtensionDescriptor::built_in(ExtensionMetadata::new("core", "Core")),
                None,
            )
            .unwrap();
        registry.register(descriptor("a", "/a.so"), None).unwrap();
        registry.mark_enabled("a");

        let removed = registry.retain_discovered(|_| false);
        assert_eq!(removed.len(), 1);
        assert!(registry.contains("core"));
        assert!(registry.enabled_ids().is_empty());
    }
}
