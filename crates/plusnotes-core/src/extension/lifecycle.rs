//! Lifecycle Controller
//!
//! Enable/disable transitions over a registry. Every transition that changes
//! the enabled-set persists it; persistence failures are logged only.

use tracing::{debug, info, warn};

use crate::error::{PlusNotesError, Result};
use crate::extension::registry::{ExtensionRegistry, RegisteredExtension};
use crate::extension::types::{BatchOutcome, Extension};

fn not_found(id: &str) -> PlusNotesError {
    PlusNotesError::ExtensionNotFound { id: id.to_string() }
}

/// Run `initialize` unless the instance is already initialized
async fn initialize_entry(entry: &mut RegisteredExtension) -> Result<()> {
    if entry.descriptor.is_initialized {
        return Ok(());
    }

    let id = entry.descriptor.id.clone();
    let instance = entry
        .instance
        .as_mut()
        .ok_or_else(|| PlusNotesError::NotLoaded { id: id.clone() })?;

    instance
        .initialize()
        .await
        .map_err(|e| PlusNotesError::InitializeFailed {
            id,
            message: format!("{:#}", e),
        })?;

    entry.descriptor.is_initialized = true;
    Ok(())
}

/// Run `shutdown` on an initialized instance; failures are logged
pub(crate) async fn shutdown_entry(entry: &mut RegisteredExtension) {
    if !entry.descriptor.is_initialized {
        return;
    }

    if let Some(instance) = entry.instance.as_mut() {
        if let Err(e) = instance.shutdown().await {
            warn!("Extension {} failed to shut down: {:#}", entry.descriptor.id, e);
        }
    }
    entry.descriptor.is_initialized = false;
}

/// Enable an extension, initializing it first.
///
/// Already enabled is a no-op. A failed `initialize` leaves the extension
/// disabled.
pub async fn enable(registry: &mut ExtensionRegistry, id: &str) -> Result<()> {
    if registry.is_enabled(id) {
        debug!("Extension {} is already enabled", id);
        return Ok(());
    }

    let entry = registry.entry_mut(id).ok_or_else(|| not_found(id))?;
    if let Err(e) = initialize_entry(entry).await {
        warn!("{}", e);
        return Err(e);
    }

    registry.mark_enabled(id);
    registry.persist_enabled();
    info!("Enabled extension {}", id);
    Ok(())
}

/// Disable an extension, shutting it down if it was initialized.
///
/// Not enabled is a no-op. A failing `shutdown` is logged and the extension
/// is disabled anyway.
pub async fn disable(registry: &mut ExtensionRegistry, id: &str) -> Result<()> {
    if !registry.contains(id) {
        return Err(not_found(id));
    }
    if !registry.is_enabled(id) {
        debug!("Extension {} is not enabled", id);
        return Ok(());
    }

    if let Some(entry) = registry.entry_mut(id) {
        shutdown_entry(entry).await;
    }

    registry.mark_disabled(id);
    registry.persist_enabled();
    info!("Disabled extension {}", id);
    Ok(())
}

/// Enable each id in order, continuing past failures
pub async fn enable_many(registry: &mut ExtensionRegistry, ids: &[String]) -> Vec<BatchOutcome> {
    let mut outcomes = Vec::with_capacity(ids.len());
    for id in ids {
        let result = enable(registry, id).await;
        outcomes.push(BatchOutcome {
            id: id.clone(),
            result,
        });
    }
    outcomes
}

/// Disable each id in order, continuing past failures
pub async fn disable_many(registry: &mut ExtensionRegistry, ids: &[String]) -> Vec<BatchOutcome> {
    let mut outcomes = Vec::with_capacity(ids.len());
    for id in ids {
        let result = disable(registry, id).await;
        outcomes.push(BatchOutcome {
            id: id.clone(),
            result,
        });
    }
    outcomes
}

/// Initialize everything in the enabled-set, in enabled order.
///
/// Used at startup after the enabled-set was loaded. Failures are reported
/// per extension; a failed extension stays in the enabled-set with
/// `is_initialized == false` so it is retried on the next start.
pub async fn initialize_enabled(registry: &mut ExtensionRegistry) -> Vec<BatchOutcome> {
    let ids: Vec<String> = registry.enabled_ids().to_vec();
    let mut outcomes = Vec::with_capacity(ids.len());

    for id in ids {
        let result = match registry.entry_mut(&id) {
            Some(entry) => initialize_entry(entry).await,
            None => Err(not_found(&id)),
        };
        if let Err(e) = &result {
            warn!("Startup initialization failed: {}", e);
        }
        outcomes.push(BatchOutcome { id, result });
    }

    outcomes
}

/// Shut down every initialized extension without touching the enabled-set
pub async fn shutdown_all(registry: &mut ExtensionRegistry) {
    let ids: Vec<String> = registry
        .entries()
        .filter(|e| e.descriptor.is_initialized)
        .map(|e| e.descriptor.id.clone())
        .collect();

    for id in ids {
        if let Some(entry) = registry.entry_mut(&id) {
            shutdown_entry(entry).await;
        }
    }
    debug!("All extensions shut down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::testing::{call_log, calls, CallLog, StubExtension};
    use crate::extension::types::{Extension, ExtensionDescriptor, ExtensionMetadata};
    use std::fs;
    use tempfile::TempDir;

    fn create_test_registry() -> (ExtensionRegistry, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let registry = ExtensionRegistry::new(temp_dir.path().join("enabled_extensions.json"));
        (registry, temp_dir)
    }

    fn register_stub(registry: &mut ExtensionRegistry, stub: StubExtension) {
        let metadata = stub.metadata();
        let source = format!("/ext/{}.extension", metadata.id);
        registry
            .register(
                ExtensionDescriptor::from_metadata(metadata, source),
                Some(stub.boxed()),
            )
            .unwrap();
    }

    fn persisted(registry: &ExtensionRegistry) -> Vec<String> {
        let content = fs::read_to_string(registry.enabled_file()).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    fn setup(log: &CallLog) -> (ExtensionRegistry, TempDir) {
        let (mut registry, temp) = create_test_registry();
        register_stub(&mut registry, StubExtension::new("a", log));
        register_stub(&mut registry, StubExtension::new("b", log));
        (registry, temp)
    }

    #[tokio::test]
    async fn test_enable_initializes_and_persists() {
        let log = call_log();
        let (mut registry, _temp) = setup(&log);

        enable(&mut registry, "a").await.unwrap();

        assert!(registry.is_enabled("a"));
        assert!(registry.get("a").unwrap().is_initialized);
        assert_eq!(persisted(&registry), vec!["a"]);
        assert_eq!(calls(&log), vec!["init:a"]);
    }

    #[tokio::test]
    async fn test_enable_twice_is_noop() {
        let log = call_log();
        let (mut registry, _temp) = setup(&log);

        enable(&mut registry, "a").await.unwrap();
        enable(&mut registry, "a").await.unwrap();

        assert_eq!(calls(&log), vec!["init:a"]);
        assert_eq!(registry.enabled_ids(), ["a"]);
    }

    #[tokio::test]
    async fn test_enable_unknown_id() {
        let log = call_log();
        let (mut registry, _temp) = setup(&log);

        let result = enable(&mut registry, "zzz").await;
        assert!(matches!(result, Err(PlusNotesError::ExtensionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_enable_failure_stays_disabled() {
        let log = call_log();
        let (mut registry, _temp) = create_test_registry();
        register_stub(&mut registry, StubExtension::new("x", &log).failing_initialize());

        let result = enable(&mut registry, "x").await;

        assert!(matches!(result, Err(PlusNotesError::InitializeFailed { .. })));
        assert!(!registry.is_enabled("x"));
        assert!(!registry.get("x").unwrap().is_initialized);
        assert!(!registry.enabled_file().exists());
    }

    #[tokio::test]
    async fn test_enable_without_instance() {
        let (mut registry, _temp) = create_test_registry();
        registry
            .register(
                ExtensionDescriptor::from_metadata(ExtensionMetadata::new("m", "M"), "/m/extension.json"),
                None,
            )
            .unwrap();

        let result = enable(&mut registry, "m").await;
        assert!(matches!(result, Err(PlusNotesError::NotLoaded { .. })));
    }

    #[tokio::test]
    async fn test_disable_shuts_down_and_persists() {
        let log = call_log();
        let (mut registry, _temp) = setup(&log);

        enable(&mut registry, "a").await.unwrap();
        enable(&mut registry, "b").await.unwrap();
        disable(&mut registry, "a").await.unwrap();

        assert_eq!(registry.enabled_ids(), ["b"]);
        assert!(!registry.get("a").unwrap().is_initialized);
        assert_eq!(persisted(&registry), vec!["b"]);
        assert_eq!(calls(&log), vec!["init:a", "init:b", "shutdown:a"]);
    }

    #[tokio::test]
    async fn test_disable_not_enabled_is_noop() {
        let log = call_log();
        let (mut registry, _temp) = setup(&log);

        disable(&mut registry, "a").await.unwrap();

        assert!(calls(&log).is_empty());
        assert!(!registry.enabled_file().exists());
    }

    #[tokio::test]
    async fn test_disable_survives_shutdown_failure() {
        let log = call_log();
        let (mut registry, _temp) = create_test_registry();
        register_stub(&mut registry, StubExtension::new("x", &log).failing_shutdown());

        enable(&mut registry, "x").await.unwrap();
        disable(&mut registry, "x").await.unwrap();

        assert!(!registry.is_enabled("x"));
        assert!(!registry.get("x").unwrap().is_initialized);
    }

    #[tokio::test]
    async fn test_batch_continues_past_failures() {
        let log = call_log();
        let (mut registry, _temp) = setup(&log);

        let ids = vec!["a".to_string(), "missing".to_string(), "b".to_string()];
        let outcomes = enable_many(&mut registry, &ids).await;

        let ok: Vec<bool> = outcomes.iter().map(|o| o.is_ok()).collect();
        assert_eq!(ok, vec![true, false, true]);
        assert_eq!(registry.enabled_ids(), ["a", "b"]);

        let outcomes = disable_many(&mut registry, &ids).await;
        assert!(!outcomes[1].is_ok());
        assert!(registry.enabled_ids().is_empty());
    }

    #[tokio::test]
    async fn test_initialize_enabled_keeps_failures_enabled() {
        let log = call_log();
        let (mut registry, _temp) = create_test_registry();
        register_stub(&mut registry, StubExtension::new("ok", &log));
        register_stub(&mut registry, StubExtension::new("bad", &log).failing_initialize());
        fs::write(registry.enabled_file(), r#"["bad", "ok"]"#).unwrap();
        registry.load_enabled();

        let outcomes = initialize_enabled(&mut registry).await;

        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].is_ok());
        assert!(outcomes[1].is_ok());
        assert_eq!(registry.enabled_ids(), ["bad", "ok"]);
        assert!(!registry.get("bad").unwrap().is_initialized);
        assert!(registry.get("ok").unwrap().is_initialized);
        assert_eq!(calls(&log), vec!["init:bad", "init:ok"]);
    }

    #[tokio::test]
    async fn test_shutdown_all_keeps_enabled_set() {
        let log = call_log();
        let (mut registry, _temp) = setup(&log);
        enable(&mut registry, "a").await.unwrap();
        enable(&mut registry, "b").await.unwrap();

        shutdown_all(&mut registry).await;

        assert_eq!(registry.enabled_ids(), ["a", "b"]);
        assert_eq!(persisted(&registry), vec!["a", "b"]);
        assert!(registry.list_available().iter().all(|d| !d.is_initialized));
        assert_eq!(
            calls(&log),
            vec!["init:a", "init:b", "shutdown:a", "shutdown:b"]
        );
    }
}
