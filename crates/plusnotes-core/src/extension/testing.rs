//! Shared fixtures for extension tests

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::extension::loader::FactoryLoader;
use crate::extension::types::{DynExtension, Extension, ExtensionMetadata};

/// Ordered record of lifecycle calls, e.g. `["init:a", "shutdown:a"]`
pub(crate) type CallLog = Arc<Mutex<Vec<String>>>;

pub(crate) fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Extension that records its lifecycle calls and can be told to fail
pub(crate) struct StubExtension {
    metadata: ExtensionMetadata,
    log: CallLog,
    fail_initialize: bool,
    fail_shutdown: bool,
}

impl StubExtension {
    pub(crate) fn new(id: &str, log: &CallLog) -> Self {
        Self {
            metadata: ExtensionMetadata::new(id, format!("Stub {}", id)).with_version("1.0.0"),
            log: Arc::clone(log),
            fail_initialize: false,
            fail_shutdown: false,
        }
    }

    pub(crate) fn with_version(mut self, version: &str) -> Self {
        self.metadata.version = Some(version.to_string());
        self
    }

    pub(crate) fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    pub(crate) fn failing_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }

    pub(crate) fn boxed(self) -> DynExtension {
        Box::new(self)
    }
}

#[async_trait]
impl Extension for StubExtension {
    fn metadata(&self) -> ExtensionMetadata {
        self.metadata.clone()
    }

    async fn initialize(&mut self) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("init:{}", self.metadata.id));
        if self.fail_initialize {
            anyhow::bail!("stub {} refused to start", self.metadata.id);
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("shutdown:{}", self.metadata.id));
        if self.fail_shutdown {
            anyhow::bail!("stub {} refused to stop", self.metadata.id);
        }
        Ok(())
    }
}

/// Factory loader understanding `{"factory": "stub", "settings": {...}}`.
///
/// Settings: `id` (required), `version`, `failInitialize`, `panic`.
pub(crate) fn stub_loader(log: &CallLog) -> FactoryLoader {
    let log = Arc::clone(log);
    FactoryLoader::new().with_factory("stub", move |settings| {
        if settings.get("panic").and_then(|v| v.as_bool()) == Some(true) {
            panic!("stub constructor panicked");
        }

        let id = settings
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("settings.id is required"))?;
        let mut stub = StubExtension::new(id, &log);
        if let Some(version) = settings.get("version").and_then(|v| v.as_str()) {
            stub = stub.with_version(version);
        }
        if settings.get("failInitialize").and_then(|v| v.as_bool()) == Some(true) {
            stub = stub.failing_initialize();
        }
        Ok(stub.boxed())
    })
}

/// JSON body of a stub `.extension` file
pub(crate) fn stub_file(id: &str, version: &str) -> String {
    serde_json::json!({
        "factory": "stub",
        "settings": { "id": id, "version": version }
    })
    .to_string()
}

/// Write a stored (uncompressed) zip with the given `(name, content)` entries
pub(crate) fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, content) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}
