//! Extension loaders
//!
//! Two kinds of artifacts can be dropped into an extensions folder:
//!
//! - native libraries (`.so`/`.dylib`/`.dll`) exporting the symbols
//!   generated by [`declare_extension!`](crate::declare_extension)
//! - `.extension` files naming a factory compiled into the host:
//!   `{ "factory": "word-count", "settings": { ... } }`

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libloading::{Library, Symbol};
use serde::Deserialize;

use crate::error::{PlusNotesError, Result};
use crate::extension::types::{DynExtension, Extension, ExtensionMetadata};

/// Bumped whenever the `Extension` trait changes shape
pub const ABI_VERSION: u32 = 1;

pub const ABI_VERSION_SYMBOL: &[u8] = b"plusnotes_extension_abi_version\0";
pub const CREATE_SYMBOL: &[u8] = b"plusnotes_extension_create\0";

/// File extension of factory-backed extension files
pub const FACTORY_FILE_EXTENSION: &str = "extension";

type AbiVersionFn = unsafe extern "C" fn() -> u32;
type CreateFn = unsafe extern "C" fn() -> *mut DynExtension;

/// Turns one artifact on disk into a live extension
pub trait ExtensionLoader: Send + Sync {
    /// Whether this loader handles the given file (by extension)
    fn accepts(&self, path: &Path) -> bool;

    fn load(&self, path: &Path) -> Result<DynExtension>;
}

fn has_extension(path: &Path, candidates: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| candidates.iter().any(|c| ext.eq_ignore_ascii_case(c)))
        .unwrap_or(false)
}

/// Check if a file is a native extension library
pub fn is_native_library(path: &Path) -> bool {
    has_extension(path, &["so", "dylib", "dll"])
}

fn load_failed(path: &Path, message: impl ToString) -> PlusNotesError {
    PlusNotesError::LoadFailed {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

// ========== Native libraries ==========

/// Loader for native extension libraries
#[derive(Debug, Default)]
pub struct NativeLoader;

impl NativeLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ExtensionLoader for NativeLoader {
    fn accepts(&self, path: &Path) -> bool {
        is_native_library(path)
    }

    fn load(&self, path: &Path) -> Result<DynExtension> {
        // SAFETY: loading runs the library's initializers. Libraries in the
        // extensions folder are trusted the same way the host binary is.
        let library = unsafe { Library::new(path) }.map_err(|e| load_failed(path, e))?;

        let abi = unsafe {
            let version: Symbol<AbiVersionFn> = library
                .get(ABI_VERSION_SYMBOL)
                .map_err(|e| load_failed(path, e))?;
            version()
        };
        if abi != ABI_VERSION {
            return Err(PlusNotesError::IncompatibleAbi {
                path: path.to_path_buf(),
                expected: ABI_VERSION,
                got: abi,
            });
        }

        let raw = unsafe {
            let create: Symbol<CreateFn> = library
                .get(CREATE_SYMBOL)
                .map_err(|e| load_failed(path, e))?;
            create()
        };
        if raw.is_null() {
            return Err(load_failed(path, "extension constructor returned null"));
        }

        // SAFETY: the pointer comes from `Box::into_raw` in `declare_extension!`
        let inner = unsafe { *Box::from_raw(raw) };

        Ok(Box::new(NativeExtension {
            inner,
            _library: library,
        }))
    }
}

/// Keeps the library mapped for as long as the extension lives.
///
/// Field order matters: `inner` must drop before `_library` unmaps its code.
struct NativeExtension {
    inner: DynExtension,
    _library: Library,
}

#[async_trait]
impl Extension for NativeExtension {
    fn metadata(&self) -> ExtensionMetadata {
        self.inner.metadata()
    }

    async fn initialize(&mut self) -> anyhow::Result<()> {
        self.inner.initialize().await
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.inner.shutdown().await
    }
}

/// Export an extension type from a `cdylib` crate.
///
/// ```rust,ignore
/// plusnotes_core::declare_extension!(WordCount::new());
/// ```
#[macro_export]
macro_rules! declare_extension {
    ($constructor:expr) => {
        #[no_mangle]
        pub extern "C" fn plusnotes_extension_abi_version() -> u32 {
            $crate::extension::loader::ABI_VERSION
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn plusnotes_extension_create() -> *mut $crate::extension::DynExtension {
            let extension: $crate::extension::DynExtension = Box::new($constructor);
            Box::into_raw(Box::new(extension))
        }
    };
}

// ========== Factory-backed files ==========

/// Constructor registered with a [`FactoryLoader`]; receives the file's `settings`
pub type ExtensionFactory =
    Arc<dyn Fn(&serde_json::Value) -> anyhow::Result<DynExtension> + Send + Sync>;

#[derive(Debug, Deserialize)]
struct FactoryFile {
    factory: String,
    #[serde(default)]
    settings: serde_json::Value,
}

/// Loader for `.extension` files backed by in-process factories.
///
/// The catalog is whatever the embedding application registers at build
/// time. An empty catalog still accepts `.extension` files so discovery can
/// report them as skipped instead of silently ignoring them.
#[derive(Default)]
pub struct FactoryLoader {
    factories: HashMap<String, ExtensionFactory>,
}

impl FactoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous one
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> anyhow::Result<DynExtension> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Builder-style [`register`](Self::register)
    pub fn with_factory<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&serde_json::Value) -> anyhow::Result<DynExtension> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ExtensionLoader for FactoryLoader {
    fn accepts(&self, path: &Path) -> bool {
        has_extension(path, &[FACTORY_FILE_EXTENSION])
    }

    fn load(&self, path: &Path) -> Result<DynExtension> {
        let content = fs::read_to_string(path)?;
        let file: FactoryFile =
            serde_json::from_str(&content).map_err(|e| PlusNotesError::Json {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let factory = self.factories.get(&file.factory).ok_or_else(|| {
            let known = match self.names() {
                names if names.is_empty() => "none".to_string(),
                names => names.join(", "),
            };
            load_failed(
                path,
                format!(
                    "unknown factory '{}' (factories in this build: {})",
                    file.factory, known
                ),
            )
        })?;

        factory(&file.settings).map_err(|e| load_failed(path, format!("{:#}", e)))
    }
}
