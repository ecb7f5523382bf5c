//! Application data layout
//!
//! ```text
//! <data dir>/PlusNotes/
//! ├── config.toml
//! ├── notes.json
//! ├── update_info.json
//! ├── Templates/
//! │   └── <template id>.json
//! └── Extensions/
//!     ├── enabled_extensions.json
//!     ├── sync_config.json
//!     ├── *.so | *.dylib | *.dll | *.extension
//!     └── Downloaded/
//!         └── <extension id>/
//!             └── extension.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PlusNotesError, Result};

const APP_DIR: &str = "PlusNotes";
const EXTENSIONS_DIR: &str = "Extensions";
const DOWNLOADED_DIR: &str = "Downloaded";
const ENABLED_FILE: &str = "enabled_extensions.json";
const NOTES_FILE: &str = "notes.json";
const TEMPLATES_DIR: &str = "Templates";
const SYNC_CONFIG_FILE: &str = "sync_config.json";
const UPDATE_INFO_FILE: &str = "update_info.json";

/// Resolved locations of everything PlusNotes keeps on disk
#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    /// Use the platform data directory (e.g. ~/.local/share/PlusNotes)
    pub fn new() -> Result<Self> {
        let data = dirs::data_dir().ok_or(PlusNotesError::DataDirNotFound)?;
        Ok(Self {
            root: data.join(APP_DIR),
        })
    }

    /// Use a custom root (for testing or `--data-dir`)
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extensions_dir(&self) -> PathBuf {
        self.root.join(EXTENSIONS_DIR)
    }

    pub fn downloaded_dir(&self) -> PathBuf {
        self.extensions_dir().join(DOWNLOADED_DIR)
    }

    pub fn enabled_file(&self) -> PathBuf {
        self.extensions_dir().join(ENABLED_FILE)
    }

    pub fn notes_file(&self) -> PathBuf {
        self.root.join(NOTES_FILE)
    }

    /// User templates of the built-in templates extension
    pub fn templates_dir(&self) -> PathBuf {
        self.root.join(TEMPLATES_DIR)
    }

    pub fn sync_config_file(&self) -> PathBuf {
        self.extensions_dir().join(SYNC_CONFIG_FILE)
    }

    /// Last application update check
    pub fn update_info_file(&self) -> PathBuf {
        self.root.join(UPDATE_INFO_FILE)
    }

    /// Create the directory skeleton if missing
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(self.downloaded_dir())?;
        Ok(())
    }
}
