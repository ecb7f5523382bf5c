//! Extension type definitions
//!
//! The `Extension` trait is the whole contract an extension implements;
//! `ExtensionDescriptor` is what the manager tracks about it and doubles as
//! the `extension.json` manifest format.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Self-reported extension metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

impl ExtensionMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            version: None,
            author: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// A pluggable unit of functionality.
///
/// `initialize` runs when the extension is enabled, `shutdown` when it is
/// disabled or the application exits. Errors are reported back to the
/// manager and never abort it.
#[async_trait]
pub trait Extension: Send + Sync {
    fn metadata(&self) -> ExtensionMetadata;

    async fn initialize(&mut self) -> anyhow::Result<()>;

    async fn shutdown(&mut self) -> anyhow::Result<()>;
}

/// Owned, type-erased extension instance
pub type DynExtension = Box<dyn Extension>;

/// Tracked state of one extension (also the `extension.json` shape)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    /// Artifact path, or `builtin:<id>` for built-ins
    #[serde(default)]
    pub source_location: String,
    /// Directory owning the artifact's files
    #[serde(default)]
    pub install_path: Option<PathBuf>,
    #[serde(default)]
    pub is_built_in: bool,
    /// Runtime only
    #[serde(skip)]
    pub is_initialized: bool,
    #[serde(default)]
    pub repository_url: Option<String>,
    #[serde(default)]
    pub last_updated: DateTime<Utc>,
    /// `sha256:<hex>` of the package this was installed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_sha256: Option<String>,
}

impl ExtensionDescriptor {
    /// Build a descriptor from an extension's own metadata
    pub fn from_metadata(metadata: ExtensionMetadata, source_location: impl Into<String>) -> Self {
        Self {
            id: metadata.id,
            name: metadata.name,
            description: metadata.description,
            version: metadata.version,
            author: metadata.author,
            source_location: source_location.into(),
            install_path: None,
            is_built_in: false,
            is_initialized: false,
            repository_url: None,
            last_updated: Utc::now(),
            package_sha256: None,
        }
    }

    /// Descriptor for an extension compiled into the application
    pub fn built_in(metadata: ExtensionMetadata) -> Self {
        let source = format!("builtin:{}", metadata.id);
        Self {
            is_built_in: true,
            ..Self::from_metadata(metadata, source)
        }
    }

    /// Installed version, or "0.0.0" when the extension declares none
    pub fn version_or_default(&self) -> &str {
        self.version.as_deref().unwrap_or("0.0.0")
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Outcome of one remote version check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheck {
    pub extension_id: String,
    pub current_version: String,
    pub remote_version: String,
    pub update_available: bool,
    /// Set once `apply_updates` has installed the newer version
    pub updated: bool,
    /// Checked too recently; no network request was made
    pub skipped: bool,
    pub release_notes: Option<String>,
    pub error: Option<String>,
}

impl UpdateCheck {
    pub fn new(descriptor: &ExtensionDescriptor) -> Self {
        let current = descriptor.version_or_default().to_string();
        Self {
            extension_id: descriptor.id.clone(),
            remote_version: current.clone(),
            current_version: current,
            ..Self::default()
        }
    }
}

/// Per-item result of a batch operation
#[derive(Debug)]
pub struct BatchOutcome {
    pub id: String,
    pub result: crate::error::Result<()>,
}

impl BatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}
