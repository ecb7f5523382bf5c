use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlusNotesError {
    #[error("Invalid extension source '{url}': {reason}")]
    InvalidSource { url: String, reason: String },

    #[error("No extension found in package: {path}")]
    NoCapabilityFound { path: PathBuf },

    #[error("Malformed version: '{version}'")]
    MalformedVersion { version: String },

    #[error("Extension id '{id}' is already registered from {existing}")]
    DuplicateId { id: String, existing: String },

    #[error("Extension not found: {id}")]
    ExtensionNotFound { id: String },

    #[error("Built-in extension cannot be removed: {id}")]
    BuiltInExtension { id: String },

    #[error("Extension '{id}' has no loaded implementation")]
    NotLoaded { id: String },

    #[error("Extension '{id}' failed to initialize: {message}")]
    InitializeFailed { id: String, message: String },

    #[error("Failed to load extension from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("Incompatible extension ABI in {path}: expected {expected}, got {got}")]
    IncompatibleAbi {
        path: PathBuf,
        expected: u32,
        got: u32,
    },

    #[error("Template not found: {id}")]
    TemplateNotFound { id: String },

    #[error("Unsupported package format: {path} (expected .zip or a native library)")]
    UnsupportedPackage { path: PathBuf },

    #[error("No published release or manifest version for {url}")]
    NoRelease { url: String },

    #[error("JSON error in {path}: {message}")]
    Json { path: PathBuf, message: String },

    #[error("Config parse error in {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Unknown config key: {key}")]
    ConfigKeyNotFound { key: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidConfigValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Data directory not found")]
    DataDirNotFound,
}

pub type Result<T> = std::result::Result<T, PlusNotesError>;

impl PlusNotesError {
    /// File, network or archive failure (the "IoFailure" class).
    pub fn is_io_failure(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Http(_) | Self::Archive(_) | Self::Json { .. }
        )
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ExtensionNotFound { .. } | Self::TemplateNotFound { .. } => 2,
            Self::InvalidSource { .. } | Self::UnsupportedPackage { .. } => 3,
            Self::DuplicateId { .. } | Self::BuiltInExtension { .. } => 4,
            Self::NoCapabilityFound { .. } | Self::LoadFailed { .. } => 5,
            Self::InitializeFailed { .. } | Self::NotLoaded { .. } => 6,
            Self::Http(_) | Self::NoRelease { .. } => 7,
            _ => 1,
        }
    }
}
