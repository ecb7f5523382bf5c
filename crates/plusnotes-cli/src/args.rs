use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "plusnotes")]
#[command(about = "Notes with pluggable extensions")]
#[command(version)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Data directory (default: platform data dir + /PlusNotes)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage extensions
    #[command(alias = "extension")]
    Ext {
        #[command(subcommand)]
        action: ExtAction,
    },

    /// Work with notes
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },

    /// Check for a newer PlusNotes release
    Update {
        #[command(subcommand)]
        action: UpdateAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ExtAction {
    /// List available extensions
    #[command(alias = "ls")]
    List {
        /// Only show enabled extensions
        #[arg(short, long)]
        enabled: bool,
    },

    /// Enable one or more extensions
    Enable {
        /// Extension ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Disable one or more extensions
    Disable {
        /// Extension ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Install a local .zip package or native library
    Install {
        /// Path to the package
        path: PathBuf,

        /// Enable the extension after installing
        #[arg(short, long)]
        enable: bool,
    },

    /// Install from a repository URL (e.g., https://github.com/owner/repo)
    Fetch {
        /// Repository URL
        url: String,

        /// Enable the extension after installing
        #[arg(short, long)]
        enable: bool,
    },

    /// Remove an installed extension
    #[command(alias = "rm")]
    Uninstall {
        /// Extension id
        id: String,
    },

    /// Check installed extensions for newer versions
    Check {
        /// Only check this extension
        id: Option<String>,
    },

    /// Install every available update
    Update,
}

#[derive(Subcommand)]
pub enum NoteAction {
    /// List notes
    #[command(alias = "ls")]
    List {
        /// Only favorites
        #[arg(short, long)]
        favorites: bool,
    },

    /// Search title, content, tags and category
    Search {
        /// Search term
        term: String,
    },

    /// Add a note
    Add {
        /// Note title (suggested from the content if omitted)
        #[arg(short, long)]
        title: Option<String>,

        /// Note content
        #[arg(short, long, default_value = "")]
        content: String,

        /// Start from a template
        #[arg(long)]
        template: Option<String>,

        /// Category (suggested by the auto-organizer if omitted)
        #[arg(long)]
        category: Option<String>,

        /// Tags (comma separated)
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// List note templates
    Templates {
        /// Filter by category
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum UpdateAction {
    /// Ask the release feed (answers younger than 4h are reused)
    Check {
        /// Ignore the saved answer
        #[arg(short, long)]
        force: bool,
    },

    /// Show the result of the last check without a request
    Status,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Create config.toml with defaults
    Init,

    /// Get a config value
    Get {
        /// Config key (e.g., network.host)
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key (e.g., updates.check_interval_hours)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all config values
    List,

    /// Show config file path
    Path,
}
