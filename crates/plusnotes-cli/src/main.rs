use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use plusnotes_core::builtin::{AutoOrganizerExtension, TemplatesExtension, ORGANIZER_ID};
use plusnotes_core::{
    search_notes, AppPaths, AppUpdateStatus, AppUpdater, BatchOutcome, Config,
    ExtensionDescriptor, ExtensionManager, JsonNoteStore, Note, NoteStore, PlusNotesError, Result,
    UpdateCheck,
};

mod args;
use args::{Cli, Commands, ConfigAction, ExtAction, NoteAction, Shell, UpdateAction};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match resolve_paths(cli.data_dir) {
        Ok(paths) => match cli.command {
            Some(Commands::Ext { action }) => handle_ext(action, paths).await,
            Some(Commands::Note { action }) => handle_note(action, paths).await,
            Some(Commands::Update { action }) => handle_update(action, paths).await,
            Some(Commands::Config { action }) => handle_config(action, paths.root()),
            Some(Commands::Completions { shell }) => {
                handle_completions(shell);
                Ok(())
            }
            None => {
                Cli::command().print_help().ok();
                Ok(())
            }
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// `RUST_LOG` wins; otherwise warnings, debug with -v, errors only with -q
fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "plusnotes_core=debug,plusnotes_cli=debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn resolve_paths(cli_dir: Option<PathBuf>) -> Result<AppPaths> {
    if let Some(dir) = cli_dir {
        return Ok(AppPaths::with_root(dir));
    }

    if let Ok(dir) = std::env::var("PLUSNOTES_DATA_DIR") {
        return Ok(AppPaths::with_root(PathBuf::from(dir)));
    }

    AppPaths::new()
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let shell = match shell {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
        Shell::Elvish => clap_complete::Shell::Elvish,
    };
    generate(shell, &mut cmd, "plusnotes", &mut io::stdout());
}

// ========== Config ==========

fn handle_config(action: ConfigAction, base_dir: &Path) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load(base_dir)?;
            match config.get(&key) {
                Some(value) => println!("{}", value),
                None => return Err(PlusNotesError::ConfigKeyNotFound { key }),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load(base_dir)?;
            config.set(&key, &value)?;
            config.save(base_dir)?;
            println!("{} {} = {}", "Set:".green(), key, value);
        }
        ConfigAction::List => {
            let config = Config::load(base_dir)?;
            println!();
            for (key, value) in config.list() {
                println!("{} = {}", key.cyan(), value);
            }
            println!();
        }
        ConfigAction::Path => {
            println!("{}", Config::path(base_dir).display());
        }
        ConfigAction::Init => {
            let path = Config::init(base_dir)?;
            println!("{} {}", "Initialized:".green(), path.display());
        }
    }

    Ok(())
}

// ========== App updates ==========

async fn handle_update(action: UpdateAction, paths: AppPaths) -> Result<()> {
    let config = Config::load(paths.root())?;
    let updater = AppUpdater::new(&paths, &config)?;

    match action {
        UpdateAction::Check { force } => {
            let status = updater.check(force, chrono::Utc::now()).await?;
            print_app_status(&status);
        }
        UpdateAction::Status => match updater.status() {
            Some(status) => print_app_status(&status),
            None => println!(
                "PlusNotes {} (never checked, run 'plusnotes update check')",
                updater.current_version()
            ),
        },
    }

    Ok(())
}

fn print_app_status(status: &AppUpdateStatus) {
    if status.update_available {
        println!(
            "{} {} -> {}",
            "Update available:".green().bold(),
            status.current_version,
            status.latest_version.green()
        );
        if let Some(notes) = &status.release_notes {
            println!();
            for line in notes.lines() {
                println!("  {}", line);
            }
            println!();
        }
    } else {
        println!("PlusNotes {} is up to date", status.current_version);
    }

    let checked = status.last_checked.format("%Y-%m-%d %H:%M UTC");
    if status.cached {
        println!("{}", format!("Last checked {} (saved answer)", checked).dimmed());
    } else {
        println!("{}", format!("Checked {}", checked).dimmed());
    }
}

// ========== Extensions ==========

/// Load config, discover extensions and start the enabled ones
async fn open_manager(paths: AppPaths) -> Result<ExtensionManager> {
    let config = Config::load(paths.root())?;
    let mut manager = ExtensionManager::new(paths, &config)?;

    let report = manager.initialize().await;
    for failure in report.failures() {
        if let Err(e) = &failure.result {
            eprintln!("{} {}: {}", "[WARN]".yellow().bold(), failure.id, e);
        }
    }
    Ok(manager)
}

/// Extensions are shut down again even when the action fails
async fn handle_ext(action: ExtAction, paths: AppPaths) -> Result<()> {
    let mut manager = open_manager(paths).await?;
    let result = run_ext(&mut manager, action).await;
    manager.shutdown().await;
    result
}

async fn run_ext(manager: &mut ExtensionManager, action: ExtAction) -> Result<()> {
    match action {
        ExtAction::List { enabled } => {
            let extensions = if enabled {
                manager.list_enabled()
            } else {
                manager.list_available()
            };

            if extensions.is_empty() {
                println!("No extensions found.");
                return Ok(());
            }

            println!();
            for descriptor in extensions {
                print_extension(descriptor, manager.is_enabled(&descriptor.id));
            }
        }
        ExtAction::Enable { ids } => {
            let outcomes = manager.enable_many(&ids).await;
            report_batch("Enabled:", outcomes)?;
        }
        ExtAction::Disable { ids } => {
            let outcomes = manager.disable_many(&ids).await;
            report_batch("Disabled:", outcomes)?;
        }
        ExtAction::Install { path, enable } => {
            let descriptor = manager.install_file(&path).await?;
            finish_install(manager, descriptor, enable).await?;
        }
        ExtAction::Fetch { url, enable } => {
            println!("Fetching {}...", url.cyan());
            let descriptor = manager.fetch_from_repository(&url).await?;
            finish_install(manager, descriptor, enable).await?;
        }
        ExtAction::Uninstall { id } => {
            manager.uninstall(&id).await?;
            println!("{} {}", "Uninstalled:".green(), id);
        }
        ExtAction::Check { id } => {
            let checks = match id {
                Some(id) => vec![manager.check_update(&id).await?],
                None => manager.check_updates().await,
            };
            print_checks(&checks);
        }
        ExtAction::Update => {
            let checks = manager.apply_updates().await;
            print_checks(&checks);
        }
    }

    Ok(())
}

async fn finish_install(
    manager: &mut ExtensionManager,
    descriptor: ExtensionDescriptor,
    enable: bool,
) -> Result<()> {
    println!(
        "{} {} {}",
        "Installed:".green(),
        descriptor.id.cyan().bold(),
        descriptor.version_or_default()
    );
    if let Some(dir) = &descriptor.install_path {
        println!("  Path: {}", dir.display());
    }

    if enable {
        manager.enable(&descriptor.id).await?;
        println!("{} {}", "Enabled:".green(), descriptor.id);
    }
    Ok(())
}

fn print_extension(descriptor: &ExtensionDescriptor, enabled: bool) {
    let state = if !enabled {
        "disabled".dimmed()
    } else if descriptor.is_initialized {
        "enabled".green()
    } else {
        "failed".red()
    };
    let origin = if descriptor.is_built_in {
        " (built-in)".dimmed().to_string()
    } else {
        String::new()
    };

    println!(
        "  {} {} [{}]{}",
        descriptor.id.cyan().bold(),
        descriptor.version_or_default(),
        state,
        origin
    );
    if descriptor.name != descriptor.id {
        println!("    {}", descriptor.display_name());
    }
    if let Some(description) = &descriptor.description {
        println!("    {}", description.dimmed());
    }
    if let Some(url) = &descriptor.repository_url {
        println!("    Source: {}", url);
    }
    println!();
}

/// Print every outcome; the first failure becomes the command's error
fn report_batch(verb: &str, outcomes: Vec<BatchOutcome>) -> Result<()> {
    let mut first_error = None;
    for outcome in outcomes {
        match outcome.result {
            Ok(()) => println!("{} {}", verb.green(), outcome.id),
            Err(e) => {
                eprintln!("{} {}: {}", "[FAILED]".red().bold(), outcome.id, e);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn print_checks(checks: &[UpdateCheck]) {
    if checks.is_empty() {
        println!("No extensions track a repository.");
        return;
    }

    println!();
    for check in checks {
        let status = if let Some(error) = &check.error {
            format!("{} {}", "error:".red(), error)
        } else if check.updated {
            format!("{} {}", "updated to".green(), check.remote_version)
        } else if check.update_available {
            format!("{} {}", "update available:".yellow(), check.remote_version)
        } else if check.skipped {
            "checked recently".dimmed().to_string()
        } else {
            "up to date".green().to_string()
        };

        println!(
            "  {} {} - {}",
            check.extension_id.cyan(),
            check.current_version,
            status
        );
        if let Some(notes) = &check.release_notes {
            for line in notes.lines().take(5) {
                println!("      {}", line.dimmed());
            }
        }
    }
    println!();
}

// ========== Notes ==========

async fn handle_note(action: NoteAction, paths: AppPaths) -> Result<()> {
    let store = JsonNoteStore::new(paths.notes_file());

    match action {
        NoteAction::List { favorites } => {
            let notes = store.load();
            let shown: Vec<&Note> = notes.iter().filter(|n| !favorites || n.is_favorite).collect();
            print_notes(&shown);
        }
        NoteAction::Search { term } => {
            let notes = store.load();
            print_notes(&search_notes(&notes, &term));
        }
        NoteAction::Templates { category } => {
            let templates = load_templates(&paths)?;
            let list = match &category {
                Some(category) => templates.by_category(category),
                None => templates.all(),
            };

            println!();
            for template in list {
                println!(
                    "  {} {} {}",
                    template.id.cyan().bold(),
                    template.name,
                    format!("[{}]", template.category).dimmed()
                );
                if !template.description.is_empty() {
                    println!("    {}", template.description.dimmed());
                }
            }
            println!();
        }
        NoteAction::Add {
            title,
            content,
            template,
            category,
            tags,
        } => {
            let content = match template {
                Some(id) => {
                    let templates = load_templates(&paths)?;
                    let template = templates
                        .find(&id)
                        .ok_or(PlusNotesError::TemplateNotFound { id })?;
                    if content.is_empty() {
                        template.render()
                    } else {
                        format!("{}\n{}", template.render(), content)
                    }
                }
                None => content,
            };

            let mut manager = open_manager(paths).await?;
            let use_organizer = manager.is_enabled(ORGANIZER_ID);
            manager.shutdown().await;

            let organizer = AutoOrganizerExtension::new();
            let title = title.unwrap_or_else(|| organizer.suggest_title(&content));
            let category = match category {
                Some(category) => category,
                None if use_organizer => organizer.suggest_category(&content).unwrap_or_default(),
                None => String::new(),
            };

            let note = Note::new(title, content)
                .with_category(category)
                .with_tags(tags.into_iter().filter(|t| !t.trim().is_empty()));

            let mut notes = store.load();
            println!(
                "{} {} {}",
                "Added:".green(),
                note.title.cyan().bold(),
                note.id.to_string().dimmed()
            );
            if !note.category.is_empty() {
                println!("  Category: {}", note.category);
            }
            notes.push(note);
            store.save(&notes)?;
        }
    }

    Ok(())
}

fn load_templates(paths: &AppPaths) -> Result<TemplatesExtension> {
    let mut templates = TemplatesExtension::new(paths.templates_dir());
    templates.load_custom()?;
    Ok(templates)
}

fn print_notes(notes: &[&Note]) {
    if notes.is_empty() {
        println!("No notes found.");
        return;
    }

    println!();
    for note in notes {
        let star = if note.is_favorite { "*".yellow().to_string() } else { " ".to_string() };
        println!(
            "{} {} {}",
            star,
            note.title.cyan().bold(),
            note.modified_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
        if !note.category.is_empty() || !note.tags.is_empty() {
            println!("    [{}] {}", note.category, note.tags.join(", "));
        }
    }
    println!();
}
