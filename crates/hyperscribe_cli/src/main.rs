//! Command-line client for Hyperscribe notes.

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use hyperscribe_core::commands::{dispatch, Command, CommandEffect};
use hyperscribe_core::store::settings_file_name;
use hyperscribe_core::sync::Conflict;
use hyperscribe_core::{
    AppError, Config, JsonFileStore, KeyValueStore, PersistedState, ResolutionStrategy,
    StateStore, SyncEngine, SyncOutcome, SystemClock,
};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hscribe", about = "Hyperscribe notes CLI", version)]
struct Cli {
    /// Data directory (defaults to HYPERSCRIBE_DATA_DIR or ~/.cache/hyperscribe)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Remote sync area file (defaults to HYPERSCRIBE_SYNC_PATH)
    #[arg(long, global = true)]
    sync_path: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Print a note (the active one by default)
    Show { id: Option<String> },
    List,
    /// Create a note from a file, stdin, or a template
    New {
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(long, conflicts_with = "file")]
        template: Option<String>,
        /// Template variable, repeatable
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },
    /// Replace a note's content from a file or stdin
    Edit {
        id: Option<String>,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    Switch { id: String },
    Close { id: String },
    Rename { id: String, title: String },
    Sync,
    Enable,
    Disable,
    /// Sync, then list unresolved conflicts
    Conflicts,
    /// Sync, then settle a conflict
    Resolve {
        #[arg(value_parser = parse_strategy)]
        strategy: ResolutionStrategy,
        /// Conflicting note (the first pending conflict by default)
        note_id: Option<String>,
    },
    /// Write all settings as JSON to a file or stdout
    Export {
        /// File or directory; a directory gets a dated file name
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    Import { file: PathBuf },
    /// Delete all local data
    Clear {
        #[arg(long)]
        yes: bool,
    },
    Usage,
    /// Run a keyboard-shortcut command
    #[command(name = "command")]
    Shortcut {
        #[arg(value_parser = parse_command)]
        name: Command,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
        /// Where `download-note` writes its file
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{}'", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_strategy(raw: &str) -> Result<ResolutionStrategy, String> {
    raw.parse().map_err(|err: AppError| err.to_string())
}

fn parse_command(raw: &str) -> Result<Command, String> {
    raw.parse().map_err(|err: AppError| err.to_string())
}

fn read_content(file: Option<&Path>) -> io::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

fn format_note_list(state: &PersistedState, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(&state.notes)?);
    }
    let rows: Vec<String> = state
        .notes
        .iter()
        .map(|note| {
            let marker = if state.active_note_id.as_deref() == Some(note.id.as_str()) {
                '*'
            } else {
                ' '
            };
            format!("{} {:<36} {}", marker, note.id, note.title)
        })
        .collect();
    Ok(rows.join("\n"))
}

fn format_outcome(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Synced {
            pushed,
            pulled,
            removed,
        } => format!(
            "Synced: {} pushed, {} pulled, {} removed",
            pushed, pulled, removed
        ),
        SyncOutcome::Conflict { conflicts } => format!(
            "{} conflict(s) need resolving; run `hscribe conflicts`",
            conflicts.len()
        ),
        SyncOutcome::Error { message } => format!("Sync failed: {}", message),
        SyncOutcome::Disabled => "Sync is disabled".to_string(),
        SyncOutcome::Rejected => "A sync is already running".to_string(),
        SyncOutcome::Unavailable => "No sync area configured".to_string(),
    }
}

fn format_conflict(conflict: &Conflict) -> String {
    format!(
        "{} [{}]\n  local:  {} ({} bytes, modified {})\n  remote: {} ({} bytes, modified {})",
        conflict.note_id,
        conflict.kind.as_str(),
        conflict.local.title,
        conflict.local.content.len(),
        conflict.local.modified,
        conflict.remote.title,
        conflict.remote.content.len(),
        conflict.remote.modified,
    )
}

/// Open storage areas described by `config` and load the document.
async fn open(config: &Config) -> (StateStore, SyncEngine) {
    let local = Arc::new(JsonFileStore::new(config.local_area_path()));
    let remote = config.sync_path.as_ref().map(|path| {
        Arc::new(JsonFileStore::with_quota(path, config.sync_quota())) as Arc<dyn KeyValueStore>
    });
    let store = StateStore::new(local, Arc::new(SystemClock), config.store_options());
    store.init().await;
    let engine = SyncEngine::new(store.clone(), remote, config.sync_options());
    (store, engine)
}

async fn sync_or_bail(engine: &SyncEngine) -> anyhow::Result<SyncOutcome> {
    let outcome = engine.sync().await;
    if let SyncOutcome::Error { message } = &outcome {
        bail!("Sync failed: {}", message);
    }
    Ok(outcome)
}

async fn run(
    command: Commands,
    json: bool,
    config: &Config,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let (store, engine) = open(config).await;
    let mut edited = true;

    match command {
        Commands::Completions { .. } => unreachable!("completions handled before opening storage"),
        Commands::Show { id } => {
            edited = false;
            let state = store.get_state();
            let note = match id.as_deref() {
                Some(id) => state.note(id),
                None => state.active_note(),
            }
            .context("note not found")?;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(note)?)?;
            } else {
                write!(out, "{}", note.content)?;
            }
        }
        Commands::List => {
            edited = false;
            writeln!(out, "{}", format_note_list(&store.get_state(), json)?)?;
        }
        Commands::New {
            file,
            title,
            template,
            vars,
        } => {
            let note = match template {
                Some(template) => {
                    let vars: BTreeMap<String, String> = vars.into_iter().collect();
                    let note = store.create_note_from_template(&template, &vars)?;
                    match title {
                        Some(title) => store.rename_note(&note.id, &title)?,
                        None => note,
                    }
                }
                None => {
                    let content = read_content(file.as_deref())?;
                    store.create_note(title.as_deref(), content)?
                }
            };
            writeln!(out, "Created: {} ({})", note.title, note.id)?;
        }
        Commands::Edit { id, file } => {
            let content = read_content(file.as_deref())?;
            let note = match id {
                Some(id) => store.update_note_content(&id, content)?,
                None => store.update_active_content(content)?,
            };
            writeln!(out, "Updated: {} ({})", note.title, note.id)?;
        }
        Commands::Switch { id } => {
            store.set_active_note(&id)?;
            writeln!(out, "Active: {}", id)?;
        }
        Commands::Close { id } => {
            let closed = store.close_note(&id)?;
            writeln!(out, "Closed: {} ({})", closed.title, closed.id)?;
        }
        Commands::Rename { id, title } => {
            let note = store.rename_note(&id, &title)?;
            writeln!(out, "Renamed: {} ({})", note.title, note.id)?;
        }
        Commands::Sync => {
            edited = false;
            let outcome = sync_or_bail(&engine).await?;
            writeln!(out, "{}", format_outcome(&outcome))?;
        }
        Commands::Enable => {
            edited = false;
            let outcome = engine.enable().await;
            writeln!(out, "{}", format_outcome(&outcome))?;
            if let SyncOutcome::Error { message } = outcome {
                bail!("Sync failed: {}", message);
            }
        }
        Commands::Disable => {
            edited = false;
            engine.disable().await;
            writeln!(out, "Sync disabled")?;
        }
        Commands::Conflicts => {
            edited = false;
            sync_or_bail(&engine).await?;
            let conflicts = engine.pending_conflicts();
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&conflicts)?)?;
            } else if conflicts.is_empty() {
                writeln!(out, "No conflicts")?;
            } else {
                for conflict in &conflicts {
                    writeln!(out, "{}", format_conflict(conflict))?;
                }
            }
        }
        Commands::Resolve { strategy, note_id } => {
            edited = false;
            sync_or_bail(&engine).await?;
            let resolution = match note_id {
                Some(id) => engine.resolve_conflict(&id, strategy).await?,
                None => engine.resolve_current(strategy).await?,
            };
            writeln!(
                out,
                "Resolved {} with {} ({} remaining)",
                resolution.note_id, resolution.strategy, resolution.remaining
            )?;
            if let Some(created) = resolution.created_note_id {
                writeln!(out, "Remote copy kept as {}", created)?;
            }
        }
        Commands::Export { output } => {
            edited = false;
            let exported = store.export_settings_json()?;
            match output {
                Some(path) => {
                    let path = if path.is_dir() {
                        path.join(settings_file_name(store.now_ms()))
                    } else {
                        path
                    };
                    std::fs::write(&path, exported)
                        .with_context(|| format!("writing {}", path.display()))?;
                    writeln!(out, "Exported to {}", path.display())?;
                }
                None => writeln!(out, "{}", exported)?,
            }
        }
        Commands::Import { file } => {
            edited = false;
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let report = store.import_settings_str(&raw).await;
            if !report.success {
                bail!("Import failed: {}", report.message);
            }
            writeln!(out, "{}", report.message)?;
        }
        Commands::Clear { yes } => {
            edited = false;
            if !yes {
                bail!("refusing to delete all notes without --yes");
            }
            store.clear().await;
            writeln!(out, "Cleared all local data")?;
        }
        Commands::Usage => {
            edited = false;
            let local = store.storage_usage().await?;
            let remote = if engine.is_available() {
                Some(engine.calculate_sync_usage().await?)
            } else {
                None
            };
            if json {
                let payload = serde_json::json!({ "local": local, "sync": remote });
                writeln!(out, "{}", serde_json::to_string_pretty(&payload)?)?;
            } else {
                writeln!(out, "Local: {}", local.formatted)?;
                if let Some(remote) = remote {
                    writeln!(out, "Sync:  {} ({}%)", remote.formatted, remote.percentage)?;
                }
            }
        }
        Commands::Shortcut { name, yes, out_dir } => {
            if name.needs_confirmation(&store.get_state()) && !yes {
                bail!("'{}' needs confirmation; pass --yes", name);
            }
            match dispatch(&store, name)? {
                CommandEffect::Copy(text) => {
                    edited = false;
                    write!(out, "{}", text)?;
                }
                CommandEffect::Download { file_name, content } => {
                    edited = false;
                    let dir = out_dir.unwrap_or_else(|| PathBuf::from("."));
                    let path = dir.join(file_name);
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    writeln!(out, "Saved {}", path.display())?;
                }
                CommandEffect::Cleared(note) => {
                    writeln!(out, "Cleared: {} ({})", note.title, note.id)?;
                }
                CommandEffect::ToggleThemePanel => {
                    edited = false;
                    writeln!(out, "The theme panel has no CLI equivalent")?;
                }
            }
        }
    }

    store.flush().await?;
    if edited && config.auto_sync && engine.is_enabled() && engine.has_unsynced_changes() {
        let outcome = engine.sync().await;
        tracing::info!("Auto-sync: {}", format_outcome(&outcome));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hyperscribe_core=warn,hscribe=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let Cli {
        data_dir,
        sync_path,
        json,
        command,
    } = Cli::parse();

    if let Commands::Completions { shell } = &command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(*shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let mut config = Config::from_env();
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    if sync_path.is_some() {
        config.sync_path = sync_path;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run(command, json, &config, &mut out).await
}
