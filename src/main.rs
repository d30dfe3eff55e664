use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use feednote::config::Config;
use feednote::feed::Fetcher;
use feednote::notify::{Notifier, TerminalNotifier};
use feednote::storage::{
    ContentFormat, FetchInterval, FolderStructure, FsVault, GlobalConfig, StateStore,
};
use feednote::sync::{Scheduler, Syncer};
use feednote::util::{parse_instant, validate_feed_url};

/// Get the config directory path (~/.config/feednote/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feednote"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feednote",
    version,
    about = "Turn RSS/Atom feed items into markdown notes"
)]
struct Args {
    /// Config file (default: ~/.config/feednote/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory notes are written under (overrides vault_dir)
    #[arg(long, value_name = "DIR", global = true)]
    vault: Option<PathBuf>,

    /// State file (overrides state_file)
    #[arg(long, value_name = "FILE", global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a feed
    Add {
        url: String,
        #[arg(long)]
        name: Option<String>,
        /// Folder for this feed's notes in separate mode
        #[arg(long)]
        folder: Option<String>,
        /// Skip items published before this date (e.g. 2024-01-31)
        #[arg(long, value_name = "DATE")]
        start_date: Option<String>,
    },
    /// Unsubscribe a feed (by id, name or list position)
    Remove { feed: String },
    /// Forget imported links so every item is imported again
    ClearHistory { feed: String },
    /// Edit a feed
    Set {
        feed: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        folder: Option<String>,
        /// Empty string clears the filter
        #[arg(long, value_name = "DATE")]
        start_date: Option<String>,
        /// Empty string clears the override
        #[arg(long, value_name = "TEMPLATE")]
        template_override: Option<String>,
    },
    /// Show or edit global settings
    Settings {
        /// shared or separate
        #[arg(long)]
        folder_structure: Option<FolderStructure>,
        #[arg(long)]
        shared_folder: Option<String>,
        /// html, htmlBlock or htmlCallout
        #[arg(long)]
        content_format: Option<ContentFormat>,
        /// manual, 10min, 30min, hour or a minute count (at least 5)
        #[arg(long)]
        fetch_interval: Option<FetchInterval>,
        #[arg(long, conflicts_with = "template_file")]
        template: Option<String>,
        /// Read the note template from a file
        #[arg(long, value_name = "FILE")]
        template_file: Option<PathBuf>,
        #[arg(long)]
        per_feed_templates: Option<bool>,
    },
    /// List feeds with their sync status
    List,
    /// Fetch all feeds now, or one with --feed
    Fetch {
        #[arg(long)]
        feed: Option<String>,
    },
    /// Fetch and parse a feed without importing anything
    Check {
        /// Feed id, name, list position or a URL
        feed: String,
    },
    /// Fetch on the configured interval; press Enter to fetch now, Ctrl-C to stop
    Watch,
}

struct Paths {
    vault: PathBuf,
    state: PathBuf,
}

fn resolve_paths(args: &Args) -> Result<(Config, Paths)> {
    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let base = config_path.parent().unwrap_or(&config_dir).to_path_buf();

    let paths = Paths {
        vault: args.vault.clone().unwrap_or_else(|| config.vault_dir.clone()),
        state: args.state.clone().unwrap_or_else(|| config.state_path(&base)),
    };
    Ok((config, paths))
}

fn check_start_date(date: &str) -> Result<String> {
    let date = date.trim();
    if !date.is_empty() && parse_instant(date).is_none() {
        anyhow::bail!("Unrecognized start date '{}' (try YYYY-MM-DD)", date);
    }
    Ok(date.to_string())
}

fn print_feeds(state: &GlobalConfig) {
    if state.feeds.is_empty() {
        println!("No feeds configured. Add one with: feednote add <URL>");
        return;
    }
    for (i, feed) in state.feeds.iter().enumerate() {
        let url = if feed.has_url() { feed.url.as_str() } else { "no URL" };
        println!("{}. {} <{}>", i + 1, feed.name, url);
        println!("   id: {}", feed.id);
        println!("   folder: {}", state.target_folder(feed));
        if let Some(start) = feed.start_date() {
            println!("   since: {}", start);
        }
        println!("   {}", feed.status_line());
        if let Some(meta) = state.feed_cache.get(&feed.url) {
            let build = meta.last_build_date.as_deref().unwrap_or("unknown");
            println!(
                "   feed: \"{}\", {} items, last build {}",
                meta.title, meta.item_count, build
            );
        }
    }
}

fn print_settings(state: &GlobalConfig) {
    let mode = match state.folder_structure {
        FolderStructure::Shared => "shared",
        FolderStructure::Separate => "separate",
    };
    let format = match state.content_format {
        ContentFormat::Html => "html",
        ContentFormat::HtmlBlock => "htmlBlock",
        ContentFormat::HtmlCallout => "htmlCallout",
    };
    println!("folder structure:   {}", mode);
    println!("shared folder:      {}", state.shared_folder);
    println!("content format:     {}", format);
    println!("fetch interval:     {}", state.fetch_interval);
    println!("per-feed templates: {}", state.use_per_feed_templates);
    println!("template:\n{}", state.template);
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, notifications to stdout
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let (config, paths) = resolve_paths(&args)?;

    let store = StateStore::new(&paths.state);
    let mut state = store
        .load()
        .with_context(|| format!("Failed to load state from {}", paths.state.display()))?;
    let notifier = TerminalNotifier;

    match args.command {
        Command::Add {
            url,
            name,
            folder,
            start_date,
        } => {
            validate_feed_url(&url).with_context(|| format!("Cannot add '{}'", url))?;
            let start_date = start_date.as_deref().map(check_start_date).transpose()?;
            let feed = state.add_feed(&url, name.as_deref());
            if let Some(folder) = folder {
                feed.folder = folder;
            }
            if let Some(start_date) = start_date {
                feed.start_date = start_date;
            }
            println!("Added {} [{}]", feed.name, feed.id);
            store.save(&state).context("Failed to save state")?;
        }
        Command::Remove { feed } => {
            let id = state.resolve_feed(&feed)?;
            let removed = state.remove_feed(&id)?;
            store.save(&state).context("Failed to save state")?;
            notifier.notify(&format!("{} removed", removed.name));
        }
        Command::ClearHistory { feed } => {
            let id = state.resolve_feed(&feed)?;
            let name = state.clear_history(&id)?.name.clone();
            store.save(&state).context("Failed to save state")?;
            notifier.notify(&format!("History cleared for {}", name));
        }
        Command::Set {
            feed,
            name,
            url,
            folder,
            start_date,
            template_override,
        } => {
            let id = state.resolve_feed(&feed)?;
            if let Some(url) = &url {
                validate_feed_url(url).with_context(|| format!("Cannot use '{}'", url))?;
            }
            let start_date = start_date.as_deref().map(check_start_date).transpose()?;
            let Some(target) = state.feed_mut(&id) else {
                anyhow::bail!("No feed matches '{}'", feed);
            };
            if let Some(name) = name {
                target.name = name;
            }
            if let Some(url) = url {
                target.url = url.trim().to_string();
            }
            if let Some(folder) = folder {
                target.folder = folder;
            }
            if let Some(start_date) = start_date {
                target.start_date = start_date;
            }
            if let Some(template) = template_override {
                target.template_override = template;
            }
            println!("{}: {}", target.name, target.status_line());
            store.save(&state).context("Failed to save state")?;
        }
        Command::Settings {
            folder_structure,
            shared_folder,
            content_format,
            fetch_interval,
            template,
            template_file,
            per_feed_templates,
        } => {
            let template = match template_file {
                Some(path) => Some(read_template(&path)?),
                None => template,
            };
            let mut changed = false;
            if let Some(mode) = folder_structure {
                state.folder_structure = mode;
                changed = true;
            }
            if let Some(folder) = shared_folder {
                state.shared_folder = folder;
                changed = true;
            }
            if let Some(format) = content_format {
                state.content_format = format;
                changed = true;
            }
            if let Some(interval) = fetch_interval {
                state.fetch_interval = interval;
                changed = true;
            }
            if let Some(template) = template {
                state.template = template;
                changed = true;
            }
            if let Some(flag) = per_feed_templates {
                state.use_per_feed_templates = flag;
                changed = true;
            }
            if changed {
                store.save(&state).context("Failed to save state")?;
            }
            print_settings(&state);
        }
        Command::List => print_feeds(&state),
        Command::Fetch { feed } => {
            let target = feed.map(|f| state.resolve_feed(&f)).transpose()?;
            let mut syncer = build_syncer(&config, &paths, store, state, notifier)?;
            match target {
                Some(id) => {
                    if syncer.fetch_feed(&id).await.is_err() {
                        std::process::exit(1);
                    }
                }
                None => {
                    syncer.fetch_all().await;
                }
            }
        }
        Command::Check { feed } => {
            let url = match state.resolve_feed(&feed) {
                Ok(id) => state
                    .feed(&id)
                    .map(|f| f.url.clone())
                    .unwrap_or_default(),
                Err(_) if validate_feed_url(&feed).is_ok() => feed,
                Err(e) => return Err(e.into()),
            };
            let mut syncer = build_syncer(&config, &paths, store, state, notifier)?;
            if syncer.check_health(&url).await.is_err() {
                std::process::exit(1);
            }
        }
        Command::Watch => {
            let period = state.fetch_interval.period();
            if period.is_none() {
                println!("Fetch interval is manual: press Enter to fetch, Ctrl-C to stop.");
            } else {
                println!(
                    "Fetching {}: press Enter to fetch now, Ctrl-C to stop.",
                    state.fetch_interval
                );
            }
            let syncer = build_syncer(&config, &paths, store, state, notifier)?;
            let scheduler = Scheduler::new(syncer);

            let (manual_tx, manual_rx) = mpsc::channel(1);
            tokio::spawn(async move {
                let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
                while let Ok(Some(_)) = lines.next_line().await {
                    // A full channel means a trigger is already pending
                    let _ = manual_tx.try_send(());
                }
            });

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            };
            scheduler.run(period, manual_rx, shutdown).await;
        }
    }

    Ok(())
}

fn read_template(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template file {}", path.display()))
}

fn build_syncer(
    config: &Config,
    paths: &Paths,
    store: StateStore,
    state: GlobalConfig,
    notifier: TerminalNotifier,
) -> Result<Syncer<FsVault, TerminalNotifier>> {
    std::fs::create_dir_all(&paths.vault)
        .with_context(|| format!("Failed to create vault directory {}", paths.vault.display()))?;
    let fetcher = Fetcher::new(&config.user_agent, config.request_timeout())
        .context("Failed to create HTTP client")?;
    Ok(Syncer::new(
        fetcher,
        FsVault::new(&paths.vault),
        notifier,
        store,
        state,
    ))
}
