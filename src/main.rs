use nvk_rag::cli::{Cli, Commands, ConfigAction};
use nvk_rag::config::{expand_path, Config, ConfigValidator};
use nvk_rag::engine::RetrievalEngine;
use nvk_rag::error::{RagError, Result};
use nvk_rag::ingest::{load_from_directory, InboxWatcher};
use nvk_rag::retrieval::SearchQuery;
use nvk_rag::storage::{dir_size, format_size, index_dir};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Ingest {
            text,
            file,
            metadata,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_ingest(config, text, file, metadata).await?;
        }
        Commands::Query {
            query,
            limit,
            dense_only,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_query(config, query, limit, dense_only, json).await?;
        }
        Commands::Load { dir, extensions } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_load(config, dir, extensions).await?;
        }
        Commands::Watch { inbox } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_watch(config, inbox).await?;
        }
        Commands::Stats { json } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_stats(config, json).await?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "nvk_rag=debug" } else { "nvk_rag=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn open_engine(config: Config) -> Result<Arc<RetrievalEngine>> {
    Ok(Arc::new(RetrievalEngine::from_config(config)?))
}

async fn cmd_ingest(
    config: Config,
    text: Option<String>,
    file: Option<PathBuf>,
    metadata: Option<String>,
) -> Result<()> {
    let text = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to read {}", path.display()),
        })?,
        (None, None) => return Err(RagError::Config("Nothing to ingest".to_string())),
    };

    let metadata = match metadata {
        Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| RagError::Json {
            source: e,
            context: "Metadata must be a JSON object".to_string(),
        })?),
        None => None,
    };

    let engine = open_engine(config)?;
    let outcome = engine.ingest(&text, metadata).await?;

    println!("✓ Ingested {}", outcome.id);
    println!("  Slot: {}", outcome.slot);
    if let Some(warning) = outcome.persist_warning {
        println!("  ⚠ Not persisted: {}", warning);
    }

    Ok(())
}

async fn cmd_query(
    config: Config,
    text: String,
    limit: Option<usize>,
    dense_only: bool,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or(config.retrieval.default_limit);
    let hybrid = config.retrieval.hybrid_by_default && !dense_only;

    let engine = open_engine(config)?;
    let mut query = SearchQuery::new(text, limit);
    query.hybrid = hybrid;

    let results = engine.query(&query).await?;

    if json {
        let out = serde_json::to_string_pretty(&results).map_err(|e| RagError::Json {
            source: e,
            context: "Failed to serialize results".to_string(),
        })?;
        println!("{}", out);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:>2}. [{:.4}] ({}) {}",
            rank + 1,
            result.score,
            result.source.as_str(),
            result.id
        );
        println!("    {}", result.preview(120).replace('\n', " "));
    }

    Ok(())
}

async fn cmd_load(config: Config, dir: PathBuf, extensions: Vec<String>) -> Result<()> {
    let engine = open_engine(config)?;
    let extensions = if extensions.is_empty() {
        None
    } else {
        Some(extensions.as_slice())
    };

    let report = load_from_directory(&engine, &dir, extensions).await?;

    println!("✓ Loaded {} documents from {}", report.count, dir.display());
    if !report.errors.is_empty() {
        println!("  {} files failed:", report.errors.len());
        for (path, message) in &report.errors {
            println!("    {}: {}", path.display(), message);
        }
    }

    Ok(())
}

async fn cmd_watch(config: Config, inbox: Option<PathBuf>) -> Result<()> {
    let inbox = match inbox {
        Some(dir) => dir,
        None => expand_path(&config.ingest.inbox_dir)?,
    };
    let interval = config.inbox_poll_interval();

    let engine = open_engine(config)?;
    let watcher = InboxWatcher::new(Arc::clone(&engine), inbox, interval)?;

    println!("✓ Watching {} (Ctrl-C to stop)", watcher.dir().display());

    watcher
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await?;

    engine.shutdown().await?;
    println!("✓ Stopped");
    Ok(())
}

async fn cmd_stats(config: Config, json: bool) -> Result<()> {
    let data_dir = expand_path(&config.storage.data_dir)?;
    let engine = open_engine(config)?;
    let stats = engine.stats().await;

    if json {
        let out = serde_json::to_string_pretty(&stats).map_err(|e| RagError::Json {
            source: e,
            context: "Failed to serialize stats".to_string(),
        })?;
        println!("{}", out);
        return Ok(());
    }

    println!("Index");
    println!("  Documents:        {}", stats.documents);
    println!("  Slots:            {}", stats.slots);
    println!("  Superseded slots: {}", stats.superseded_slots);
    println!("  Vectors:          {}", stats.vectors);
    println!("  HNSW points:      {}", stats.approx_points);
    println!("  Lexical docs:     {}", stats.lexical_documents);
    println!("  Model:            {} ({}d, {})", stats.model, stats.dimension, stats.metric);
    if stats.persistence_enabled {
        println!("  Generation:       {}", stats.generation);
        println!(
            "  On disk:          {}",
            format_size(dir_size(&index_dir(&data_dir)))
        );
    } else {
        println!("  Persistence:      disabled");
    }

    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let value = serde_json::to_value(&config).map_err(|e| RagError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            let shown = match section {
                Some(section) => value.get(&section).cloned().ok_or_else(|| {
                    RagError::Config(format!("Unknown config section: {}", section))
                })?,
                None => value,
            };

            let json = serde_json::to_string_pretty(&shown).map_err(|e| RagError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            ConfigValidator::validate(&config)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            // Create parent directory
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RagError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'nvk-rag config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}
