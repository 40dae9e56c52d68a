//! CLI Tooling

use crate::config::{paths, AdapterConfig, ConfigLoader};
use crate::error::{AdapterError, StorageError};
use crate::events::{
    AggregatedSource, AggregatingEventLogClient, DispatchingEventLogClient, EventLogBatch,
    EventLogClient, LoggingEventLogClient, NotifyEventLogClient,
};
use crate::store::{NodeLink, NodeLinkStore, SledNodeLinkStore};
use crate::types::{ScopeId, VolumeId};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// cloudfs-adapter - local/remote file-system reconciliation adapter
#[derive(Parser)]
#[command(name = "cloudfs-adapter")]
#[command(about = "Inspect and drive the cloud file-system adapter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch a directory through the event pipeline and acknowledge batches
    Watch {
        /// Directory to watch
        path: PathBuf,
        /// Scope the directory is reported under
        #[arg(long, default_value = "1")]
        scope: ScopeId,
        /// Volume the directory is reported under
        #[arg(long, default_value = "0")]
        volume: VolumeId,
        /// Stop after this many seconds (default: until interrupted)
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Inspect the copy link store
    Links {
        #[command(subcommand)]
        command: LinksCommands,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum LinksCommands {
    /// List stored links
    List {
        /// Link store path (default: configured or platform data dir)
        #[arg(long)]
        store: Option<PathBuf>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
}

/// Loaded configuration plus command execution
pub struct CliContext {
    config: AdapterConfig,
}

impl CliContext {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, AdapterError> {
        let config = match &config_path {
            Some(path) => ConfigLoader::load_with_file(path)?,
            None => ConfigLoader::load()?,
        };
        Ok(Self { config })
    }

    pub fn from_config(config: AdapterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, AdapterError> {
        match command {
            Commands::Watch {
                path,
                scope,
                volume,
                duration_secs,
            } => {
                self.watch(
                    path.clone(),
                    *scope,
                    *volume,
                    duration_secs.map(Duration::from_secs),
                )
                .await
            }
            Commands::Links {
                command: LinksCommands::List { store, format },
            } => self.list_links(store.clone(), format),
            Commands::Config {
                command: ConfigCommands::Show,
            } => toml::to_string_pretty(&self.config)
                .map_err(|e| AdapterError::ConfigError(format!("Failed to render config: {}", e))),
        }
    }

    async fn watch(
        &self,
        path: PathBuf,
        scope: ScopeId,
        volume_id: VolumeId,
        duration: Option<Duration>,
    ) -> Result<String, AdapterError> {
        let source = Arc::new(NotifyEventLogClient::new(
            path.clone(),
            self.config.events.ignore_patterns.clone(),
        ));
        let aggregated = Arc::new(AggregatingEventLogClient::new(vec![AggregatedSource {
            scope,
            volume_id,
            client: source,
        }]));
        let dispatching = Arc::new(DispatchingEventLogClient::new(aggregated));
        let pipeline = LoggingEventLogClient::new(dispatching);

        let entries = Arc::new(AtomicU64::new(0));
        let batches = Arc::new(AtomicU64::new(0));
        let (entries_seen, batches_acked) = (entries.clone(), batches.clone());
        let _subscription = pipeline.subscribe(Arc::new(move |batch: EventLogBatch| {
            entries_seen.fetch_add(batch.entries.len() as u64, Ordering::Relaxed);
            if batch.acknowledgment.is_some() {
                batch.acknowledge();
                batches_acked.fetch_add(1, Ordering::Relaxed);
            }
        }));

        pipeline.enable()?;
        info!(path = %path.display(), scope, volume_id, "Watch started");

        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.events.pull_interval_ms.max(1)));
        let deadline = async {
            match duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                _ = tokio::signal::ctrl_c() => break,
                _ = interval.tick() => pipeline.get_events().await?,
            }
        }
        pipeline.get_events().await?;
        pipeline.disable();

        Ok(format!(
            "Observed {} entries in {} acknowledged batches",
            entries.load(Ordering::Relaxed),
            batches.load(Ordering::Relaxed)
        ))
    }

    fn list_links(&self, store: Option<PathBuf>, format: &str) -> Result<String, AdapterError> {
        let path = store
            .or_else(|| self.config.storage.link_store_path.clone())
            .or_else(paths::default_link_store_path)
            .ok_or_else(|| {
                AdapterError::ConfigError("Could not determine link store path".to_string())
            })?;
        let store = SledNodeLinkStore::new(&path)?;
        let links = store.list()?;
        format_links(&links, format)
    }
}

fn format_links(links: &[NodeLink], format: &str) -> Result<String, AdapterError> {
    if format == "json" {
        return serde_json::to_string_pretty(links)
            .map_err(|e| AdapterError::StorageError(StorageError::Serialization(e.to_string())));
    }
    if links.is_empty() {
        return Ok("No links stored.".to_string());
    }
    use comfy_table::Table;
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Type", "Source", "Destination"]);
    for link in links {
        table.add_row(vec![
            format!("{:?}", link.link_type),
            link.source_id.to_string(),
            link.destination_id.to_string(),
        ]);
    }
    Ok(table.to_string())
}
