//! Command-line client for the r2index metadata store.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use r2index_core::config::AppConfig;
use r2index_core::{
    ChecksumAlgorithm, Checksums, FileCreate, FileUpdate, RemoteTuple, SearchQuery,
};
use r2index_metadata::{
    Consistency, FileRepo, MetadataError, SearchRepo, Session, SqliteStore, TagRepo,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "r2indexctl")]
#[command(about = "Manage the r2index file metadata registry")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "R2INDEX_CONFIG",
        default_value = "config/r2index.toml"
    )]
    config: PathBuf,

    /// Bookmark printed by an earlier command; reads observe everything it covers
    #[arg(long, global = true, env = "R2INDEX_BOOKMARK")]
    bookmark: Option<String>,

    /// Serve the first read from the primary (ignored when a bookmark is given)
    #[arg(long, global = true, default_value_t = false)]
    primary: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a file record
    Create(CreateArgs),
    /// Show a record by ID
    Get { id: String },
    /// Show a record by remote path, filename and version
    GetByTuple(TupleArgs),
    /// Change fields of a record
    Update(UpdateArgs),
    /// Delete a record and its tags
    Delete { id: String },
    /// Delete the record with the given remote tuple
    DeleteByTuple(TupleArgs),
    /// Tag management
    Tags {
        #[command(subcommand)]
        command: TagCommands,
    },
    /// Search records
    Search(SearchArgs),
    /// Count records per value of a field
    Group {
        /// One of: category, entity, extension, media_type, deprecated
        field: String,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// List records nested by category and entity
    Index {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Compute size and checksums of a local file
    Checksum { file: PathBuf },
    /// Check a local file against a record's stored size and checksums
    Verify { id: String, file: PathBuf },
    /// Write a copy of the primary database for use as a read replica
    Snapshot { path: PathBuf },
    /// Check connectivity and replica lag
    Status,
}

#[derive(Subcommand, Debug)]
enum TagCommands {
    /// Add tags to a record
    Add {
        id: String,
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Replace all tags of a record
    Set { id: String, tags: Vec<String> },
    /// Remove tags from a record
    Remove {
        id: String,
        #[arg(required = true)]
        tags: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct TupleArgs {
    remote_path: String,
    remote_filename: String,
    remote_version: String,
}

impl TupleArgs {
    fn tuple(&self) -> RemoteTuple {
        RemoteTuple::new(
            self.remote_path.clone(),
            self.remote_filename.clone(),
            self.remote_version.clone(),
        )
    }
}

#[derive(Args, Debug)]
struct CreateArgs {
    #[arg(long)]
    category: String,
    #[arg(long)]
    entity: String,
    #[arg(long)]
    extension: String,
    #[arg(long)]
    media_type: String,
    #[arg(long)]
    remote_path: String,
    #[arg(long)]
    remote_filename: String,
    #[arg(long)]
    remote_version: String,
    /// Display name
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    metadata_path: Option<String>,
    /// Size in bytes
    #[arg(long)]
    size: Option<u64>,
    #[arg(long)]
    md5: Option<String>,
    #[arg(long)]
    sha1: Option<String>,
    #[arg(long)]
    sha256: Option<String>,
    #[arg(long)]
    sha512: Option<String>,
    /// Fill size and checksums from a local copy of the file
    #[arg(long, value_name = "FILE")]
    compute_from: Option<PathBuf>,
    /// Extra attribute; VALUE is read as JSON when it parses, else as a string
    #[arg(long = "extra", value_name = "KEY=VALUE", value_parser = parse_extra)]
    extra: Vec<(String, Value)>,
    /// Tag to attach (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,
}

impl CreateArgs {
    fn into_create(self) -> Result<FileCreate> {
        let computed = match &self.compute_from {
            Some(path) => Some(
                Checksums::compute(path)
                    .with_context(|| format!("failed to checksum {}", path.display()))?,
            ),
            None => None,
        };

        let size = match (self.size, computed.as_ref().map(|c| c.size)) {
            (Some(given), Some(actual)) if given != actual => {
                anyhow::bail!("--size {given} does not match the file ({actual} bytes)")
            }
            (given, actual) => given.or(actual),
        };

        Ok(FileCreate {
            name: self.name,
            category: self.category,
            entity: self.entity,
            extension: self.extension,
            media_type: self.media_type,
            remote_path: self.remote_path,
            remote_filename: self.remote_filename,
            remote_version: self.remote_version,
            metadata_path: self.metadata_path,
            size,
            md5: merge_digest(ChecksumAlgorithm::Md5, self.md5, computed.as_ref())?,
            sha1: merge_digest(ChecksumAlgorithm::Sha1, self.sha1, computed.as_ref())?,
            sha256: merge_digest(ChecksumAlgorithm::Sha256, self.sha256, computed.as_ref())?,
            sha512: merge_digest(ChecksumAlgorithm::Sha512, self.sha512, computed.as_ref())?,
            extra: self.extra.into_iter().collect(),
            tags: self.tags,
        })
    }
}

#[derive(Args, Debug)]
struct UpdateArgs {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    entity: Option<String>,
    #[arg(long)]
    extension: Option<String>,
    #[arg(long)]
    media_type: Option<String>,
    #[arg(long)]
    remote_path: Option<String>,
    #[arg(long)]
    remote_filename: Option<String>,
    #[arg(long)]
    remote_version: Option<String>,
    #[arg(long)]
    metadata_path: Option<String>,
    #[arg(long)]
    size: Option<u64>,
    #[arg(long)]
    md5: Option<String>,
    #[arg(long)]
    sha1: Option<String>,
    #[arg(long)]
    sha256: Option<String>,
    #[arg(long)]
    sha512: Option<String>,
    /// Replace the extra attributes (repeatable KEY=VALUE)
    #[arg(long = "extra", value_name = "KEY=VALUE", value_parser = parse_extra)]
    extra: Vec<(String, Value)>,
    /// Mark the record deprecated or current
    #[arg(long)]
    deprecated: Option<bool>,
    #[arg(long)]
    deprecation_reason: Option<String>,
    /// Replace the tag set (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,
    /// Remove every tag
    #[arg(long, default_value_t = false, conflicts_with = "tags")]
    clear_tags: bool,
}

impl UpdateArgs {
    fn into_update(self) -> (String, FileUpdate) {
        let tags = if self.clear_tags {
            Some(Vec::new())
        } else if self.tags.is_empty() {
            None
        } else {
            Some(self.tags)
        };
        let extra = (!self.extra.is_empty()).then(|| self.extra.into_iter().collect::<Map<_, _>>());

        let update = FileUpdate {
            name: self.name,
            category: self.category,
            entity: self.entity,
            extension: self.extension,
            media_type: self.media_type,
            remote_path: self.remote_path,
            remote_filename: self.remote_filename,
            remote_version: self.remote_version,
            metadata_path: self.metadata_path,
            size: self.size,
            md5: self.md5,
            sha1: self.sha1,
            sha256: self.sha256,
            sha512: self.sha512,
            extra,
            deprecated: self.deprecated,
            deprecation_reason: self.deprecation_reason,
            tags,
        };
        (self.id, update)
    }
}

#[derive(Args, Debug)]
struct FilterArgs {
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    entity: Option<String>,
    #[arg(long)]
    extension: Option<String>,
    #[arg(long)]
    media_type: Option<String>,
    /// "true" or "false"
    #[arg(long)]
    deprecated: Option<String>,
    /// Comma-separated tags; matching records carry all of them
    #[arg(long)]
    tags: Option<String>,
}

impl FilterArgs {
    fn into_query(self) -> SearchQuery {
        SearchQuery {
            category: self.category,
            entity: self.entity,
            extension: self.extension,
            media_type: self.media_type,
            deprecated: self.deprecated,
            tags: self.tags,
            ..SearchQuery::default()
        }
    }
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[command(flatten)]
    filter: FilterArgs,
    /// Page size (default and maximum come from the search config)
    #[arg(long)]
    limit: Option<u32>,
    #[arg(long)]
    offset: Option<u64>,
}

/// Output of every store command.
#[derive(Serialize)]
struct Envelope<T> {
    bookmark: Option<String>,
    result: T,
}

#[derive(Serialize)]
struct VerifyReport {
    id: String,
    file: PathBuf,
    mismatched: Vec<&'static str>,
}

#[derive(Serialize)]
struct StatusReport {
    primary: PathBuf,
    replicas: Vec<r2index_metadata::ReplicaStatus>,
}

fn parse_extra(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("extra attribute key must not be empty".to_string());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Use the given digest, or the computed one; both must agree when present.
fn merge_digest(
    algorithm: ChecksumAlgorithm,
    given: Option<String>,
    computed: Option<&Checksums>,
) -> Result<Option<String>> {
    let actual = computed.map(|c| c.get(algorithm).to_string());
    match (given, actual) {
        (Some(given), Some(actual)) => {
            let normalized = algorithm.normalize_digest(&given)?;
            if normalized != actual {
                anyhow::bail!("--{algorithm} {given} does not match the file ({actual})");
            }
            Ok(Some(actual))
        }
        (given, actual) => Ok(given.or(actual)),
    }
}

/// Attach the error kind so scripts can tell conflicts from outages.
fn store_error(err: MetadataError) -> anyhow::Error {
    anyhow::anyhow!("[{}] {err}", err.kind().as_str())
}

fn emit<T: Serialize>(session: &Session<'_>, result: T) -> Result<()> {
    let envelope = Envelope {
        bookmark: session.bookmark().map(|b| b.to_string()),
        result,
    };
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

fn print_checksums(file: &Path) -> Result<()> {
    let checksums = Checksums::compute(file)
        .with_context(|| format!("failed to checksum {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&checksums)?);
    Ok(())
}

fn init_tracing() {
    // Logs go to stderr; stdout carries JSON only.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load configuration from an optional TOML file overlaid with
/// `R2INDEX_`-prefixed environment variables.
fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if path.exists() {
        tracing::debug!(config_path = %path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!(config_path = %path.display(), "No config file found, using defaults");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("R2INDEX_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

fn consistency(bookmark: Option<&str>, primary: bool) -> Consistency {
    match (bookmark, primary) {
        (Some(token), _) => Consistency::from_token(Some(token)),
        (None, true) => Consistency::Primary,
        (None, false) => Consistency::Unconstrained,
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Checksum { file } = &cli.command {
        return print_checksums(file);
    }

    let config = load_config(&cli.config)?;
    let store = r2index_metadata::from_config(&config.metadata)
        .await
        .context("failed to open metadata store")?;

    let session = store.open_session_with(consistency(cli.bookmark.as_deref(), cli.primary));
    let outcome = execute(&store, &session, &config, cli.command).await;
    store.close().await;
    outcome
}

async fn execute(
    store: &SqliteStore,
    session: &Session<'_>,
    config: &AppConfig,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::Create(args) => {
            let input = args.into_create()?;
            let record = session.create_file(&input).await.map_err(store_error)?;
            emit(session, record)
        }
        Commands::Get { id } => {
            let record = session.get_file(&id).await.map_err(store_error)?;
            emit(session, record)
        }
        Commands::GetByTuple(args) => {
            let record = session
                .get_file_by_tuple(&args.tuple())
                .await
                .map_err(store_error)?;
            emit(session, record)
        }
        Commands::Update(args) => {
            let (id, update) = args.into_update();
            if update.is_empty() {
                tracing::warn!(file_id = %id, "No fields given, only refreshing the update time");
            }
            let record = session.update_file(&id, &update).await.map_err(store_error)?;
            emit(session, record)
        }
        Commands::Delete { id } => {
            session.delete_file(&id).await.map_err(store_error)?;
            emit(session, serde_json::json!({ "deleted": id }))
        }
        Commands::DeleteByTuple(args) => {
            let tuple = args.tuple();
            session.delete_file_by_tuple(&tuple).await.map_err(store_error)?;
            emit(session, serde_json::json!({ "deleted": tuple }))
        }
        Commands::Tags { command } => {
            let tags = match command {
                TagCommands::Add { id, tags } => session.add_tags(&id, &tags).await,
                TagCommands::Set { id, tags } => session.set_tags(&id, &tags).await,
                TagCommands::Remove { id, tags } => session.remove_tags(&id, &tags).await,
            }
            .map_err(store_error)?;
            emit(session, tags)
        }
        Commands::Search(args) => {
            let query = SearchQuery {
                limit: args.limit.map(|l| l.to_string()),
                offset: args.offset.map(|o| o.to_string()),
                ..args.filter.into_query()
            };
            let outcome = session
                .query(&query, &config.search)
                .await
                .map_err(store_error)?;
            emit(session, outcome)
        }
        Commands::Group { field, filter } => {
            let query = SearchQuery {
                group_by: Some(field),
                ..filter.into_query()
            };
            let outcome = session
                .query(&query, &config.search)
                .await
                .map_err(store_error)?;
            emit(session, outcome)
        }
        Commands::Index { filter } => {
            let parsed = filter
                .into_query()
                .parse(&config.search)
                .map_err(|e| store_error(e.into()))?;
            let index = session.index(&parsed.filter).await.map_err(store_error)?;
            emit(session, index)
        }
        Commands::Verify { id, file } => {
            let record = session.get_file(&id).await.map_err(store_error)?;
            let actual = Checksums::compute(&file)
                .with_context(|| format!("failed to checksum {}", file.display()))?;
            let report = VerifyReport {
                mismatched: record.mismatches(&actual),
                id,
                file,
            };
            emit(session, &report)?;
            anyhow::ensure!(
                report.mismatched.is_empty(),
                "{} does not match record {}: {}",
                report.file.display(),
                report.id,
                report.mismatched.join(", ")
            );
            Ok(())
        }
        Commands::Snapshot { path } => {
            store.snapshot_into(&path).await.map_err(store_error)?;
            emit(session, serde_json::json!({ "snapshot": path }))
        }
        Commands::Status => {
            store.health_check().await.map_err(store_error)?;
            let replicas = store.replica_lag().await.map_err(store_error)?;
            emit(
                session,
                StatusReport {
                    primary: config.metadata.path.clone(),
                    replicas,
                },
            )
        }
        Commands::Checksum { file } => print_checksums(&file),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    run(Cli::parse()).await
}
