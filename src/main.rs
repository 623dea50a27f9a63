//! `azsdk` -- command-line access to the clients in this crate.
//!
//! Endpoints and credentials come from a YAML configuration file; each
//! subcommand builds the one client it needs and prints results to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use azsdk::auth::{CognitiveCredential, SharedKeyCredential, StaticTokenCredential, TokenCredential};
use azsdk::config::{Config, StorageConfig};
use azsdk::language::{AnalyzeAction, AnalyzeActionsOptions, TextAnalyticsClient, TextDocumentInput};
use azsdk::mgmt::ApplicationInsightsManagementClient;
use azsdk::pipeline::ClientOptions;
use azsdk::schema_registry::{SchemaFormat, SchemaRegistryClient};
use azsdk::servicebus::{QueueOptions, ServiceBusAdministrationClient};
use azsdk::storage::changefeed::{ChangeFeedClient, ListChangesOptions};
use azsdk::storage::datalake::{FileSystemClient, GetPathsOptions};
use azsdk::storage::file_share::{DownloadFileOptions, ShareClient, UploadFileOptions};
use azsdk::storage::StorageCredential;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "azsdk", version, about = "Azure REST service clients")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "azsdk.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Azure Files operations
    Share {
        #[command(subcommand)]
        action: ShareCommand,
    },
    /// Schema Registry operations
    Schema {
        #[command(subcommand)]
        action: SchemaCommand,
    },
    /// Service Bus queue management
    Queue {
        #[command(subcommand)]
        action: QueueCommand,
    },
    /// Data Lake file system operations
    Fs {
        #[command(subcommand)]
        action: FsCommand,
    },
    /// Text analytics
    Text {
        #[command(subcommand)]
        action: TextCommand,
    },
    /// Blob change feed
    Changefeed {
        #[command(subcommand)]
        action: ChangefeedCommand,
    },
    /// Application Insights management
    Insights {
        #[command(subcommand)]
        action: InsightsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ShareCommand {
    /// Upload a local file
    Upload {
        #[arg(long)]
        share: String,
        /// Destination path inside the share.
        #[arg(long)]
        path: String,
        /// Local file to upload.
        #[arg(long)]
        file: PathBuf,
    },
    /// Download a file
    Download {
        #[arg(long)]
        share: String,
        #[arg(long)]
        path: String,
        /// Write here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List the valid ranges of a file
    Ranges {
        #[arg(long)]
        share: String,
        #[arg(long)]
        path: String,
    },
}

#[derive(Subcommand, Debug)]
enum SchemaCommand {
    /// Fetch a schema by id
    Get {
        #[arg(long)]
        id: String,
    },
    /// Register an Avro schema from a file
    Register {
        #[arg(long)]
        group: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
    List,
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        max_delivery_count: Option<i32>,
    },
    Delete {
        #[arg(long)]
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum FsCommand {
    /// List paths
    Ls {
        #[arg(long)]
        file_system: String,
        #[arg(long)]
        path: Option<String>,
        #[arg(long, default_value_t = false)]
        recursive: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TextAction {
    Entities,
    Pii,
    KeyPhrases,
    LinkedEntities,
    Sentiment,
    Summary,
}

impl TextAction {
    fn to_action(self) -> AnalyzeAction {
        let options = Default::default();
        match self {
            TextAction::Entities => AnalyzeAction::RecognizeEntities(options),
            TextAction::Pii => AnalyzeAction::RecognizePiiEntities {
                options,
                domain_filter: None,
                categories_filter: Vec::new(),
            },
            TextAction::KeyPhrases => AnalyzeAction::ExtractKeyPhrases(options),
            TextAction::LinkedEntities => AnalyzeAction::RecognizeLinkedEntities(options),
            TextAction::Sentiment => AnalyzeAction::AnalyzeSentiment {
                options,
                show_opinion_mining: None,
            },
            TextAction::Summary => AnalyzeAction::ExtractSummary {
                options,
                max_sentence_count: None,
                order_by: None,
            },
        }
    }
}

#[derive(Subcommand, Debug)]
enum TextCommand {
    /// Run actions over documents and wait for the results
    Analyze {
        /// Document text; repeat for several documents.
        #[arg(long = "text", required = true)]
        texts: Vec<String>,
        #[arg(long = "action", value_enum, default_values_t = [TextAction::Entities])]
        actions: Vec<TextAction>,
        #[arg(long)]
        language: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ChangefeedCommand {
    /// Print change events as JSON lines
    List {
        /// RFC 3339 lower bound.
        #[arg(long)]
        start: Option<String>,
        /// RFC 3339 upper bound.
        #[arg(long)]
        end: Option<String>,
        /// Stop after this many events.
        #[arg(long)]
        max: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum InsightsCommand {
    /// List components in the subscription or a resource group
    Components {
        #[arg(long)]
        resource_group: Option<String>,
    },
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn client_options(config: &Config) -> ClientOptions {
    ClientOptions {
        retry: config.retry.to_options(),
        timeout: Some(std::time::Duration::from_secs(config.retry.timeout_secs)),
        api_version: None,
    }
}

/// Account URL and credential for one storage service (`file`, `blob`, `dfs`).
fn storage_target(storage: &StorageConfig, service: &str) -> anyhow::Result<(String, StorageCredential)> {
    if !storage.connection_string.is_empty() {
        let cs = azsdk::connection_string::StorageConnectionString::parse(&storage.connection_string)?;
        let endpoint = match service {
            "file" => cs.file_endpoint.clone(),
            "dfs" => cs.dfs_endpoint.clone(),
            _ => cs.blob_endpoint.clone(),
        };
        return Ok((endpoint, StorageCredential::from_connection_string(&cs)?));
    }
    if storage.account.is_empty() {
        bail!("storage.account or storage.connection_string must be configured");
    }
    let url = format!(
        "https://{}.{}.{}",
        storage.account, service, storage.endpoint_suffix
    );
    let credential = if !storage.account_key.is_empty() {
        StorageCredential::SharedKey(SharedKeyCredential::new(
            storage.account.clone(),
            &storage.account_key,
        )?)
    } else if !storage.sas_token.is_empty() {
        StorageCredential::Sas(storage.sas_token.clone())
    } else {
        StorageCredential::Anonymous
    };
    Ok((url, credential))
}

fn token(token: &str, section: &str) -> anyhow::Result<Arc<dyn TokenCredential>> {
    if token.is_empty() {
        bail!("{}.token must be configured", section);
    }
    Ok(Arc::new(StaticTokenCredential::new(token)))
}

fn parse_time(value: Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(&v)
                .map(|t| t.with_timezone(&Utc))
                .with_context(|| format!("invalid time '{}'", v))
        })
        .transpose()
}

async fn run_share(config: &Config, action: ShareCommand) -> anyhow::Result<()> {
    let options = client_options(config);
    let (url, credential) = storage_target(&config.storage, "file")?;
    match action {
        ShareCommand::Upload { share, path, file } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let client = ShareClient::new(&url, share, credential, &options)?.get_file_client(&path);
            let size = data.len();
            client
                .upload_file(Bytes::from(data), &UploadFileOptions::default())
                .await?;
            info!("Uploaded {} bytes to {}", size, path);
        }
        ShareCommand::Download { share, path, out } => {
            let client = ShareClient::new(&url, share, credential, &options)?.get_file_client(&path);
            let downloaded = client.download_file(&DownloadFileOptions::default()).await?;
            match out {
                Some(out) => tokio::fs::write(&out, &downloaded.content).await?,
                None => {
                    use tokio::io::AsyncWriteExt;
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&downloaded.content).await?;
                    stdout.flush().await?;
                }
            }
        }
        ShareCommand::Ranges { share, path } => {
            let client = ShareClient::new(&url, share, credential, &options)?.get_file_client(&path);
            let (ranges, _) = client.get_ranges(None, None, None, None).await?;
            for range in ranges {
                println!("{}-{}", range.start, range.end);
            }
        }
    }
    Ok(())
}

async fn run_schema(config: &Config, action: SchemaCommand) -> anyhow::Result<()> {
    let section = &config.schema_registry;
    let client = SchemaRegistryClient::new(
        &section.namespace,
        token(&section.token, "schema_registry")?,
        &client_options(config),
    )?;
    match action {
        SchemaCommand::Get { id } => {
            let schema = client.get_schema(&id).await?;
            println!("{}", schema.definition);
        }
        SchemaCommand::Register { group, name, file } => {
            let definition = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let properties = client
                .register_schema(&group, &name, &definition, &SchemaFormat::Avro)
                .await?;
            println!("{} (version {})", properties.id, properties.version);
        }
    }
    Ok(())
}

async fn run_queue(config: &Config, action: QueueCommand) -> anyhow::Result<()> {
    if config.service_bus.connection_string.is_empty() {
        bail!("service_bus.connection_string must be configured");
    }
    let client = ServiceBusAdministrationClient::from_connection_string(
        &config.service_bus.connection_string,
        &client_options(config),
    )?;
    match action {
        QueueCommand::List => {
            let mut queues = client.list_queues().into_items();
            while let Some(queue) = queues.next().await {
                println!("{}", queue?.name);
            }
        }
        QueueCommand::Create {
            name,
            max_delivery_count,
        } => {
            let options = QueueOptions {
                max_delivery_count,
                ..Default::default()
            };
            let queue = client.create_queue(&name, options).await?;
            println!("{}", queue.name);
        }
        QueueCommand::Delete { name } => client.delete_queue(&name).await?,
    }
    Ok(())
}

async fn run_fs(config: &Config, action: FsCommand) -> anyhow::Result<()> {
    let (url, credential) = storage_target(&config.storage, "dfs")?;
    match action {
        FsCommand::Ls {
            file_system,
            path,
            recursive,
        } => {
            let client = FileSystemClient::new(&url, file_system, credential, &client_options(config))?;
            let mut paths = client
                .get_paths(GetPathsOptions {
                    path,
                    recursive,
                    ..Default::default()
                })
                .into_items();
            while let Some(item) = paths.next().await {
                let item = item?;
                let marker = if item.is_directory { "/" } else { "" };
                println!("{:>12} {}{}", item.content_length, item.name, marker);
            }
        }
    }
    Ok(())
}

async fn run_text(config: &Config, action: TextCommand) -> anyhow::Result<()> {
    let section = &config.language;
    if section.endpoint.is_empty() || section.key.is_empty() {
        bail!("language.endpoint and language.key must be configured");
    }
    let client = TextAnalyticsClient::new(
        &section.endpoint,
        CognitiveCredential::Key(section.key.clone()),
        &client_options(config),
    )?;
    match action {
        TextCommand::Analyze {
            texts,
            actions,
            language,
        } => {
            let documents = TextDocumentInput::from_strings(texts.as_slice(), language.as_deref());
            let actions: Vec<AnalyzeAction> = actions.into_iter().map(TextAction::to_action).collect();
            let poller = client
                .begin_analyze_actions(documents, &actions, AnalyzeActionsOptions::default())
                .await?;
            let results = poller.result().await?;
            for (document, per_action) in texts.iter().zip(results) {
                println!("{}", document);
                for result in per_action {
                    println!("  {:?}", result);
                }
            }
        }
    }
    Ok(())
}

async fn run_changefeed(config: &Config, action: ChangefeedCommand) -> anyhow::Result<()> {
    let (url, credential) = storage_target(&config.storage, "blob")?;
    let client = ChangeFeedClient::new(&url, credential, &client_options(config))?;
    match action {
        ChangefeedCommand::List { start, end, max } => {
            let options = ListChangesOptions {
                start_time: parse_time(start)?,
                end_time: parse_time(end)?,
                ..Default::default()
            };
            let mut events = client.list_changes(options)?.into_items();
            let mut printed = 0usize;
            while let Some(event) = events.next().await {
                if max.is_some_and(|m| printed >= m) {
                    break;
                }
                println!("{}", serde_json::to_string(&event?)?);
                printed += 1;
            }
        }
    }
    Ok(())
}

async fn run_insights(config: &Config, action: InsightsCommand) -> anyhow::Result<()> {
    let section = &config.management;
    let client = ApplicationInsightsManagementClient::with_endpoint(
        token(&section.token, "management")?,
        section.subscription_id.clone(),
        &section.endpoint,
        &client_options(config),
    )?;
    match action {
        InsightsCommand::Components { resource_group } => {
            let pager = match resource_group {
                Some(rg) => client.components().list_by_resource_group(&rg),
                None => client.components().list(),
            };
            let mut components = pager.into_items();
            while let Some(component) = components.next().await {
                let component = component?;
                println!(
                    "{} {} {}",
                    component.name.unwrap_or_default(),
                    component.location,
                    component.kind
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        azsdk::config::load_config(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?
    } else {
        Config::default()
    };
    init_tracing(&config);
    azsdk::metrics::describe_metrics();
    info!("Using configuration from {}", cli.config.display());

    match cli.command {
        Command::Share { action } => run_share(&config, action).await,
        Command::Schema { action } => run_schema(&config, action).await,
        Command::Queue { action } => run_queue(&config, action).await,
        Command::Fs { action } => run_fs(&config, action).await,
        Command::Text { action } => run_text(&config, action).await,
        Command::Changefeed { action } => run_changefeed(&config, action).await,
        Command::Insights { action } => run_insights(&config, action).await,
    }
}
