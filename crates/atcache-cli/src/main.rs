mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "atcache",
    about = "Build the Airtable client image and work with Airtable records"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the generated Dockerfile
    Dockerfile,
    /// Write the generated Dockerfile to the project for manual editing
    Eject,
    /// Check configuration, dependency manifest, and package script
    Check,
    /// Build the image with docker
    Build {
        /// Override the image tag from atcache.toml
        #[arg(long, short = 't')]
        tag: Option<String>,
    },
    /// Read and write Airtable records
    Records {
        #[command(subcommand)]
        action: RecordsAction,
    },
    /// Manage Airtable webhooks
    Webhooks {
        #[command(subcommand)]
        action: WebhooksAction,
    },
}

#[derive(Subcommand)]
enum RecordsAction {
    /// Print every record of a table as JSON
    List {
        table: String,
        #[command(flatten)]
        target: Target,
        /// Only records visible in this view
        #[arg(long)]
        view: Option<String>,
        /// Read through the cache proxy (needs AIRTABLE_CACHE_TOKEN)
        #[arg(long)]
        cache: bool,
        #[command(flatten)]
        format: Format,
    },
    /// Create records from a JSON array
    Create {
        table: String,
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        input: Input,
        #[command(flatten)]
        format: Format,
    },
    /// Update records (PATCH) from a JSON array
    Update {
        table: String,
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        input: Input,
        #[command(flatten)]
        format: Format,
        /// Send null cells, clearing those values in Airtable
        #[arg(long)]
        keep_null: bool,
    },
    /// Attach record ids to rows by matching key columns against a table
    Match {
        table: String,
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        input: Input,
        /// Column to match on (repeatable)
        #[arg(long = "key", short = 'k', required = true)]
        keys: Vec<String>,
        /// Only match against records visible in this view
        #[arg(long)]
        view: Option<String>,
    },
    /// Permanently delete records by id
    Delete {
        table: String,
        /// Record ids
        #[arg(required = true)]
        ids: Vec<String>,
        #[command(flatten)]
        target: Target,
        /// Confirm the deletion
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum WebhooksAction {
    /// List webhooks registered for a base
    List {
        #[command(flatten)]
        target: Target,
    },
    /// Register a webhook
    Create {
        /// Specification JSON file ('-' for stdin)
        #[arg(long)]
        spec: PathBuf,
        /// URL that receives notification pings
        #[arg(long)]
        notification_url: Option<String>,
        #[command(flatten)]
        target: Target,
    },
    /// Delete a webhook
    Delete {
        id: String,
        #[command(flatten)]
        target: Target,
    },
    /// Extend a webhook's life by seven days
    Refresh {
        id: String,
        #[command(flatten)]
        target: Target,
    },
    /// List change payloads
    Payloads {
        id: String,
        /// Transaction number to start from
        #[arg(long)]
        cursor: Option<u64>,
        /// Maximum payloads to return (at most 50)
        #[arg(long)]
        limit: Option<u32>,
        #[command(flatten)]
        target: Target,
    },
    /// Turn notification pings on or off
    Notifications {
        id: String,
        state: Toggle,
        #[command(flatten)]
        target: Target,
    },
}

#[derive(Args)]
struct Target {
    /// Airtable base id; defaults to [airtable].base in atcache.toml
    #[arg(long)]
    base: Option<String>,
}

#[derive(Args)]
struct Input {
    /// JSON input file; reads stdin when omitted or '-'
    #[arg(long, short = 'f')]
    file: Option<PathBuf>,
}

#[derive(Args)]
struct Format {
    /// Use processed rows (at_record_id + columns)
    #[arg(long, conflicts_with = "raw")]
    rows: bool,
    /// Use raw Airtable records ({id, fields})
    #[arg(long)]
    raw: bool,
}

impl Format {
    fn resolve(&self) -> commands::RecordFormat {
        commands::RecordFormat::from_flags(self.rows, self.raw)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Dockerfile => commands::dockerfile()?,
        Commands::Eject => commands::eject()?,
        Commands::Check => commands::check()?,
        Commands::Build { tag } => commands::build(tag).await?,
        Commands::Records { action } => match action {
            RecordsAction::List {
                table,
                target,
                view,
                cache,
                format,
            } => commands::records_list(&table, target.base, view, cache, format.resolve()).await?,
            RecordsAction::Create {
                table,
                target,
                input,
                format,
            } => {
                commands::records_create(&table, target.base.as_deref(), input.file, format.resolve())
                    .await?
            }
            RecordsAction::Update {
                table,
                target,
                input,
                format,
                keep_null,
            } => {
                commands::records_update(
                    &table,
                    target.base.as_deref(),
                    input.file,
                    format.resolve(),
                    keep_null,
                )
                .await?
            }
            RecordsAction::Match {
                table,
                target,
                input,
                keys,
                view,
            } => commands::records_match(&table, target.base, input.file, &keys, view).await?,
            RecordsAction::Delete {
                table,
                ids,
                target,
                yes,
            } => commands::records_delete(&table, &ids, target.base.as_deref(), yes).await?,
        },
        Commands::Webhooks { action } => match action {
            WebhooksAction::List { target } => commands::webhooks_list(target.base).await?,
            WebhooksAction::Create {
                spec,
                notification_url,
                target,
            } => {
                commands::webhooks_create(target.base, &spec, notification_url.as_deref()).await?
            }
            WebhooksAction::Delete { id, target } => {
                commands::webhooks_delete(target.base, &id).await?
            }
            WebhooksAction::Refresh { id, target } => {
                commands::webhooks_refresh(target.base, &id).await?
            }
            WebhooksAction::Payloads {
                id,
                cursor,
                limit,
                target,
            } => commands::webhooks_payloads(target.base, &id, cursor, limit).await?,
            WebhooksAction::Notifications { id, state, target } => {
                commands::webhooks_notifications(target.base, &id, matches!(state, Toggle::On))
                    .await?
            }
        },
    }

    Ok(())
}
