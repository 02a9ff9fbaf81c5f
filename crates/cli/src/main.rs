//! FourEyes CLI - Main entry point

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use foureyes_audit::{AuditFilter, AuditOutcome};
use foureyes_cli::commands::{self, FieldSpec};
use foureyes_cli::{AppContext, GovernanceConfig};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "foureyes")]
#[command(about = "FourEyes - dual-control governance", long_about = None)]
struct Cli {
    /// Data directory path
    #[arg(short, long, default_value = "./data")]
    data: PathBuf,

    /// Config file (defaults to <data>/foureyes.json when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Act as this login (FOUREYES_USER takes precedence)
    #[arg(long = "as", global = true)]
    as_user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resolved identity
    Whoami,

    /// Show the effective permissions of the current identity
    Permissions,

    /// Create a draft entity
    Create {
        /// Entity kind (e.g. portfolio)
        kind: String,
        /// JSON payload
        #[arg(long, default_value = "{}")]
        payload: String,
    },

    /// Replace the payload of a draft or rejected entity
    Edit {
        id: String,
        /// JSON payload
        #[arg(long)]
        payload: String,
    },

    /// Submit an entity for approval
    Submit { id: String },

    /// Approve a pending entity
    Approve {
        id: String,
        #[arg(long)]
        comments: Option<String>,
    },

    /// Reject a pending entity
    Reject {
        id: String,
        /// Reason for rejection (required)
        #[arg(long)]
        comments: String,
    },

    /// Close an approved or active entity
    Close { id: String },

    /// Reactivate a closed entity
    Reactivate {
        id: String,
        /// Justification (required)
        #[arg(long)]
        justification: String,
    },

    /// Show an entity and its field values
    Show { id: String },

    /// Show the workflow history of an entity
    History { id: String },

    /// Entity counts per status
    Stats,

    /// List audit records
    Audit {
        /// Verify the hash chain
        #[arg(long)]
        verify: bool,
        /// Filter by entity id
        #[arg(long)]
        entity: Option<String>,
        /// Filter by actor login
        #[arg(long)]
        actor: Option<String>,
        /// Only failures
        #[arg(long)]
        failures: bool,
        /// Maximum number of records to show (most recent)
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// User-defined fields
    Udf {
        #[command(subcommand)]
        command: UdfCommands,
    },
}

#[derive(Subcommand)]
enum UdfCommands {
    /// Define a field on an entity type
    Define {
        entity_type: String,
        field_name: String,
        /// TEXT, NUMBER, CURRENCY, PERCENTAGE, BOOLEAN, DATE, DATETIME, DROPDOWN, MULTI_SELECT
        #[arg(long = "type")]
        field_type: String,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        min: Option<Decimal>,
        #[arg(long)]
        max: Option<Decimal>,
        #[arg(long)]
        max_length: Option<usize>,
        /// Allowed options (comma separated)
        #[arg(long, value_delimiter = ',')]
        options: Vec<String>,
        #[arg(long)]
        required: bool,
        #[arg(long)]
        unique: bool,
    },

    /// Deactivate a field
    Deactivate { entity_type: String, field_name: String },

    /// Set values: name=value ... (name= clears)
    Set {
        entity_type: String,
        entity_id: String,
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Show values of an entity, or the field definitions when no id is given
    Get {
        entity_type: String,
        entity_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => GovernanceConfig::from_file(path)?,
        None => GovernanceConfig::load(&cli.data)?,
    };
    let ctx = AppContext::new(&cli.data, config)?;

    // Every command except `audit` and `stats` acts on behalf of someone
    let actor = || ctx.actor(cli.as_user.as_deref());

    match cli.command {
        Commands::Whoami => {
            commands::whoami(&actor()?);
        }

        Commands::Permissions => {
            commands::permissions(&ctx, &actor()?).await?;
        }

        Commands::Create { kind, payload } => {
            commands::create(&ctx, &actor()?, &kind, &payload).await?;
        }

        Commands::Edit { id, payload } => {
            commands::edit(&ctx, &actor()?, &id, &payload).await?;
        }

        Commands::Submit { id } => {
            commands::submit(&ctx, &actor()?, &id).await?;
        }

        Commands::Approve { id, comments } => {
            commands::approve(&ctx, &actor()?, &id, comments.as_deref()).await?;
        }

        Commands::Reject { id, comments } => {
            commands::reject(&ctx, &actor()?, &id, &comments).await?;
        }

        Commands::Close { id } => {
            commands::close(&ctx, &actor()?, &id).await?;
        }

        Commands::Reactivate { id, justification } => {
            commands::reactivate(&ctx, &actor()?, &id, &justification).await?;
        }

        Commands::Show { id } => {
            commands::show(&ctx, &actor()?, &id).await?;
        }

        Commands::History { id } => {
            commands::history(&ctx, &actor()?, &id).await?;
        }

        Commands::Stats => {
            commands::stats(&ctx).await?;
        }

        Commands::Audit {
            verify,
            entity,
            actor: login,
            failures,
            limit,
        } => {
            let mut filter = AuditFilter::new();
            if let Some(entity_id) = &entity {
                filter = filter.with_entity_id(entity_id);
            }
            if let Some(login) = &login {
                filter = filter.with_actor(login);
            }
            if failures {
                filter = filter.with_outcome(AuditOutcome::Failure);
            }
            commands::audit(&ctx, &filter, limit, verify)?;
        }

        Commands::Udf { command } => match command {
            UdfCommands::Define {
                entity_type,
                field_name,
                field_type,
                label,
                min,
                max,
                max_length,
                options,
                required,
                unique,
            } => {
                let spec = FieldSpec {
                    field_type,
                    label,
                    min,
                    max,
                    max_length,
                    options,
                    required,
                    unique,
                };
                commands::udf_define(&ctx, &actor()?, &entity_type, &field_name, &spec).await?;
            }

            UdfCommands::Deactivate {
                entity_type,
                field_name,
            } => {
                commands::udf_deactivate(&ctx, &actor()?, &entity_type, &field_name).await?;
            }

            UdfCommands::Set {
                entity_type,
                entity_id,
                values,
            } => {
                commands::udf_set(&ctx, &actor()?, &entity_type, &entity_id, &values).await?;
            }

            UdfCommands::Get {
                entity_type,
                entity_id,
            } => {
                commands::udf_get(&ctx, &entity_type, entity_id.as_deref()).await?;
            }
        },
    }

    Ok(())
}
