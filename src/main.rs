//! # Role Search CLI (`rolesearch`)
//!
//! ## Usage
//!
//! ```bash
//! rolesearch --config ./config/rolesearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rolesearch init` | Create the user database and seed roles |
//! | `rolesearch index build` | Build the index from the corpus and save it |
//! | `rolesearch index info` | Describe the saved index |
//! | `rolesearch search "<query>" --user <id>` | Search as a user |
//! | `rolesearch users list` | List users |
//! | `rolesearch users add <id> <name> --role <role>` | Add a user |
//! | `rolesearch users set-role <id> <role>` | Change a user's role |
//! | `rolesearch roles list` | List roles and their categories |
//! | `rolesearch roles set <role> --categories a,b` | Create or change a role |
//! | `rolesearch serve` | Start the HTTP API |

use clap::builder::{PossibleValuesParser, TypedValueParser};
use clap::{Parser, Subcommand};
use rolesearch_core::SearchMode;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rolesearch::{config, index_store, migrate, search, server, users};

/// Role-aware semantic search over company documents.
#[derive(Parser)]
#[command(name = "rolesearch", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rolesearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the user/role tables and seed the default roles.
    ///
    /// Idempotent: existing roles and users are left as they are.
    Init {
        /// Also add the demo accounts (user001..user005, admin001).
        #[arg(long)]
        sample_users: bool,
    },

    /// Build or inspect the saved index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Search the index as a given user.
    Search {
        /// The search query.
        query: String,

        /// User id whose role decides which categories are searched.
        #[arg(long)]
        user: String,

        /// Threshold preset: `standard` (0.1), `smart` (0.05) or `strict` (0.3).
        #[arg(
            long,
            default_value = "standard",
            value_parser = PossibleValuesParser::new(["standard", "smart", "strict"])
                .try_map(|s| s.parse::<SearchMode>())
        )]
        mode: SearchMode,

        /// Maximum number of results.
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum similarity; overrides the mode's threshold.
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Manage users.
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },

    /// Inspect roles.
    Roles {
        #[command(subcommand)]
        action: RolesAction,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Read the corpus, build the index and save it.
    Build,
    /// Print size, vocabulary and categories of the saved index.
    Info,
}

#[derive(Subcommand)]
enum UsersAction {
    /// List all users.
    List,
    /// Add a user with an existing role.
    Add {
        id: String,
        username: String,
        #[arg(long)]
        role: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        department: Option<String>,
    },
    /// Move a user to another role.
    SetRole { id: String, role: String },
}

#[derive(Subcommand)]
enum RolesAction {
    /// List roles and the categories they grant.
    List,
    /// Create a role or replace the categories it grants.
    Set {
        role: String,
        /// Comma-separated categories, e.g. `policy,rules`.
        #[arg(long, value_delimiter = ',', required = true)]
        categories: Vec<String>,
        /// Kept from the existing role when omitted.
        #[arg(long)]
        description: Option<String>,
    },
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg.logging.level);

    match cli.command {
        Commands::Init { sample_users } => {
            migrate::run_init(&cfg, sample_users).await?;
        }
        Commands::Index { action } => match action {
            IndexAction::Build => index_store::run_index_build(&cfg)?,
            IndexAction::Info => index_store::run_index_info(&cfg)?,
        },
        Commands::Search {
            query,
            user,
            mode,
            top_k,
            threshold,
        } => {
            search::run_search(&cfg, &query, &user, mode, top_k, threshold).await?;
        }
        Commands::Users { action } => match action {
            UsersAction::List => users::run_users_list(&cfg).await?,
            UsersAction::Add {
                id,
                username,
                role,
                email,
                department,
            } => {
                users::run_users_add(&cfg, &id, &username, &role, email, department).await?;
            }
            UsersAction::SetRole { id, role } => {
                users::run_users_set_role(&cfg, &id, &role).await?;
            }
        },
        Commands::Roles { action } => match action {
            RolesAction::List => users::run_roles_list(&cfg).await?,
            RolesAction::Set {
                role,
                categories,
                description,
            } => {
                users::run_roles_set(&cfg, &role, categories, description).await?;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
