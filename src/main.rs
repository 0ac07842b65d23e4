use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sms_bridge::bridge::DEFAULT_CONFLICT_ATTEMPTS;
use sms_bridge::carrier::TwilioGateway;
use sms_bridge::chat::SlackConnector;
use sms_bridge::config::ServerConfig;
use sms_bridge::error::Error;
use sms_bridge::server::{AppState, create_router};
use sms_bridge::store::{self, SqliteStore, TenantStore};
use sms_bridge::types::{CarrierCredentials, Tenant};

const NOT_INITIALIZED: &str = "Database not initialized. Run 'sms-bridge admin init' first.";

#[derive(Parser)]
#[command(name = "sms-bridge")]
#[command(about = "Relays Slack channels to SMS and back", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// TOML config file; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the database
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create the database
    Init {
        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },

    /// Attach carrier credentials and an SMS number to an installed team
    Provision {
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Team id, e.g. T024BE7LD
        #[arg(long)]
        team: String,

        #[arg(long)]
        account_sid: String,

        #[arg(long)]
        auth_token: String,

        /// The number messages are sent from and received on
        #[arg(long)]
        phone: String,
    },

    /// Print a tenant, without its secrets
    Show {
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        #[command(flatten)]
        lookup: Lookup,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Lookup {
    #[arg(long)]
    team: Option<String>,

    #[arg(long)]
    account_sid: Option<String>,

    #[arg(long)]
    phone: Option<String>,
}

fn db_path(data_dir: &Path) -> PathBuf {
    ServerConfig {
        data_dir: data_dir.to_path_buf(),
        ..ServerConfig::default()
    }
    .db_path()
}

fn open_store(data_dir: &Path) -> anyhow::Result<SqliteStore> {
    let path = db_path(data_dir);
    if !path.exists() {
        bail!(NOT_INITIALIZED);
    }
    Ok(SqliteStore::new(&path)?)
}

fn run_init(data_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(data_dir)?;

    let path = db_path(data_dir);
    let store = SqliteStore::new(&path)?;
    store.initialize()?;

    println!("Database ready at {}", path.display());
    Ok(())
}

fn run_provision(
    data_dir: &Path,
    team: &str,
    account_sid: String,
    auth_token: String,
    phone: &str,
) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let carrier = CarrierCredentials {
        account_id: account_sid,
        auth_token,
    };

    let tenant = match store::provision(&store, team, carrier, phone, DEFAULT_CONFLICT_ATTEMPTS) {
        Ok(tenant) => tenant,
        Err(Error::AlreadyExists(_)) => {
            bail!("Phone number {phone} is already used by another team")
        }
        Err(Error::NotFound(_)) => {
            bail!("Team {team} is not installed. Complete the Slack install first.")
        }
        Err(e) => return Err(e.into()),
    };

    println!("Provisioned team {} with {}", tenant.team, phone);
    Ok(())
}

fn summary(tenant: &Tenant) -> serde_json::Value {
    json!({
        "id": tenant.id,
        "team": tenant.team,
        "botUserId": tenant.chat.bot_user_id,
        "carrierAccountId": tenant.carrier.as_ref().map(|c| &c.account_id),
        "phoneNumber": tenant.phone_number,
        "channels": tenant.channels,
        "lastEventTs": tenant.last_event_ts,
        "createdAt": tenant.created_at,
        "updatedAt": tenant.updated_at,
    })
}

fn run_show(data_dir: &Path, lookup: Lookup) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;

    let tenant = match lookup {
        Lookup { team: Some(team), .. } => store.find_by_team(&team)?,
        Lookup {
            account_sid: Some(sid),
            ..
        } => store.find_by_carrier_account(&sid)?,
        Lookup { phone: Some(phone), .. } => store.find_by_phone(&phone)?,
        _ => bail!("One of --team, --account-sid or --phone is required"),
    };

    let Some(tenant) = tenant else {
        bail!("No tenant found");
    };

    println!("{}", serde_json::to_string_pretty(&summary(&tenant))?);
    Ok(())
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    let db_path = config.db_path();
    if !db_path.exists() {
        bail!(NOT_INITIALIZED);
    }

    let store = SqliteStore::with_busy_timeout(&db_path, config.busy_timeout())?;
    store.initialize()?;

    let chat = SlackConnector::new(&config.slack.api_base, config.request_timeout())
        .context("Failed to build Slack client")?;
    let carrier = TwilioGateway::new(&config.twilio.api_base, config.request_timeout())
        .context("Failed to build Twilio client")?;

    let state = Arc::new(AppState::new(
        Arc::new(store),
        Arc::new(chat),
        Arc::new(carrier),
        config.bridge_settings(),
    ));

    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sms_bridge=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init { data_dir } => run_init(&data_dir)?,
            AdminCommands::Provision {
                data_dir,
                team,
                account_sid,
                auth_token,
                phone,
            } => run_provision(&data_dir, &team, account_sid, auth_token, &phone)?,
            AdminCommands::Show { data_dir, lookup } => run_show(&data_dir, lookup)?,
        },
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
        } => {
            let mut config = match config {
                Some(path) => ServerConfig::load(&path)?,
                None => ServerConfig::default(),
            };
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }

            run_serve(config).await?;
        }
    }

    Ok(())
}
