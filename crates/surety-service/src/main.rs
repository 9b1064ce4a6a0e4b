use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use surety_core::{EngineConfig, EventStorageConfig, RolesConfig};
use surety_service::{build_router, ServiceConfig, ServiceState};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EventStorageMode {
    Auto,
    Memory,
    Postgres,
}

#[derive(Debug, Parser)]
#[command(name = "suretyd", version, about = "Surety coverage ledger REST service")]
struct Cli {
    /// REST socket address to bind, e.g. 127.0.0.1:8091
    #[arg(long, default_value = "127.0.0.1:8091")]
    listen: SocketAddr,
    /// Principal authorized to originate and price policies.
    #[arg(long, env = "SURETY_ISSUER")]
    issuer: String,
    /// Principal authorized to trigger reimbursements.
    #[arg(long, env = "SURETY_CLAIMS_AUTHORITY")]
    claims_authority: String,
    /// Funds the custody pool starts with.
    #[arg(long, default_value_t = 0, env = "SURETY_INITIAL_POOL_BALANCE")]
    initial_pool_balance: u64,
    /// Coverage term in days applied to every new policy.
    #[arg(long, default_value_t = 365, env = "SURETY_TERM_DAYS")]
    term_days: i64,
    /// Event persistence backend. `auto` picks postgres when a database url is configured.
    #[arg(long, value_enum, default_value_t = EventStorageMode::Auto, env = "SURETY_EVENT_STORAGE")]
    event_storage: EventStorageMode,
    /// PostgreSQL url for audit event persistence.
    #[arg(long, env = "SURETY_EVENT_DATABASE_URL")]
    event_database_url: Option<String>,
    /// Max PostgreSQL pool connections for event persistence.
    #[arg(long, default_value_t = 5, env = "SURETY_EVENT_PG_MAX_CONNECTIONS")]
    event_pg_max_connections: u32,
}

fn resolve_event_storage(cli: &Cli) -> anyhow::Result<EventStorageConfig> {
    let resolved_url = cli
        .event_database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let storage = match cli.event_storage {
        EventStorageMode::Memory => EventStorageConfig::Memory,
        EventStorageMode::Postgres => {
            let database_url = resolved_url.ok_or_else(|| {
                anyhow::anyhow!(
                    "event_storage=postgres requires --event-database-url or DATABASE_URL"
                )
            })?;
            EventStorageConfig::postgres(database_url, cli.event_pg_max_connections)
        }
        EventStorageMode::Auto => {
            if let Some(database_url) = resolved_url {
                EventStorageConfig::postgres(database_url, cli.event_pg_max_connections)
            } else {
                EventStorageConfig::Memory
            }
        }
    };

    Ok(storage)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "surety_service=info,info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let event_storage = resolve_event_storage(&cli)?;
    let config = ServiceConfig {
        roles: RolesConfig::new(&cli.issuer, &cli.claims_authority),
        engine: EngineConfig {
            term_days: cli.term_days,
            initial_pool_balance: cli.initial_pool_balance,
            event_storage,
        },
    };
    let state = ServiceState::bootstrap(config).await?;
    info!(
        backend = %state.engine.event_backend().await,
        "surety-service engine ready"
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("surety-service REST listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
