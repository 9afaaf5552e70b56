use invalidate::HttpInvalidator;
use serde::Deserialize;
use server::ServerState;
use spindle_common::snowflake::{ProcessId, WorkerId};
use spindle_core::{
    InvalidationSink, NoopInvalidator, ThreadService, ThreadServiceConfig, error::BoxError,
};
use spindle_db::{DbClient, PoolConfig};
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU64,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod invalidate;
mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("{0} {1} is out of range for a snowflake")]
    SnowflakePart(&'static str, u8),
    #[error("REVALIDATE_URL is not a valid url: {0}")]
    RevalidateUrl(#[source] BoxError),
    #[error("Error building http client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

fn default_max_connections() -> u32 {
    PoolConfig::default().max_connections
}

fn default_store_timeout_ms() -> u64 {
    5000
}

fn default_reply_depth() -> usize {
    spindle_core::service::DEFAULT_REPLY_DEPTH
}

fn default_page_size() -> NonZeroU64 {
    spindle_core::service::DEFAULT_PAGE_SIZE
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    database_url: String,
    #[serde(default = "default_max_connections")]
    database_max_connections: u32,
    /// Zero disables the per-call timeout.
    #[serde(default = "default_store_timeout_ms")]
    store_timeout_ms: u64,
    #[serde(default = "default_reply_depth")]
    reply_depth: usize,
    #[serde(default = "default_page_size")]
    default_page_size: NonZeroU64,
    revalidate_url: Option<String>,
    #[serde(default)]
    snowflake_worker_id: u8,
    #[serde(default)]
    snowflake_process_id: u8,
}

impl Env {
    fn service_config(&self) -> ThreadServiceConfig {
        ThreadServiceConfig {
            reply_depth: self.reply_depth,
            store_timeout: (self.store_timeout_ms > 0)
                .then(|| Duration::from_millis(self.store_timeout_ms)),
            default_page_size: self.default_page_size,
        }
    }
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "spindle_api=debug,\
                spindle_core=debug,\
                spindle_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

fn build_db_client(env: &Env) -> Result<DbClient, InitError> {
    let worker_id = WorkerId::new(env.snowflake_worker_id)
        .ok_or(InitError::SnowflakePart("SNOWFLAKE_WORKER_ID", env.snowflake_worker_id))?;
    let process_id = ProcessId::new(env.snowflake_process_id)
        .ok_or(InitError::SnowflakePart("SNOWFLAKE_PROCESS_ID", env.snowflake_process_id))?;

    let pool_config = PoolConfig {
        max_connections: env.database_max_connections,
        ..PoolConfig::default()
    };

    Ok(DbClient::new(
        env.database_url.clone(),
        pool_config,
        worker_id,
        process_id,
    ))
}

fn build_invalidator(env: &Env) -> Result<Arc<dyn InvalidationSink>, InitError> {
    let Some(url) = &env.revalidate_url else {
        debug!("No REVALIDATE_URL set, invalidations are only logged");
        return Ok(Arc::new(NoopInvalidator));
    };

    let url = reqwest::Url::parse(url).map_err(|err| InitError::RevalidateUrl(err.into()))?;
    Ok(Arc::new(HttpInvalidator::new(url)?))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let threads = ThreadService::new(
        Arc::new(build_db_client(&env)?),
        build_invalidator(&env)?,
        env.service_config(),
    );

    let tracing_layer = TraceLayer::new_for_http();
    let app = server::routes()
        .layer(tracing_layer)
        .with_state(ServerState { threads });

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
