use huephoria_client::{
    auth::AuthSession,
    config::{self, ClientConfig, ConfigError, ENV_PREFIX},
    error::ClientError,
    feed::{FeedSession, LoadOutcome},
};
use huephoria_common::model::{Id, InvalidIdError};
use huephoria_db::client::{DbClient, DbError};
use serde::Deserialize;
use std::{io::Write, sync::Arc};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Invalid viewer uid: {0}")]
    InvalidViewer(#[from] InvalidIdError),
    #[error("Error connecting to database: {0}")]
    Database(#[from] DbError),
    #[error("Error loading feed: {0}")]
    Client(#[from] ClientError),
    #[error("Error writing feed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Error writing feed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    database_url: String,
    viewer_uid: Option<String>,
    #[serde(default = "default_pages")]
    pages: u32,
}

fn default_pages() -> u32 {
    1
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "huephoria_client=debug,\
                huephoria_common=debug,\
                huephoria_db=debug,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn get_env() -> Result<(Env, ClientConfig), InitError> {
    config::load_dotenv()?;

    let env: Env = envy::prefixed(ENV_PREFIX).from_env()?;
    let config = ClientConfig::from_env()?;
    Ok((env, config))
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let (env, config) = get_env()?;
    debug!(?config, "Loaded configuration");

    let auth = match env.viewer_uid {
        Some(uid) => AuthSession::signed_in(Id::new(uid)?),
        None => AuthSession::new(),
    };
    let store = Arc::new(DbClient::connect(&env.database_url).await?);
    let feed = FeedSession::from_config(store, auth, &config);

    feed.load_initial().await?;
    for _ in 1..env.pages {
        if let LoadOutcome::Skipped(reason) = feed.load_more().await? {
            debug!(?reason, "Stopped loading pages");
            break;
        }
    }
    info!(loaded = feed.posts().len(), total = feed.total(), "Loaded feed");

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &feed.posts())?;
    writeln!(stdout)?;

    Ok(())
}
