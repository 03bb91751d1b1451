use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{warn, Level};
use tracing_subscriber::{filter::Targets, prelude::*};

use granola::prelude::*;
use granola::store::Store;

fn default_database_uri() -> String {
    "granola.redb".to_string()
}

fn default_listen_address() -> SocketAddr {
    "0.0.0.0:8000".parse().unwrap()
}

/// Process configuration, taken from the environment: `DATABASE_URI`,
/// `OGMIOS_URL` / `OGMIOS_HOSTNAME`, `BLOCKFROST_PROJECT_ID`,
/// `LISTEN_ADDRESS`, `LOG_LEVEL`.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_uri")]
    pub database_uri: String,

    pub ogmios_url: Option<String>,
    pub ogmios_hostname: Option<String>,

    pub blockfrost_project_id: Option<String>,

    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,

    pub log_level: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .map_err(Error::config)?
            .try_deserialize()
            .map_err(Error::config)
    }

    pub fn ogmios_url(&self) -> String {
        match &self.ogmios_url {
            Some(url) => url.clone(),
            None => {
                let host = self.ogmios_hostname.as_deref().unwrap_or("localhost");
                format!("ws://{host}:1337")
            }
        }
    }
}

pub fn setup_tracing(config: &Config) -> Result<(), Error> {
    let level = config
        .log_level
        .as_deref()
        .map(|x| x.parse::<Level>())
        .transpose()
        .map_err(Error::config)?
        .unwrap_or(Level::INFO);

    let filter = Targets::new()
        .with_target("granola", level)
        .with_target("gasket", level);

    tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .finish()
        .with(filter)
        .init();

    Ok(())
}

pub fn open_store(config: &Config) -> Result<Store, Error> {
    if let Some(parent) = Path::new(&config.database_uri).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    Ok(Store::open(&config.database_uri)?)
}

pub fn hook_exit_token() -> CancellationToken {
    let cancel = CancellationToken::new();

    let cancel2 = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        warn!("exit signal received");
        cancel2.cancel();
    });

    cancel
}

pub async fn run_pipeline(daemon: gasket::daemon::Daemon, exit: CancellationToken) {
    tokio::select! {
        _ = tokio::task::spawn_blocking(move || daemon.block()) => (),
        _ = exit.cancelled() => warn!("exit requested"),
    }
}
