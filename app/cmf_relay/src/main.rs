use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use cmf::SourceConfig;
use framework::asset::asset_path;
use framework::exception;
use framework::exception::CoreRsResult;
use framework::http::HttpClient;
use framework::json;
use framework::log;
use framework::log::ConsoleAppender;
use framework::shutdown::Shutdown;
use framework::web::server::HttpServerConfig;
use framework::web::server::start_http_server;
use gcs::Credential;
use gcs::GcsClient;
use serde::Deserialize;
use tracing::info;
use tracing::warn;

mod cmf;
mod gcs;
#[cfg(test)]
mod mock;
mod service;
mod web;

// default timeout of the google cloud storage client libraries
const STORAGE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize, Clone)]
struct AppConfig {
    source: SourceConfig,
    download_dir: PathBuf,
    storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
struct StorageConfig {
    folder: String,
    uri: String,
    metadata_uri: String,
}

/// Values provided by the runtime environment, read once at startup.
#[derive(Debug, Clone, Default)]
struct EnvConfig {
    bucket: Option<String>,
    // K_SERVICE is set by cloud run
    managed: bool,
    port: u16,
    storage_emulator_host: Option<String>,
}

impl EnvConfig {
    fn load() -> CoreRsResult<Self> {
        Ok(EnvConfig {
            bucket: non_empty_var("GCS_BUCKET_NAME"),
            managed: non_empty_var("K_SERVICE").is_some(),
            port: port(non_empty_var("PORT").as_deref())?,
            storage_emulator_host: non_empty_var("STORAGE_EMULATOR_HOST"),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn port(value: Option<&str>) -> CoreRsResult<u16> {
    let Some(value) = value else {
        return Ok(8080);
    };
    value
        .trim()
        .parse::<u16>()
        .map_err(|err| exception!(message = format!("invalid PORT, value={value}"), source = err))
}

pub struct AppState {
    source: SourceConfig,
    download_dir: PathBuf,
    folder: String,
    bucket: Option<String>,
    http_client: HttpClient,
    gcs: GcsClient,
}

impl AppState {
    fn new(config: AppConfig, env: &EnvConfig) -> CoreRsResult<Self> {
        let (storage_uri, credential) = if let Some(ref host) = env.storage_emulator_host {
            (emulator_uri(host), Credential::Anonymous)
        } else if env.managed {
            (
                config.storage.uri,
                Credential::MetadataServer {
                    uri: config.storage.metadata_uri,
                },
            )
        } else {
            (config.storage.uri, Credential::GcloudCli)
        };

        Ok(AppState {
            http_client: HttpClient::new(Duration::from_secs(config.source.timeout_in_secs))?,
            gcs: GcsClient::new(HttpClient::new(STORAGE_TIMEOUT)?, &storage_uri, credential),
            source: config.source,
            download_dir: config.download_dir,
            folder: config.storage.folder,
            bucket: env.bucket.clone(),
        })
    }
}

// STORAGE_EMULATOR_HOST may omit the scheme, e.g. "localhost:4443"
fn emulator_uri(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_owned()
    } else {
        format!("http://{host}")
    }
}

#[tokio::main]
async fn main() -> CoreRsResult<()> {
    log::init_with_action(ConsoleAppender);

    let config: AppConfig = json::load_file(&asset_path("assets/conf.json")?)?;
    let env = EnvConfig::load()?;

    if env.bucket.is_none() && !env.managed {
        warn!("GCS_BUCKET_NAME is not configured, files will be downloaded but not uploaded");
        warn!("for local run, set it before starting, e.g. export GCS_BUCKET_NAME=valores-cuota-cmf");
    }
    info!(
        "starting cmf_relay, port={}, bucket={}, download_dir={}",
        env.port,
        env.bucket.as_deref().unwrap_or("-"),
        config.download_dir.to_string_lossy()
    );

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    shutdown.listen();

    let state = Arc::new(AppState::new(config, &env)?);

    let app = Router::new();
    let app = app.merge(web::routes());
    let app = app.with_state(state);
    start_http_server(app, signal, HttpServerConfig::with_port(env.port)).await
}
