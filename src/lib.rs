//! promptd - prompt chain generation daemon
//!
//! Compiles prompt chains, reads generation metadata back out of PNGs and
//! drives a rate-limited benchmark queue against a remote image API.

pub mod api;
pub mod benchmark;
pub mod generation;
pub mod images;
pub mod metadata;
pub mod prompt;
pub mod queue;
pub mod store;
pub mod tags;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use api::AppState;
use generation::{GenerationClient, NovelAiClient, DEFAULT_MODEL};
use queue::{GenerationContext, GenerationQueue, LogObserver, QueueConfig, SharedContext};
use store::{EntityCache, HttpStore, MemoryStore, RemoteStore};

/// Config file read when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "promptd.toml";

/// Remote image API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://image.novelai.net".to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 120,
        }
    }
}

/// Remote CRUD store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// None = in-memory only
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 30,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub api: ApiConfig,
    pub store: StoreConfig,
    pub queue: QueueConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            api: ApiConfig::default(),
            store: StoreConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),
}

impl Config {
    /// Layer defaults, a TOML file and `PROMPTD_*` environment variables
    /// (nested keys split on `__`, e.g. `PROMPTD_QUEUE__DELAY_MS`)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Self::figment(file).extract().map_err(|e| Box::new(e).into())
    }

    fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("PROMPTD_").split("__"))
    }
}

/// The promptd server instance
pub struct Server {
    config: Config,
    state: AppState,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Create a server talking to the configured remote services
    pub async fn new(config: Config) -> Result<Self> {
        let client = NovelAiClient::new(
            &config.api.base_url,
            Duration::from_secs(config.api.timeout_secs),
        )?;

        let store: Arc<dyn RemoteStore> = match config.store.base_url {
            Some(ref url) => Arc::new(HttpStore::new(
                url,
                Duration::from_secs(config.store.timeout_secs),
            )?),
            None => {
                warn!("No store configured; entities and results are kept in memory");
                Arc::new(MemoryStore::new())
            }
        };

        Self::with_services(config, Arc::new(client), store).await
    }

    /// Create a server with explicit generation and store backends
    pub async fn with_services(
        config: Config,
        client: Arc<dyn GenerationClient>,
        store: Arc<dyn RemoteStore>,
    ) -> Result<Self> {
        let cache = Arc::new(EntityCache::new());
        if let Err(e) = cache.refresh_from(store.as_ref()).await {
            warn!("Failed to load entities: {}", e);
        }

        let benchmark = match store.load_benchmark_config().await {
            Ok(found) => found.unwrap_or_default(),
            Err(e) => {
                warn!("Failed to load benchmark config: {}", e);
                Default::default()
            }
        };

        let mut context = GenerationContext::new(
            config.api.api_key.as_deref().unwrap_or_default(),
            benchmark,
        );
        context.model = config.api.model.clone();
        let context: SharedContext = Arc::new(RwLock::new(context));

        let queue = Arc::new(GenerationQueue::new(
            config.queue.clone(),
            client,
            store.clone(),
            cache.clone(),
            Arc::new(LogObserver),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            state: AppState {
                queue,
                cache,
                store,
                context,
                entity_tag: config.queue.entity_tag.clone(),
            },
            config,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Shared state behind the HTTP API
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the queue worker and HTTP server until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("promptd listening on {}", local_addr);

        let worker = self
            .state
            .queue
            .spawn_worker(self.state.context.clone(), self.shutdown_rx.clone());

        let router = api::router(self.state.clone());
        let mut shutdown_rx = self.shutdown_rx.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
            })
            .await?;

        worker.await?;
        info!("promptd shutdown complete");
        Ok(())
    }

    /// Signal the server to shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.queue.delay_ms, 2000);
        assert_eq!(config.api.model, DEFAULT_MODEL);
        assert!(config.store.base_url.is_none());
    }

    #[test]
    fn test_config_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
bind_addr = "0.0.0.0:9000"

[api]
api_key = "secret"

[queue]
delay_ms = 250
entity_tag = "style"
"#
        )
        .unwrap();

        let config = Config::figment(file.path()).extract::<Config>().unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.api.api_key.as_deref(), Some("secret"));
        assert_eq!(config.queue.delay_ms, 250);
        assert_eq!(config.queue.entity_tag, "style");
        assert_eq!(config.queue.log_capacity, 100);
    }

    #[test]
    fn test_config_missing_file_uses_defaults() {
        let config = Config::figment(Path::new("/nonexistent/promptd.toml"))
            .extract::<Config>()
            .unwrap();
        assert_eq!(config.api.base_url, ApiConfig::default().base_url);
    }

    #[tokio::test]
    async fn test_server_loads_entities_and_benchmark() {
        let store = Arc::new(MemoryStore::with_entities([store::Entity::new("a1", "wlop")]));
        let benchmark = benchmark::BenchmarkConfig {
            slots: vec![benchmark::Slot::new("portrait", "1girl")],
            ..Default::default()
        };
        store.save_benchmark_config(&benchmark).await.unwrap();

        let client =
            Arc::new(NovelAiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap());
        let server = Server::with_services(Config::default(), client, store)
            .await
            .unwrap();

        assert_eq!(server.state().cache.len(), 1);
        assert_eq!(server.state().context.read().benchmark, benchmark);
    }
}
