//! Common test utilities - PromptdTest harness for end-to-end testing

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use promptd::benchmark::{BenchmarkConfig, Slot};
use promptd::generation::{GenerationClient, GenerationError, GenerationRequest};
use promptd::images::GeneratedImage;
use promptd::metadata::PNG_SIGNATURE;
use promptd::store::{Entity, MemoryStore, RemoteStore};
use promptd::{Config, Server};
use reqwest::Client;
use tokio::task::JoinHandle;

/// Generation client that returns a fixed PNG, or scripted failures first
#[derive(Default)]
pub struct ScriptedClient {
    failures: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    /// Fail the next requests with these messages, in order
    pub fn fail_with(&self, messages: &[&str]) {
        let mut failures = self.failures.lock();
        failures.extend(messages.iter().rev().map(|m| m.to_string()));
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(
        &self,
        _api_key: &str,
        request: &GenerationRequest,
    ) -> Result<GeneratedImage, GenerationError> {
        self.prompts.lock().push(request.input.clone());
        if let Some(message) = self.failures.lock().pop() {
            return Err(GenerationError::remote(message));
        }
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend_from_slice(request.input.as_bytes());
        Ok(GeneratedImage::new(data))
    }
}

/// Test harness that spawns a real promptd server on a random port
pub struct PromptdTest {
    pub addr: SocketAddr,
    pub client: Client,
    pub generator: Arc<ScriptedClient>,
    pub store: Arc<MemoryStore>,
    server: Arc<Server>,
    _handle: JoinHandle<()>,
}

impl PromptdTest {
    /// Start a server with two entities and a two-slot benchmark
    pub async fn start() -> Result<Self> {
        let store = Arc::new(MemoryStore::with_entities([
            Entity::new("e1", "wlop"),
            Entity::new("e2", "sakimichan"),
        ]));
        let benchmark = BenchmarkConfig {
            slots: vec![
                Slot::new("portrait", "1girl, upper body"),
                Slot::new("landscape", "scenery, no humans"),
            ],
            negative_prompt: "lowres".to_string(),
            ..Default::default()
        };
        store.save_benchmark_config(&benchmark).await?;
        Self::start_with(store).await
    }

    /// Start a server backed by the given store
    pub async fn start_with(store: Arc<MemoryStore>) -> Result<Self> {
        // Find a random available port
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        drop(listener);

        let mut config = Config::default();
        config.bind_addr = addr;
        config.api.api_key = Some("test-key".to_string());
        config.queue.delay_ms = 10;

        let generator = Arc::new(ScriptedClient::default());
        let server = Arc::new(
            Server::with_services(config, generator.clone(), store.clone()).await?,
        );
        let server_clone = server.clone();

        // Spawn the server in a background task
        let handle = tokio::spawn(async move {
            if let Err(e) = server_clone.run().await {
                eprintln!("Server error: {}", e);
            }
        });

        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;

        // Poll until server is ready (max 2 seconds)
        let mut ready = false;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if client
                .get(format!("http://{}/health", addr))
                .send()
                .await
                .is_ok()
            {
                ready = true;
                break;
            }
        }

        if !ready {
            panic!("Server failed to start within 2 seconds");
        }

        Ok(Self {
            addr,
            client,
            generator,
            store,
            server,
            _handle: handle,
        })
    }

    /// Get the base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await?)
    }

    /// Make a POST request with JSON body
    pub async fn post<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await?)
    }

    /// Make a PUT request with JSON body
    pub async fn put<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        Ok(self
            .client
            .put(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await?)
    }

    /// POST a raw byte body
    pub async fn post_bytes(&self, path: &str, body: Vec<u8>) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(format!("{}{}", self.base_url(), path))
            .header("content-type", "image/png")
            .body(body)
            .send()
            .await?)
    }

    /// Poll GET /queue until `done` holds (max 5 seconds)
    pub async fn wait_for_queue<F>(&self, done: F) -> Result<serde_json::Value>
    where
        F: Fn(&serde_json::Value) -> bool,
    {
        for _ in 0..100 {
            let snapshot: serde_json::Value = self.get("/queue").await?.json().await?;
            if done(&snapshot) {
                return Ok(snapshot);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("Queue did not settle within 5 seconds")
    }

    /// Direct access to the server, for state assertions
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Shutdown the server gracefully
    pub fn shutdown(&self) {
        self.server.shutdown();
    }
}

impl Drop for PromptdTest {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}

/// Assemble a PNG chunk (CRC left zero; readers do not check it)
pub fn png_chunk(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 12);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out.extend_from_slice(&[0, 0, 0, 0]);
    out
}

/// Minimal PNG with one tEXt chunk
pub fn png_with_text(keyword: &str, text: &str) -> Vec<u8> {
    let mut payload = keyword.as_bytes().to_vec();
    payload.push(0);
    payload.extend_from_slice(text.as_bytes());

    let mut out = PNG_SIGNATURE.to_vec();
    out.extend(png_chunk(b"IHDR", &[0u8; 13]));
    out.extend(png_chunk(b"tEXt", &payload));
    out.extend(png_chunk(b"IEND", &[]));
    out
}
