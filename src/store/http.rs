//! REST implementation of the remote store

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{Entity, RemoteStore, StoreError};
use crate::benchmark::BenchmarkConfig;
use crate::prompt::PromptChain;

/// Remote CRUD backend reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET a JSON document; 404 maps to `None`
    async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, StoreError> {
        debug!("GET {}", path);
        let response = self.client.get(self.url(path)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        Ok(Some(response.json().await?))
    }

    /// PUT a full JSON document; 404 means the record does not exist remotely
    async fn put<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<(), StoreError> {
        debug!("PUT {}", path);
        let response = self.client.put(self.url(path)).json(body).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(path.to_string()));
        }
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    warn!("Store error: {} - {}", status, body);
    Err(StoreError::Status { status, body })
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn list_entities(&self) -> Result<Vec<Entity>, StoreError> {
        Ok(self.get_optional("/artists").await?.unwrap_or_default())
    }

    async fn get_entity(&self, id: &str) -> Result<Option<Entity>, StoreError> {
        self.get_optional(&format!("/artists/{}", id)).await
    }

    async fn update_entity(&self, entity: &Entity) -> Result<(), StoreError> {
        self.put(&format!("/artists/{}", entity.id), entity).await
    }

    async fn load_chain(&self, id: &str) -> Result<Option<PromptChain>, StoreError> {
        self.get_optional(&format!("/chains/{}", id)).await
    }

    async fn save_chain(&self, chain: &PromptChain) -> Result<(), StoreError> {
        self.put(&format!("/chains/{}", chain.id), chain).await
    }

    async fn load_benchmark_config(&self) -> Result<Option<BenchmarkConfig>, StoreError> {
        self.get_optional("/config/benchmark").await
    }

    async fn save_benchmark_config(&self, config: &BenchmarkConfig) -> Result<(), StoreError> {
        self.put("/config/benchmark", config).await
    }
}
