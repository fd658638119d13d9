//! HTTP implementation of the instance gateway
//!
//! `AuraClientFactory` plays the role of the authenticated client factory:
//! it layers a cached client-credentials token source on top of a shared
//! base `reqwest::Client`, which owns connection pooling and TLS.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use url::Url;

use super::gateway::{GatewayFactory, InstanceGateway};
use super::token::{ClientCredentials, TokenSource};
use super::types::{
    CreateInstanceRequest, CreatedInstance, Envelope, InstanceData, InstanceSummary,
    PatchInstanceRequest,
};
use crate::error::{Error, Result};

/// Raw outcome of one API call
struct ApiResponse {
    status: StatusCode,
    body: String,
}

impl ApiResponse {
    fn rejected(self, action: &'static str) -> Error {
        Error::UpstreamRejected {
            action,
            code: self.status.as_u16(),
            body: self.body,
        }
    }

    fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let envelope: Envelope<T> = serde_json::from_str(&self.body)?;
        Ok(envelope.data)
    }
}

/// Aura API client bound to one token source
pub struct AuraClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: Arc<TokenSource>,
    timeout: Duration,
}

impl AuraClient {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        tokens: Arc<TokenSource>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            tokens,
            timeout,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::ConfigError(format!("invalid base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        action: &'static str,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<ApiResponse> {
        let token = self.tokens.token(self.timeout).await?;
        let started = Instant::now();

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(token)
            .timeout(self.timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|source| Error::TransportFailure { action, source })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| Error::TransportFailure { action, source })?;

        debug!(
            method = %method,
            path = url.path(),
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Aura API request"
        );

        if status == StatusCode::UNAUTHORIZED {
            warn!("Aura API rejected the access token, dropping cached token");
            self.tokens.invalidate().await;
        }

        Ok(ApiResponse { status, body })
    }
}

#[async_trait]
impl InstanceGateway for AuraClient {
    #[instrument(skip(self))]
    async fn list_instances(&self, tenant_id: &str) -> Result<Vec<InstanceSummary>> {
        let mut url = self.endpoint(&["instances"])?;
        url.query_pairs_mut().append_pair("tenantId", tenant_id);

        let response = self
            .send::<()>("get instance list", Method::GET, url, None)
            .await?;
        if response.status != StatusCode::OK {
            return Err(response.rejected("get instance list"));
        }
        response.decode()
    }

    #[instrument(skip(self))]
    async fn get_instance(&self, instance_id: &str) -> Result<Option<InstanceData>> {
        let url = self.endpoint(&["instances", instance_id])?;

        let response = self
            .send::<()>("get instance", Method::GET, url, None)
            .await?;
        match response.status {
            StatusCode::OK => response.decode().map(Some),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(response.rejected("get instance")),
        }
    }

    #[instrument(skip(self, request), fields(name = %request.name, tenant_id = %request.tenant_id))]
    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<CreatedInstance> {
        let url = self.endpoint(&["instances"])?;

        let response = self
            .send("create the instance", Method::POST, url, Some(request))
            .await?;
        if response.status != StatusCode::ACCEPTED {
            return Err(response.rejected("create the instance"));
        }
        response.decode()
    }

    #[instrument(skip(self, request))]
    async fn patch_instance(
        &self,
        instance_id: &str,
        request: &PatchInstanceRequest,
    ) -> Result<()> {
        let url = self.endpoint(&["instances", instance_id])?;

        let response = self
            .send("update instance", Method::PATCH, url, Some(request))
            .await?;
        if response.status != StatusCode::ACCEPTED {
            return Err(response.rejected("update instance"));
        }
        Ok(())
    }
}

/// Builds `AuraClient`s, reusing one token source per client id.
///
/// A source is replaced when the secret for its client id changes.
pub struct AuraClientFactory {
    http: reqwest::Client,
    base_url: Url,
    token_url: Url,
    sources: Mutex<HashMap<String, Arc<TokenSource>>>,
}

impl AuraClientFactory {
    pub fn new(http: reqwest::Client, base_url: &str, token_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::ConfigError(format!("invalid base url {base_url:?}: {e}")))?;
        let token_url = Url::parse(token_url)
            .map_err(|e| Error::ConfigError(format!("invalid token url {token_url:?}: {e}")))?;
        Ok(Self {
            http,
            base_url,
            token_url,
            sources: Mutex::new(HashMap::new()),
        })
    }

    fn cache_key(&self, credentials: &ClientCredentials) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.token_url.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(credentials.client_id.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn token_source(&self, credentials: ClientCredentials) -> Result<Arc<TokenSource>> {
        let key = self.cache_key(&credentials);
        let mut sources = self
            .sources
            .lock()
            .map_err(|_| Error::ConfigError("token cache lock poisoned".to_string()))?;

        if let Some(source) = sources.get(&key) {
            if source.credentials() == &credentials {
                return Ok(source.clone());
            }
            debug!("Client secret rotated, replacing cached token source");
        }

        let source = Arc::new(TokenSource::new(
            self.http.clone(),
            self.token_url.clone(),
            credentials,
        ));
        sources.insert(key, source.clone());
        Ok(source)
    }
}

impl GatewayFactory for AuraClientFactory {
    fn gateway(
        &self,
        credentials: ClientCredentials,
        timeout: Duration,
    ) -> Result<Box<dyn InstanceGateway>> {
        let tokens = self.token_source(credentials)?;
        Ok(Box::new(AuraClient::new(
            self.http.clone(),
            self.base_url.clone(),
            tokens,
            timeout,
        )))
    }
}
