use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::{
    NewProject, NewRegistry, RegistryApi, RegistryConnector, RegistryEndpoint, RegistryError,
};

const API_PREFIX: &str = "api/v2.0/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Harbor v2 REST client authenticating with basic auth.
#[derive(Debug, Clone)]
pub struct HarborClient {
    http: Client,
    base: Url,
    username: String,
    password: String,
}

impl HarborClient {
    /// Client for the Harbor instance at `base_url` (e.g. `http://127.0.0.1:18080`).
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self, RegistryError> {
        let mut base = Url::parse(base_url).map_err(|e| RegistryError::Http {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RegistryError::Http {
                url: base_url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            base,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, RegistryError> {
        self.base
            .join(API_PREFIX)
            .and_then(|api| api.join(path))
            .map_err(|e| RegistryError::Http {
                url: format!("{}{API_PREFIX}{path}", self.base),
                reason: e.to_string(),
            })
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
    }

    async fn send(&self, method: Method, url: Url, body: Option<&serde_json::Value>) -> Result<Response, RegistryError> {
        debug!(method = %method, path = %url.path(), "harbor request");
        let mut request = self.request(method, url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(|e| RegistryError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Accept `ok` plus 409 Conflict as success for creates.
    async fn expect_created(response: Response, method: &str) -> Result<(), RegistryError> {
        let status = response.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            return Ok(());
        }
        Err(status_error(method, response).await)
    }
}

async fn status_error(method: &str, response: Response) -> RegistryError {
    let status = response.status().as_u16();
    let path = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    RegistryError::Status {
        method: method.to_string(),
        path,
        status,
        body: body.chars().take(500).collect(),
    }
}

fn to_json<T: serde::Serialize>(value: &T, path: &str) -> Result<serde_json::Value, RegistryError> {
    serde_json::to_value(value).map_err(|e| RegistryError::Decode {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl RegistryApi for HarborClient {
    async fn ping(&self) -> Result<(), RegistryError> {
        let response = self.send(Method::GET, self.url("ping")?, None).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error("GET", response).await)
        }
    }

    async fn find_registry(&self, name: &str) -> Result<Option<RegistryEndpoint>, RegistryError> {
        let mut url = self.url("registries")?;
        url.query_pairs_mut().append_pair("q", &format!("name={name}"));

        let response = self.send(Method::GET, url, None).await?;
        if !response.status().is_success() {
            return Err(status_error("GET", response).await);
        }
        let registries: Vec<RegistryEndpoint> =
            response.json().await.map_err(|e| RegistryError::Decode {
                path: "/api/v2.0/registries".to_string(),
                reason: e.to_string(),
            })?;
        // `q=name=` is a fuzzy match
        Ok(registries.into_iter().find(|r| r.name == name))
    }

    async fn create_registry(&self, registry: &NewRegistry) -> Result<(), RegistryError> {
        let body = to_json(registry, "/api/v2.0/registries")?;
        let response = self
            .send(Method::POST, self.url("registries")?, Some(&body))
            .await?;
        Self::expect_created(response, "POST").await
    }

    async fn project_exists(&self, name: &str) -> Result<bool, RegistryError> {
        let mut url = self.url("projects")?;
        url.query_pairs_mut().append_pair("project_name", name);

        let response = self.send(Method::HEAD, url, None).await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error("HEAD", response).await),
        }
    }

    async fn create_project(&self, project: &NewProject) -> Result<(), RegistryError> {
        let body = to_json(project, "/api/v2.0/projects")?;
        let response = self
            .send(Method::POST, self.url("projects")?, Some(&body))
            .await?;
        Self::expect_created(response, "POST").await
    }
}

/// Connects [`HarborClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HarborConnector;

impl RegistryConnector for HarborConnector {
    fn connect(
        &self,
        base_url: &str,
        username: &str,
        password: &str,
    ) -> Result<Arc<dyn RegistryApi>, RegistryError> {
        Ok(Arc::new(HarborClient::new(base_url, username, password)?))
    }
}
