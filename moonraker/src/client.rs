use reqwest::StatusCode;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::{KLIPPY_READY, MoonrakerError};

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerInfo {
    pub klippy_state: String,
}

impl ServerInfo {
    pub fn is_ready(&self) -> bool {
        self.klippy_state == KLIPPY_READY
    }
}

#[derive(Deserialize, Default)]
struct ObjectsQuery {
    #[serde(default)]
    status: QueriedObjects,
}

#[derive(Deserialize, Default)]
struct QueriedObjects {
    #[serde(default)]
    toolhead: QueriedToolhead,
}

#[derive(Deserialize, Default)]
struct QueriedToolhead {
    #[serde(default)]
    homed_axes: String,
}

#[derive(Deserialize)]
struct DatabaseItem {
    value: Value,
}

#[derive(Serialize)]
struct DatabasePost<'a> {
    namespace: &'a str,
    key: &'a str,
    value: &'a Value,
}

#[derive(Debug, Clone)]
pub struct MoonrakerClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl MoonrakerClient {
    pub fn new(endpoint: &str) -> Result<Self, MoonrakerError> {
        let mut endpoint = Url::parse(endpoint)?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(MoonrakerError::Endpoint {
                message: format!("unsupported scheme '{}'", endpoint.scheme()),
            });
        }

        // Joining relative paths needs a trailing slash or the last segment is replaced.
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
        })
    }

    pub fn server_info_url(&self) -> Result<Url, MoonrakerError> {
        Ok(self.endpoint.join("server/info")?)
    }

    pub fn toolhead_query_url(&self) -> Result<Url, MoonrakerError> {
        Ok(self.endpoint.join("printer/objects/query?toolhead")?)
    }

    pub fn database_url(&self) -> Result<Url, MoonrakerError> {
        Ok(self.endpoint.join("server/database/item")?)
    }

    pub fn websocket_url(&self) -> Result<Url, MoonrakerError> {
        let mut url = self.endpoint.join("websocket")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };

        url.set_scheme(scheme).map_err(|_| MoonrakerError::Endpoint {
            message: format!("cannot derive websocket url from {}", self.endpoint),
        })?;

        Ok(url)
    }

    pub async fn server_info(&self) -> Result<ServerInfo, MoonrakerError> {
        self.get_result(self.server_info_url()?).await
    }

    pub async fn klippy_ready(&self) -> Result<bool, MoonrakerError> {
        Ok(self.server_info().await?.is_ready())
    }

    pub async fn query_homed_axes(&self) -> Result<String, MoonrakerError> {
        let query: ObjectsQuery = self.get_result(self.toolhead_query_url()?).await?;
        Ok(query.status.toolhead.homed_axes)
    }

    pub async fn database_get_item(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<Value>, MoonrakerError> {
        let mut url = self.database_url()?;
        url.query_pairs_mut()
            .append_pair("namespace", namespace)
            .append_pair("key", key);

        match self.get_result::<DatabaseItem>(url).await {
            Ok(item) => Ok(Some(item.value)),
            Err(MoonrakerError::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn database_post_item(
        &self,
        namespace: &str,
        key: &str,
        value: &Value,
    ) -> Result<(), MoonrakerError> {
        let url = self.database_url()?;
        let body = DatabasePost {
            namespace,
            key,
            value,
        };

        let response = self
            .http
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|source| MoonrakerError::Transport {
                url: url.to_string(),
                source,
            })?;

        check_status(&url, response.status())
    }

    async fn get_result<T: DeserializeOwned>(&self, url: Url) -> Result<T, MoonrakerError> {
        let response =
            self.http
                .get(url.clone())
                .send()
                .await
                .map_err(|source| MoonrakerError::Transport {
                    url: url.to_string(),
                    source,
                })?;

        check_status(&url, response.status())?;

        let body = response
            .bytes()
            .await
            .map_err(|source| MoonrakerError::Transport {
                url: url.to_string(),
                source,
            })?;

        let envelope: Envelope<T> = serde_json::from_slice(&body)?;
        Ok(envelope.result)
    }
}

fn check_status(url: &Url, status: StatusCode) -> Result<(), MoonrakerError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(MoonrakerError::Status {
            url: url.to_string(),
            status,
        })
    }
}
