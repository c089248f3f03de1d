//! Minimal Dolibarr REST client (read-only).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::Value;
use thiserror::Error;

const API_PATH: &str = "/api/index.php/";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid JSON from Dolibarr: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Dolibarr answered {status} for {resource}")]
    Status { resource: String, status: u16 },

    #[error("invalid API key")]
    InvalidApiKey,
}

/// Anything that can list Dolibarr resources. The importer only needs this.
#[async_trait]
pub trait DolibarrSource: Send + Sync {
    async fn get_list(&self, resource: &str, params: &[(&str, &str)]) -> Result<Vec<Value>, ClientError>;
}

#[derive(Debug, Clone)]
pub struct DolibarrClient {
    base_url: String,
    client: reqwest::Client,
}

impl DolibarrClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key.trim()).map_err(|_| ClientError::InvalidApiKey)?;
        headers.insert("DOLAPIKEY", key);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, resource: &str) -> String {
        format!("{}{API_PATH}{}", self.base_url, resource.trim_start_matches('/'))
    }

    /// One-item listing of third parties; succeeds when the URL and key are usable.
    pub async fn test_connection(&self) -> Result<(), ClientError> {
        self.get_list("thirdparties", &[("limit", "1"), ("sortfield", "t.rowid")])
            .await
            .map(|_| ())
    }
}

/// Dolibarr wraps "no result" and errors in several shapes; normalise to a list.
pub(crate) fn items_from_body(body: &str) -> Result<Vec<Value>, ClientError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(body)? {
        Value::Array(items) => Ok(items),
        Value::Object(map) if map.contains_key("error") => Ok(Vec::new()),
        obj @ Value::Object(_) => Ok(vec![obj]),
        _ => Ok(Vec::new()),
    }
}

#[async_trait]
impl DolibarrSource for DolibarrClient {
    async fn get_list(&self, resource: &str, params: &[(&str, &str)]) -> Result<Vec<Value>, ClientError> {
        let resp = self.client.get(self.url(resource)).query(params).send().await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(ClientError::Status {
                resource: resource.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.text().await?;
        items_from_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let c = DolibarrClient::new(" https://erp.example.com/ ", "k").unwrap();
        assert_eq!(c.base_url(), "https://erp.example.com");
        assert_eq!(c.url("thirdparties"), "https://erp.example.com/api/index.php/thirdparties");
    }

    #[test]
    fn body_shapes() {
        assert!(items_from_body("").unwrap().is_empty());
        assert_eq!(items_from_body(r#"[{"id":1},{"id":2}]"#).unwrap().len(), 2);
        assert!(items_from_body(r#"{"error":{"code":404}}"#).unwrap().is_empty());
        assert_eq!(items_from_body(r#"{"id":"7"}"#).unwrap().len(), 1);
        assert!(items_from_body("not json").is_err());
    }
}
