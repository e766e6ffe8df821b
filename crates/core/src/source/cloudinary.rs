//! Cloudinary search API lister.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::credentials::SourceConfig;
use crate::job::{DateRange, FileDescriptor};

use super::{FilePage, ListerError, SourceConnector, SourceLister};

/// Results requested per search page.
pub const PAGE_SIZE: u32 = 500;

const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";

/// Search expression selecting everything created within `range`.
pub fn search_expression(range: &DateRange) -> String {
    format!(
        "created_at>=\"{}\" AND created_at<=\"{}\"",
        range.start_datetime().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
        range.end_datetime().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
    )
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    expression: String,
    max_results: u32,
    sort_by: Vec<SortField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_cursor: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SortField {
    created_at: &'static str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    resources: Vec<Resource>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    public_id: String,
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    format: Option<String>,
}

impl From<Resource> for FileDescriptor {
    fn from(r: Resource) -> Self {
        FileDescriptor {
            source_url: r.secure_url.or(r.url).unwrap_or_default(),
            public_id: r.public_id,
            bytes: r.bytes,
            format: r.format.unwrap_or_default(),
        }
    }
}

/// Lists one cloud's resources through the search API.
pub struct CloudinaryLister {
    client: Client,
    config: SourceConfig,
}

impl CloudinaryLister {
    pub fn new(client: Client, config: SourceConfig) -> Result<Self, ListerError> {
        if config.cloud_name.is_empty() || config.api_key.is_empty() {
            return Err(ListerError::InvalidConfig(
                "cloud name and api key are required".to_string(),
            ));
        }
        Ok(Self { client, config })
    }

    fn search_url(&self) -> String {
        format!(
            "{}/v1_1/{}/resources/search",
            self.config
                .api_base
                .as_deref()
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/'),
            urlencoding::encode(&self.config.cloud_name)
        )
    }
}

#[async_trait]
impl SourceLister for CloudinaryLister {
    async fn list_page(
        &self,
        range: &DateRange,
        cursor: Option<&str>,
    ) -> Result<FilePage, ListerError> {
        let request = SearchRequest {
            expression: search_expression(range),
            max_results: PAGE_SIZE,
            sort_by: vec![SortField { created_at: "desc" }],
            next_cursor: cursor,
        };
        debug!(expression = %request.expression, cursor = ?cursor, "Searching source");

        let response = self
            .client
            .post(self.search_url())
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .json(&request)
            .send()
            .await
            .map_err(|e| ListerError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ListerError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ListerError::Parse(e.to_string()))?;

        Ok(FilePage {
            files: parsed
                .resources
                .into_iter()
                .map(FileDescriptor::from)
                .collect(),
            next_cursor: parsed.next_cursor,
        })
    }
}

/// Builds a [`CloudinaryLister`] per account, sharing one HTTP client.
pub struct CloudinaryConnector {
    client: Client,
}

impl Default for CloudinaryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl CloudinaryConnector {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

impl SourceConnector for CloudinaryConnector {
    fn connect(&self, config: &SourceConfig) -> Result<Arc<dyn SourceLister>, ListerError> {
        Ok(Arc::new(CloudinaryLister::new(
            self.client.clone(),
            config.clone(),
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn config() -> SourceConfig {
        SourceConfig {
            cloud_name: "demo cloud".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            api_base: Some("http://localhost:9999/".to_string()),
        }
    }

    #[test]
    fn test_search_expression_covers_whole_days() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        assert_eq!(
            search_expression(&range),
            "created_at>=\"2024-01-01T00:00:00.000Z\" AND created_at<=\"2024-01-31T23:59:59.999Z\""
        );
    }

    #[test]
    fn test_search_url() {
        let lister = CloudinaryLister::new(Client::new(), config()).unwrap();
        assert_eq!(
            lister.search_url(),
            "http://localhost:9999/v1_1/demo%20cloud/resources/search"
        );
    }

    #[test]
    fn test_resource_conversion() {
        let json = r#"{
            "resources": [
                {"public_id": "a/b", "secure_url": "https://res/a/b.png", "bytes": 42, "format": "png"},
                {"public_id": "c", "url": "http://res/c"}
            ],
            "next_cursor": "abc"
        }"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.next_cursor.as_deref(), Some("abc"));

        let files: Vec<FileDescriptor> = parsed
            .resources
            .into_iter()
            .map(FileDescriptor::from)
            .collect();
        assert_eq!(files[0].source_url, "https://res/a/b.png");
        assert_eq!(files[0].bytes, 42);
        assert_eq!(files[1].source_url, "http://res/c");
        assert_eq!(files[1].format, "");
    }

    #[test]
    fn test_request_body_shape() {
        let request = SearchRequest {
            expression: "x".to_string(),
            max_results: PAGE_SIZE,
            sort_by: vec![SortField { created_at: "desc" }],
            next_cursor: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["max_results"], 500);
        assert_eq!(json["sort_by"][0]["created_at"], "desc");
        assert!(json.get("next_cursor").is_none());
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let mut cfg = config();
        cfg.api_key.clear();
        assert!(matches!(
            CloudinaryLister::new(Client::new(), cfg),
            Err(ListerError::InvalidConfig(_))
        ));
    }
}
