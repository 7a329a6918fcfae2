// src/retrieval/newsapi.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::{NewsSource, RawArticle, LANGUAGE, PAGE_SIZE};
use crate::error::RetrievalError;

pub const DEFAULT_BASE_URL: &str = "https://newsapi.org";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    total_results: Option<u64>,
    #[serde(default)]
    articles: Vec<RawArticle>,
    code: Option<String>,
    message: Option<String>,
}

/// NewsAPI `/v2/everything` search, newest first.
#[derive(Clone)]
pub struct NewsApiSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl NewsApiSource {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("subject-news-tracker/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/v2/everything", self.base_url)
    }
}

#[async_trait]
impl NewsSource for NewsApiSource {
    async fn search(
        &self,
        query: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawArticle>, RetrievalError> {
        let Some(key) = &self.api_key else {
            return Err(RetrievalError::MissingCredential);
        };

        let mut params: Vec<(&str, String)> = vec![
            ("q", query.to_string()),
            ("sortBy", "publishedAt".to_string()),
            ("pageSize", PAGE_SIZE.to_string()),
            ("language", LANGUAGE.to_string()),
        ];
        if let Some(from) = since {
            params.push(("from", from.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }

        let resp = self
            .client
            .get(self.endpoint())
            .header("X-Api-Key", key)
            .query(&params)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            // NewsAPI reports errors as JSON with a code; keep it when present.
            if let Ok(parsed) = serde_json::from_str::<EverythingResponse>(&body) {
                if let (Some(code), Some(message)) = (parsed.code, parsed.message) {
                    return Err(RetrievalError::Api { code, message });
                }
            }
            return Err(RetrievalError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let parsed: EverythingResponse = serde_json::from_str(&body)?;
        if parsed.status != "ok" {
            return Err(RetrievalError::Api {
                code: parsed.code.unwrap_or_else(|| "unknown".to_string()),
                message: parsed.message.unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        tracing::debug!(
            target: "retrieval",
            %query,
            returned = parsed.articles.len(),
            total = parsed.total_results.unwrap_or_default(),
            "newsapi search"
        );
        Ok(parsed.articles)
    }

    fn name(&self) -> &'static str {
        "newsapi"
    }
}
