use article_filter::{FetchError, SearchBackend};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;
use utils_common::{Category, ContentKind, ListEnvelope, SearchEnvelope, Tag};

use crate::config::{ClientConfig, ConfigError};

/// 错误信息最多保留的字符数
const MAX_ERROR_CHARS: usize = 200;

/// 内容接口客户端
#[derive(Clone, Debug)]
pub struct ContentClient {
    http: Client,
    config: ClientConfig,
}

impl ContentClient {
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        cancel: &CancellationToken,
    ) -> Result<T, FetchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%url, "请求已取消");
                Err(FetchError::Cancelled)
            }
            result = self.fetch(url.clone()) => result,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        let started = Instant::now();
        let mut request = self.http.get(url.clone()).header(ACCEPT, "application/json");
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            warn!(method = "GET", %url, error = %e, "请求发送失败");
            transport_error(e)
        })?;
        let status = response.status();
        debug!(
            method = "GET",
            %url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "收到响应"
        );

        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!(%url, error = %e, "读取错误响应失败");
                    String::new()
                }
            };
            let error = FetchError::from_status(status.as_u16(), error_message(status, &body));
            warn!(%url, %error, "接口返回错误");
            return Err(error);
        }

        let body = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&body).map_err(|e| {
            warn!(%url, error = %e, "响应解析失败");
            FetchError::Decode(e.to_string())
        })
    }

    fn endpoint(result: Result<Url, url::ParseError>) -> Result<Url, FetchError> {
        result.map_err(|e| FetchError::Network(format!("接口地址无效: {}", e)))
    }
}

#[async_trait]
impl SearchBackend for ContentClient {
    async fn search(
        &self,
        kind: ContentKind,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<SearchEnvelope, FetchError> {
        let url = Self::endpoint(self.config.search_url(kind, query))?;
        let envelope: SearchEnvelope = self.get_json(url, &cancel).await?;
        let media_url = &self.config.media_url;
        Ok(SearchEnvelope {
            data: envelope
                .data
                .into_iter()
                .map(|item| item.with_normalized_cover(media_url))
                .collect(),
            meta: envelope.meta,
        })
    }

    async fn categories(&self) -> Result<Vec<Category>, FetchError> {
        let url = Self::endpoint(self.config.categories_url())?;
        let envelope: ListEnvelope<Category> = self.get_json(url, &CancellationToken::new()).await?;
        Ok(envelope.data)
    }

    async fn tags(&self) -> Result<Vec<Tag>, FetchError> {
        let url = Self::endpoint(self.config.tags_url())?;
        let envelope: ListEnvelope<Tag> = self.get_json(url, &CancellationToken::new()).await?;
        Ok(envelope.data)
    }
}

fn transport_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else if error.is_decode() {
        FetchError::Decode(error.to_string())
    } else {
        FetchError::Network(error.to_string())
    }
}

/// 取出错误响应里的说明：`{ error: { message } }`、`{ message }` 或原始文本
fn error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.get("message"))
                .and_then(|message| message.as_str())
                .map(str::to_string)
        });
    let message = from_json.unwrap_or_else(|| body.trim().chars().take(MAX_ERROR_CHARS).collect());
    if message.is_empty() {
        status.canonical_reason().unwrap_or("未知错误").to_string()
    } else {
        message
    }
}
