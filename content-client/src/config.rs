use std::time::Duration;
use thiserror::Error;
use url::Url;
use utils_common::ContentKind;

pub const ENV_API_URL: &str = "CONTENT_API_URL";
pub const ENV_API_TOKEN: &str = "CONTENT_API_TOKEN";
pub const ENV_TIMEOUT_SECS: &str = "CONTENT_API_TIMEOUT_SECS";
pub const ENV_MEDIA_URL: &str = "CONTENT_MEDIA_URL";

pub const DEFAULT_API_URL: &str = "http://localhost:1337";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} 不是合法的地址 `{value}`: {source}")]
    InvalidUrl {
        var: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{var} 必须是正整数秒数，实际为 `{value}`")]
    InvalidTimeout { var: &'static str, value: String },

    #[error("HTTP 客户端初始化失败: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// 内容接口客户端配置
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// 接口根地址，路径总是以 `/` 结尾
    pub api_url: Url,
    /// Bearer 令牌
    pub token: Option<String>,
    pub timeout: Duration,
    /// 相对图片路径的基准地址
    pub media_url: Url,
}

impl ClientConfig {
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        let api_url = parse_base(ENV_API_URL, api_url)?;
        Ok(Self {
            media_url: api_url.clone(),
            api_url,
            token: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// 从环境变量读取配置
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源读取配置，空值视为未设置
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut config = Self::new(get(ENV_API_URL).as_deref().unwrap_or(DEFAULT_API_URL))?;
        config.token = get(ENV_API_TOKEN);
        if let Some(value) = get(ENV_TIMEOUT_SECS) {
            let seconds = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|seconds| *seconds > 0)
                .ok_or(ConfigError::InvalidTimeout {
                    var: ENV_TIMEOUT_SECS,
                    value: value.clone(),
                })?;
            config.timeout = Duration::from_secs(seconds);
        }
        if let Some(value) = get(ENV_MEDIA_URL) {
            config.media_url = parse_base(ENV_MEDIA_URL, &value)?;
        }
        Ok(config)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_media_url(mut self, media_url: &str) -> Result<Self, ConfigError> {
        self.media_url = parse_base(ENV_MEDIA_URL, media_url)?;
        Ok(self)
    }

    /// `GET /api/{kind}/search?{query}`
    pub fn search_url(&self, kind: ContentKind, query: &str) -> Result<Url, url::ParseError> {
        let mut url = self.api_url.join(&format!("api/{}/search", kind.path_segment()))?;
        url.set_query((!query.is_empty()).then_some(query));
        Ok(url)
    }

    pub fn categories_url(&self) -> Result<Url, url::ParseError> {
        self.api_url.join("api/categories")
    }

    pub fn tags_url(&self) -> Result<Url, url::ParseError> {
        self.api_url.join("api/tags")
    }
}

/// 解析根地址并补齐结尾的 `/`，否则 `join` 会替换掉最后一段路径
fn parse_base(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl {
        var,
        value: value.to_string(),
        source,
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
