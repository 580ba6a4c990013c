use thiserror::Error;
use utils_common::ContentKind;

use crate::models::SortOrder;

/// 筛选状态操作错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("页码必须大于等于 1，实际为 {0}")]
    InvalidPage(u32),

    #[error("每页条数必须在 1 到 {max} 之间，实际为 {value}")]
    InvalidPageSize { value: u32, max: u32 },

    #[error("排序方式 {sort} 不适用于 {kind}")]
    UnsupportedSort { sort: SortOrder, kind: ContentKind },

    #[error("写入浏览器地址失败: {0}")]
    History(String),

    #[error("搜索会话已结束")]
    SessionClosed,
}

/// 请求后端失败的原因
///
/// 同步逻辑只区分成功和失败，分类仅用于展示和日志。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("网络错误: {0}")]
    Network(String),

    #[error("请求超时")]
    Timeout,

    #[error("未登录或凭证已失效 (401)")]
    Authentication,

    #[error("没有访问权限 (403)")]
    Authorization,

    #[error("资源不存在 (404): {0}")]
    NotFound(String),

    #[error("接口返回错误 ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("响应解析失败: {0}")]
    Decode(String),

    #[error("请求已取消")]
    Cancelled,
}

impl FetchError {
    /// 按 HTTP 状态码归类非 2xx 响应
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => FetchError::Authentication,
            403 => FetchError::Authorization,
            404 => FetchError::NotFound(message),
            408 | 504 => FetchError::Timeout,
            _ => FetchError::Api { status, message },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}
