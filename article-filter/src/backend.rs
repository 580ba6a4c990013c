use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use utils_common::{Category, ContentKind, SearchEnvelope, Tag};

use crate::error::FetchError;

/// 内容后端 - 搜索接口和分类、标签列表
///
/// `search` 收到的查询串由 [`crate::codec::encode_explicit`] 生成。
/// 实现方在 `cancel` 触发后应尽快返回 [`FetchError::Cancelled`]。
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(
        &self,
        kind: ContentKind,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<SearchEnvelope, FetchError>;

    async fn categories(&self) -> Result<Vec<Category>, FetchError>;

    async fn tags(&self) -> Result<Vec<Tag>, FetchError>;
}
