use std::fmt;
use utils_common::ContentKind;

use crate::codec;
use crate::models::{FilterState, PageState};

/// 请求指纹 - 请求参数的确定性序列化，用于合并重复请求
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    pub fn compute(kind: ContentKind, filter: &FilterState, page: &PageState) -> Self {
        Self::from_query(kind, &codec::encode_explicit(filter, page))
    }

    /// 由已经完整编码的查询串构造
    pub fn from_query(kind: ContentKind, explicit_query: &str) -> Self {
        Self(format!("{kind}?{explicit_query}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 稳定的 64 位 FNV-1a 哈希，日志里用作短标识
    pub fn short_hash(&self) -> u64 {
        const FNV_OFFSET: u64 = 0xcbf29ce484222325;
        const FNV_PRIME: u64 = 0x00000100000001b3;

        let mut hash = FNV_OFFSET;
        for byte in self.0.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.short_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SortOrder;

    #[test]
    fn identical_state_gives_identical_fingerprint() {
        let filter = FilterState {
            query: Some("蛋糕".to_string()),
            tag_ids: [3, 1].into(),
            ..FilterState::default()
        };
        let page = PageState::default();
        let a = RequestFingerprint::compute(ContentKind::Recipes, &filter, &page);
        let b = RequestFingerprint::compute(ContentKind::Recipes, &filter.clone(), &page);
        assert_eq!(a, b);
        assert_eq!(a.short_hash(), b.short_hash());
        assert!(a.as_str().starts_with("recipes?q="));
    }

    #[test]
    fn kind_page_and_sort_change_the_fingerprint() {
        let filter = FilterState::default();
        let page = PageState::default();
        let base = RequestFingerprint::compute(ContentKind::Articles, &filter, &page);

        let other_kind = RequestFingerprint::compute(ContentKind::Recipes, &filter, &page);
        let other_page =
            RequestFingerprint::compute(ContentKind::Articles, &filter, &PageState { page: 2, ..page });
        let other_sort = RequestFingerprint::compute(
            ContentKind::Articles,
            &FilterState::with_sort(SortOrder::PublishedAtAsc),
            &page,
        );

        assert_ne!(base, other_kind);
        assert_ne!(base, other_page);
        assert_ne!(base, other_sort);
        assert_eq!(base.to_string().len(), 16);
    }
}
