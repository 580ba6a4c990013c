use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use utils_common::ContentKind;

use crate::error::FilterError;

/// 默认每页条数
pub const DEFAULT_PAGE_SIZE: u32 = 12;
/// 每页条数上限
pub const MAX_PAGE_SIZE: u32 = 100;

/// 排序方式，序列化为接口和地址栏里使用的 `字段:方向` 形式
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    /// 最新发布
    #[default]
    #[serde(rename = "publishedAt:desc")]
    PublishedAtDesc,
    /// 最早发布
    #[serde(rename = "publishedAt:asc")]
    PublishedAtAsc,
    /// 浏览最多（仅文章）
    #[serde(rename = "viewCount:desc")]
    ViewCountDesc,
    /// 标题字母序（仅菜谱）
    #[serde(rename = "title:asc")]
    TitleAsc,
}

const ARTICLE_SORTS: &[SortOrder] = &[
    SortOrder::PublishedAtDesc,
    SortOrder::PublishedAtAsc,
    SortOrder::ViewCountDesc,
];

const RECIPE_SORTS: &[SortOrder] = &[
    SortOrder::PublishedAtDesc,
    SortOrder::PublishedAtAsc,
    SortOrder::TitleAsc,
];

impl SortOrder {
    pub const fn as_str(self) -> &'static str {
        match self {
            SortOrder::PublishedAtDesc => "publishedAt:desc",
            SortOrder::PublishedAtAsc => "publishedAt:asc",
            SortOrder::ViewCountDesc => "viewCount:desc",
            SortOrder::TitleAsc => "title:asc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "publishedAt:desc" => Some(SortOrder::PublishedAtDesc),
            "publishedAt:asc" => Some(SortOrder::PublishedAtAsc),
            "viewCount:desc" => Some(SortOrder::ViewCountDesc),
            "title:asc" => Some(SortOrder::TitleAsc),
            _ => None,
        }
    }

    /// 某种内容可用的排序方式，第一个为默认值
    pub fn options_for(kind: ContentKind) -> &'static [SortOrder] {
        match kind {
            ContentKind::Articles => ARTICLE_SORTS,
            ContentKind::Recipes => RECIPE_SORTS,
        }
    }

    pub fn default_for(kind: ContentKind) -> Self {
        Self::options_for(kind)
            .first()
            .copied()
            .unwrap_or_default()
    }

    pub fn supported_by(self, kind: ContentKind) -> bool {
        Self::options_for(kind).contains(&self)
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 筛选条件 - 驱动一次搜索的全部用户选择
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    /// 搜索关键词
    pub query: Option<String>,
    /// 已选分类，保持选择顺序，不含重复
    pub category_ids: Vec<u64>,
    /// 已选标签
    pub tag_ids: BTreeSet<u64>,
    /// 排序方式
    pub sort: SortOrder,
    /// 语言
    pub locale: Option<String>,
}

impl FilterState {
    /// 只设置排序方式的空筛选条件
    pub fn with_sort(sort: SortOrder) -> Self {
        Self {
            sort,
            ..Self::default()
        }
    }
}

/// 分页状态
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageState {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

impl PageState {
    /// 第一页
    pub const fn first(page_size: u32) -> Self {
        Self { page: 1, page_size }
    }

    pub fn validate_page(page: u32) -> Result<u32, FilterError> {
        if page >= 1 {
            Ok(page)
        } else {
            Err(FilterError::InvalidPage(page))
        }
    }

    pub fn validate_page_size(page_size: u32) -> Result<u32, FilterError> {
        if (1..=MAX_PAGE_SIZE).contains(&page_size) {
            Ok(page_size)
        } else {
            Err(FilterError::InvalidPageSize {
                value: page_size,
                max: MAX_PAGE_SIZE,
            })
        }
    }
}
