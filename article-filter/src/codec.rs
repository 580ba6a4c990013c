//! 筛选状态与地址栏查询串之间的转换
//!
//! 编码只写出非默认字段，得到最短且唯一的查询串；解码是全函数，
//! 任何无法识别的值都会被丢弃或回退到默认值，永远不会报错。

use url::form_urlencoded;
use utils_common::ContentKind;

use crate::models::{FilterState, PageState, SortOrder, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

pub const KEY_QUERY: &str = "q";
pub const KEY_CATEGORY_IDS: &str = "categoryIds";
/// 旧版分享链接里的单个分类参数
pub const KEY_LEGACY_CATEGORY_ID: &str = "categoryId";
pub const KEY_TAG_IDS: &str = "tagIds";
pub const KEY_SORT: &str = "sort";
pub const KEY_LOCALE: &str = "locale";
pub const KEY_PAGE: &str = "page";
pub const KEY_PAGE_SIZE: &str = "pageSize";

/// 编解码时使用的默认值
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodecDefaults {
    pub kind: ContentKind,
    pub sort: SortOrder,
    pub page_size: u32,
}

impl CodecDefaults {
    pub fn for_kind(kind: ContentKind) -> Self {
        Self {
            kind,
            sort: SortOrder::default_for(kind),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// 默认的筛选条件和分页
    pub fn initial_state(&self) -> (FilterState, PageState) {
        (
            FilterState::with_sort(self.sort),
            PageState::first(self.page_size),
        )
    }
}

impl Default for CodecDefaults {
    fn default() -> Self {
        Self::for_kind(ContentKind::default())
    }
}

/// 编码为地址栏查询串（不带 `?`），省略空值和默认值
pub fn encode(filter: &FilterState, page: &PageState, defaults: &CodecDefaults) -> String {
    join_pairs(&pairs(filter, page, Some(defaults)))
}

/// 编码为完整查询串，所有字段都写出，用于请求后端和计算请求指纹
pub fn encode_explicit(filter: &FilterState, page: &PageState) -> String {
    join_pairs(&pairs(filter, page, None))
}

/// 拼接路径和查询串
pub fn to_location(path: &str, query: &str) -> String {
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    }
}

/// 取出地址中的查询串部分，去掉 `?` 和 `#` 片段
pub fn query_part(location: &str) -> &str {
    let without_fragment = location.split('#').next().unwrap_or_default();
    match without_fragment.split_once('?') {
        Some((_, query)) => query,
        None if without_fragment.contains('=') => without_fragment,
        None => "",
    }
}

/// 解码查询串，可以带或不带前导 `?`，也可以是完整的 `路径?查询串`
pub fn decode(input: &str, defaults: &CodecDefaults) -> (FilterState, PageState) {
    let (mut filter, mut page) = defaults.initial_state();

    for (key, value) in form_urlencoded::parse(query_part(input.trim()).as_bytes()) {
        match base_key(&key) {
            KEY_QUERY => filter.query = non_blank(&value),
            KEY_CATEGORY_IDS | KEY_LEGACY_CATEGORY_ID => {
                for id in parse_ids(&value) {
                    if !filter.category_ids.contains(&id) {
                        filter.category_ids.push(id);
                    }
                }
            }
            KEY_TAG_IDS => filter.tag_ids.extend(parse_ids(&value)),
            KEY_SORT => {
                filter.sort = SortOrder::parse(&value)
                    .filter(|sort| sort.supported_by(defaults.kind))
                    .unwrap_or(defaults.sort);
            }
            KEY_LOCALE => filter.locale = non_blank(&value),
            KEY_PAGE => {
                page.page = value
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|page| *page >= 1)
                    .unwrap_or(1);
            }
            KEY_PAGE_SIZE => {
                page.page_size = value
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|size| (1..=MAX_PAGE_SIZE).contains(size))
                    .unwrap_or(defaults.page_size);
            }
            _ => {}
        }
    }

    (filter, page)
}

fn pairs(
    filter: &FilterState,
    page: &PageState,
    defaults: Option<&CodecDefaults>,
) -> Vec<(&'static str, String)> {
    let explicit = defaults.is_none();
    let mut pairs = Vec::new();

    if let Some(query) = filter.query.as_deref().and_then(non_blank) {
        pairs.push((KEY_QUERY, encode_component(&query)));
    }
    if !filter.category_ids.is_empty() {
        pairs.push((KEY_CATEGORY_IDS, join_ids(filter.category_ids.iter())));
    }
    if !filter.tag_ids.is_empty() {
        pairs.push((KEY_TAG_IDS, join_ids(filter.tag_ids.iter())));
    }
    if explicit || defaults.is_some_and(|d| d.sort != filter.sort) {
        pairs.push((KEY_SORT, filter.sort.as_str().to_string()));
    }
    if let Some(locale) = filter.locale.as_deref().and_then(non_blank) {
        pairs.push((KEY_LOCALE, encode_component(&locale)));
    }
    if explicit || page.page != 1 {
        pairs.push((KEY_PAGE, page.page.to_string()));
    }
    if explicit || defaults.is_some_and(|d| d.page_size != page.page_size) {
        pairs.push((KEY_PAGE_SIZE, page.page_size.to_string()));
    }

    pairs
}

fn join_pairs(pairs: &[(&'static str, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn join_ids<'a>(ids: impl Iterator<Item = &'a u64>) -> String {
    ids.map(u64::to_string).collect::<Vec<_>>().join(",")
}

fn encode_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// `categoryIds[]`、`categoryIds[0]` 都按 `categoryIds` 处理
fn base_key(key: &str) -> &str {
    key.split_once('[').map_or(key, |(base, _)| base)
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// 逗号分隔的ID，非数字和 0 被丢弃
fn parse_ids(value: &str) -> impl Iterator<Item = u64> + '_ {
    value
        .split(',')
        .filter_map(|part| part.trim().parse::<u64>().ok())
        .filter(|id| *id > 0)
}
