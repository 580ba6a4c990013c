use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 内容类型 - 决定后端接口路径和可用的排序方式
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// 博客文章
    #[default]
    Articles,
    /// 菜谱
    Recipes,
}

impl ContentKind {
    /// 后端接口中的路径片段
    pub const fn path_segment(self) -> &'static str {
        match self {
            ContentKind::Articles => "articles",
            ContentKind::Recipes => "recipes",
        }
    }

    /// 从路径片段解析内容类型
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "articles" | "article" => Some(ContentKind::Articles),
            "recipes" | "recipe" => Some(ContentKind::Recipes),
            _ => None,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// 内容条目 - 一条文章或菜谱的列表展示信息
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    /// 条目ID
    pub id: u64,
    /// 标题
    pub title: String,
    /// URL别名
    #[serde(default)]
    pub slug: String,
    /// 摘要
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    /// 发布时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// 封面图地址
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    /// 浏览次数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    /// 所属分类
    #[serde(default)]
    pub category_ids: Vec<u64>,
    /// 所属标签
    #[serde(default)]
    pub tag_ids: Vec<u64>,
    /// 其余字段（菜谱的烹饪时间等），原样保留给页面渲染
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ContentItem {
    /// 用媒体地址规范化封面图，无法识别的地址会被清空
    pub fn with_normalized_cover(mut self, media_base: &url::Url) -> Self {
        self.cover_image = self
            .cover_image
            .as_deref()
            .and_then(|raw| crate::media::normalize_image_url(raw, media_base));
        self
    }
}

/// 分类 - 后端返回的扁平结构，通过 parentId 组成树
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// 分类ID
    pub id: u64,
    /// 分类名称
    pub name: String,
    /// URL别名
    #[serde(default)]
    pub slug: String,
    /// 父分类ID
    #[serde(default)]
    pub parent_id: Option<u64>,
}

/// 标签
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// 标签ID
    pub id: u64,
    /// 标签名称
    pub name: String,
    /// URL别名
    #[serde(default)]
    pub slug: String,
}

/// 根据总数和每页条数计算总页数
pub fn page_count_for(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    u32::try_from(total.div_ceil(u64::from(page_size))).unwrap_or(u32::MAX)
}

/// 分页信息
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// 当前页码
    pub page: u32,
    /// 每页条数
    pub page_size: u32,
    /// 总页数
    #[serde(default)]
    pub page_count: u32,
    /// 结果总数
    pub total: u64,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32, total: u64) -> Self {
        Self {
            page,
            page_size,
            page_count: page_count_for(total, page_size),
            total,
        }
    }

    /// 总页数是否与总数和每页条数一致
    pub fn is_consistent(&self) -> bool {
        self.page_count == page_count_for(self.total, self.page_size)
    }
}

/// 分面类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FacetKind {
    Category,
    Tag,
}

impl FacetKind {
    /// 接口返回中的字段名
    pub const fn wire_key(self) -> &'static str {
        match self {
            FacetKind::Category => "categories",
            FacetKind::Tag => "tags",
        }
    }

    pub fn from_wire_key(key: &str) -> Option<Self> {
        match key {
            "categories" | "category" => Some(FacetKind::Category),
            "tags" | "tag" => Some(FacetKind::Tag),
            _ => None,
        }
    }
}

/// 分面选项及其在当前筛选条件下的结果数
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FacetCount {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub count: u64,
}

/// 分面统计 - 每种分面对应一组有序的选项
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Facets(BTreeMap<FacetKind, Vec<FacetCount>>);

impl Facets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: FacetKind, options: Vec<FacetCount>) {
        self.0.insert(kind, options);
    }

    /// 获取某种分面的选项，缺失时返回空切片
    pub fn get(&self, kind: FacetKind) -> &[FacetCount] {
        self.0.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FacetKind, &[FacetCount])> {
        self.0.iter().map(|(kind, options)| (*kind, options.as_slice()))
    }
}

impl Serialize for Facets {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (kind, options) in &self.0 {
            map.serialize_entry(kind.wire_key(), options)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Facets {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // 未知的分面字段和格式不对的分面直接忽略
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut facets = Facets::new();
        for (key, value) in raw {
            let Some(kind) = FacetKind::from_wire_key(&key) else {
                continue;
            };
            if let Ok(options) = serde_json::from_value::<Vec<FacetCount>>(value) {
                facets.insert(kind, options);
            }
        }
        Ok(facets)
    }
}

/// 搜索结果 - 一页条目、分页信息和分面统计，整体替换
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub items: Vec<ContentItem>,
    pub pagination: Pagination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<Facets>,
}

/// 搜索接口响应的元数据部分
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SearchMeta {
    pub pagination: Pagination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<Facets>,
}

/// 搜索接口响应: `{ data: [...], meta: { pagination, facets? } }`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SearchEnvelope {
    pub data: Vec<ContentItem>,
    pub meta: SearchMeta,
}

/// 列表接口响应: `{ data: [...] }`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ListEnvelope<T> {
    pub data: Vec<T>,
}
