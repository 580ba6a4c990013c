pub mod media;
pub mod models;

// 重新导出常用类型，方便直接使用
pub use media::normalize_image_url;
pub use models::{
    page_count_for, Category, ContentItem, ContentKind, FacetCount, FacetKind, Facets,
    ListEnvelope, Pagination, SearchEnvelope, SearchMeta, SearchResult, Tag,
};
