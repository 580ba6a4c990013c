//! 文章 / 菜谱列表页的分面筛选
//!
//! 筛选状态仓库、查询串编解码、防抖和过期请求丢弃、地址栏双向同步。
//! 核心部分不做 IO，由 tokio 会话（`runtime` 特性）或页面脚本（wasm）驱动。

pub mod backend;
pub mod category;
pub mod codec;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod fingerprint;
pub mod history;
pub mod models;
pub mod reconcile;
pub mod store;

#[cfg(feature = "runtime")]
pub mod session;

#[cfg(target_arch = "wasm32")]
mod js;

pub use backend::SearchBackend;
pub use category::{CategoryNode, CategoryTree};
pub use codec::CodecDefaults;
pub use controller::{SearchSync, SearchView};
pub use dispatcher::{Completion, DispatcherConfig, FetchTicket, ResultView, TicketId};
pub use error::{FetchError, FilterError};
pub use fingerprint::RequestFingerprint;
pub use history::{History, MemoryHistory};
pub use models::{FilterState, PageState, SortOrder, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use reconcile::{Inbound, UrlReconciler};
pub use store::{ChangeOrigin, FilterStore, StoreChange};

#[cfg(feature = "runtime")]
pub use session::SessionHandle;

#[cfg(target_arch = "wasm32")]
pub use history::BrowserHistory;
#[cfg(target_arch = "wasm32")]
pub use js::SearchSyncJS;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// 初始化函数 - 设置错误处理和日志输出
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();
}

/// 版本信息
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
