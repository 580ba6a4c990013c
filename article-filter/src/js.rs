use serde::Serialize;
use std::time::Duration;
use tracing::warn;
use utils_common::{Category, ContentKind, SearchEnvelope};
use wasm_bindgen::prelude::*;

use crate::category::CategoryTree;
use crate::controller::SearchSync;
use crate::dispatcher::{Completion, FetchTicket, TicketId};
use crate::error::FetchError;
use crate::history::{BrowserHistory, History};
use crate::models::SortOrder;

/// 交给页面执行的请求
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TicketJS {
    id: TicketId,
    /// 完整查询串，拼到 `/api/{kind}/search?` 后面
    query: String,
    /// 页面应当中止的上一次请求
    supersedes: Option<TicketId>,
}

impl From<FetchTicket> for TicketJS {
    fn from(ticket: FetchTicket) -> Self {
        Self {
            id: ticket.id,
            query: ticket.query_string,
            supersedes: ticket.supersedes,
        }
    }
}

fn ticket_value(ticket: Option<FetchTicket>) -> Result<JsValue, JsValue> {
    match ticket {
        Some(ticket) => serde_wasm_bindgen::to_value(&TicketJS::from(ticket))
            .map_err(|e| JsValue::from_str(&format!("序列化请求失败: {}", e))),
        None => Ok(JsValue::NULL),
    }
}

fn millis(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0) / 1000.0)
}

fn js_error(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}

/// JavaScript 接口 - 页面持有一个实例，负责计时和发请求
///
/// 返回请求的方法都返回 `{ id, query, supersedes }` 或 `null`；
/// 页面执行完请求后调用 `complete` 或 `fail`。
#[wasm_bindgen]
pub struct SearchSyncJS {
    sync: SearchSync,
    history: BrowserHistory,
}

#[wasm_bindgen]
impl SearchSyncJS {
    /// kind: `articles` 或 `recipes`，path: 列表页路径
    #[wasm_bindgen(constructor)]
    pub fn new(kind: &str, path: &str) -> Result<SearchSyncJS, JsValue> {
        let kind = ContentKind::parse(kind)
            .ok_or_else(|| JsValue::from_str(&format!("未知的内容类型: {}", kind)))?;
        Ok(Self {
            sync: SearchSync::new(kind, path),
            history: BrowserHistory,
        })
    }

    /// 从当前地址恢复状态
    #[wasm_bindgen]
    pub fn init(&mut self) -> Result<JsValue, JsValue> {
        let location = self.history.location();
        ticket_value(self.sync.init(&location))
    }

    /// categories_json: 分类数组 `[{ id, name, slug, parentId }]`
    #[wasm_bindgen]
    pub fn load_categories(&mut self, categories_json: &str) -> Result<JsValue, JsValue> {
        let categories: Vec<Category> = serde_json::from_str(categories_json)
            .map_err(|e| JsValue::from_str(&format!("解析分类失败: {}", e)))?;
        ticket_value(self.sync.set_categories(CategoryTree::from_categories(categories)))
    }

    #[wasm_bindgen]
    pub fn toggle_category(&mut self, id: u32) -> Result<JsValue, JsValue> {
        ticket_value(self.sync.toggle_category(u64::from(id)))
    }

    #[wasm_bindgen]
    pub fn toggle_tag(&mut self, id: u32, checked: bool) -> Result<JsValue, JsValue> {
        ticket_value(self.sync.toggle_tag(u64::from(id), checked))
    }

    #[wasm_bindgen]
    pub fn set_sort(&mut self, sort: &str) -> Result<JsValue, JsValue> {
        let sort = SortOrder::parse(sort)
            .ok_or_else(|| JsValue::from_str(&format!("未知的排序方式: {}", sort)))?;
        ticket_value(self.sync.set_sort(sort).map_err(js_error)?)
    }

    /// now_ms: `performance.now()`
    #[wasm_bindgen]
    pub fn set_query(&mut self, text: &str, now_ms: f64) {
        self.sync.set_query(text, millis(now_ms));
    }

    #[wasm_bindgen]
    pub fn submit_query(&mut self) -> Result<JsValue, JsValue> {
        ticket_value(self.sync.flush())
    }

    #[wasm_bindgen]
    pub fn set_page(&mut self, page: u32) -> Result<JsValue, JsValue> {
        ticket_value(self.sync.set_page(page).map_err(js_error)?)
    }

    #[wasm_bindgen]
    pub fn set_page_size(&mut self, page_size: u32) -> Result<JsValue, JsValue> {
        ticket_value(self.sync.set_page_size(page_size).map_err(js_error)?)
    }

    #[wasm_bindgen]
    pub fn clear(&mut self) -> Result<JsValue, JsValue> {
        ticket_value(self.sync.clear())
    }

    /// 计时器回调
    #[wasm_bindgen]
    pub fn poll(&mut self, now_ms: f64) -> Result<JsValue, JsValue> {
        ticket_value(self.sync.poll(millis(now_ms)))
    }

    /// 下一次需要调用 `poll` 的时间点
    #[wasm_bindgen]
    pub fn next_deadline_ms(&self) -> Option<f64> {
        self.sync
            .next_deadline()
            .map(|deadline| deadline.as_secs_f64() * 1000.0)
    }

    /// 请求成功，body 为接口返回的原始 JSON；返回 `applied`、`failed` 或 `stale`
    #[wasm_bindgen]
    pub fn complete(&mut self, ticket_id: f64, body: &str) -> String {
        let outcome = serde_json::from_str::<SearchEnvelope>(body)
            .map_err(|e| FetchError::Decode(e.to_string()));
        self.finish(ticket_id, outcome)
    }

    /// 请求失败；status 为 0 表示网络错误
    #[wasm_bindgen]
    pub fn fail(&mut self, ticket_id: f64, status: u16, message: &str) -> String {
        let error = match status {
            0 => FetchError::Network(message.to_string()),
            status => FetchError::from_status(status, message),
        };
        self.finish(ticket_id, Err(error))
    }

    /// `popstate` 事件
    #[wasm_bindgen]
    pub fn on_popstate(&mut self) -> Result<JsValue, JsValue> {
        let location = self.history.location();
        ticket_value(self.sync.on_navigation(&location))
    }

    #[wasm_bindgen]
    pub fn view(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.sync.view())
            .map_err(|e| JsValue::from_str(&format!("序列化状态失败: {}", e)))
    }

    /// 页面卸载
    #[wasm_bindgen]
    pub fn teardown(&mut self) {
        self.sync.teardown();
    }
}

impl SearchSyncJS {
    fn finish(&mut self, ticket_id: f64, outcome: Result<SearchEnvelope, FetchError>) -> String {
        let completion = self
            .sync
            .complete(&mut self.history, ticket_id as TicketId, outcome);
        match completion {
            Completion::Applied { .. } => "applied",
            Completion::Failed(error) => {
                warn!(%error, "搜索请求失败");
                "failed"
            }
            Completion::Stale => "stale",
        }
        .to_string()
    }
}
