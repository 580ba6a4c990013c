use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use utils_common::{ContentKind, Pagination, SearchEnvelope, SearchResult};

use crate::category::CategoryTree;
use crate::codec::{self, CodecDefaults};
use crate::dispatcher::{Completion, Dispatcher, DispatcherConfig, FetchTicket, TicketId};
use crate::error::{FetchError, FilterError};
use crate::history::History;
use crate::models::{FilterState, PageState, SortOrder};
use crate::reconcile::{Inbound, UrlReconciler};
use crate::store::{FilterStore, StoreChange};

/// 页面可渲染的完整快照
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchView {
    pub kind: ContentKind,
    pub filter: FilterState,
    pub page: PageState,
    pub result: Option<SearchResult>,
    pub error: Option<String>,
    pub loading: bool,
    /// 搜索框输入仍在防抖中
    pub pending: bool,
    /// 当前状态对应的地址
    pub location: String,
    /// 驱动方已处理的命令数
    pub revision: u64,
}

/// 搜索同步控制器 - 状态仓库、请求调度和地址栏同步的组合
///
/// 所有操作都是同步的，需要请求时返回 [`FetchTicket`]，由驱动方执行后调用
/// [`SearchSync::complete`] 回报。时间以驱动方的单调时钟传入。
#[derive(Debug)]
pub struct SearchSync {
    store: FilterStore,
    dispatcher: Dispatcher,
    reconciler: UrlReconciler,
}

impl SearchSync {
    pub fn new(kind: ContentKind, path: impl Into<String>) -> Self {
        Self::with_config(
            CodecDefaults::for_kind(kind),
            DispatcherConfig::for_kind(kind),
            path,
        )
    }

    pub fn with_config(
        defaults: CodecDefaults,
        dispatcher: DispatcherConfig,
        path: impl Into<String>,
    ) -> Self {
        Self {
            store: FilterStore::new(defaults),
            dispatcher: Dispatcher::new(dispatcher),
            reconciler: UrlReconciler::new(path, defaults),
        }
    }

    pub fn kind(&self) -> ContentKind {
        self.dispatcher.config().kind
    }

    pub fn filter(&self) -> &FilterState {
        self.store.filter()
    }

    pub fn page(&self) -> &PageState {
        self.store.page()
    }

    pub fn categories(&self) -> Option<&CategoryTree> {
        self.store.tree()
    }

    /// 当前状态对应的地址
    pub fn location(&self) -> String {
        self.reconciler
            .location_for(self.store.filter(), self.store.page())
    }

    /// 页面加载：从初始地址恢复状态并立即请求
    pub fn init(&mut self, location: &str) -> Option<FetchTicket> {
        let (filter, page) = codec::decode(location, self.store.defaults());
        self.store.replace(filter, page);
        self.dispatch_now()
    }

    /// 加载分类树，已选分类如有冲突会被整理并重新请求
    pub fn set_categories(&mut self, tree: CategoryTree) -> Option<FetchTicket> {
        let change = self.store.set_tree(tree);
        if change.changed {
            self.dispatch_now()
        } else {
            None
        }
    }

    pub fn toggle_category(&mut self, id: u64) -> Option<FetchTicket> {
        let change = self.store.toggle_category(id);
        self.after_change(change, Duration::ZERO)
    }

    pub fn toggle_tag(&mut self, id: u64, checked: bool) -> Option<FetchTicket> {
        let change = self.store.toggle_tag(id, checked);
        self.after_change(change, Duration::ZERO)
    }

    pub fn set_sort(&mut self, sort: SortOrder) -> Result<Option<FetchTicket>, FilterError> {
        let change = self.store.set_sort(sort)?;
        Ok(self.after_change(change, Duration::ZERO))
    }

    /// 搜索框输入，静默窗口结束后才会请求
    pub fn set_query(&mut self, text: &str, now: Duration) {
        let change = self.store.set_query(text);
        self.after_change(change, now);
    }

    pub fn set_page(&mut self, page: u32) -> Result<Option<FetchTicket>, FilterError> {
        let change = self.store.set_page(page)?;
        Ok(self.after_change(change, Duration::ZERO))
    }

    pub fn set_page_size(&mut self, page_size: u32) -> Result<Option<FetchTicket>, FilterError> {
        let change = self.store.set_page_size(page_size)?;
        Ok(self.after_change(change, Duration::ZERO))
    }

    pub fn clear(&mut self) -> Option<FetchTicket> {
        let change = self.store.clear();
        self.after_change(change, Duration::ZERO)
    }

    /// 防抖到期时发出请求
    pub fn poll(&mut self, now: Duration) -> Option<FetchTicket> {
        self.dispatcher.poll(now)
    }

    /// 跳过防抖立即发出（例如回车提交）
    pub fn flush(&mut self) -> Option<FetchTicket> {
        self.dispatcher.flush()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.dispatcher.next_deadline()
    }

    pub fn is_current(&self, id: TicketId) -> bool {
        self.dispatcher.is_current(id)
    }

    /// 回报请求结果；成功时把对应状态写回地址栏
    pub fn complete<H: History + ?Sized>(
        &mut self,
        history: &mut H,
        id: TicketId,
        outcome: Result<SearchEnvelope, FetchError>,
    ) -> Completion {
        let requested = self
            .dispatcher
            .in_flight_page()
            .unwrap_or(*self.store.page())
            .page_size;
        let outcome = outcome.map(|envelope| into_search_result(envelope, requested));
        let completion = self.dispatcher.complete(id, outcome);
        if let Completion::Applied { filter, page } = &completion {
            if let Err(error) = self.reconciler.outbound(history, filter, page) {
                warn!(%error, "地址栏同步失败");
            }
        }
        completion
    }

    /// 浏览器前进后退：与当前状态不同时应用并立即请求
    pub fn on_navigation(&mut self, observed: &str) -> Option<FetchTicket> {
        match self
            .reconciler
            .inbound(observed, self.store.filter(), self.store.page())
        {
            Inbound::Apply { filter, page } => {
                self.store.replace(filter, page);
                self.dispatch_now()
            }
            Inbound::SelfOriginated | Inbound::Unchanged => None,
        }
    }

    /// 页面销毁
    pub fn teardown(&mut self) {
        self.dispatcher.abort();
    }

    pub fn view(&self) -> SearchView {
        let results = self.dispatcher.view();
        SearchView {
            kind: self.kind(),
            filter: self.store.filter().clone(),
            page: *self.store.page(),
            result: results.result.clone(),
            error: results.error.clone(),
            loading: results.loading,
            pending: self.dispatcher.has_pending(),
            location: self.location(),
            revision: 0,
        }
    }

    fn after_change(&mut self, change: StoreChange, now: Duration) -> Option<FetchTicket> {
        debug!(origin = ?change.origin, changed = change.changed, "筛选状态变化");
        if change.is_debounced() {
            self.dispatcher
                .schedule(self.store.filter(), self.store.page(), now);
            None
        } else {
            self.dispatch_now()
        }
    }

    fn dispatch_now(&mut self) -> Option<FetchTicket> {
        self.dispatcher
            .dispatch_now(self.store.filter(), self.store.page())
    }
}

/// 校正后端返回的分页信息，保证总页数和条目数量的约束成立
fn into_search_result(envelope: SearchEnvelope, requested_page_size: u32) -> SearchResult {
    let SearchEnvelope { mut data, meta } = envelope;
    let mut pagination = meta.pagination;

    if pagination.page_size == 0 {
        warn!(requested_page_size, "后端返回的每页条数为 0，使用请求时的每页条数");
        pagination.page_size = requested_page_size;
    }
    if !pagination.is_consistent() {
        warn!(
            page_count = pagination.page_count,
            total = pagination.total,
            page_size = pagination.page_size,
            "后端返回的总页数不一致，重新计算"
        );
        pagination = Pagination::new(pagination.page, pagination.page_size, pagination.total);
    }
    let limit = pagination.page_size as usize;
    if data.len() > limit {
        warn!(items = data.len(), limit, "后端返回的条目超过每页条数，截断");
        data.truncate(limit);
    }

    SearchResult {
        items: data,
        pagination,
        facets: meta.facets,
    }
}
