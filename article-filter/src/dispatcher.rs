use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use utils_common::{ContentKind, SearchResult};

use crate::codec;
use crate::error::FetchError;
use crate::fingerprint::RequestFingerprint;
use crate::models::{FilterState, PageState};

/// 搜索框输入的静默窗口
pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(300);

pub type TicketId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub kind: ContentKind,
    pub quiet_window: Duration,
}

impl DispatcherConfig {
    pub fn for_kind(kind: ContentKind) -> Self {
        Self {
            kind,
            quiet_window: DEFAULT_QUIET_WINDOW,
        }
    }
}

/// 一次已发出的请求，由驱动方执行并通过 `complete` 回报结果
#[derive(Clone, Debug)]
pub struct FetchTicket {
    pub id: TicketId,
    /// 被这次请求取代的上一次请求
    pub supersedes: Option<TicketId>,
    pub fingerprint: RequestFingerprint,
    pub filter: FilterState,
    pub page: PageState,
    /// 发给后端的完整查询串
    pub query_string: String,
    /// 被新请求取代或页面销毁时触发
    pub cancel: CancellationToken,
}

/// 请求结果的处理方式
#[derive(Clone, Debug, PartialEq)]
pub enum Completion {
    /// 结果已替换到可见状态
    Applied { filter: FilterState, page: PageState },
    /// 当前请求失败，保留上一次的结果
    Failed(FetchError),
    /// 已被取代的请求，结果被丢弃
    Stale,
}

/// 对用户可见的结果状态
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultView {
    pub result: Option<SearchResult>,
    pub error: Option<String>,
    pub loading: bool,
}

#[derive(Debug)]
struct Pending {
    due_at: Duration,
    filter: FilterState,
    page: PageState,
}

#[derive(Debug)]
struct InFlight {
    id: TicketId,
    filter: FilterState,
    page: PageState,
    cancel: CancellationToken,
}

/// 请求调度器
///
/// 不做任何 IO：时间由调用方传入，请求以 [`FetchTicket`] 的形式交给驱动方执行。
/// 始终只有一个有效的在途请求，后发出的请求胜出。
#[derive(Debug)]
pub struct Dispatcher {
    config: DispatcherConfig,
    next_id: TicketId,
    in_flight: Option<InFlight>,
    /// 最近一次发出且未被取代的请求指纹
    last_issued: Option<RequestFingerprint>,
    pending: Option<Pending>,
    view: ResultView,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            next_id: 0,
            in_flight: None,
            last_issued: None,
            pending: None,
            view: ResultView::default(),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn view(&self) -> &ResultView {
        &self.view
    }

    pub fn in_flight_id(&self) -> Option<TicketId> {
        self.in_flight.as_ref().map(|flight| flight.id)
    }

    /// 在途请求对应的分页
    pub fn in_flight_page(&self) -> Option<PageState> {
        self.in_flight.as_ref().map(|flight| flight.page)
    }

    pub fn is_current(&self, id: TicketId) -> bool {
        self.in_flight_id() == Some(id)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// 防抖计时到期的时间点
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending.as_ref().map(|pending| pending.due_at)
    }

    /// 安排一次防抖请求，静默窗口内的多次调用只保留最后一次
    pub fn schedule(&mut self, filter: &FilterState, page: &PageState, now: Duration) {
        let due_at = now + self.config.quiet_window;
        debug!(due_ms = due_at.as_millis() as u64, "安排防抖请求");
        self.pending = Some(Pending {
            due_at,
            filter: filter.clone(),
            page: *page,
        });
    }

    /// 到期时发出防抖请求
    pub fn poll(&mut self, now: Duration) -> Option<FetchTicket> {
        if !self.pending.as_ref().is_some_and(|pending| pending.due_at <= now) {
            return None;
        }
        let pending = self.pending.take()?;
        self.issue(&pending.filter, &pending.page)
    }

    /// 立即发出防抖中的请求
    pub fn flush(&mut self) -> Option<FetchTicket> {
        let pending = self.pending.take()?;
        self.issue(&pending.filter, &pending.page)
    }

    /// 立即发出请求；带着最新的完整状态，所以防抖中的请求一并作废
    pub fn dispatch_now(&mut self, filter: &FilterState, page: &PageState) -> Option<FetchTicket> {
        self.pending = None;
        self.issue(filter, page)
    }

    fn issue(&mut self, filter: &FilterState, page: &PageState) -> Option<FetchTicket> {
        let query_string = codec::encode_explicit(filter, page);
        let fingerprint = RequestFingerprint::from_query(self.config.kind, &query_string);

        if self.last_issued.as_ref() == Some(&fingerprint) {
            debug!(%fingerprint, "相同参数的请求已发出，跳过");
            return None;
        }

        let supersedes = self.in_flight.take().map(|previous| {
            previous.cancel.cancel();
            debug!(ticket = previous.id, "取消被取代的请求");
            previous.id
        });

        self.next_id += 1;
        let cancel = CancellationToken::new();
        self.in_flight = Some(InFlight {
            id: self.next_id,
            filter: filter.clone(),
            page: *page,
            cancel: cancel.clone(),
        });
        self.last_issued = Some(fingerprint.clone());
        self.view.loading = true;

        debug!(ticket = self.next_id, %fingerprint, query = %query_string, "发出搜索请求");
        Some(FetchTicket {
            id: self.next_id,
            supersedes,
            fingerprint,
            filter: filter.clone(),
            page: *page,
            query_string,
            cancel,
        })
    }

    /// 回报请求结果；只有当前在途的请求会影响可见状态
    pub fn complete(&mut self, id: TicketId, outcome: Result<SearchResult, FetchError>) -> Completion {
        if !self.is_current(id) {
            debug!(ticket = id, "丢弃已被取代的请求结果");
            return Completion::Stale;
        }
        let Some(flight) = self.in_flight.take() else {
            return Completion::Stale;
        };
        self.view.loading = false;

        match outcome {
            Ok(result) => {
                self.view.result = Some(result);
                self.view.error = None;
                Completion::Applied {
                    filter: flight.filter,
                    page: flight.page,
                }
            }
            Err(error) => {
                warn!(ticket = id, %error, "搜索请求失败，保留上一次结果");
                // 允许用户重复同样的操作来重试
                self.last_issued = None;
                self.view.error = Some(error.to_string());
                Completion::Failed(error)
            }
        }
    }

    /// 页面销毁：取消在途请求和防抖中的请求
    pub fn abort(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            flight.cancel.cancel();
            debug!(ticket = flight.id, "页面销毁，取消请求");
        }
        self.pending = None;
        self.last_issued = None;
        self.view.loading = false;
    }
}
