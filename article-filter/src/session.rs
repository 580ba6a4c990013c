//! tokio 驱动的搜索会话
//!
//! 控制器本身不做 IO，这里把它放进一个独立任务：命令通过通道进入，
//! 请求交给 [`SearchBackend`] 执行，每处理一步都把 [`SearchView`] 发布出去。

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use utils_common::{Category, ContentKind, SearchEnvelope};

use crate::backend::SearchBackend;
use crate::category::CategoryTree;
use crate::controller::{SearchSync, SearchView};
use crate::dispatcher::{Completion, FetchTicket, TicketId};
use crate::error::{FetchError, FilterError};
use crate::history::History;
use crate::models::{PageState, SortOrder};

#[derive(Debug)]
enum Command {
    ToggleCategory(u64),
    ToggleTag { id: u64, checked: bool },
    SetSort(SortOrder),
    SetQuery(String),
    SubmitQuery,
    SetPage(u32),
    SetPageSize(u32),
    Clear,
    Navigate(String),
    Shutdown,
}

enum Event {
    Searched {
        id: TicketId,
        outcome: Result<SearchEnvelope, FetchError>,
    },
    Categories(Result<Vec<Category>, FetchError>),
}

/// 会话句柄，可以在任意任务里克隆使用
#[derive(Clone, Debug)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<SearchView>,
    kind: ContentKind,
    sent: Arc<AtomicU64>,
}

impl SessionHandle {
    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn toggle_category(&self, id: u64) -> Result<(), FilterError> {
        self.send(Command::ToggleCategory(id))
    }

    pub fn toggle_tag(&self, id: u64, checked: bool) -> Result<(), FilterError> {
        self.send(Command::ToggleTag { id, checked })
    }

    pub fn set_sort(&self, sort: SortOrder) -> Result<(), FilterError> {
        if !sort.supported_by(self.kind) {
            return Err(FilterError::UnsupportedSort {
                sort,
                kind: self.kind,
            });
        }
        self.send(Command::SetSort(sort))
    }

    /// 搜索框输入，防抖后才会请求
    pub fn set_query(&self, text: impl Into<String>) -> Result<(), FilterError> {
        self.send(Command::SetQuery(text.into()))
    }

    /// 回车提交，跳过防抖
    pub fn submit_query(&self) -> Result<(), FilterError> {
        self.send(Command::SubmitQuery)
    }

    pub fn set_page(&self, page: u32) -> Result<(), FilterError> {
        let page = PageState::validate_page(page)?;
        self.send(Command::SetPage(page))
    }

    pub fn set_page_size(&self, page_size: u32) -> Result<(), FilterError> {
        let page_size = PageState::validate_page_size(page_size)?;
        self.send(Command::SetPageSize(page_size))
    }

    pub fn clear(&self) -> Result<(), FilterError> {
        self.send(Command::Clear)
    }

    /// 浏览器前进后退后观察到的地址
    pub fn navigate(&self, location: impl Into<String>) -> Result<(), FilterError> {
        self.send(Command::Navigate(location.into()))
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }

    pub fn view(&self) -> SearchView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchView> {
        self.view.clone()
    }

    /// 等到已发送的命令全部处理完、没有防抖和在途请求
    pub async fn settled(&self) -> Result<SearchView, FilterError> {
        let target = self.sent.load(Ordering::SeqCst);
        let mut view = self.view.clone();
        let settled = view
            .wait_for(|view| view.revision >= target && !view.loading && !view.pending)
            .await
            .map_err(|_| FilterError::SessionClosed)?;
        Ok(settled.clone())
    }

    fn send(&self, command: Command) -> Result<(), FilterError> {
        self.tx.send(command).map_err(|_| FilterError::SessionClosed)?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 启动会话：从历史记录的当前地址恢复状态，加载分类树并发出首个请求
///
/// 任务结束时返回历史记录。
pub fn spawn<B, H>(
    mut sync: SearchSync,
    backend: Arc<B>,
    history: H,
) -> (SessionHandle, JoinHandle<H>)
where
    B: SearchBackend + ?Sized + 'static,
    H: History + Send + 'static,
{
    let location = history.location();
    info!(kind = %sync.kind(), %location, "搜索会话启动");
    let first = sync.init(&location);
    // 分类树还没有加载，首个快照一定处于加载中
    let mut initial = sync.view();
    initial.loading = true;

    let (tx, rx) = mpsc::unbounded_channel();
    let (view_tx, view_rx) = watch::channel(initial);
    let handle = SessionHandle {
        tx,
        view: view_rx,
        kind: sync.kind(),
        sent: Arc::new(AtomicU64::new(0)),
    };
    let session = Session {
        sync,
        backend,
        history,
        origin: Instant::now(),
        processed: 0,
        view: view_tx,
    };
    (handle, tokio::spawn(session.run(rx, first)))
}

struct Session<B: ?Sized, H> {
    sync: SearchSync,
    backend: Arc<B>,
    history: H,
    origin: Instant,
    processed: u64,
    view: watch::Sender<SearchView>,
}

impl<B, H> Session<B, H>
where
    B: SearchBackend + ?Sized + 'static,
    H: History + Send + 'static,
{
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Command>,
        first: Option<FetchTicket>,
    ) -> H {
        let mut in_flight: FuturesUnordered<BoxFuture<'static, Event>> = FuturesUnordered::new();
        in_flight.push(self.load_categories());
        if let Some(ticket) = first {
            in_flight.push(self.execute(ticket));
        }
        self.publish(in_flight.len());

        loop {
            let deadline = self.sync.next_deadline().map(|due| self.origin + due);
            let ticket = tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => {
                        self.processed += 1;
                        self.handle(command)
                    }
                },
                Some(event) = in_flight.next(), if !in_flight.is_empty() => self.on_event(event),
                _ = sleep_until(deadline.unwrap_or(self.origin)), if deadline.is_some() => {
                    self.sync.poll(self.origin.elapsed())
                }
            };
            if let Some(ticket) = ticket {
                in_flight.push(self.execute(ticket));
            }
            self.publish(in_flight.len());
        }

        self.sync.teardown();
        self.publish(0);
        info!(processed = self.processed, "搜索会话结束");
        self.history
    }

    fn handle(&mut self, command: Command) -> Option<FetchTicket> {
        debug!(?command, "处理命令");
        let result = match command {
            Command::ToggleCategory(id) => Ok(self.sync.toggle_category(id)),
            Command::ToggleTag { id, checked } => Ok(self.sync.toggle_tag(id, checked)),
            Command::SetSort(sort) => self.sync.set_sort(sort),
            Command::SetQuery(text) => {
                self.sync.set_query(&text, self.origin.elapsed());
                Ok(None)
            }
            Command::SubmitQuery => Ok(self.sync.flush()),
            Command::SetPage(page) => self.sync.set_page(page),
            Command::SetPageSize(page_size) => self.sync.set_page_size(page_size),
            Command::Clear => Ok(self.sync.clear()),
            Command::Navigate(location) => Ok(self.sync.on_navigation(&location)),
            Command::Shutdown => Ok(None),
        };
        result.unwrap_or_else(|error| {
            warn!(%error, "命令被拒绝");
            None
        })
    }

    fn on_event(&mut self, event: Event) -> Option<FetchTicket> {
        match event {
            Event::Searched { id, outcome } => {
                match self.sync.complete(&mut self.history, id, outcome) {
                    Completion::Applied { .. } => debug!(ticket = id, "结果已应用"),
                    Completion::Failed(error) => debug!(ticket = id, %error, "请求失败"),
                    Completion::Stale => debug!(ticket = id, "丢弃过期结果"),
                }
                None
            }
            Event::Categories(Ok(categories)) => {
                let tree = CategoryTree::from_categories(categories);
                info!(count = tree.len(), "分类树已加载");
                self.sync.set_categories(tree)
            }
            Event::Categories(Err(error)) => {
                warn!(%error, "分类加载失败，分类之间不做互斥");
                None
            }
        }
    }

    fn execute(&self, ticket: FetchTicket) -> BoxFuture<'static, Event> {
        let backend = Arc::clone(&self.backend);
        let kind = self.sync.kind();
        async move {
            let outcome = backend
                .search(kind, &ticket.query_string, ticket.cancel.clone())
                .await;
            Event::Searched {
                id: ticket.id,
                outcome,
            }
        }
        .boxed()
    }

    fn load_categories(&self) -> BoxFuture<'static, Event> {
        let backend = Arc::clone(&self.backend);
        async move { Event::Categories(backend.categories().await) }.boxed()
    }

    /// 发布快照；仍有未返回的请求（包括已被取代的）时视为加载中
    fn publish(&self, outstanding: usize) {
        let mut view = self.sync.view();
        view.loading |= outstanding > 0;
        view.revision = self.processed;
        self.view.send_replace(view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;
    use tokio::sync::oneshot;
    use tokio_util::sync::CancellationToken;
    use utils_common::{ContentItem, Pagination, SearchMeta, Tag};

    #[derive(Default)]
    struct FakeBackend {
        calls: Mutex<Vec<String>>,
        gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
        categories: Vec<Category>,
        failing: Mutex<Option<FetchError>>,
    }

    impl FakeBackend {
        /// 查询串包含 `needle` 的请求要等到返回的发送端触发后才完成
        fn gate(&self, needle: &str) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(needle.to_string(), rx);
            tx
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchBackend for FakeBackend {
        async fn search(
            &self,
            _kind: ContentKind,
            query: &str,
            _cancel: CancellationToken,
        ) -> Result<SearchEnvelope, FetchError> {
            self.calls.lock().unwrap().push(query.to_string());
            let gate = {
                let mut gates = self.gates.lock().unwrap();
                let key = gates.keys().find(|needle| query.contains(needle.as_str())).cloned();
                key.and_then(|key| gates.remove(&key))
            };
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if let Some(error) = self.failing.lock().unwrap().take() {
                return Err(error);
            }
            Ok(SearchEnvelope {
                data: vec![ContentItem {
                    id: 1,
                    title: query.to_string(),
                    slug: String::new(),
                    excerpt: None,
                    published_at: None,
                    cover_image: None,
                    view_count: None,
                    category_ids: Vec::new(),
                    tag_ids: Vec::new(),
                    extra: Default::default(),
                }],
                meta: SearchMeta {
                    pagination: Pagination::new(1, 12, 1),
                    facets: None,
                },
            })
        }

        async fn categories(&self) -> Result<Vec<Category>, FetchError> {
            Ok(self.categories.clone())
        }

        async fn tags(&self) -> Result<Vec<Tag>, FetchError> {
            Ok(Vec::new())
        }
    }

    fn shown_query(view: &SearchView) -> String {
        view.result
            .as_ref()
            .map(|result| result.items[0].title.clone())
            .unwrap_or_default()
    }

    fn start(
        backend: &Arc<FakeBackend>,
        location: &str,
    ) -> (SessionHandle, Arc<Mutex<MemoryHistory>>, JoinHandle<Arc<Mutex<MemoryHistory>>>) {
        let history = Arc::new(Mutex::new(MemoryHistory::new(location)));
        let sync = SearchSync::new(ContentKind::Articles, "/articles");
        let (handle, task) = spawn(sync, Arc::clone(backend), Arc::clone(&history));
        (handle, history, task)
    }

    #[tokio::test(start_paused = true)]
    async fn first_settle_waits_for_the_restored_search() {
        let backend = Arc::new(FakeBackend::default());
        let (handle, _history, _task) = start(&backend, "/articles?tagIds=1");
        let initial = handle.view();
        assert!(initial.loading);
        assert_eq!(initial.filter.tag_ids, BTreeSet::from([1]));

        let view = handle.settled().await.unwrap();
        assert!(!view.loading);
        assert_eq!(
            shown_query(&view),
            "tagIds=1&sort=publishedAt:desc&page=1&pageSize=12"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn typing_burst_sends_one_request_after_quiet_window() {
        let backend = Arc::new(FakeBackend::default());
        let (handle, history, _task) = start(&backend, "/articles");
        handle.settled().await.unwrap();

        let started = Instant::now();
        for text in ["s", "so", "sou", "soup"] {
            handle.set_query(text).unwrap();
        }
        let view = handle.settled().await.unwrap();

        assert!(started.elapsed() >= crate::dispatcher::DEFAULT_QUIET_WINDOW);
        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], "q=soup&sort=publishedAt:desc&page=1&pageSize=12");
        assert_eq!(shown_query(&view), calls[1]);
        assert_eq!(history.lock().unwrap().location(), "/articles?q=soup");
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_for_superseded_request_is_discarded() {
        let backend = Arc::new(FakeBackend::default());
        let (handle, history, _task) = start(&backend, "/articles");
        handle.settled().await.unwrap();

        let first = backend.gate("tagIds=1&");
        let second = backend.gate("tagIds=1,2&");
        handle.toggle_tag(1, true).unwrap();
        handle.toggle_tag(2, true).unwrap();
        tokio::task::yield_now().await;

        second.send(()).unwrap();
        tokio::task::yield_now().await;
        first.send(()).unwrap();
        let view = handle.settled().await.unwrap();

        assert_eq!(
            shown_query(&view),
            "tagIds=1,2&sort=publishedAt:desc&page=1&pageSize=12"
        );
        assert_eq!(history.lock().unwrap().location(), "/articles?tagIds=1,2");
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_action_does_not_refetch() {
        let backend = Arc::new(FakeBackend::default());
        let (handle, _history, _task) = start(&backend, "/articles");
        handle.toggle_tag(4, true).unwrap();
        handle.settled().await.unwrap();
        handle.toggle_tag(4, true).unwrap();
        handle.settled().await.unwrap();

        let tagged = backend
            .calls()
            .into_iter()
            .filter(|call| call.starts_with("tagIds=4"))
            .count();
        assert_eq!(tagged, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_previous_result_and_url() {
        let backend = Arc::new(FakeBackend::default());
        let (handle, history, _task) = start(&backend, "/articles?page=2");
        let before = handle.settled().await.unwrap();

        *backend.failing.lock().unwrap() = Some(FetchError::Timeout);
        handle.set_page(3).unwrap();
        let view = handle.settled().await.unwrap();

        assert_eq!(view.error.as_deref(), Some("请求超时"));
        assert_eq!(view.result, before.result);
        assert_eq!(history.lock().unwrap().location(), "/articles?page=2");
    }

    #[tokio::test(start_paused = true)]
    async fn back_button_restores_previous_filters() {
        let backend = Arc::new(FakeBackend::default());
        let (handle, history, _task) = start(&backend, "/articles?tagIds=3");
        handle.settled().await.unwrap();

        let pushed = history.lock().unwrap().push("/articles?q=pie");
        handle.navigate(pushed).unwrap();
        let view = handle.settled().await.unwrap();
        assert_eq!(view.filter.query.as_deref(), Some("pie"));

        let previous = history.lock().unwrap().back().unwrap();
        handle.navigate(previous).unwrap();
        let view = handle.settled().await.unwrap();
        assert_eq!(view.filter.query, None);
        assert!(view.filter.tag_ids.contains(&3));
        assert_eq!(view.location, "/articles?tagIds=3");
        assert_eq!(backend.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_the_last_written_url_is_applied() {
        let backend = Arc::new(FakeBackend::default());
        let history = Arc::new(Mutex::new(MemoryHistory::new("/articles?tagIds=1")));
        history.lock().unwrap().push("/articles");
        let sync = SearchSync::new(ContentKind::Articles, "/articles");
        let (handle, _task) = spawn(sync, Arc::clone(&backend), Arc::clone(&history));
        handle.settled().await.unwrap();

        handle.toggle_tag(1, true).unwrap();
        handle.settled().await.unwrap();
        assert_eq!(history.lock().unwrap().location(), "/articles?tagIds=1");

        let release = backend.gate("tagIds=1,2&");
        handle.toggle_tag(2, true).unwrap();
        let previous = history.lock().unwrap().back().unwrap();
        assert_eq!(previous, "/articles?tagIds=1");
        handle.navigate(previous).unwrap();

        let mut views = handle.subscribe();
        let restored = views
            .wait_for(|view| view.revision >= 3)
            .await
            .unwrap()
            .clone();
        assert_eq!(restored.filter.tag_ids, BTreeSet::from([1]));

        release.send(()).unwrap();
        let view = handle.settled().await.unwrap();
        assert_eq!(view.filter.tag_ids, BTreeSet::from([1]));
        assert_eq!(
            shown_query(&view),
            "tagIds=1&sort=publishedAt:desc&page=1&pageSize=12"
        );
        assert_eq!(history.lock().unwrap().location(), "/articles?tagIds=1");
        assert_eq!(backend.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn categories_are_loaded_and_enforce_sibling_exclusivity() {
        let category = |id, parent_id| Category {
            id,
            name: format!("c{id}"),
            slug: String::new(),
            parent_id,
        };
        let backend = Arc::new(FakeBackend {
            categories: vec![category(1, None), category(10, Some(1)), category(11, Some(1))],
            ..FakeBackend::default()
        });
        let (handle, _history, _task) = start(&backend, "/articles");
        handle.settled().await.unwrap();

        handle.toggle_category(10).unwrap();
        handle.toggle_category(11).unwrap();
        let view = handle.settled().await.unwrap();
        assert_eq!(view.filter.category_ids, vec![11]);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_input_is_rejected_before_reaching_the_session() {
        let backend = Arc::new(FakeBackend::default());
        let (handle, _history, _task) = start(&backend, "/articles");
        assert_eq!(handle.set_page(0), Err(FilterError::InvalidPage(0)));
        assert!(handle.set_sort(SortOrder::TitleAsc).is_err());
        assert!(handle.set_page_size(101).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_returns_history_and_closes_handle() {
        let backend = Arc::new(FakeBackend::default());
        let (handle, _history, task) = start(&backend, "/articles");
        handle.toggle_tag(2, true).unwrap();
        handle.settled().await.unwrap();
        handle.shutdown();

        let history = task.await.unwrap();
        assert_eq!(history.lock().unwrap().location(), "/articles?tagIds=2");
        assert_eq!(handle.clear(), Err(FilterError::SessionClosed));
    }
}
