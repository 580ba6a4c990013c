use tracing::debug;

use crate::codec::{self, CodecDefaults};
use crate::error::FilterError;
use crate::history::History;
use crate::models::{FilterState, PageState};

/// 地址栏变化的处理结论
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// 自己写入地址栏引起的回声
    SelfOriginated,
    /// 与当前状态相同
    Unchanged,
    /// 需要应用到状态仓库并立即请求
    Apply { filter: FilterState, page: PageState },
}

#[derive(Clone, Debug)]
struct Echo {
    seq: u64,
    location: String,
}

/// 状态仓库和地址栏的双向同步
///
/// 写入后立即读回地址栏确认：已生效的写入不会再产生回声，
/// 之后观察到的任何地址都按外部跳转处理。只有读回时尚未生效的写入才记为待确认，
/// 第一次观察到该地址时视为回声。
#[derive(Clone, Debug)]
pub struct UrlReconciler {
    path: String,
    defaults: CodecDefaults,
    write_seq: u64,
    echo: Option<Echo>,
}

impl UrlReconciler {
    pub fn new(path: impl Into<String>, defaults: CodecDefaults) -> Self {
        Self {
            path: path.into(),
            defaults,
            write_seq: 0,
            echo: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// 已写入地址栏的次数
    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn location_for(&self, filter: &FilterState, page: &PageState) -> String {
        codec::to_location(&self.path, &codec::encode(filter, page, &self.defaults))
    }

    /// 状态 → 地址栏。地址已一致时不写入，返回是否写入
    pub fn outbound<H: History + ?Sized>(
        &mut self,
        history: &mut H,
        filter: &FilterState,
        page: &PageState,
    ) -> Result<bool, FilterError> {
        let target = self.location_for(filter, page);
        if history.location() == target {
            return Ok(false);
        }
        history.replace(&target)?;
        self.write_seq += 1;
        if history.location() == target {
            debug!(seq = self.write_seq, location = %target, "更新地址栏");
            self.echo = None;
        } else {
            debug!(seq = self.write_seq, location = %target, "地址栏尚未生效，等待回声");
            self.echo = Some(Echo {
                seq: self.write_seq,
                location: target,
            });
        }
        Ok(true)
    }

    /// 地址栏 → 状态
    pub fn inbound(&mut self, observed: &str, filter: &FilterState, page: &PageState) -> Inbound {
        if let Some(echo) = self.echo.take() {
            if echo.location == observed {
                debug!(seq = echo.seq, "忽略自身写入的地址");
                return Inbound::SelfOriginated;
            }
        }

        let (decoded_filter, decoded_page) = codec::decode(observed, &self.defaults);
        if decoded_filter == *filter && decoded_page == *page {
            Inbound::Unchanged
        } else {
            debug!(location = observed, "地址栏发生外部变化");
            Inbound::Apply {
                filter: decoded_filter,
                page: decoded_page,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use pretty_assertions::assert_eq;

    fn reconciler() -> UrlReconciler {
        UrlReconciler::new("/articles", CodecDefaults::default())
    }

    fn tagged(id: u64) -> FilterState {
        FilterState {
            tag_ids: [id].into(),
            ..FilterState::default()
        }
    }

    #[test]
    fn outbound_replaces_current_entry_once() {
        let mut reconciler = reconciler();
        let mut history = MemoryHistory::new("/articles");
        let page = PageState::default();

        assert!(reconciler.outbound(&mut history, &tagged(3), &page).unwrap());
        assert!(!reconciler.outbound(&mut history, &tagged(3), &page).unwrap());
        assert_eq!(history.location(), "/articles?tagIds=3");
        assert_eq!(history.entries().len(), 1);
        assert_eq!(reconciler.write_seq(), 1);
    }

    /// `replace` 之后要等 `settle` 才在地址栏上生效
    struct DeferredHistory {
        current: String,
        queued: Option<String>,
    }

    impl DeferredHistory {
        fn settle(&mut self) -> String {
            if let Some(location) = self.queued.take() {
                self.current = location;
            }
            self.current.clone()
        }
    }

    impl History for DeferredHistory {
        fn location(&self) -> String {
            self.current.clone()
        }

        fn replace(&mut self, location: &str) -> Result<(), FilterError> {
            self.queued = Some(location.to_string());
            Ok(())
        }
    }

    #[test]
    fn deferred_write_is_acknowledged_as_echo_exactly_once() {
        let mut reconciler = reconciler();
        let mut history = DeferredHistory {
            current: "/articles".to_string(),
            queued: None,
        };
        let page = PageState::default();
        reconciler.outbound(&mut history, &tagged(3), &page).unwrap();

        let observed = history.settle();
        let moved_on = tagged(4);
        assert_eq!(
            reconciler.inbound(&observed, &moved_on, &page),
            Inbound::SelfOriginated
        );
        assert_eq!(
            reconciler.inbound(&observed, &moved_on, &page),
            Inbound::Apply {
                filter: tagged(3),
                page
            }
        );
    }

    #[test]
    fn applied_write_leaves_nothing_to_acknowledge() {
        let mut reconciler = reconciler();
        let mut history = MemoryHistory::new("/articles");
        let page = PageState::default();
        reconciler.outbound(&mut history, &tagged(3), &page).unwrap();

        assert_eq!(
            reconciler.inbound("/articles?tagIds=3", &tagged(3), &page),
            Inbound::Unchanged
        );
    }

    #[test]
    fn going_back_to_the_last_written_url_is_applied() {
        let mut reconciler = reconciler();
        let mut history = MemoryHistory::new("/articles?tagIds=1");
        history.push("/articles");
        let page = PageState::default();
        reconciler.outbound(&mut history, &tagged(1), &page).unwrap();

        // 写入之后用户又勾选了标签 2，然后点了后退
        let current = FilterState {
            tag_ids: [1, 2].into(),
            ..FilterState::default()
        };
        let observed = history.back().unwrap();
        assert_eq!(observed, "/articles?tagIds=1");
        assert_eq!(
            reconciler.inbound(&observed, &current, &page),
            Inbound::Apply {
                filter: tagged(1),
                page
            }
        );
    }

    #[test]
    fn back_navigation_right_after_a_write_is_applied() {
        let mut reconciler = reconciler();
        let mut history = MemoryHistory::new("/articles?tagIds=1");
        history.push("/articles?tagIds=2");
        let page = PageState::default();
        reconciler.outbound(&mut history, &tagged(3), &page).unwrap();

        let observed = history.back().unwrap();
        assert_eq!(
            reconciler.inbound(&observed, &tagged(3), &page),
            Inbound::Apply {
                filter: tagged(1),
                page
            }
        );
    }
}
