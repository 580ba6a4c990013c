use tracing::debug;

use crate::category::CategoryTree;
use crate::codec::CodecDefaults;
use crate::error::FilterError;
use crate::models::{FilterState, PageState, SortOrder};

/// 状态变化的来源，决定是否需要防抖
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// 搜索框输入
    FreeText,
    /// 分类、标签、排序
    Selection,
    /// 翻页、修改每页条数
    Paging,
    /// 浏览器前进后退
    Navigation,
    /// 清空
    Reset,
}

/// 一次修改的结果，控制器据此发起请求
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreChange {
    pub origin: ChangeOrigin,
    /// 筛选条件或分页是否真的发生了变化
    pub changed: bool,
}

impl StoreChange {
    /// 是否走防抖
    pub fn is_debounced(&self) -> bool {
        self.origin == ChangeOrigin::FreeText
    }
}

/// 筛选状态仓库 - 所有修改都经过这里
#[derive(Clone, Debug)]
pub struct FilterStore {
    filter: FilterState,
    page: PageState,
    defaults: CodecDefaults,
    tree: Option<CategoryTree>,
}

impl FilterStore {
    pub fn new(defaults: CodecDefaults) -> Self {
        let (filter, page) = defaults.initial_state();
        Self {
            filter,
            page,
            defaults,
            tree: None,
        }
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn page(&self) -> &PageState {
        &self.page
    }

    pub fn defaults(&self) -> &CodecDefaults {
        &self.defaults
    }

    pub fn tree(&self) -> Option<&CategoryTree> {
        self.tree.as_ref()
    }

    /// 加载分类树，并按兄弟互斥规则整理已有的分类选择
    pub fn set_tree(&mut self, tree: CategoryTree) -> StoreChange {
        let normalized = normalize_categories(&self.filter.category_ids, &tree);
        self.tree = Some(tree);
        let changed = normalized != self.filter.category_ids;
        if changed {
            self.filter.category_ids = normalized;
            self.reset_page();
        }
        StoreChange {
            origin: ChangeOrigin::Selection,
            changed,
        }
    }

    /// 切换分类：已选中则取消；否则取消同级的其他分类后选中
    pub fn toggle_category(&mut self, id: u64) -> StoreChange {
        if let Some(position) = self.filter.category_ids.iter().position(|c| *c == id) {
            self.filter.category_ids.remove(position);
        } else {
            if let Some(tree) = &self.tree {
                let siblings = tree.siblings(id);
                self.filter.category_ids.retain(|c| !siblings.contains(c));
            } else {
                debug!(category = id, "分类树未加载，跳过同级互斥");
            }
            self.filter.category_ids.push(id);
        }
        self.reset_page();
        self.selection(true)
    }

    /// 勾选或取消标签，重复调用结果不变
    pub fn toggle_tag(&mut self, id: u64, checked: bool) -> StoreChange {
        let changed = if checked {
            self.filter.tag_ids.insert(id)
        } else {
            self.filter.tag_ids.remove(&id)
        };
        let page_changed = self.reset_page();
        self.selection(changed || page_changed)
    }

    pub fn set_sort(&mut self, sort: SortOrder) -> Result<StoreChange, FilterError> {
        if !sort.supported_by(self.defaults.kind) {
            return Err(FilterError::UnsupportedSort {
                sort,
                kind: self.defaults.kind,
            });
        }
        let changed = self.filter.sort != sort;
        self.filter.sort = sort;
        let page_changed = self.reset_page();
        Ok(self.selection(changed || page_changed))
    }

    /// 修改搜索关键词；空白视为没有关键词
    pub fn set_query(&mut self, text: &str) -> StoreChange {
        let trimmed = text.trim();
        let query = (!trimmed.is_empty()).then(|| trimmed.to_string());
        let changed = self.filter.query != query;
        self.filter.query = query;
        let page_changed = self.reset_page();
        StoreChange {
            origin: ChangeOrigin::FreeText,
            changed: changed || page_changed,
        }
    }

    /// 翻页，不影响筛选条件
    pub fn set_page(&mut self, page: u32) -> Result<StoreChange, FilterError> {
        let page = PageState::validate_page(page)?;
        let changed = self.page.page != page;
        self.page.page = page;
        Ok(StoreChange {
            origin: ChangeOrigin::Paging,
            changed,
        })
    }

    pub fn set_page_size(&mut self, page_size: u32) -> Result<StoreChange, FilterError> {
        let page_size = PageState::validate_page_size(page_size)?;
        let changed = self.page.page_size != page_size;
        self.page.page_size = page_size;
        let page_changed = self.reset_page();
        Ok(StoreChange {
            origin: ChangeOrigin::Paging,
            changed: changed || page_changed,
        })
    }

    /// 恢复默认筛选条件并回到第一页，保留每页条数
    pub fn clear(&mut self) -> StoreChange {
        let (filter, _) = self.defaults.initial_state();
        let page = PageState::first(self.page.page_size);
        let changed = self.filter != filter || self.page != page;
        self.filter = filter;
        self.page = page;
        StoreChange {
            origin: ChangeOrigin::Reset,
            changed,
        }
    }

    /// 用地址栏解码出的状态整体替换
    pub fn replace(&mut self, mut filter: FilterState, page: PageState) -> StoreChange {
        if let Some(tree) = &self.tree {
            filter.category_ids = normalize_categories(&filter.category_ids, tree);
        }
        let changed = self.filter != filter || self.page != page;
        self.filter = filter;
        self.page = page;
        StoreChange {
            origin: ChangeOrigin::Navigation,
            changed,
        }
    }

    fn selection(&self, changed: bool) -> StoreChange {
        StoreChange {
            origin: ChangeOrigin::Selection,
            changed,
        }
    }

    fn reset_page(&mut self) -> bool {
        let changed = self.page.page != 1;
        self.page.page = 1;
        changed
    }
}

/// 同一兄弟组里只保留最后一个选择；不在树里的分类原样保留
fn normalize_categories(ids: &[u64], tree: &CategoryTree) -> Vec<u64> {
    let mut kept: Vec<u64> = Vec::with_capacity(ids.len());
    for id in ids {
        let siblings = tree.siblings(*id);
        kept.retain(|c| !siblings.contains(c));
        if !kept.contains(id) {
            kept.push(*id);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_PAGE_SIZE;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use utils_common::{Category, ContentKind};

    fn tree() -> CategoryTree {
        let category = |id: u64, parent_id: Option<u64>| Category {
            id,
            name: format!("c{id}"),
            slug: format!("c{id}"),
            parent_id,
        };
        CategoryTree::from_categories([
            category(1, None),
            category(2, None),
            category(10, Some(1)),
            category(11, Some(1)),
            category(20, Some(2)),
            category(21, Some(2)),
        ])
    }

    fn store() -> FilterStore {
        let mut store = FilterStore::new(CodecDefaults::for_kind(ContentKind::Articles));
        store.set_tree(tree());
        store
    }

    #[test]
    fn selecting_a_sibling_replaces_the_previous_one() {
        let mut store = store();
        store.toggle_category(10);
        store.toggle_category(11);
        assert_eq!(store.filter().category_ids, vec![11]);
    }

    #[test]
    fn other_branches_and_ancestors_stay_selected() {
        let mut store = store();
        store.toggle_category(1);
        store.toggle_category(20);
        store.toggle_category(10);
        assert_eq!(store.filter().category_ids, vec![1, 20, 10]);

        store.toggle_category(21);
        assert_eq!(store.filter().category_ids, vec![1, 10, 21]);
    }

    #[test]
    fn toggling_a_selected_category_removes_it() {
        let mut store = store();
        store.toggle_category(10);
        store.toggle_category(10);
        assert!(store.filter().category_ids.is_empty());
    }

    #[test]
    fn tag_toggle_is_idempotent() {
        let mut store = store();
        assert!(store.toggle_tag(7, true).changed);
        assert!(!store.toggle_tag(7, true).changed);
        assert_eq!(store.filter().tag_ids, BTreeSet::from([7]));
        store.toggle_tag(7, false);
        store.toggle_tag(7, false);
        assert!(store.filter().tag_ids.is_empty());
    }

    #[test]
    fn filter_mutations_reset_page() {
        let mut store = store();
        let mutations: Vec<Box<dyn Fn(&mut FilterStore)>> = vec![
            Box::new(|s: &mut FilterStore| {
                s.toggle_category(10);
            }),
            Box::new(|s: &mut FilterStore| {
                s.toggle_tag(3, true);
            }),
            Box::new(|s: &mut FilterStore| {
                s.set_sort(SortOrder::ViewCountDesc).unwrap();
            }),
            Box::new(|s: &mut FilterStore| {
                s.set_page_size(24).unwrap();
            }),
            Box::new(|s: &mut FilterStore| {
                s.set_query("铁锅");
            }),
        ];

        for mutate in mutations {
            store.set_page(5).unwrap();
            mutate(&mut store);
            assert_eq!(store.page().page, 1);
        }
    }

    #[test]
    fn set_page_leaves_filters_alone() {
        let mut store = store();
        store.toggle_tag(3, true);
        store.set_query("汤");
        let before = store.filter().clone();
        let change = store.set_page(4).unwrap();
        assert_eq!(change.origin, ChangeOrigin::Paging);
        assert_eq!(store.filter(), &before);
        assert_eq!(store.page().page, 4);
    }

    #[test]
    fn invalid_paging_is_rejected_without_side_effects() {
        let mut store = store();
        store.set_page(3).unwrap();
        assert_eq!(store.set_page(0), Err(FilterError::InvalidPage(0)));
        assert!(store.set_page_size(0).is_err());
        assert_eq!(store.page(), &PageState { page: 3, page_size: DEFAULT_PAGE_SIZE });
    }

    #[test]
    fn unsupported_sort_is_rejected() {
        let mut store = FilterStore::new(CodecDefaults::for_kind(ContentKind::Recipes));
        assert!(store.set_sort(SortOrder::ViewCountDesc).is_err());
        assert!(store.set_sort(SortOrder::TitleAsc).is_ok());
    }

    #[test]
    fn clear_restores_defaults_and_first_page() {
        let mut store = store();
        store.set_page_size(24).unwrap();
        store.toggle_category(10);
        store.toggle_tag(2, true);
        store.set_query("早餐");
        store.set_page(2).unwrap();

        let change = store.clear();
        assert!(change.changed);
        assert_eq!(store.filter(), &FilterState::default());
        assert_eq!(store.page(), &PageState::first(24));
    }

    #[test]
    fn blank_query_becomes_none_and_is_debounced() {
        let mut store = store();
        let change = store.set_query("   ");
        assert!(change.is_debounced());
        assert_eq!(store.filter().query, None);
    }

    #[test]
    fn replace_and_tree_load_normalize_sibling_conflicts() {
        let mut store = FilterStore::new(CodecDefaults::default());
        store.replace(
            FilterState {
                category_ids: vec![10, 11, 20, 99],
                ..FilterState::default()
            },
            PageState { page: 2, page_size: 12 },
        );
        assert_eq!(store.filter().category_ids, vec![10, 11, 20, 99]);

        let change = store.set_tree(tree());
        assert!(change.changed);
        assert_eq!(store.filter().category_ids, vec![11, 20, 99]);
        assert_eq!(store.page().page, 1);

        store.replace(
            FilterState {
                category_ids: vec![21, 20],
                ..FilterState::default()
            },
            PageState::default(),
        );
        assert_eq!(store.filter().category_ids, vec![20]);
    }
}
