use std::sync::{Arc, Mutex, PoisonError};

use crate::error::FilterError;

/// 浏览器地址栏的抽象
pub trait History {
    /// 当前地址（路径 + 查询串）
    fn location(&self) -> String;

    /// 替换当前历史记录，不新增记录也不刷新页面
    fn replace(&mut self, location: &str) -> Result<(), FilterError>;
}

/// 内存中的历史记录，模拟跳转和前进后退
#[derive(Clone, Debug)]
pub struct MemoryHistory {
    entries: Vec<String>,
    index: usize,
    replacements: usize,
}

impl MemoryHistory {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            entries: vec![initial.into()],
            index: 0,
            replacements: 0,
        }
    }

    /// 外部跳转：丢弃前进记录并新增一条
    pub fn push(&mut self, location: impl Into<String>) -> String {
        self.entries.truncate(self.index + 1);
        self.entries.push(location.into());
        self.index = self.entries.len() - 1;
        self.location()
    }

    pub fn back(&mut self) -> Option<String> {
        self.index = self.index.checked_sub(1)?;
        Some(self.location())
    }

    pub fn forward(&mut self) -> Option<String> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        Some(self.location())
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// `replace` 被调用的次数
    pub fn replacements(&self) -> usize {
        self.replacements
    }
}

impl History for MemoryHistory {
    fn location(&self) -> String {
        self.entries[self.index].clone()
    }

    fn replace(&mut self, location: &str) -> Result<(), FilterError> {
        self.entries[self.index] = location.to_string();
        self.replacements += 1;
        Ok(())
    }
}

/// 会话和外部共享同一份历史记录
///
/// 持锁方崩溃不影响地址栏本身，读写都继续使用锁内的数据。
impl<H: History> History for Arc<Mutex<H>> {
    fn location(&self) -> String {
        self.lock().unwrap_or_else(PoisonError::into_inner).location()
    }

    fn replace(&mut self, location: &str) -> Result<(), FilterError> {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(location)
    }
}

/// `window.history` / `window.location`
#[cfg(target_arch = "wasm32")]
#[derive(Clone, Debug, Default)]
pub struct BrowserHistory;

#[cfg(target_arch = "wasm32")]
impl History for BrowserHistory {
    fn location(&self) -> String {
        let Some(location) = web_sys::window().map(|window| window.location()) else {
            return String::new();
        };
        let path = location.pathname().unwrap_or_default();
        let search = location.search().unwrap_or_default();
        format!("{path}{search}")
    }

    fn replace(&mut self, location: &str) -> Result<(), FilterError> {
        let window = web_sys::window().ok_or_else(|| FilterError::History("window 不可用".to_string()))?;
        let history = window
            .history()
            .map_err(|e| FilterError::History(format!("{e:?}")))?;
        history
            .replace_state_with_url(&wasm_bindgen::JsValue::NULL, "", Some(location))
            .map_err(|e| FilterError::History(format!("{e:?}")))
    }
}
