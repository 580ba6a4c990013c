//! 文章 / 菜谱内容接口的 HTTP 客户端

pub mod client;
pub mod config;

pub use client::ContentClient;
pub use config::{ClientConfig, ConfigError};
