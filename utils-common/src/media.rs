use url::{ParseError, Url};

/// 规范化图片地址
///
/// - 空白地址返回 `None`
/// - `http(s)://` 绝对地址保持不变
/// - 协议相对地址 `//host/x` 补全为 `https:`
/// - 相对路径拼接到媒体服务地址上
/// - 其他协议（`data:`、`javascript:` 等）和无法解析的地址返回 `None`
pub fn normalize_image_url(raw: &str, media_base: &Url) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.starts_with("//") {
        return Url::parse(&format!("https:{raw}")).ok().map(String::from);
    }

    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url.into()),
        Ok(_) => None,
        Err(ParseError::RelativeUrlWithoutBase) => media_base.join(raw).ok().map(String::from),
        Err(_) => None,
    }
}
