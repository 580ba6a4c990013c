use anyhow::{anyhow, bail, Context, Result};
use clap::ArgMatches;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use article_filter::codec::{self, CodecDefaults};
use article_filter::{
    session, CategoryTree, FilterState, MemoryHistory, PageState, SearchBackend, SearchSync,
    SearchView, SortOrder,
};
use content_client::config::{ENV_API_TOKEN, ENV_API_URL};
use content_client::{ClientConfig, ContentClient};
use utils_common::ContentKind;

fn kind_of(matches: &ArgMatches) -> Result<ContentKind> {
    let raw = matches
        .get_one::<String>("kind")
        .map(String::as_str)
        .unwrap_or_default();
    ContentKind::parse(raw).ok_or_else(|| anyhow!("未知的内容类型 '{}'，可选 articles / recipes", raw))
}

fn sort_of(matches: &ArgMatches, kind: ContentKind) -> Result<Option<SortOrder>> {
    let Some(raw) = matches.get_one::<String>("sort") else {
        return Ok(None);
    };
    let sort = SortOrder::parse(raw).ok_or_else(|| anyhow!("未知的排序方式 '{}'", raw))?;
    if !sort.supported_by(kind) {
        let options: Vec<&str> = SortOrder::options_for(kind).iter().map(|s| s.as_str()).collect();
        bail!("{} 不支持排序方式 '{}'，可选: {}", kind, raw, options.join(", "));
    }
    Ok(Some(sort))
}

fn ids(matches: &ArgMatches, id: &str) -> Vec<u64> {
    matches
        .get_many::<u64>(id)
        .map(|values| values.copied().collect())
        .unwrap_or_default()
}

/// 命令行参数优先，其余配置来自环境变量
fn client(root: &ArgMatches) -> Result<ContentClient> {
    let api_url = root.get_one::<String>("api_url").cloned();
    let token = root.get_one::<String>("token").cloned();
    let config = ClientConfig::from_lookup(|key| match key {
        ENV_API_URL => api_url.clone(),
        ENV_API_TOKEN => token.clone(),
        other => std::env::var(other).ok(),
    })?;
    info!(api = %config.api_url, "使用内容接口");
    Ok(ContentClient::new(config)?)
}

/// decode 子命令
pub fn decode(matches: &ArgMatches) -> Result<()> {
    let kind = kind_of(matches)?;
    let location = matches
        .get_one::<String>("location")
        .context("缺少要解析的地址")?;
    let defaults = CodecDefaults::for_kind(kind);
    let (filter, page) = codec::decode(location, &defaults);

    let output = json!({
        "filter": filter,
        "page": page,
        "canonical": codec::encode(&filter, &page, &defaults),
        "explicit": codec::encode_explicit(&filter, &page),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// 根据 encode 子命令的参数组装筛选状态
fn state_from_args(matches: &ArgMatches, kind: ContentKind) -> Result<(FilterState, PageState)> {
    let defaults = CodecDefaults::for_kind(kind);
    let (mut filter, mut page) = defaults.initial_state();

    filter.query = matches
        .get_one::<String>("query")
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty());
    for id in ids(matches, "category") {
        if !filter.category_ids.contains(&id) {
            filter.category_ids.push(id);
        }
    }
    filter.tag_ids.extend(ids(matches, "tag"));
    if let Some(sort) = sort_of(matches, kind)? {
        filter.sort = sort;
    }
    filter.locale = matches.get_one::<String>("locale").cloned();
    if let Some(value) = matches.get_one::<u32>("page") {
        page.page = PageState::validate_page(*value)?;
    }
    if let Some(value) = matches.get_one::<u32>("page_size") {
        page.page_size = PageState::validate_page_size(*value)?;
    }
    Ok((filter, page))
}

/// encode 子命令
pub fn encode(matches: &ArgMatches) -> Result<()> {
    let kind = kind_of(matches)?;
    let (filter, page) = state_from_args(matches, kind)?;
    let path = matches
        .get_one::<String>("path")
        .cloned()
        .unwrap_or_else(|| format!("/{}", kind));
    let query = codec::encode(&filter, &page, &CodecDefaults::for_kind(kind));
    println!("{}", codec::to_location(&path, &query));
    Ok(())
}

/// search 子命令 - 起一个搜索会话，按参数依次操作后等待结果
pub async fn search(root: &ArgMatches, matches: &ArgMatches) -> Result<()> {
    let kind = kind_of(matches)?;
    let path = format!("/{}", kind);
    let location = matches
        .get_one::<String>("location")
        .cloned()
        .unwrap_or_else(|| path.clone());
    let sort = sort_of(matches, kind)?;
    let backend = Arc::new(client(root)?);

    let sync = SearchSync::new(kind, path);
    let (handle, task) = session::spawn(sync, backend, MemoryHistory::new(location));
    handle.settled().await?;

    for id in ids(matches, "toggle_category") {
        handle.toggle_category(id)?;
    }
    for id in ids(matches, "toggle_tag") {
        handle.toggle_tag(id, true)?;
    }
    if let Some(sort) = sort {
        handle.set_sort(sort)?;
    }
    if let Some(text) = matches.get_one::<String>("query") {
        handle.set_query(text.clone())?;
    }
    if let Some(page) = matches.get_one::<u32>("page") {
        // 筛选条件的修改都会回到第一页，所以翻页放在最后
        handle.settled().await?;
        handle.set_page(*page)?;
    }

    let view = handle.settled().await?;
    handle.shutdown();
    task.await.context("搜索会话异常退出")?;

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_view(&view);
    }
    match view.error {
        Some(error) => bail!("搜索失败: {}", error),
        None => Ok(()),
    }
}

fn print_view(view: &SearchView) {
    println!("地址: {}", view.location);
    let Some(result) = &view.result else {
        println!("没有结果");
        return;
    };
    let pagination = &result.pagination;
    println!(
        "第 {}/{} 页，共 {} 条",
        pagination.page, pagination.page_count, pagination.total
    );
    for item in &result.items {
        match &item.published_at {
            Some(date) => println!("  [{}] {} ({})", item.id, item.title, date.format("%Y-%m-%d")),
            None => println!("  [{}] {}", item.id, item.title),
        }
    }
    if let Some(facets) = &result.facets {
        for (kind, options) in facets.iter() {
            let summary: Vec<String> = options
                .iter()
                .map(|option| format!("{}({})", option.name, option.count))
                .collect();
            println!("{}: {}", kind.wire_key(), summary.join(" "));
        }
    }
}

/// categories 子命令 - 按层级缩进输出
pub async fn categories(root: &ArgMatches) -> Result<()> {
    let categories = client(root)?.categories().await?;
    let tree = CategoryTree::from_categories(categories);
    for line in render_tree(&tree) {
        println!("{}", line);
    }
    Ok(())
}

fn render_tree(tree: &CategoryTree) -> Vec<String> {
    let mut lines = Vec::with_capacity(tree.len());
    let mut stack: Vec<(u64, usize)> = tree.roots().iter().rev().map(|id| (*id, 0)).collect();
    while let Some((id, depth)) = stack.pop() {
        if let Some(node) = tree.get(id) {
            lines.push(format!("{}[{}] {}", "  ".repeat(depth), node.id, node.name));
        }
        stack.extend(tree.children(id).iter().rev().map(|child| (*child, depth + 1)));
    }
    lines
}

/// tags 子命令
pub async fn tags(root: &ArgMatches) -> Result<()> {
    for tag in client(root)?.tags().await? {
        println!("[{}] {}", tag.id, tag.name);
    }
    Ok(())
}
