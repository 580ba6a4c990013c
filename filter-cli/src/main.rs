use anyhow::Result;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use content_client::config::{ENV_API_TOKEN, ENV_API_URL};

mod commands;

/// 命令行参数定义
fn cli() -> Command {
    let kind = || {
        Arg::new("kind")
            .short('k')
            .long("kind")
            .value_name("KIND")
            .help("内容类型: articles 或 recipes")
            .default_value("articles")
    };

    Command::new("filter-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("文章 / 菜谱列表的筛选地址工具和搜索客户端")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("api_url")
                .long("api-url")
                .value_name("URL")
                .env(ENV_API_URL)
                .global(true)
                .help("内容接口地址"),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .value_name("TOKEN")
                .env(ENV_API_TOKEN)
                .hide_env_values(true)
                .global(true)
                .help("接口令牌"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .help("显示详细日志")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("decode")
                .about("解析筛选地址，输出状态和规范化后的查询串")
                .arg(
                    Arg::new("location")
                        .value_name("QUERY")
                        .help("查询串或完整地址，例如 '/articles?tagIds=1,2&page=2'")
                        .required(true),
                )
                .arg(kind()),
        )
        .subcommand(
            Command::new("encode")
                .about("根据筛选条件生成地址")
                .arg(kind())
                .arg(
                    Arg::new("query")
                        .short('q')
                        .long("q")
                        .value_name("TEXT")
                        .help("搜索关键词"),
                )
                .arg(
                    Arg::new("category")
                        .short('c')
                        .long("category")
                        .value_name("ID")
                        .value_parser(value_parser!(u64))
                        .action(ArgAction::Append)
                        .help("分类ID，可重复"),
                )
                .arg(
                    Arg::new("tag")
                        .short('t')
                        .long("tag")
                        .value_name("ID")
                        .value_parser(value_parser!(u64))
                        .action(ArgAction::Append)
                        .help("标签ID，可重复"),
                )
                .arg(
                    Arg::new("sort")
                        .short('s')
                        .long("sort")
                        .value_name("SORT")
                        .help("排序方式，例如 publishedAt:asc"),
                )
                .arg(
                    Arg::new("locale")
                        .long("locale")
                        .value_name("LOCALE")
                        .help("语言"),
                )
                .arg(
                    Arg::new("page")
                        .short('p')
                        .long("page")
                        .value_name("N")
                        .value_parser(value_parser!(u32))
                        .help("页码"),
                )
                .arg(
                    Arg::new("page_size")
                        .long("page-size")
                        .value_name("N")
                        .value_parser(value_parser!(u32))
                        .help("每页条数"),
                )
                .arg(
                    Arg::new("path")
                        .long("path")
                        .value_name("PATH")
                        .help("列表页路径，默认 /{kind}"),
                ),
        )
        .subcommand(
            Command::new("search")
                .about("按地址恢复筛选状态并请求接口，输出结果和同步后的地址")
                .arg(
                    Arg::new("location")
                        .value_name("LOCATION")
                        .help("起始地址，默认 /{kind}"),
                )
                .arg(kind())
                .arg(
                    Arg::new("query")
                        .short('q')
                        .long("q")
                        .value_name("TEXT")
                        .help("输入搜索关键词（走防抖）"),
                )
                .arg(
                    Arg::new("toggle_category")
                        .short('c')
                        .long("toggle-category")
                        .value_name("ID")
                        .value_parser(value_parser!(u64))
                        .action(ArgAction::Append)
                        .help("切换分类，可重复"),
                )
                .arg(
                    Arg::new("toggle_tag")
                        .short('t')
                        .long("toggle-tag")
                        .value_name("ID")
                        .value_parser(value_parser!(u64))
                        .action(ArgAction::Append)
                        .help("勾选标签，可重复"),
                )
                .arg(
                    Arg::new("sort")
                        .short('s')
                        .long("sort")
                        .value_name("SORT")
                        .help("排序方式"),
                )
                .arg(
                    Arg::new("page")
                        .short('p')
                        .long("page")
                        .value_name("N")
                        .value_parser(value_parser!(u32))
                        .help("跳到指定页"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("以 JSON 输出完整状态")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("categories").about("列出分类树"))
        .subcommand(Command::new("tags").about("列出标签"))
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "filter_cli=debug,article_filter=debug,content_client=debug"
    } else {
        "filter_cli=info,article_filter=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(matches: ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("decode", sub)) => commands::decode(sub),
        Some(("encode", sub)) => commands::encode(sub),
        Some(("search", sub)) => commands::search(&matches, sub).await,
        Some(("categories", _)) => commands::categories(&matches).await,
        Some(("tags", _)) => commands::tags(&matches).await,
        other => anyhow::bail!("未知的子命令: {:?}", other.map(|(name, _)| name)),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("verbose"));
    run(matches).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn repeated_ids_are_collected() {
        let matches = cli()
            .try_get_matches_from(["filter-cli", "encode", "-t", "3", "--tag", "1", "-c", "5"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let tags: Vec<u64> = sub.get_many::<u64>("tag").unwrap().copied().collect();
        assert_eq!(tags, vec![3, 1]);
    }

    #[test]
    fn missing_subcommand_is_an_error() {
        assert!(cli().try_get_matches_from(["filter-cli"]).is_err());
    }
}
