//! Bilibili 收藏夹视频下载器。
//!
//! 读取 Cookie 登录态，列出收藏夹，按所选画质下载每个视频的每个分P，
//! 用 FFmpeg 合并音视频，并用历史记录保证重复运行不会重复下载。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/凭证/限速/路径等基础设施
//! - `network_parser`：B站接口（收藏夹目录、播放地址）
//! - `download`：下载流程编排（拉流、重试、合并、历史记录）
//! - `ui`：命令行交互

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use tracing::{error, info, warn};

mod base_system;
mod download;
mod network_parser;
mod ui;

use base_system::config::load_or_create_with_base;
use base_system::context::Config;
use base_system::credential::Credential;
use base_system::logging::{LogOptions, LogSystem};
use base_system::rate_limit::RateLimiter;
use download::error::DownloadError;
use download::fetcher::Fetcher;
use download::history::HistoryStore;
use download::models::{Collection, QualityMode, RunSummary};
use download::muxer::FfmpegMuxer;
use download::pipeline::{Pipeline, PipelineOptions};
use network_parser::catalog::Catalog;
use network_parser::network::{BiliClient, BiliWebConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "bili-fav-downloader")]
#[command(about = "Bilibili 收藏夹视频下载器")]
struct Cli {
    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（存放 config.yml、logs、历史记录；相对路径都以此为基准）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 指定配置文件路径
    #[arg(long)]
    config: Option<PathBuf>,

    /// 不询问，全部以最高画质下载
    #[arg(long, default_value_t = false, conflicts_with = "manual_quality")]
    auto_quality: bool,

    /// 不询问，每个分P手动选择画质
    #[arg(long, default_value_t = false)]
    manual_quality: bool,

    /// 直接指定要下载的收藏夹序号，如 `1,3` 或 `2-4`
    #[arg(long)]
    folders: Option<String>,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("Bili Fav Downloader v{}", VERSION);
        return Ok(());
    }

    let data_dir = cli.data_dir.as_deref();
    if let Some(dir) = data_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("创建数据目录失败: {}", dir.display()))?;
    }
    let _log = init_logging(cli.debug, data_dir)?;
    info!(target: "startup", "当前版本: v{}", VERSION);

    match run(&cli, data_dir) {
        Ok(summary) => {
            println!(
                "\n完成：新下载 {} 个，已存在跳过 {} 个，失败 {} 个",
                summary.completed, summary.skipped, summary.failed
            );
            if summary.entries_failed > 0 || summary.collections_failed > 0 {
                println!(
                    "另有 {} 个视频、{} 个收藏夹无法读取，详见日志",
                    summary.entries_failed, summary.collections_failed
                );
            }
            Ok(())
        }
        Err(err) => {
            error!("{err:#}");
            Err(err)
        }
    }
}

fn run(cli: &Cli, data_dir: Option<&Path>) -> Result<RunSummary> {
    let loaded = load_or_create_with_base::<Config>(cli.config.as_deref(), data_dir)
        .context("加载配置失败")?;
    if loaded.created {
        bail!(
            "已生成默认配置文件 {}，请填写 cookies（需包含 DedeUserID 与 SESSDATA）后重新运行",
            loaded.path.display()
        );
    }
    let config = loaded.config.with_base_dir(data_dir);

    let credential = Credential::parse(&config.cookies).map_err(DownloadError::from)?;
    if !credential.has_session() {
        warn!("cookie 中没有 SESSDATA，只能获取游客可见的画质");
    }
    info!(user_id = credential.user_id(), "已读取登录凭证");

    let mut history = HistoryStore::open(&config.history_path()).context("打开下载历史失败")?;
    if history.is_empty() {
        println!("暂无下载历史记录");
    } else {
        println!("已加载历史记录：{} 条", history.len());
    }

    let limiter = RateLimiter::new(config.request_interval());
    let client = BiliClient::new(credential, BiliWebConfig::from(&config))
        .context("创建 HTTP 客户端失败")?;

    let mut mode = choose_quality_mode(cli)?;

    let folders = client
        .list_collections(&limiter)
        .context("获取收藏夹列表失败，请检查 Cookie 是否有效、网络是否正常")?;
    if folders.is_empty() {
        println!("没有找到任何收藏夹");
        return Ok(RunSummary::default());
    }

    let Some(selected) = choose_collections(cli, &folders)? else {
        println!("下载已取消");
        return Ok(RunSummary::default());
    };

    let muxer = FfmpegMuxer::new(config.ffmpeg_path.clone());
    let fetcher = Fetcher::new(&client, &limiter, config.max_retries, config.show_progress);
    let mut pipeline = Pipeline::new(
        &client,
        &client,
        fetcher,
        &muxer,
        &mut history,
        &limiter,
        PipelineOptions {
            save_dir: config.save_dir(),
            temp_dir: config.temp_dir(),
            history_match: config.history_match,
        },
    );
    pipeline
        .run(&selected, &mut mode)
        .context("下载中止")
}

fn choose_quality_mode(cli: &Cli) -> Result<QualityMode> {
    let automatic = if cli.auto_quality {
        true
    } else if cli.manual_quality {
        false
    } else {
        ui::noui::ask_auto_quality()?
    };
    Ok(if automatic {
        QualityMode::Automatic
    } else {
        QualityMode::Manual(ui::noui::quality_asker())
    })
}

fn choose_collections(cli: &Cli, folders: &[Collection]) -> Result<Option<Vec<Collection>>> {
    let Some(indices) = cli.folders.as_deref() else {
        return ui::noui::select_collections(folders);
    };
    ui::noui::print_collections(folders);
    let picked = ui::noui::parse_indices(indices, folders.len())
        .map_err(|msg| anyhow!("--folders 参数无效: {msg}"))?;
    Ok(Some(picked.into_iter().map(|i| folders[i].clone()).collect()))
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: true,
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}
