mod run;
mod tags;

use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use tagflow_build::BuildError;
use tagflow_config::{CACHE_DIR_ENV, DEFAULT_BUILD_DIR, DEFAULT_MAINTAINER};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tagflow")]
#[command(
    about = "上流イメージのバージョンごとに Dockerfile テンプレートからイメージをビルドして公開",
    long_about = None
)]
pub struct Cli {
    /// テンプレートディレクトリ（Dockerfile を含む）
    pub template_dir: PathBuf,

    /// 公開先リポジトリ（例: acme/postgres）
    pub target_repo: String,

    /// テンプレートに渡すメンテナ名
    #[arg(short, long, default_value = DEFAULT_MAINTAINER)]
    pub maintainer: String,

    /// バージョンごとのビルドディレクトリを作る場所
    #[arg(short = 'b', long = "build", default_value = DEFAULT_BUILD_DIR)]
    pub build_dir: PathBuf,

    /// バージョン制約（例: ">= 12.0, < 13.0"）。空ならすべて
    #[arg(short = 'v', long, visible_alias = "version", default_value = "")]
    pub constraint: String,

    /// 最も新しいバージョンに latest を付ける
    #[arg(short, long)]
    pub latest: bool,

    /// ビルドのみ行い、プッシュしない
    #[arg(long)]
    pub dry_run: bool,

    /// デバッグログを出力
    #[arg(long)]
    pub debug: bool,

    /// 終了後もビルドディレクトリを残す
    #[arg(long)]
    pub keep: bool,

    /// 上流イメージ（省略時は Dockerfile の FROM から検出）
    #[arg(long)]
    pub source: Option<String>,

    /// キャッシュがあってもレジストリからタグを取り直す
    #[arg(long)]
    pub refresh: bool,

    /// タグキャッシュの保存先
    #[arg(long, env = CACHE_DIR_ENV)]
    pub cache_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env の値は CLI の env 既定値にも効かせるため、解析より先に読む
    let dotenv = tagflow_config::load_dotenv();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_tracing(cli.debug);
    if let Err(e) = dotenv {
        tracing::warn!("{}", e);
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current step");
            signal_token.cancel();
        }
    });

    if let Err(e) = run::run(cli, cancel).await {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        if let Some(hint) = user_hint(&e) {
            eprintln!();
            eprintln!("{}", hint);
        }
        std::process::exit(1);
    }

    Ok(())
}

/// RUST_LOG が優先。なければ --debug で debug、既定は info
fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn user_hint(err: &anyhow::Error) -> Option<String> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<BuildError>())
        .map(BuildError::user_message)
        .filter(|message| !err.chain().any(|cause| cause.to_string() == *message))
}
