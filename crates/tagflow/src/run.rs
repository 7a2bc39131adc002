use crate::Cli;
use crate::tags;
use anyhow::{Context, Result};
use colored::Colorize;
use tagflow_build::{
    DockerCredentials, DockerEngine, Pipeline, PipelineOptions, PipelineReport, RegistryAuth,
    RunStatus,
};
use tagflow_core::{
    Constraint, RenderOptions, SelectorConfig, TagCache, TemplateRenderer, TemplateSet, Version,
    VersionSelector,
};
use tagflow_registry::DockerHubTags;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    // 設定の誤りはデーモンやネットワークに触れる前に検出する
    let constraint = Constraint::parse(&cli.constraint).context("バージョン制約を解析できません")?;

    let templates = TemplateSet::load(&cli.template_dir).with_context(|| {
        format!(
            "テンプレートを読み込めません: {}",
            cli.template_dir.display()
        )
    })?;

    let source = match &cli.source {
        Some(source) => source.clone(),
        None => templates
            .source_image()
            .context("上流イメージを検出できません。--source で指定してください")?,
    };
    info!("Upstream image: {}", source);

    let credentials = if cli.dry_run {
        None
    } else {
        Some(
            RegistryAuth::new()
                .login(&cli.target_repo)
                .context("プッシュ用の認証情報がありません")?,
        )
    };

    let cache_dir = tagflow_config::get_cache_dir(cli.cache_dir.as_deref())?;
    let cache_path = tagflow_config::cache_file(&cache_dir, &source);
    let client = DockerHubTags::new().with_page_size(tagflow_config::DEFAULT_PAGE_SIZE);
    let cache = tags::resolve(&client, &source, &cache_path, cli.refresh).await?;

    let outcome = build_versions(&cli, &cache, &constraint, templates, credentials, cancel).await;

    // 成否にかかわらずタグキャッシュは残す
    tags::persist(&cache, &cache_path);

    let Some(report) = outcome? else {
        return Ok(());
    };
    print_summary(&report, cli.dry_run);
    Ok(())
}

async fn build_versions(
    cli: &Cli,
    cache: &TagCache,
    constraint: &Constraint,
    templates: TemplateSet,
    credentials: Option<DockerCredentials>,
    cancel: CancellationToken,
) -> Result<Option<PipelineReport>> {
    let versions: Vec<Version> =
        VersionSelector::new(SelectorConfig::default()).select(&cache.tags, constraint);

    if versions.is_empty() {
        println!(
            "{} {} に一致するバージョンがありません",
            "ℹ".cyan(),
            constraint
        );
        return Ok(None);
    }

    println!(
        "{} {} 件のバージョンをビルドします: {}",
        "→".cyan(),
        versions.len(),
        versions
            .iter()
            .map(Version::original)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut engine = DockerEngine::connect(cancel.clone())
        .await
        .context("Docker デーモンに接続できません")?;
    if let Some(credentials) = credentials {
        engine = engine.with_credentials(credentials);
    }

    let options = PipelineOptions {
        target_repo: cli.target_repo.clone(),
        build_root: cli.build_dir.clone(),
        maintainer: cli.maintainer.clone(),
        tag_latest: cli.latest,
        dry_run: cli.dry_run,
        keep_build_dirs: cli.keep,
    };
    let renderer = TemplateRenderer::new(templates, RenderOptions::default());

    let mut pipeline = Pipeline::new(engine, renderer, options, cancel);
    let report = pipeline
        .run(&versions)
        .await
        .context("イメージのビルドに失敗しました")?;

    Ok(Some(report))
}

fn print_summary(report: &PipelineReport, dry_run: bool) {
    println!();
    match report.status {
        RunStatus::Completed => println!("{}", "✓ 完了しました".green().bold()),
        RunStatus::Cancelled => println!("{}", "⚠ 中断しました".yellow().bold()),
    }

    println!("  ビルド: {} 件", report.built.len());
    for tag in &report.built {
        println!("    {}", tag.cyan());
    }

    if dry_run {
        println!("  プッシュ: {}", "dry-run のためスキップ".dimmed());
    } else {
        println!("  プッシュ: {} 件", report.pushed.len());
        for tag in &report.pushed {
            println!("    {}", tag.cyan());
        }
    }

    if !report.removed.is_empty() {
        println!("  削除したイメージ: {} 件", report.removed.len());
    }
    if !report.stranded.is_empty() {
        println!(
            "  {} 削除できなかったイメージ: {}",
            "⚠".yellow(),
            report.stranded.join(", ")
        );
    }
}
