//! バージョンごとのビルドパイプライン
//!
//! 選択済みのバージョンを昇順に1つずつ処理します。
//!
//! 1. ビルドディレクトリを作り直してテンプレートを展開
//! 2. `<target>:<version>`（最後のバージョンのみ `latest` も）でビルド
//! 3. dry-run でなければプッシュ
//! 4. 2世代前のイメージを削除
//!
//! 中断はバージョンの境目で確認し、実行中のデーモン呼び出しは
//! エンジン側で同じトークンにより打ち切られます。

use crate::engine::{BuildEngine, BuiltImage};
use crate::error::{BuildError, PipelineError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tagflow_core::{TemplateRenderer, Version};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const LATEST_TAG: &str = "latest";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// プッシュ先リポジトリ（例: "acme/postgres"）
    pub target_repo: String,
    /// バージョンごとのビルドディレクトリを作る場所
    pub build_root: PathBuf,
    pub maintainer: String,
    /// 最後のバージョンに `latest` を付ける
    pub tag_latest: bool,
    /// ビルドのみ行い、プッシュしない
    pub dry_run: bool,
    /// 終了時にビルドディレクトリを残す
    pub keep_build_dirs: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Preparing,
    Building,
    Pushing,
    Cleaning,
    Cancelled,
    Failed,
}

/// 1回のビルドで生まれたイメージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageGeneration {
    pub image_id: String,
    pub base_id: String,
}

impl From<BuiltImage> for ImageGeneration {
    fn from(built: BuiltImage) -> Self {
        Self {
            image_id: built.image_id,
            base_id: built.base_id,
        }
    }
}

impl ImageGeneration {
    fn ids(&self) -> [&str; 2] {
        [self.image_id.as_str(), self.base_id.as_str()]
    }
}

/// ローカルに残しているイメージの世代
///
/// 直前の世代は次のビルドのレイヤーキャッシュとして残し、
/// それより古い世代は新しい世代のビルドが終わった時点で削除対象になります。
#[derive(Debug, Clone, Default)]
pub struct ArtifactWindow {
    previous: Option<ImageGeneration>,
    superseded: Option<ImageGeneration>,
}

impl ArtifactWindow {
    pub fn previous(&self) -> Option<&ImageGeneration> {
        self.previous.as_ref()
    }

    pub fn superseded(&self) -> Option<&ImageGeneration> {
        self.superseded.as_ref()
    }

    /// `current` をビルドした後に削除してよい ID
    ///
    /// 以前に削除できなかった `stranded` と2世代前の ID のうち、
    /// 直前の世代と `current` が使っていないもの。
    pub fn evictable(&self, current: &ImageGeneration, stranded: &[String]) -> Vec<String> {
        let retained: HashSet<&str> = std::iter::once(current)
            .chain(self.previous.as_ref())
            .flat_map(ImageGeneration::ids)
            .collect();

        let old = self.superseded.iter().flat_map(ImageGeneration::ids);

        let mut ids: Vec<String> = Vec::new();
        for id in stranded.iter().map(String::as_str).chain(old) {
            if !id.is_empty() && !retained.contains(id) && !ids.iter().any(|known| known == id) {
                ids.push(id.to_string());
            }
        }
        ids
    }

    /// 窓を1世代進める
    pub fn advance(&mut self, current: ImageGeneration) {
        self.superseded = self.previous.replace(current);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStatus {
    #[default]
    Completed,
    /// 中断された（失敗ではない）
    Cancelled,
}

/// 実行結果のまとめ
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub status: RunStatus,
    /// ビルドしたタグ（`<target>:<version>`）
    pub built: Vec<String>,
    /// プッシュしたタグ
    pub pushed: Vec<String>,
    /// 削除したイメージ ID
    pub removed: Vec<String>,
    /// 削除に失敗して残ったイメージ ID
    pub stranded: Vec<String>,
}

impl PipelineReport {
    pub fn is_cancelled(&self) -> bool {
        self.status == RunStatus::Cancelled
    }
}

enum Step {
    Continue,
    Cancelled,
}

pub struct Pipeline<E> {
    engine: E,
    renderer: TemplateRenderer,
    options: PipelineOptions,
    cancel: CancellationToken,
    window: ArtifactWindow,
    state: PipelineState,
    marked_dirs: Vec<PathBuf>,
}

impl<E: BuildEngine> Pipeline<E> {
    pub fn new(
        engine: E,
        renderer: TemplateRenderer,
        options: PipelineOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            renderer,
            options,
            cancel,
            window: ArtifactWindow::default(),
            state: PipelineState::Idle,
            marked_dirs: Vec::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn window(&self) -> &ArtifactWindow {
        &self.window
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// バージョンを順に処理する
    ///
    /// どの終わり方でも、削除対象として記録したビルドディレクトリは片付けます。
    pub async fn run(&mut self, versions: &[Version]) -> Result<PipelineReport, PipelineError> {
        let mut report = PipelineReport::default();
        let outcome = self.run_versions(versions, &mut report).await;
        self.sweep_build_dirs();

        match outcome {
            Ok(status) => {
                report.status = status;
                Ok(report)
            }
            Err(e) => {
                self.transition(PipelineState::Failed);
                Err(e)
            }
        }
    }

    async fn run_versions(
        &mut self,
        versions: &[Version],
        report: &mut PipelineReport,
    ) -> Result<RunStatus, PipelineError> {
        let total = versions.len();

        for (index, version) in versions.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Cancellation requested, stopping before {}", version);
                self.transition(PipelineState::Cancelled);
                return Ok(RunStatus::Cancelled);
            }

            info!("Processing {} ({}/{})", version, index + 1, total);
            let is_last = index + 1 == total;

            if let Step::Cancelled = self.process(version, is_last, report).await? {
                warn!("Cancelled while processing {}", version);
                self.transition(PipelineState::Cancelled);
                return Ok(RunStatus::Cancelled);
            }
        }

        Ok(RunStatus::Completed)
    }

    async fn process(
        &mut self,
        version: &Version,
        is_last: bool,
        report: &mut PipelineReport,
    ) -> Result<Step, PipelineError> {
        self.transition(PipelineState::Preparing);
        let dir = self.options.build_root.join(version.original());
        self.prepare_dir(version, &dir)?;

        let ctx = self
            .renderer
            .context(dir.clone(), version, &self.options.maintainer);
        self.renderer
            .render(&ctx)
            .await
            .map_err(|source| PipelineError::Render {
                version: version.to_string(),
                source,
            })?;

        self.transition(PipelineState::Building);
        let tags = self.image_tags(version, is_last);
        let primary = tags[0].clone();

        let built = match self.engine.build(&dir, &tags).await {
            Ok(built) => built,
            Err(BuildError::Cancelled) => return Ok(Step::Cancelled),
            Err(source) => {
                return Err(PipelineError::Build {
                    tag: primary,
                    source,
                });
            }
        };
        info!(image_id = %built.image_id, "Built {}", tags.join(", "));
        report.built.push(primary.clone());

        if self.options.dry_run {
            info!("Dry run, skipping push of {}", primary);
        } else {
            self.transition(PipelineState::Pushing);
            match self.engine.push(&tags).await {
                Ok(()) => report.pushed.extend(tags.iter().cloned()),
                Err(BuildError::Cancelled) => return Ok(Step::Cancelled),
                Err(source) => {
                    return Err(PipelineError::Push {
                        tag: primary,
                        source,
                    });
                }
            }
        }

        self.transition(PipelineState::Cleaning);
        let generation = ImageGeneration::from(built);
        let evict = self.window.evictable(&generation, &report.stranded);
        if !evict.is_empty() {
            match self.engine.remove(&evict).await {
                Ok(()) => {
                    report.stranded.retain(|id| !evict.contains(id));
                    report.removed.extend(evict);
                }
                Err(e) => {
                    // 残った ID は次の世代の削除でもう一度試す
                    warn!("Failed to remove old images {}: {}", evict.join(", "), e);
                    for id in evict {
                        if !report.stranded.contains(&id) {
                            report.stranded.push(id);
                        }
                    }
                }
            }
        }
        self.window.advance(generation);

        self.transition(PipelineState::Idle);
        Ok(Step::Continue)
    }

    fn image_tags(&self, version: &Version, is_last: bool) -> Vec<String> {
        let mut tags = vec![format!(
            "{}:{}",
            self.options.target_repo,
            version.original()
        )];
        if self.options.tag_latest && is_last {
            tags.push(format!("{}:{}", self.options.target_repo, LATEST_TAG));
        }
        tags
    }

    fn prepare_dir(&mut self, version: &Version, dir: &Path) -> Result<(), PipelineError> {
        let prepare_error = |source: std::io::Error| PipelineError::PrepareDir {
            version: version.to_string(),
            path: dir.to_path_buf(),
            source,
        };

        if dir.exists() {
            std::fs::remove_dir_all(dir).map_err(prepare_error)?;
        }
        std::fs::create_dir_all(dir).map_err(prepare_error)?;

        if !self.options.keep_build_dirs && !self.marked_dirs.iter().any(|d| d == dir) {
            self.marked_dirs.push(dir.to_path_buf());
        }
        Ok(())
    }

    fn sweep_build_dirs(&mut self) {
        for dir in self.marked_dirs.drain(..) {
            debug!("Removing build directory {}", dir.display());
            if let Err(e) = std::fs::remove_dir_all(&dir)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!("Failed to remove build directory {}: {}", dir.display(), e);
            }
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "Pipeline state");
        self.state = next;
    }
}
