use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tagflow_build::{BuildEngine, BuildError, BuildResult, BuiltImage, PipelineOptions};
use tagflow_core::{RenderOptions, TemplateRenderer, TemplateSet, Version};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Build(Vec<String>),
    Tag(String, Vec<String>),
    Push(Vec<String>),
    Remove(Vec<String>),
}

/// 呼び出しを記録するだけのエンジン
#[derive(Default)]
pub struct FakeEngine {
    calls: Mutex<Vec<Call>>,
    dockerfiles: Mutex<Vec<String>>,
    shared_base: Option<String>,
    fail_build: Option<String>,
    fail_push: Option<String>,
    remove_failures: Mutex<usize>,
    cancelled_build: Option<String>,
    cancel_after_build: Option<(String, CancellationToken)>,
}

#[allow(dead_code)]
impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shared_base(mut self, base: &str) -> Self {
        self.shared_base = Some(base.to_string());
        self
    }

    pub fn failing_build(mut self, tag: &str) -> Self {
        self.fail_build = Some(tag.to_string());
        self
    }

    pub fn failing_push(mut self, tag: &str) -> Self {
        self.fail_push = Some(tag.to_string());
        self
    }

    pub fn failing_remove(self) -> Self {
        self.failing_remove_times(usize::MAX)
    }

    /// 最初の `times` 回の削除だけ失敗させる
    pub fn failing_remove_times(self, times: usize) -> Self {
        *self.remove_failures.lock().unwrap() = times;
        self
    }

    /// このタグのビルドを中断扱いにする
    pub fn cancelled_on(mut self, tag: &str) -> Self {
        self.cancelled_build = Some(tag.to_string());
        self
    }

    /// このタグのビルドが終わった直後にトークンを発火する
    pub fn cancel_after(mut self, tag: &str, token: CancellationToken) -> Self {
        self.cancel_after_build = Some((tag.to_string(), token));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn builds(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Build(tags) => Some(tags),
                _ => None,
            })
            .collect()
    }

    pub fn pushes(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Push(tags) => Some(tags),
                _ => None,
            })
            .collect()
    }

    pub fn removals(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Remove(ids) => Some(ids),
                _ => None,
            })
            .collect()
    }

    /// ビルド時点で読めた Dockerfile の内容
    pub fn dockerfiles(&self) -> Vec<String> {
        self.dockerfiles.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl BuildEngine for FakeEngine {
    async fn build(&self, context_dir: &Path, tags: &[String]) -> BuildResult<BuiltImage> {
        self.record(Call::Build(tags.to_vec()));

        let dockerfile = fs::read_to_string(context_dir.join("Dockerfile"))
            .map_err(|_| BuildError::DockerfileNotFound(context_dir.join("Dockerfile")))?;
        self.dockerfiles.lock().unwrap().push(dockerfile);

        let primary = &tags[0];
        if self.fail_build.as_ref() == Some(primary) {
            return Err(BuildError::BuildFailed(format!("step failed for {}", primary)));
        }
        if self.cancelled_build.as_ref() == Some(primary) {
            return Err(BuildError::Cancelled);
        }
        if let Some((tag, token)) = &self.cancel_after_build
            && tag == primary
        {
            token.cancel();
        }

        let generation = self.builds().len();
        Ok(BuiltImage {
            image_id: format!("img{}", generation),
            base_id: self
                .shared_base
                .clone()
                .unwrap_or_else(|| format!("base{}", generation)),
        })
    }

    async fn tag(&self, source_id: &str, targets: &[String]) -> BuildResult<()> {
        self.record(Call::Tag(source_id.to_string(), targets.to_vec()));
        Ok(())
    }

    async fn push(&self, tags: &[String]) -> BuildResult<()> {
        self.record(Call::Push(tags.to_vec()));
        if self.fail_push.as_ref() == Some(&tags[0]) {
            return Err(BuildError::PushFailed {
                image: tags[0].clone(),
                message: "denied".to_string(),
            });
        }
        Ok(())
    }

    async fn remove(&self, ids: &[String]) -> BuildResult<()> {
        self.record(Call::Remove(ids.to_vec()));
        let mut failures = self.remove_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(BuildError::RemoveFailed {
                id: ids[0].clone(),
                message: "conflict: image is being used by running container".to_string(),
            });
        }
        Ok(())
    }
}

pub struct Workspace {
    pub root: TempDir,
}

#[allow(dead_code)]
impl Workspace {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn build_root(&self) -> PathBuf {
        self.root.path().join("build")
    }

    pub fn options(&self) -> PipelineOptions {
        PipelineOptions {
            target_repo: "acme/postgres".to_string(),
            build_root: self.build_root(),
            maintainer: "Jane Doe".to_string(),
            tag_latest: true,
            dry_run: false,
            keep_build_dirs: false,
        }
    }
}

pub fn renderer() -> TemplateRenderer {
    renderer_from(vec![
        (
            "Dockerfile",
            "FROM postgres:{{ version }}\nLABEL maintainer=\"{{ maintainer }}\"\n",
        ),
        ("init.sh", "echo {{ version }}\n"),
    ])
}

pub fn renderer_from(sources: Vec<(&str, &str)>) -> TemplateRenderer {
    let sources = sources
        .into_iter()
        .map(|(name, content)| (name.to_string(), content.to_string()))
        .collect();
    let templates = TemplateSet::from_sources("templates", sources).unwrap();
    TemplateRenderer::new(templates, RenderOptions::default())
}

pub fn versions(raw: &[&str]) -> Vec<Version> {
    raw.iter().map(|v| Version::parse(v).unwrap()).collect()
}

pub fn tags(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|t| t.to_string()).collect()
}
