//! ビルドコンテキストのテンプレート展開
//!
//! テンプレートディレクトリ内の各ファイルを Tera テンプレートとして読み込み、
//! バージョンごとのビルドディレクトリに同名のファイルとして書き出します。
//!
//! テンプレートで使える変数:
//! - `version`: タグの元の表記（例: "12.3"）
//! - `maintainer`: メンテナ名
//! - `install_tools`: ツールをインストールするか
//! - `tools`: インストールするツール（スペース区切り）

use crate::error::{FlowError, Result};
use crate::version::Version;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tera::{Context, Tera};
use tokio::task::JoinSet;
use tracing::debug;

/// ビルドコンテキストに必須のテンプレート名
pub const DOCKERFILE: &str = "Dockerfile";

/// ツールのインストールを有効にする最小バージョン
pub const DEFAULT_TOOLS_SINCE: &str = "10.0.0";

/// デフォルトでインストールするツール
pub const DEFAULT_TOOLS: &str = "vim";

/// 展開ポリシー
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// このバージョン以上で `install_tools` が true になる
    pub tools_since: Version,
    pub tools: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            tools_since: Version::parse(DEFAULT_TOOLS_SINCE)
                .expect("default tools cutoff is a valid version"),
            tools: DEFAULT_TOOLS.to_string(),
        }
    }
}

/// 1バージョン分のビルドコンテキスト
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub dir: PathBuf,
    pub version: Version,
    pub maintainer: String,
    pub install_tools: bool,
    pub tools: String,
}

#[derive(Serialize)]
struct TemplateVars<'a> {
    version: &'a str,
    maintainer: &'a str,
    install_tools: bool,
    tools: &'a str,
}

/// 読み込み済みのテンプレート群
#[derive(Clone)]
pub struct TemplateSet {
    root: PathBuf,
    tera: Arc<Tera>,
    names: Vec<String>,
    dockerfile: String,
}

impl TemplateSet {
    /// ディレクトリ直下の通常ファイルをすべてテンプレートとして読み込む
    ///
    /// 隠しファイル（`.` で始まるもの）とサブディレクトリは対象外です。
    pub fn load(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| FlowError::TemplateSet {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut sources = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FlowError::io(dir, e))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            if name.starts_with('.') || !path.is_file() {
                continue;
            }

            let content = std::fs::read_to_string(&path).map_err(|e| FlowError::io(&path, e))?;
            sources.push((name, content));
        }

        Self::from_sources(dir, sources)
    }

    /// (名前, 内容) の組からテンプレート群を構築
    pub fn from_sources(root: impl Into<PathBuf>, sources: Vec<(String, String)>) -> Result<Self> {
        let root = root.into();

        if sources.is_empty() {
            return Err(FlowError::TemplateSet {
                path: root,
                message: "テンプレートがありません".to_string(),
            });
        }

        let Some(dockerfile) = sources
            .iter()
            .find(|(name, _)| name == DOCKERFILE)
            .map(|(_, content)| content.clone())
        else {
            return Err(FlowError::TemplateSet {
                path: root,
                message: format!("'{DOCKERFILE}' テンプレートが必要です"),
            });
        };

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_templates(
            sources
                .iter()
                .map(|(name, content)| (name.as_str(), content.as_str())),
        )
        .map_err(|e| FlowError::TemplateSet {
            path: root.clone(),
            message: extract_tera_error_detail(&e),
        })?;

        let mut names: Vec<String> = sources.into_iter().map(|(name, _)| name).collect();
        names.sort();
        debug!(root = %root.display(), templates = ?names, "Loaded template set");

        Ok(Self {
            root,
            tera: Arc::new(tera),
            names,
            dockerfile,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// テンプレート名（昇順）
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// 展開前の Dockerfile
    pub fn dockerfile_source(&self) -> &str {
        &self.dockerfile
    }

    /// Dockerfile の最初の FROM から上流イメージ名を取得
    pub fn source_image(&self) -> Result<String> {
        detect_source_image(&self.dockerfile).ok_or_else(|| {
            FlowError::SourceImage(self.root.join(DOCKERFILE).display().to_string())
        })
    }
}

impl std::fmt::Debug for TemplateSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateSet")
            .field("root", &self.root)
            .field("names", &self.names)
            .finish()
    }
}

/// テンプレート展開器
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    templates: TemplateSet,
    options: RenderOptions,
}

impl TemplateRenderer {
    pub fn new(templates: TemplateSet, options: RenderOptions) -> Self {
        Self { templates, options }
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    /// バージョンに対応するビルドコンテキストを組み立てる
    pub fn context(&self, dir: PathBuf, version: &Version, maintainer: &str) -> BuildContext {
        BuildContext {
            dir,
            version: version.clone(),
            maintainer: maintainer.to_string(),
            install_tools: *version >= self.options.tools_since,
            tools: self.options.tools.clone(),
        }
    }

    /// すべてのテンプレートを並行して展開し、`ctx.dir` に書き出す
    ///
    /// 1つでも失敗した時点で残りを中断してエラーを返します。
    /// 書き出し済みのファイルは削除しません。
    pub async fn render(&self, ctx: &BuildContext) -> Result<()> {
        let vars = TemplateVars {
            version: ctx.version.original(),
            maintainer: &ctx.maintainer,
            install_tools: ctx.install_tools,
            tools: &ctx.tools,
        };
        let context = Context::from_serialize(&vars).map_err(|e| FlowError::TemplateRender {
            name: self.templates.root.display().to_string(),
            message: extract_tera_error_detail(&e),
        })?;

        let mut tasks = JoinSet::new();
        for name in &self.templates.names {
            let tera = Arc::clone(&self.templates.tera);
            let context = context.clone();
            let name = name.clone();
            let path = ctx.dir.join(&name);

            tasks.spawn(async move {
                let rendered =
                    tera.render(&name, &context)
                        .map_err(|e| FlowError::TemplateRender {
                            name: name.clone(),
                            message: extract_tera_error_detail(&e),
                        })?;
                tokio::fs::write(&path, rendered)
                    .await
                    .map_err(|e| FlowError::io(&path, e))?;
                debug!(template = %name, path = %path.display(), "Rendered template");
                Ok::<_, FlowError>(())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| FlowError::TemplateRender {
                name: ctx.dir.display().to_string(),
                message: e.to_string(),
            });
            if let Err(e) = outcome.and_then(|rendered| rendered) {
                tasks.abort_all();
                return Err(e);
            }
        }

        Ok(())
    }
}

fn detect_source_image(dockerfile: &str) -> Option<String> {
    let mut words = dockerfile
        .lines()
        .map(str::trim)
        .find(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|keyword| keyword.eq_ignore_ascii_case("FROM"))
        })?
        .split_whitespace()
        .skip(1);

    let reference = words.find(|word| !word.starts_with("--"))?;
    let name = reference.split('@').next().unwrap_or(reference);

    // 最後の `:` 以降に `/` がなければタグ（ポート番号ではない）
    let name = match name.rfind(':') {
        Some(pos) if !name[pos..].contains('/') => &name[..pos],
        _ => name,
    };
    let name = name.strip_prefix("docker.io/").unwrap_or(name);
    let name = name.strip_prefix("library/").unwrap_or(name);

    if name.is_empty() || name.contains("{{") || name.contains('$') {
        return None;
    }
    Some(name.to_string())
}

/// Teraエラーから詳細情報を抽出
fn extract_tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }

    let full_error = details.join(" | ");

    if full_error.contains("not found in context")
        && let Some(start) = full_error.find("Variable `")
        && let Some(end) = full_error[start..].find("` not found")
    {
        let var_name = &full_error[start + 10..start + end];
        return format!(
            "未定義の変数: `{}`\nヒント: 使用できる変数は version, maintainer, install_tools, tools です",
            var_name
        );
    }

    full_error
}
