use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("バージョン制約が不正です: '{expr}'\n理由: {message}")]
    ConstraintParse { expr: String, message: String },

    #[error("バージョンとして解釈できません: '{text}' ({message})")]
    VersionParse { text: String, message: String },

    #[error("テンプレートセットが不正です: {path}\n理由: {message}")]
    TemplateSet { path: PathBuf, message: String },

    #[error("テンプレート展開エラー: {name}\n理由: {message}")]
    TemplateRender { name: String, message: String },

    #[error("ベースイメージを特定できません: {0}\nヒント: Dockerfile テンプレートに FROM を記述するか --source を指定してください")]
    SourceImage(String),

    #[error("タグキャッシュが見つかりません: {0}")]
    CacheNotFound(PathBuf),

    #[error("タグキャッシュが不正です: {path}\n理由: {message}")]
    CacheInvalid { path: PathBuf, message: String },

    #[error("IO エラー: {path}\n理由: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FlowError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FlowError::Io {
            path: path.into(),
            source,
        }
    }

    /// キャッシュミスとして扱うべきエラーか
    pub fn is_cache_miss(&self) -> bool {
        matches!(
            self,
            FlowError::CacheNotFound(_) | FlowError::CacheInvalid { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
