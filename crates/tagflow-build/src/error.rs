use std::path::PathBuf;
use tagflow_core::FlowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Dockerfile not found in build context: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Build context directory not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Image not found after build: {0}")]
    ImageNotFound(String),

    #[error("Could not resolve base image of {0}")]
    BaseImageNotFound(String),

    #[error("Failed to tag {source_id} as {target}: {message}")]
    TagFailed {
        source_id: String,
        target: String,
        message: String,
    },

    #[error("Push failed for {image}: {message}")]
    PushFailed { image: String, message: String },

    #[error("Failed to remove image {id}: {message}")]
    RemoveFailed { id: String, message: String },

    #[error("Invalid tag: {tag}")]
    InvalidTag { tag: String },

    #[error("Registry authentication failed for {registry}: {message}")]
    AuthFailed { registry: String, message: String },

    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::DockerConnection(e) => {
                format!(
                    "Dockerに接続できません: {}\n\
                     \n\
                     ヒント:\n\
                     • Dockerが起動しているか確認してください\n\
                     • DOCKER_HOST の設定を確認してください",
                    e
                )
            }
            BuildError::DockerfileNotFound(path) => {
                format!(
                    "Dockerfileが見つかりません: {}\n\
                     \n\
                     テンプレートディレクトリに 'Dockerfile' があるか確認してください。",
                    path.display()
                )
            }
            BuildError::BuildFailed(msg) => {
                format!(
                    "ビルドに失敗しました: {}\n\
                     \n\
                     Dockerfileテンプレートの内容を確認してください。",
                    msg
                )
            }
            BuildError::AuthFailed { registry, message } => {
                format!(
                    "レジストリ認証に失敗しました ({}): {}\n\
                     \n\
                     解決方法:\n\
                     1. DOCKER_USERNAME と DOCKER_PASSWORD を設定してください\n\
                     2. または docker login {} を実行してください\n\
                     3. プッシュしない場合は --dry-run を指定してください",
                    registry, message, registry
                )
            }
            _ => format!("{}", self),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BuildError::Cancelled)
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// パイプラインの致命的なエラー
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to prepare build directory {path} for {version}")]
    PrepareDir {
        version: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render build context for {version}")]
    Render {
        version: String,
        #[source]
        source: FlowError,
    },

    #[error("failed to build image {tag}")]
    Build {
        tag: String,
        #[source]
        source: BuildError,
    },

    #[error("failed to push image {tag}")]
    Push {
        tag: String,
        #[source]
        source: BuildError,
    },
}
