use crate::builder::ImageBuilder;
use crate::context::ContextBuilder;
use crate::engine::{BuildEngine, BuiltImage};
use crate::error::{BuildError, BuildResult};
use crate::pusher::ImagePusher;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// ローカルの Docker デーモンを使うビルドエンジン
pub struct DockerEngine {
    builder: ImageBuilder,
    pusher: ImagePusher,
}

impl DockerEngine {
    /// デフォルト設定でデーモンに接続し、疎通を確認する
    pub async fn connect(cancel: CancellationToken) -> BuildResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        docker.ping().await?;
        tracing::debug!("Connected to Docker daemon");
        Ok(Self::new(docker, cancel))
    }

    pub fn new(docker: Docker, cancel: CancellationToken) -> Self {
        Self {
            builder: ImageBuilder::new(docker.clone(), cancel.clone()),
            pusher: ImagePusher::new(docker, cancel),
        }
    }

    pub fn with_credentials(mut self, credentials: DockerCredentials) -> Self {
        self.pusher = self.pusher.with_credentials(credentials);
        self
    }
}

impl BuildEngine for DockerEngine {
    async fn build(&self, context_dir: &Path, tags: &[String]) -> BuildResult<BuiltImage> {
        let (primary, extra) = tags
            .split_first()
            .ok_or_else(|| BuildError::InvalidConfig("no tag given for build".to_string()))?;

        let context = ContextBuilder::create_context(context_dir)?;
        self.builder.build_image(context, primary).await?;

        let built = self.builder.resolve_ids(primary).await?;
        self.tag(&built.image_id, extra).await?;
        Ok(built)
    }

    async fn tag(&self, source_id: &str, targets: &[String]) -> BuildResult<()> {
        for target in targets {
            self.builder.tag_image(source_id, target).await?;
        }
        Ok(())
    }

    async fn push(&self, tags: &[String]) -> BuildResult<()> {
        for tag in tags {
            self.pusher.push(tag).await?;
        }
        Ok(())
    }

    async fn remove(&self, ids: &[String]) -> BuildResult<()> {
        for id in ids {
            if self.builder.remove_image(id).await? {
                tracing::info!("Removed image {}", id);
            } else {
                tracing::debug!("Image {} was already removed", id);
            }
        }
        Ok(())
    }
}
