use crate::engine::{BuiltImage, base_image_id, trim_digest};
use crate::error::{BuildError, BuildResult};
use crate::output::{DaemonLine, LineScan};
use crate::progress::BuildProgress;
use crate::pusher::split_image_tag;
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use http_body_util::{Either, Full};
use std::collections::HashMap;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// ローカルイメージの作成・タグ付け・削除
pub struct ImageBuilder {
    docker: Docker,
    cancel: CancellationToken,
}

impl ImageBuilder {
    pub fn new(docker: Docker, cancel: CancellationToken) -> Self {
        Self { docker, cancel }
    }

    /// ビルドコンテキストから `tag` の付いたイメージを作成
    pub async fn build_image(&self, context_data: Vec<u8>, tag: &str) -> BuildResult<()> {
        tracing::info!("Building image: {}", tag);

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: "Dockerfile",
            t: tag,
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let body = Full::new(Bytes::from(context_data));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        let progress = BuildProgress::new("Building", tag);
        let mut scan = LineScan::default();

        loop {
            let item = tokio::select! {
                _ = self.cancel.cancelled() => {
                    progress.finish_error("cancelled");
                    return Err(BuildError::Cancelled);
                }
                item = stream.next() => item,
            };

            let Some(item) = item else { break };
            match item {
                Ok(info) => {
                    let line = DaemonLine::from(info);
                    progress.update(&line);
                    scan.observe(&line);
                }
                Err(e) => {
                    progress.finish_error(&e.to_string());
                    return Err(BuildError::DockerConnection(e));
                }
            }
        }

        if let Err(message) = scan.finish() {
            progress.finish_error(&message);
            return Err(BuildError::BuildFailed(message));
        }

        progress.finish_success(&format!("Built {}", tag));
        tracing::info!("Successfully built: {}", tag);
        Ok(())
    }

    /// タグからイメージ ID とベースイメージ ID を解決
    pub async fn resolve_ids(&self, tag: &str) -> BuildResult<BuiltImage> {
        #[allow(deprecated)]
        let options = bollard::image::ListImagesOptions::<String> {
            filters: HashMap::from([("reference".to_string(), vec![tag.to_string()])]),
            ..Default::default()
        };

        let images = self
            .until_cancelled(self.docker.list_images(Some(options)))
            .await??;
        let image = images
            .first()
            .ok_or_else(|| BuildError::ImageNotFound(tag.to_string()))?;
        let image_id = trim_digest(&image.id).to_string();

        let history = self
            .until_cancelled(self.docker.image_history(&image_id))
            .await??;
        let base_id = base_image_id(history.iter().map(|entry| entry.id.as_str()))
            .ok_or_else(|| BuildError::BaseImageNotFound(tag.to_string()))?;

        tracing::debug!(image_id = %image_id, base_id = %base_id, "Resolved image ids for {}", tag);
        Ok(BuiltImage { image_id, base_id })
    }

    /// 既存のイメージに別名を付ける
    pub async fn tag_image(&self, source_id: &str, target: &str) -> BuildResult<()> {
        let (repo, tag) = split_image_tag(target);

        #[allow(deprecated)]
        let options = bollard::image::TagImageOptions { repo, tag };

        self.until_cancelled(self.docker.tag_image(source_id, Some(options)))
            .await?
            .map_err(|e| BuildError::TagFailed {
                source_id: source_id.to_string(),
                target: target.to_string(),
                message: e.to_string(),
            })?;

        tracing::info!("Tagged {} as {}", source_id, target);
        Ok(())
    }

    /// イメージを強制削除
    ///
    /// 削除した場合は `true`、既に存在しなかった場合は `false` を返します。
    pub async fn remove_image(&self, id: &str) -> BuildResult<bool> {
        #[allow(deprecated)]
        let options = bollard::image::RemoveImageOptions {
            force: true,
            noprune: false,
        };

        match self
            .until_cancelled(self.docker.remove_image(id, Some(options), None))
            .await?
        {
            Ok(items) => {
                for item in items {
                    tracing::debug!(?item, "Removed image layer");
                }
                Ok(true)
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(BuildError::RemoveFailed {
                id: id.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn until_cancelled<F: Future>(&self, fut: F) -> BuildResult<F::Output> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(BuildError::Cancelled),
            output = fut => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextBuilder;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    #[ignore] // Docker接続が必要なため、通常のテストではスキップ
    async fn test_build_tag_and_remove() {
        let docker = Docker::connect_with_local_defaults().unwrap();
        let builder = ImageBuilder::new(docker, CancellationToken::new());

        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join("Dockerfile"),
            "FROM alpine:latest\nCMD echo 'test'",
        )
        .unwrap();
        let context = ContextBuilder::create_context(temp_dir.path()).unwrap();

        builder.build_image(context, "tagflow-test:1.0").await.unwrap();
        let built = builder.resolve_ids("tagflow-test:1.0").await.unwrap();
        assert!(!built.image_id.is_empty());
        assert_ne!(built.image_id, built.base_id);

        builder
            .tag_image(&built.image_id, "tagflow-test:latest")
            .await
            .unwrap();

        assert!(builder.remove_image(&built.image_id).await.unwrap());
        assert!(!builder.remove_image(&built.image_id).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Docker接続が必要なため、通常のテストではスキップ
    async fn test_cancelled_build() {
        let docker = Docker::connect_with_local_defaults().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let builder = ImageBuilder::new(docker, cancel);

        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("Dockerfile"), "FROM alpine:latest").unwrap();
        let context = ContextBuilder::create_context(temp_dir.path()).unwrap();

        let err = builder
            .build_image(context, "tagflow-test:cancelled")
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
