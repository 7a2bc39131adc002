//! イメージプッシュ処理

use crate::error::{BuildError, BuildResult};
use crate::output::{DaemonLine, LineScan};
use crate::progress::BuildProgress;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

/// ビルド済みイメージをレジストリに送る
pub struct ImagePusher {
    docker: Docker,
    credentials: Option<DockerCredentials>,
    cancel: CancellationToken,
}

impl ImagePusher {
    pub fn new(docker: Docker, cancel: CancellationToken) -> Self {
        Self {
            docker,
            credentials: None,
            cancel,
        }
    }

    pub fn with_credentials(mut self, credentials: DockerCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// `repo:tag` 形式の参照をプッシュする
    pub async fn push(&self, reference: &str) -> BuildResult<String> {
        let (image, tag) = split_image_tag(reference);
        validate_tag(&tag)?;

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> { tag: tag.clone() };

        tracing::info!("Pushing image: {}", reference);

        #[allow(deprecated)]
        let mut stream = self
            .docker
            .push_image(&image, Some(options), self.credentials.clone());

        let progress = BuildProgress::new("Pushing", reference);
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
                    return Err(BuildError::PushFailed {
                        image: reference.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if let Err(message) = scan.finish() {
            progress.finish_error(&message);
            return Err(BuildError::PushFailed {
                image: reference.to_string(),
                message,
            });
        }

        progress.finish_success(&format!("Pushed {}", reference));
        Ok(format!("{}:{}", image, tag))
    }
}

/// タグのバリデーション
///
/// 128文字以下で、英数字・ピリオド・ハイフン・アンダースコアのみ。
/// 先頭にピリオドとハイフンは使えません。
pub fn validate_tag(tag: &str) -> BuildResult<()> {
    if tag.is_empty() {
        return Err(BuildError::InvalidTag {
            tag: "(empty)".to_string(),
        });
    }

    if tag.len() > 128 {
        return Err(BuildError::InvalidTag {
            tag: format!("Tag too long ({} characters, max 128)", tag.len()),
        });
    }

    if tag.starts_with('.') || tag.starts_with('-') {
        return Err(BuildError::InvalidTag {
            tag: tag.to_string(),
        });
    }

    if let Some(c) = tag
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '.' && *c != '-' && *c != '_')
    {
        return Err(BuildError::InvalidTag {
            tag: format!("Invalid character '{}' in tag: {}", c, tag),
        });
    }

    Ok(())
}

/// イメージ名とタグを分離
///
/// - `user/postgres:12.0` -> `("user/postgres", "12.0")`
/// - `user/postgres` -> `("user/postgres", "latest")`
/// - `user/postgres:12` -> `("user/postgres", "12")`
/// - `localhost:5000/postgres` -> `("localhost:5000/postgres", "latest")`
pub fn split_image_tag(image: &str) -> (String, String) {
    if let Some(pos) = image.rfind(':') {
        let potential_tag = &image[pos + 1..];
        let potential_image = &image[..pos];

        // 後ろに / が続くならレジストリのポート番号、数字だけでもそれ以外はタグ
        if !potential_tag.is_empty() && !potential_tag.contains('/') {
            return (potential_image.to_string(), potential_tag.to_string());
        }
    }

    (image.to_string(), "latest".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_image_tag_with_tag() {
        let (image, tag) = split_image_tag("acme/postgres:12.0");
        assert_eq!(image, "acme/postgres");
        assert_eq!(tag, "12.0");
    }

    #[test]
    fn test_split_image_tag_without_tag() {
        let (image, tag) = split_image_tag("acme/postgres");
        assert_eq!(image, "acme/postgres");
        assert_eq!(tag, "latest");
    }

    #[test]
    fn test_split_image_tag_with_port() {
        let (image, tag) = split_image_tag("localhost:5000/postgres");
        assert_eq!(image, "localhost:5000/postgres");
        assert_eq!(tag, "latest");

        let (image, tag) = split_image_tag("localhost:5000/postgres:13.1");
        assert_eq!(image, "localhost:5000/postgres");
        assert_eq!(tag, "13.1");
    }

    #[test]
    fn test_split_image_tag_major_only() {
        let (image, tag) = split_image_tag("acme/postgres:12");
        assert_eq!(image, "acme/postgres");
        assert_eq!(tag, "12");

        let (image, tag) = split_image_tag("localhost:5000/pg:12");
        assert_eq!(image, "localhost:5000/pg");
        assert_eq!(tag, "12");
    }

    #[test]
    fn test_validate_tag() {
        assert!(validate_tag("12.0").is_ok());
        assert!(validate_tag("latest").is_ok());
        assert!(validate_tag("12.0-bullseye_1").is_ok());

        assert!(validate_tag("").is_err());
        assert!(validate_tag(".hidden").is_err());
        assert!(validate_tag("-dash").is_err());
        assert!(validate_tag("12.0+build").is_err());
        assert!(validate_tag(&"1".repeat(129)).is_err());
    }
}
