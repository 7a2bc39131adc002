use crate::error::{BuildError, BuildResult};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::Path;
use tar::Builder;

pub const DOCKERFILE: &str = "Dockerfile";

pub struct ContextBuilder;

impl ContextBuilder {
    /// レンダリング済みディレクトリを tar.gz のビルドコンテキストにまとめる
    pub fn create_context(context_path: &Path) -> BuildResult<Vec<u8>> {
        tracing::debug!("Creating build context from: {}", context_path.display());

        if !context_path.is_dir() {
            return Err(BuildError::ContextNotFound(context_path.to_path_buf()));
        }

        let dockerfile = context_path.join(DOCKERFILE);
        if !dockerfile.is_file() {
            return Err(BuildError::DockerfileNotFound(dockerfile));
        }

        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);

            tar.append_dir_all(".", context_path)?;
            tar.into_inner()?.finish()?;
        }

        tracing::debug!("Build context created: {} bytes", archive_data.len());
        Self::check_context_size(archive_data.len());

        Ok(archive_data)
    }

    fn check_context_size(size: usize) {
        const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024;

        if size > MAX_CONTEXT_SIZE {
            tracing::warn!(
                "ビルドコンテキストが大きすぎます（{}MB）。テンプレートディレクトリを確認してください。",
                size / 1024 / 1024
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn unpack(archive: Vec<u8>) -> tempfile::TempDir {
        let extract_dir = tempdir().unwrap();
        let decoder = flate2::read::GzDecoder::new(std::io::Cursor::new(archive));
        tar::Archive::new(decoder).unpack(extract_dir.path()).unwrap();
        extract_dir
    }

    #[test]
    fn test_create_context() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join(DOCKERFILE), "FROM postgres:12.0\n").unwrap();
        fs::write(temp_dir.path().join("docker-entrypoint.sh"), "#!/bin/sh\n").unwrap();
        fs::create_dir(temp_dir.path().join("conf")).unwrap();
        fs::write(temp_dir.path().join("conf/pg.conf"), "max_connections = 10").unwrap();

        let archive = ContextBuilder::create_context(temp_dir.path()).unwrap();
        assert!(!archive.is_empty());

        let extracted = unpack(archive);
        assert_eq!(
            fs::read_to_string(extracted.path().join(DOCKERFILE)).unwrap(),
            "FROM postgres:12.0\n"
        );
        assert!(extracted.path().join("docker-entrypoint.sh").exists());
        assert!(extracted.path().join("conf/pg.conf").exists());
    }

    #[test]
    fn test_missing_dockerfile() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("other"), "x").unwrap();

        let err = ContextBuilder::create_context(temp_dir.path()).unwrap_err();
        assert!(matches!(err, BuildError::DockerfileNotFound(_)));
    }

    #[test]
    fn test_missing_directory() {
        let temp_dir = tempdir().unwrap();
        let err = ContextBuilder::create_context(&temp_dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, BuildError::ContextNotFound(_)));
    }
}
