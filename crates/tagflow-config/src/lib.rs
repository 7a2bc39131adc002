pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "tagflow";

/// キャッシュディレクトリを指定する環境変数
pub const CACHE_DIR_ENV: &str = "TAGFLOW_CACHE_DIR";

pub const DEFAULT_MAINTAINER: &str = "Unknown";
pub const DEFAULT_BUILD_DIR: &str = "./tagflow";
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// タグキャッシュの置き場所を決めて作成する
///
/// 以下の優先順位:
/// 1. 引数 `override_dir`（`--cache-dir`）
/// 2. 環境変数 TAGFLOW_CACHE_DIR
/// 3. ユーザーのキャッシュディレクトリ配下の `tagflow`
/// 4. `./.cache/tagflow`
pub fn get_cache_dir(override_dir: Option<&Path>) -> Result<PathBuf> {
    let cache_dir = override_dir
        .map(Path::to_path_buf)
        .or_else(|| {
            std::env::var_os(CACHE_DIR_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        })
        .or_else(|| dirs::cache_dir().map(|d| d.join(APP_NAME)))
        .unwrap_or_else(|| PathBuf::from(".cache").join(APP_NAME));

    if !cache_dir.exists() {
        std::fs::create_dir_all(&cache_dir).map_err(|source| ConfigError::CacheDir {
            path: cache_dir.clone(),
            source,
        })?;
    }

    Ok(cache_dir)
}

/// 上流イメージごとのキャッシュファイル
///
/// `bitnami/postgresql` -> `<dir>/bitnami_postgresql.json`
pub fn cache_file(cache_dir: &Path, image: &str) -> PathBuf {
    let name: String = image
        .chars()
        .map(|c| match c {
            '/' | ':' | '\\' => '_',
            c => c,
        })
        .collect();
    cache_dir.join(format!("{}.json", name))
}

/// カレントディレクトリの `.env` を読み込む
///
/// 既に設定されている環境変数は上書きしません。
pub fn load_dotenv() -> Result<Option<PathBuf>> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!("Loaded environment from {}", path.display());
            Ok(Some(path))
        }
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}
