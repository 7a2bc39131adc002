//! タグキャッシュ
//!
//! レジストリから取得したタグ一覧をローカルの JSON ファイルに保存します。
//! 読み込めないキャッシュは常にキャッシュミスとして扱い、実行を止めません。

use crate::error::{FlowError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagCache {
    /// 上流イメージ名（例: "postgres"）
    pub image: String,
    /// 最終更新日時
    pub modified: DateTime<Utc>,
    /// フィルタ前の生のタグ
    pub tags: Vec<String>,
}

impl TagCache {
    pub fn new(image: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            image: image.into(),
            modified: Utc::now(),
            tags,
        }
    }

    /// イメージ名とタグが空でないか
    pub fn is_valid(&self) -> bool {
        !self.image.is_empty() && !self.tags.is_empty()
    }

    /// キャッシュファイルを読み込む
    ///
    /// ファイルが存在しないか空の場合は `CacheNotFound`、
    /// デコードや検証に失敗した場合は `CacheInvalid` を返します。
    pub fn load(path: &Path) -> Result<Self> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FlowError::CacheNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(FlowError::io(path, e)),
        };

        if metadata.len() == 0 {
            return Err(FlowError::CacheNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| FlowError::io(path, e))?;
        let mut cache: TagCache =
            serde_json::from_str(&content).map_err(|e| FlowError::CacheInvalid {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        if !cache.is_valid() {
            return Err(FlowError::CacheInvalid {
                path: path.to_path_buf(),
                message: "image または tags が空です".to_string(),
            });
        }

        // 更新日時はファイルの mtime より古くしない
        if let Ok(mtime) = metadata.modified() {
            let mtime = DateTime::<Utc>::from(mtime);
            if mtime > cache.modified {
                cache.modified = mtime;
            }
        }

        Ok(cache)
    }

    /// 読み込みに失敗した場合は None（キャッシュミス）
    pub fn load_or_miss(path: &Path) -> Option<Self> {
        match Self::load(path) {
            Ok(cache) => Some(cache),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Tag cache miss");
                None
            }
        }
    }

    /// キャッシュファイルを書き込む（親ディレクトリも作成）
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| FlowError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| FlowError::CacheInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        std::fs::write(path, json).map_err(|e| FlowError::io(path, e))?;
        debug!(path = %path.display(), tags = self.tags.len(), "Saved tag cache");
        Ok(())
    }

    /// 未知のタグを末尾に追加し、追加した件数を返す
    ///
    /// 1件以上追加された場合は更新日時を進めます。
    pub fn merge<I, S>(&mut self, tags: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut known: HashSet<String> = self.tags.iter().cloned().collect();
        let mut added = 0;

        for tag in tags {
            let tag = tag.into();
            if known.insert(tag.clone()) {
                self.tags.push(tag);
                added += 1;
            }
        }

        if added > 0 {
            self.modified = Utc::now().max(self.modified);
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn sample() -> TagCache {
        TagCache::new(
            "postgres",
            vec!["latest".into(), "12.0".into(), "12.5".into()],
        )
    }

    #[test]
    fn test_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested/dir/postgres.json");

        let cache = sample();
        cache.save(&path).unwrap();

        let loaded = TagCache::load(&path).unwrap();
        assert_eq!(loaded.image, cache.image);
        assert_eq!(loaded.tags, cache.tags);
        // mtime に合わせて進むことはあっても戻ることはない
        assert!(loaded.modified >= cache.modified);
    }

    #[test]
    fn test_missing_file_is_cache_miss() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("missing.json");

        let err = TagCache::load(&path).unwrap_err();
        assert!(matches!(err, FlowError::CacheNotFound(_)));
        assert!(err.is_cache_miss());
        assert!(TagCache::load_or_miss(&path).is_none());
    }

    #[test]
    fn test_zero_length_file_is_cache_miss() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("empty.json");
        fs::write(&path, "").unwrap();

        let err = TagCache::load(&path).unwrap_err();
        assert!(matches!(err, FlowError::CacheNotFound(_)));
        assert!(TagCache::load_or_miss(&path).is_none());
    }

    #[test]
    fn test_empty_tags_is_cache_miss() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("postgres.json");
        fs::write(
            &path,
            r#"{"image":"postgres","modified":"2024-01-01T00:00:00Z","tags":[]}"#,
        )
        .unwrap();

        let err = TagCache::load(&path).unwrap_err();
        assert!(matches!(err, FlowError::CacheInvalid { .. }));
        assert!(err.is_cache_miss());
        assert!(TagCache::load_or_miss(&path).is_none());
    }

    #[test]
    fn test_empty_image_is_cache_miss() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("postgres.json");
        fs::write(
            &path,
            r#"{"image":"","modified":"2024-01-01T00:00:00Z","tags":["12"]}"#,
        )
        .unwrap();

        assert!(TagCache::load_or_miss(&path).is_none());
    }

    #[test]
    fn test_corrupt_file_is_cache_miss() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("postgres.json");
        fs::write(&path, "{ not json").unwrap();

        let err = TagCache::load(&path).unwrap_err();
        assert!(matches!(err, FlowError::CacheInvalid { .. }));
        assert!(TagCache::load_or_miss(&path).is_none());
    }

    #[test]
    fn test_old_timestamp_is_normalized_to_mtime() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("postgres.json");
        fs::write(
            &path,
            r#"{"image":"postgres","modified":"2001-01-01T00:00:00Z","tags":["12"]}"#,
        )
        .unwrap();

        let loaded = TagCache::load(&path).unwrap();
        assert!(loaded.modified.timestamp() > 978_307_200);
    }

    #[test]
    fn test_merge_appends_unknown_tags() {
        let mut cache = sample();
        let before = cache.modified;

        let added = cache.merge(["12.5", "13.0", "latest", "13.1"]);
        assert_eq!(added, 2);
        assert_eq!(cache.tags, vec!["latest", "12.0", "12.5", "13.0", "13.1"]);
        assert!(cache.modified >= before);

        assert_eq!(cache.merge(Vec::<String>::new()), 0);
    }
}
