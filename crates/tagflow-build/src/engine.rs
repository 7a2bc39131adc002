//! ビルドエンジンの抽象
//!
//! パイプラインはこのトレイトだけに依存し、Docker デーモンとの通信は
//! [`crate::DockerEngine`] が担います。

use crate::error::BuildResult;
use std::path::Path;

/// ビルド結果として保持する ID の組
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltImage {
    /// ビルドしたイメージの ID（`sha256:` なし）
    pub image_id: String,
    /// 履歴上もっとも古い親レイヤーの ID
    pub base_id: String,
}

#[allow(async_fn_in_trait)]
pub trait BuildEngine {
    /// `context_dir` をビルドし、`tags` のすべてを付与する
    ///
    /// `tags` の先頭はビルド時のタグ、残りは追加のタグです。
    async fn build(&self, context_dir: &Path, tags: &[String]) -> BuildResult<BuiltImage>;

    async fn tag(&self, source_id: &str, targets: &[String]) -> BuildResult<()>;

    async fn push(&self, tags: &[String]) -> BuildResult<()>;

    /// イメージを強制削除する。既に存在しない ID は成功として扱う
    async fn remove(&self, ids: &[String]) -> BuildResult<()>;
}

/// `sha256:` プレフィックスを取り除く
pub fn trim_digest(id: &str) -> &str {
    id.strip_prefix("sha256:").unwrap_or(id)
}

/// イメージ履歴（新しい順）から、ID を持つもっとも古いエントリを選ぶ
pub fn base_image_id<'a>(history: impl IntoIterator<Item = &'a str>) -> Option<String> {
    history
        .into_iter()
        .filter(|id| !id.is_empty() && *id != "<missing>")
        .last()
        .map(|id| trim_digest(id).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_digest() {
        assert_eq!(trim_digest("sha256:abc123"), "abc123");
        assert_eq!(trim_digest("abc123"), "abc123");
    }

    #[test]
    fn test_base_image_id_skips_missing_layers() {
        let history = [
            "sha256:top",
            "<missing>",
            "sha256:middle",
            "sha256:base",
            "<missing>",
            "<missing>",
        ];
        assert_eq!(base_image_id(history), Some("base".to_string()));
    }

    #[test]
    fn test_base_image_id_without_ids() {
        assert_eq!(base_image_id(["<missing>", ""]), None);
        assert_eq!(base_image_id(Vec::<&str>::new()), None);
    }
}
