use anyhow::{Context, Result};
use std::path::Path;
use tagflow_core::TagCache;
use tagflow_registry::DockerHubTags;
use tracing::{info, warn};

/// 上流イメージのタグ一覧を用意する
///
/// 有効なキャッシュがあればそれを使い、`refresh` のときだけレジストリに問い合わせて
/// 新しいタグを追記します。取り直しに失敗してもキャッシュがあれば続行します。
pub async fn resolve(
    client: &DockerHubTags,
    image: &str,
    cache_path: &Path,
    refresh: bool,
) -> Result<TagCache> {
    let cached = TagCache::load_or_miss(cache_path).filter(|cache| {
        let same_image = cache.image == image;
        if !same_image {
            warn!(
                "Ignoring cache {} written for {}",
                cache_path.display(),
                cache.image
            );
        }
        same_image
    });

    if let Some(cache) = &cached
        && !refresh
    {
        info!(
            "Using {} cached tags for {} ({})",
            cache.tags.len(),
            image,
            cache_path.display()
        );
        return Ok(cache.clone());
    }

    match client.fetch(image).await {
        Ok(fetched) => {
            info!("Fetched {} tags for {}", fetched.len(), image);
            Ok(match cached {
                Some(mut cache) => {
                    let added = cache.merge(fetched);
                    info!("{} new tags since the last refresh", added);
                    cache
                }
                None => TagCache::new(image, fetched),
            })
        }
        Err(e) => match cached {
            Some(cache) => {
                warn!("Tag refresh failed, using cache: {}", e);
                Ok(cache)
            }
            None => Err(e).with_context(|| format!("{} のタグ一覧を取得できません", image)),
        },
    }
}

/// タグキャッシュを書き出す（失敗しても実行は止めない）
pub fn persist(cache: &TagCache, cache_path: &Path) {
    if !cache.is_valid() {
        return;
    }
    match cache.save(cache_path) {
        Ok(()) => tracing::debug!("Saved tag cache to {}", cache_path.display()),
        Err(e) => warn!("Failed to save tag cache: {}", e),
    }
}
