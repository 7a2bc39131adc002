use crate::error::{RegistryError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.hub.docker.com";
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// タグ API の1ページ分
#[derive(Debug, Deserialize)]
struct TagPage {
    /// 次ページの URL（最終ページでは null または空文字）
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Docker Hub のタグ一覧クライアント
#[derive(Debug, Clone)]
pub struct DockerHubTags {
    client: reqwest::Client,
    base_url: String,
    page_size: usize,
}

impl Default for DockerHubTags {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerHubTags {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_REGISTRY_URL)
    }

    /// API のベース URL を指定して作成
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tagflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// 最初のページの URL
    ///
    /// 名前空間のないリポジトリは公式イメージ（`library/`）として扱います。
    pub fn first_page_url(&self, repository: &str) -> String {
        let repository = if repository.contains('/') {
            repository.to_string()
        } else {
            format!("library/{}", repository)
        };

        format!(
            "{}/v2/repositories/{}/tags?page=1&page_size={}",
            self.base_url, repository, self.page_size
        )
    }

    /// すべてのページを辿ってタグ名を取得
    pub async fn fetch(&self, repository: &str) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        let mut visited = HashSet::new();
        let mut next = self.first_page_url(repository);

        while !next.is_empty() {
            if !visited.insert(next.clone()) {
                return Err(RegistryError::Decode {
                    url: next,
                    message: "同じページが再度指定されました".to_string(),
                });
            }

            let page = self.fetch_page(&next).await?;
            debug!(url = %next, count = page.results.len(), "Fetched tag page");

            tags.extend(page.results.into_iter().map(|entry| entry.name));
            next = page.next.unwrap_or_default();
        }

        debug!(repository, count = tags.len(), "Fetched all tags");
        Ok(tags)
    }

    async fn fetch_page(&self, url: &str) -> Result<TagPage> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RegistryError::Network {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| RegistryError::Network {
            url: url.to_string(),
            source: e,
        })?;

        serde_json::from_str(&body).map_err(|e| RegistryError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
