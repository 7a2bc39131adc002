//! 上流イメージのタグ一覧取得
//!
//! Docker Hub のタグ API をページ単位で辿り、すべてのタグ名を返します。
//! タグの妥当性はここでは判定しません。

pub mod error;
pub mod hub;

pub use error::{RegistryError, Result};
pub use hub::{DEFAULT_PAGE_SIZE, DEFAULT_REGISTRY_URL, DockerHubTags};
