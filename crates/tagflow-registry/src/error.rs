//! タグ取得のエラー型

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("レジストリに接続できません: {url}\n理由: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("レジストリがエラーを返しました: {url} (HTTP {status})")]
    Status { url: String, status: u16 },

    #[error("レジストリの応答を解析できません: {url}\n理由: {message}")]
    Decode { url: String, message: String },
}

pub type Result<T> = std::result::Result<T, RegistryError>;
