//! レジストリ認証
//!
//! 環境変数を最優先し、見つからなければ Docker config.json の auths と
//! credential helper を順に参照します。

use crate::error::{BuildError, BuildResult};
use base64::Engine;
use bollard::auth::DockerCredentials;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

pub const USERNAME_ENV: &str = "DOCKER_USERNAME";
pub const PASSWORD_ENV: &str = "DOCKER_PASSWORD";

const DOCKER_HUB: &str = "docker.io";
const DOCKER_HUB_INDEX: &str = "https://index.docker.io/v1/";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    #[serde(default)]
    creds_store: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthEntry {
    /// Base64エンコードされた "username:password"
    auth: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CredentialResponse {
    username: String,
    secret: String,
}

/// プッシュ先レジストリの認証情報を解決
#[derive(Debug)]
pub struct RegistryAuth {
    config_path: PathBuf,
}

impl Default for RegistryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryAuth {
    /// `$DOCKER_CONFIG/config.json`、なければ `~/.docker/config.json` を使用
    pub fn new() -> Self {
        let config_path = std::env::var("DOCKER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|h| h.join(".docker"))
                    .unwrap_or_else(|| PathBuf::from(".docker"))
            })
            .join("config.json");

        Self { config_path }
    }

    pub fn with_config_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// 認証情報を必須として取得
    ///
    /// どこにも見つからない場合は [`BuildError::AuthFailed`] を返します。
    pub fn login(&self, image: &str) -> BuildResult<DockerCredentials> {
        let registry = extract_registry(image);
        self.get_credentials(image)?
            .ok_or_else(|| BuildError::AuthFailed {
                registry,
                message: format!(
                    "{} / {} が未設定で、Docker の設定にも認証情報がありません",
                    USERNAME_ENV, PASSWORD_ENV
                ),
            })
    }

    /// イメージ名からレジストリの認証情報を探す
    pub fn get_credentials(&self, image: &str) -> BuildResult<Option<DockerCredentials>> {
        let registry = extract_registry(image);

        if let Some(creds) = credentials_from_env(&registry) {
            tracing::debug!("Using credentials from {} for {}", USERNAME_ENV, registry);
            return Ok(Some(creds));
        }

        if !self.config_path.exists() {
            tracing::debug!("Docker config.json not found at {:?}", self.config_path);
            return Ok(None);
        }

        let config = self.load_docker_config()?;
        let keys = config_keys(&registry);

        for key in &keys {
            if let Some(auth_entry) = config.auths.get(key)
                && let Some(auth_b64) = &auth_entry.auth
                && let Some(creds) = decode_auth(auth_b64, key)?
            {
                tracing::debug!("Found credentials in auths for {}", key);
                return Ok(Some(creds));
            }
        }

        if let Some(helper) = &config.creds_store {
            for key in &keys {
                tracing::debug!("Trying credential helper {} for {}", helper, key);
                if let Ok(Some(creds)) = get_from_helper(helper, key) {
                    return Ok(Some(creds));
                }
            }
        }

        tracing::debug!("No credentials found for {}", registry);
        Ok(None)
    }

    fn load_docker_config(&self) -> BuildResult<DockerConfig> {
        let content =
            std::fs::read_to_string(&self.config_path).map_err(|e| BuildError::AuthFailed {
                registry: self.config_path.display().to_string(),
                message: format!("Failed to read config.json: {}", e),
            })?;

        serde_json::from_str(&content).map_err(|e| BuildError::AuthFailed {
            registry: self.config_path.display().to_string(),
            message: format!("Failed to parse config.json: {}", e),
        })
    }
}

/// イメージ名からレジストリを抽出
///
/// - `ghcr.io/org/app:tag` -> `ghcr.io`
/// - `myuser/app:tag` -> `docker.io`
/// - `localhost:5000/app` -> `localhost:5000`
pub fn extract_registry(image: &str) -> String {
    if let Some((first, _)) = image.split_once('/')
        && (first.contains('.') || first.contains(':'))
    {
        return first.to_string();
    }

    DOCKER_HUB.to_string()
}

/// config.json 内で参照するキーの候補
fn config_keys(registry: &str) -> Vec<String> {
    if registry == DOCKER_HUB {
        vec![
            DOCKER_HUB_INDEX.to_string(),
            DOCKER_HUB.to_string(),
            "index.docker.io".to_string(),
        ]
    } else {
        vec![registry.to_string()]
    }
}

fn server_address(registry: &str) -> String {
    if registry == DOCKER_HUB {
        DOCKER_HUB_INDEX.to_string()
    } else {
        registry.to_string()
    }
}

fn credentials_from_env(registry: &str) -> Option<DockerCredentials> {
    let username = std::env::var(USERNAME_ENV).ok().filter(|v| !v.is_empty())?;
    let password = std::env::var(PASSWORD_ENV).ok().filter(|v| !v.is_empty())?;

    Some(DockerCredentials {
        username: Some(username),
        password: Some(password),
        serveraddress: Some(server_address(registry)),
        ..Default::default()
    })
}

fn decode_auth(auth_b64: &str, registry: &str) -> BuildResult<Option<DockerCredentials>> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(auth_b64.trim())
        .map_err(|e| BuildError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Failed to decode auth: {}", e),
        })?;

    let auth_str = String::from_utf8(decoded).map_err(|e| BuildError::AuthFailed {
        registry: registry.to_string(),
        message: format!("Invalid UTF-8 in auth: {}", e),
    })?;

    Ok(auth_str
        .split_once(':')
        .map(|(username, password)| DockerCredentials {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            serveraddress: Some(registry.to_string()),
            ..Default::default()
        }))
}

fn get_from_helper(helper: &str, registry: &str) -> BuildResult<Option<DockerCredentials>> {
    let helper_cmd = format!("docker-credential-{}", helper);

    let mut child = Command::new(&helper_cmd)
        .arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| BuildError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Failed to run {}: {}", helper_cmd, e),
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(registry.as_bytes()).ok();
    }

    let output = child
        .wait_with_output()
        .map_err(|e| BuildError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Credential helper failed: {}", e),
        })?;

    if !output.status.success() {
        tracing::debug!(
            "Credential helper returned error for {}: {}",
            registry,
            String::from_utf8_lossy(&output.stderr)
        );
        return Ok(None);
    }

    let response: CredentialResponse =
        serde_json::from_slice(&output.stdout).map_err(|e| BuildError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Failed to parse credential helper response: {}", e),
        })?;

    Ok(Some(DockerCredentials {
        username: Some(response.username),
        password: Some(response.secret),
        serveraddress: Some(registry.to_string()),
        ..Default::default()
    }))
}
