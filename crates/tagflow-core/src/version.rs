//! セマンティックバージョン
//!
//! レジストリのタグ（"12", "12.3", "12.3.1" など）を比較可能な値に変換します。
//! 比較は数値成分のみで行い、元の文字列表記はタグやパスの組み立て用に保持します。

use crate::error::{FlowError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// 元の表記を保持したバージョン
#[derive(Debug, Clone)]
pub struct Version {
    parsed: semver::Version,
    original: String,
}

impl Version {
    /// タグ文字列をパース
    ///
    /// 省略された minor / patch は 0 として補完します（"12" → 12.0.0）。
    /// 先頭の `v` とプレリリース / ビルドメタデータも受け付けます。
    pub fn parse(text: &str) -> Result<Self> {
        let original = text.trim();
        let body = original.strip_prefix('v').unwrap_or(original);

        let split_at = body.find(['-', '+']).unwrap_or(body.len());
        let (core, suffix) = body.split_at(split_at);

        let components = core.split('.').count();
        if core.is_empty() || components > 3 {
            return Err(FlowError::VersionParse {
                text: original.to_string(),
                message: "major[.minor[.patch]] の形式ではありません".to_string(),
            });
        }

        let mut normalized = core.to_string();
        for _ in components..3 {
            normalized.push_str(".0");
        }
        normalized.push_str(suffix);

        let parsed =
            semver::Version::parse(&normalized).map_err(|e| FlowError::VersionParse {
                text: original.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            parsed,
            original: original.to_string(),
        })
    }

    /// タグとして取得した元の表記
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn major(&self) -> u64 {
        self.parsed.major
    }

    pub fn minor(&self) -> u64 {
        self.parsed.minor
    }

    pub fn patch(&self) -> u64 {
        self.parsed.patch
    }

    pub fn is_prerelease(&self) -> bool {
        !self.parsed.pre.is_empty()
    }

    /// 正規化済みの semver 値
    pub fn as_semver(&self) -> &semver::Version {
        &self.parsed
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    // ビルドメタデータは順序に含めない
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (&self.parsed, &other.parsed);
        a.major
            .cmp(&b.major)
            .then(a.minor.cmp(&b.minor))
            .then(a.patch.cmp(&b.patch))
            .then_with(|| a.pre.cmp(&b.pre))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl FromStr for Version {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
