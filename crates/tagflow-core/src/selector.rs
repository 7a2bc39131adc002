//! ビルド対象バージョンの選定
//!
//! レジストリから取得した生のタグ列を、数値のみのタグに絞り込み、
//! 制約で評価したうえで昇順に並べます。

use crate::constraint::Constraint;
use crate::error::Result;
use crate::version::Version;
use regex::Regex;
use tracing::{debug, warn};

/// major[.minor[.patch]] のみを対象とするデフォルトのタグパターン
pub const DEFAULT_TAG_PATTERN: &str = r"^\d+(\.\d+)?(\.\d+)?$";

#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// このパターンに一致しないタグは黙って除外する
    pub tag_pattern: Regex,
}

impl SelectorConfig {
    pub fn with_pattern(pattern: &str) -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            tag_pattern: Regex::new(pattern)?,
        })
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            tag_pattern: Regex::new(DEFAULT_TAG_PATTERN).expect("default tag pattern is valid"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VersionSelector {
    config: SelectorConfig,
}

impl VersionSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    /// 制約式をパースしてから選定する
    pub fn select_expr<S: AsRef<str>>(&self, raw_tags: &[S], expr: &str) -> Result<Vec<Version>> {
        let constraint = Constraint::parse(expr)?;
        debug!(constraint = %constraint, "Parsed version constraint");
        Ok(self.select(raw_tags, &constraint))
    }

    /// タグを絞り込み、昇順に並べる
    ///
    /// 同値のバージョン（"12" と "12.0" など）は入力順のまま両方残ります。
    pub fn select<S: AsRef<str>>(&self, raw_tags: &[S], constraint: &Constraint) -> Vec<Version> {
        let mut versions = Vec::with_capacity(raw_tags.len());

        for raw in raw_tags {
            let tag = raw.as_ref().trim();

            if !self.config.tag_pattern.is_match(tag) {
                debug!(tag, "Skipping tag; not a numeric version");
                continue;
            }

            let version = match Version::parse(tag) {
                Ok(version) => version,
                Err(e) => {
                    warn!(tag, error = %e, "Failed to parse tag");
                    continue;
                }
            };

            if !constraint.matches(&version) {
                debug!(tag, "Skipping version; does not match constraint");
                continue;
            }

            debug!(tag, "Adding version");
            versions.push(version);
        }

        // sort は安定ソート
        versions.sort();
        debug!(count = versions.len(), "Versions after filtering and sorting");
        versions
    }
}
