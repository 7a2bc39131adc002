//! バージョン制約
//!
//! 書式:
//! - `||` で区切った選択肢のいずれかを満たせば一致
//! - 選択肢内の比較子はすべて満たす必要がある。区切りはカンマでも空白でもよい
//!   （例: `>= 12.0, < 13.0`、`>= 12.0 < 13.0`）
//! - `12 - 13` のような範囲は `>= 12, <= 13` として扱う
//! - 演算子なしのバージョン（`12.3`）は完全一致扱いで、省略成分はワイルドカード
//! - 空文字列はすべてのバージョンに一致

use crate::error::{FlowError, Result};
use crate::version::Version;
use semver::VersionReq;
use std::fmt;

#[derive(Debug, Clone)]
pub struct Constraint {
    expr: String,
    alternatives: Vec<VersionReq>,
}

impl Constraint {
    /// すべてのバージョンに一致する制約
    pub fn any() -> Self {
        Self {
            expr: String::new(),
            alternatives: Vec::new(),
        }
    }

    pub fn parse(expr: &str) -> Result<Self> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Ok(Self::any());
        }

        let mut alternatives = Vec::new();
        for alternative in trimmed.split("||") {
            let alternative = alternative.trim();
            if alternative.is_empty() {
                return Err(FlowError::ConstraintParse {
                    expr: expr.to_string(),
                    message: "'||' の前後に条件がありません".to_string(),
                });
            }

            let mut comparators = Vec::new();
            for group in alternative.split(',') {
                let words: Vec<&str> = group.split_whitespace().collect();
                let expanded =
                    expand_group(&words).map_err(|message| FlowError::ConstraintParse {
                        expr: expr.to_string(),
                        message,
                    })?;
                comparators.extend(expanded);
            }

            let normalized = comparators
                .iter()
                .map(String::as_str)
                .map(normalize_comparator)
                .collect::<Vec<_>>()
                .join(", ");

            let req = VersionReq::parse(&normalized).map_err(|e| FlowError::ConstraintParse {
                expr: expr.to_string(),
                message: e.to_string(),
            })?;
            alternatives.push(req);
        }

        Ok(Self {
            expr: trimmed.to_string(),
            alternatives,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.is_empty()
            || self
                .alternatives
                .iter()
                .any(|req| req.matches(version.as_semver()))
    }

    pub fn is_any(&self) -> bool {
        self.alternatives.is_empty()
    }

    /// パース前の式
    pub fn as_str(&self) -> &str {
        &self.expr
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            f.write_str("*")
        } else {
            f.write_str(&self.expr)
        }
    }
}

/// カンマ区切り1つ分の語を比較子の並びに展開する
///
/// 単独の演算子は直後のバージョンと結合し、`a - b` は上下限の組にする。
fn expand_group(words: &[&str]) -> std::result::Result<Vec<String>, String> {
    if words.is_empty() {
        return Err("カンマの前後に条件がありません".to_string());
    }

    if words.contains(&"-") {
        return match words {
            [low, "-", high] => Ok(vec![format!(">={low}"), format!("<={high}")]),
            _ => Err("範囲は `12 - 13` の形式で指定してください".to_string()),
        };
    }

    let mut comparators = Vec::new();
    let mut pending: Option<&str> = None;
    for &word in words {
        match pending.take() {
            Some(op) => comparators.push(format!("{op}{word}")),
            None if is_operator(word) => pending = Some(word),
            None => comparators.push(word.to_string()),
        }
    }
    if let Some(op) = pending {
        return Err(format!("'{op}' の後にバージョンがありません"));
    }
    Ok(comparators)
}

fn is_operator(word: &str) -> bool {
    word.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^'))
}

// 演算子なしの比較子は semver クレートでは `^` 扱いになるため `=` を補う
fn normalize_comparator(comparator: &str) -> String {
    let comparator = comparator.trim();
    if comparator.starts_with(|c: char| c.is_ascii_digit()) {
        format!("={comparator}")
    } else {
        comparator.to_string()
    }
}
