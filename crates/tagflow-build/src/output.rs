//! デーモン出力の分類
//!
//! ビルド・プッシュのストリームは一度しか読めないため、行ごとに
//! [`DaemonLine`] へ変換して [`LineScan`] に流し、最後にエラーの有無を判定します。

use bollard::models::{BuildInfo, PushImageInfo};

/// デーモンから届いた1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonLine {
    /// ビルドステップの出力
    Log(String),
    /// pull / push などの進捗
    Status(String),
    /// デーモンが報告したエラー
    Error(String),
}

impl DaemonLine {
    pub fn message(&self) -> &str {
        match self {
            DaemonLine::Log(s) | DaemonLine::Status(s) | DaemonLine::Error(s) => s,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, DaemonLine::Error(_))
    }
}

impl From<BuildInfo> for DaemonLine {
    fn from(info: BuildInfo) -> Self {
        if let Some(detail) = info.error_detail
            && let Some(message) = detail.message
        {
            return DaemonLine::Error(message);
        }
        if let Some(error) = info.error {
            return DaemonLine::Error(error);
        }
        if let Some(stream) = info.stream {
            return DaemonLine::Log(stream);
        }

        DaemonLine::Status(join_status(info.status, info.progress))
    }
}

impl From<PushImageInfo> for DaemonLine {
    fn from(info: PushImageInfo) -> Self {
        if let Some(error) = info.error {
            return DaemonLine::Error(error);
        }

        DaemonLine::Status(join_status(info.status, info.progress))
    }
}

fn join_status(status: Option<String>, progress: Option<String>) -> String {
    match (status, progress) {
        (Some(status), Some(progress)) if !progress.is_empty() => {
            format!("{} {}", status, progress)
        }
        (Some(status), _) => status,
        (None, Some(progress)) => progress,
        (None, None) => String::new(),
    }
}

/// ストリーム全体を走査してエラー行を集める
#[derive(Debug, Default)]
pub struct LineScan {
    lines: usize,
    errors: Vec<String>,
}

impl LineScan {
    pub fn observe(&mut self, line: &DaemonLine) {
        self.lines += 1;
        match line {
            DaemonLine::Error(message) => {
                tracing::error!("{}", message.trim_end());
                self.errors.push(message.trim().to_string());
            }
            DaemonLine::Log(text) => {
                let text = text.trim_end();
                if !text.is_empty() {
                    tracing::debug!("{}", text);
                }
            }
            DaemonLine::Status(text) => {
                if !text.is_empty() {
                    tracing::trace!("{}", text);
                }
            }
        }
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// エラー行がなければ読んだ行数、あればエラーを連結したメッセージ
    pub fn finish(self) -> Result<usize, String> {
        if self.errors.is_empty() {
            Ok(self.lines)
        } else {
            Err(self.errors.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::ErrorDetail;

    #[test]
    fn test_build_info_classification() {
        let log = BuildInfo {
            stream: Some("Step 1/3 : FROM postgres:12.0\n".to_string()),
            ..Default::default()
        };
        assert_eq!(
            DaemonLine::from(log),
            DaemonLine::Log("Step 1/3 : FROM postgres:12.0\n".to_string())
        );

        let status = BuildInfo {
            status: Some("Downloading".to_string()),
            progress: Some("[==>   ]".to_string()),
            ..Default::default()
        };
        assert_eq!(
            DaemonLine::from(status),
            DaemonLine::Status("Downloading [==>   ]".to_string())
        );
    }

    #[test]
    fn test_error_detail_wins_over_error() {
        let info = BuildInfo {
            error: Some("short".to_string()),
            error_detail: Some(ErrorDetail {
                message: Some("The command '/bin/sh -c false' returned a non-zero code: 1".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let line = DaemonLine::from(info);
        assert!(line.is_error());
        assert!(line.message().contains("non-zero code"));
    }

    #[test]
    fn test_push_error() {
        let info = PushImageInfo {
            error: Some("denied: requested access to the resource is denied".to_string()),
            ..Default::default()
        };
        assert!(DaemonLine::from(info).is_error());
    }

    #[test]
    fn test_scan_collects_every_error() {
        let mut scan = LineScan::default();
        scan.observe(&DaemonLine::Log("Step 1/2\n".to_string()));
        scan.observe(&DaemonLine::Error("first".to_string()));
        scan.observe(&DaemonLine::Status("Pushing".to_string()));
        scan.observe(&DaemonLine::Error("second\n".to_string()));

        assert_eq!(scan.lines(), 4);
        assert_eq!(scan.errors(), ["first", "second"]);
        assert_eq!(scan.finish().unwrap_err(), "first; second");
    }

    #[test]
    fn test_clean_scan() {
        let mut scan = LineScan::default();
        scan.observe(&DaemonLine::Log("Successfully built abc\n".to_string()));
        assert_eq!(scan.finish(), Ok(1));
    }
}
