use crate::output::DaemonLine;
use indicatif::{ProgressBar, ProgressStyle};

/// ビルド・プッシュ中のスピナー
pub struct BuildProgress {
    progress_bar: ProgressBar,
}

impl BuildProgress {
    pub fn new(action: &str, image: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            pb.set_style(style);
        }
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        pb.set_message(format!("{} {}...", action, image));

        Self { progress_bar: pb }
    }

    /// 最新の出力行をスピナーの横に表示
    pub fn update(&self, line: &DaemonLine) {
        let text = line.message().trim();
        if !text.is_empty() && !line.is_error() {
            self.progress_bar.set_message(text.to_string());
        }
    }

    pub fn finish_success(&self, message: &str) {
        self.progress_bar
            .finish_with_message(format!("{} ✓", message));
    }

    pub fn finish_error(&self, error: &str) {
        self.progress_bar.abandon_with_message(format!("✗ {}", error));
    }
}
