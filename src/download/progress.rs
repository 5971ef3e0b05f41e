//! 流下载进度条。

use std::io::Read;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

pub(crate) struct TransferProgress {
    bar: ProgressBar,
}

impl TransferProgress {
    /// `enabled` 为 false 时使用隐藏进度条，调用方不必区分。
    pub(crate) fn new(enabled: bool, label: &str, total: Option<u64>) -> Self {
        if !enabled {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::with_draw_target(total, ProgressDrawTarget::stderr());
        let template = if total.is_some() {
            "{prefix} [{elapsed_precise}] {wide_bar} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})"
        } else {
            "{prefix} [{elapsed_precise}] {spinner} {bytes} ({bytes_per_sec})"
        };
        let style = ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        bar.set_style(style);
        bar.set_prefix(format!("下载 {label}"));
        Self { bar }
    }

    pub(crate) fn wrap(&self, reader: Box<dyn Read>) -> Box<dyn Read> {
        Box::new(self.bar.wrap_read(reader))
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Drop for TransferProgress {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}
