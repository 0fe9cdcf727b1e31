use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

/// Receives transfer progress. Called synchronously from the copy loop, so
/// implementations must return quickly.
pub trait ProgressSink: Send + Sync {
    fn start(&self, label: &str, total: Option<u64>);
    fn advance(&self, bytes: u64);
    fn finish(&self);
}

/// Discards all progress reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&self, _label: &str, _total: Option<u64>) {}
    fn advance(&self, _bytes: u64) {}
    fn finish(&self) {}
}

/// Terminal progress bar, one bar per transferred file.
#[derive(Default)]
pub struct ProgressBarSink {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressBarSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] \
             {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
    }
}

impl ProgressSink for ProgressBarSink {
    fn start(&self, label: &str, total: Option<u64>) {
        let pb = match total {
            Some(len) => ProgressBar::new(len),
            None => ProgressBar::no_length(),
        };
        pb.set_style(Self::style());
        pb.set_message(format!("Retrieving {label}"));
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(pb);
        }
    }

    fn advance(&self, bytes: u64) {
        if let Ok(slot) = self.bar.lock()
            && let Some(pb) = slot.as_ref()
        {
            pb.inc(bytes);
        }
    }

    fn finish(&self) {
        if let Ok(mut slot) = self.bar.lock()
            && let Some(pb) = slot.take()
        {
            pb.finish();
        }
    }
}
