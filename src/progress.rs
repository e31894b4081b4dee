//! Terminal progress for uploads, and a log writer that keeps bars intact.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::fmt::MakeWriter;

static MULTI_PROGRESS: OnceLock<MultiProgress> = OnceLock::new();

fn multi_progress() -> &'static MultiProgress {
    MULTI_PROGRESS.get_or_init(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        mp
    })
}

/// Percentage bar for one upload
pub fn upload_progress_bar(file_name: &str) -> ProgressBar {
    let style = ProgressStyle::with_template("{msg} [{bar:30.cyan/blue}] {pos:>3}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    let bar = multi_progress().add(ProgressBar::new(100));
    bar.set_style(style);
    bar.set_message(format!("Uploading {}", file_name));
    bar
}

/// Spinner shown while the backend indexes uploaded documents
pub fn ingestion_spinner(message: &str) -> ProgressBar {
    let style = ProgressStyle::with_template("{spinner} {msg} ({elapsed})")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let spinner = multi_progress().add(ProgressBar::new_spinner());
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Mirror an upload progress channel onto `bar` until it reaches 100 or the
/// sender goes away.
pub async fn track_upload(bar: ProgressBar, mut progress: watch::Receiver<u8>) {
    loop {
        let percent = *progress.borrow_and_update();
        bar.set_position(u64::from(percent));
        if percent >= 100 || progress.changed().await.is_err() {
            break;
        }
    }
}

#[derive(Default, Clone)]
pub struct LogWriterFactory;

/// Buffers a log record and prints it above any active bars, line by line
pub struct LogWriter {
    buffer: String,
}

impl LogWriter {
    fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    fn emit_line(line: &str) {
        let _ = multi_progress().println(line.trim_end_matches('\r'));
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.push_str(&String::from_utf8_lossy(buf));

        while let Some(idx) = self.buffer.find('\n') {
            Self::emit_line(&self.buffer[..idx]);
            self.buffer.drain(..=idx);
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            Self::emit_line(self.buffer.trim_end_matches('\n'));
            self.buffer.clear();
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_track_upload_follows_channel() {
        let (tx, rx) = watch::channel(0u8);
        let bar = ProgressBar::hidden();
        bar.set_length(100);
        let tracker = tokio::spawn(track_upload(bar.clone(), rx));

        tx.send_replace(40);
        tokio::task::yield_now().await;
        tx.send_replace(100);

        tokio::time::timeout(Duration::from_secs(1), tracker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bar.position(), 100);
    }

    #[tokio::test]
    async fn test_track_upload_stops_when_sender_drops() {
        let (tx, rx) = watch::channel(30u8);
        let bar = ProgressBar::hidden();
        let tracker = tokio::spawn(track_upload(bar.clone(), rx));
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), tracker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bar.position(), 30);
    }
}
