//! LogProgressSink - pull の進捗を tracing に流す

use tracing::debug;

use crate::domain::PullProgress;
use crate::ports::PullProgressSink;

/// One `debug` event per progress message, nothing buffered.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgressSink;

impl PullProgressSink for LogProgressSink {
    fn on_progress(&self, image: &str, progress: &PullProgress) {
        debug!(
            image,
            layer = progress.id.as_deref().unwrap_or("-"),
            status = progress.status.as_deref().unwrap_or(""),
            progress = progress.progress.as_deref().unwrap_or(""),
            "pull progress"
        );
    }
}
