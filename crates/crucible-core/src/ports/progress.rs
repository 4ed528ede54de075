//! PullProgressSink port - イメージ pull の進捗の出力先

use crate::domain::PullProgress;

/// Receives pull progress one message at a time, as the engine streams it.
pub trait PullProgressSink: Send + Sync {
    fn on_progress(&self, image: &str, progress: &PullProgress);
}
