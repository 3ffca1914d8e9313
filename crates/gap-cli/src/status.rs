//! Folds the engine's upward notification stream into an `EngineStatus`
//! snapshot and logs each transition, the way the teacher's `bridge::status`
//! folded HTTP-facing state from the same kind of event stream.

use gap_types::{EngineStatus, Notification, NotificationPayload, PlaybackEndReason};

/// Tracks the single active stream's status from the notifications an
/// `Engine` emits. `gap-cli` owns exactly one of these per `Player`.
#[derive(Default)]
pub struct StatusTracker {
    status: EngineStatus,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> &EngineStatus {
        &self.status
    }

    /// Apply one notification, logging it, and report whether the stream
    /// this notification concerns has reached a terminal state (Eos or a
    /// fatal ErrorMessage).
    pub fn apply(&mut self, notification: &Notification) -> bool {
        let stream_id = notification.stream_id;
        match &notification.payload {
            NotificationPayload::Bos => {
                tracing::info!(stream_id, "beginning of stream");
                self.status.stream_id = Some(stream_id);
                self.status.end_reason = None;
                self.status.paused = false;
                false
            }
            NotificationPayload::Eos => {
                tracing::info!(stream_id, "end of stream");
                self.status.end_reason = Some(PlaybackEndReason::Eof);
                true
            }
            NotificationPayload::StateReady => {
                tracing::debug!(stream_id, "state: ready");
                false
            }
            NotificationPayload::StatePlaying => {
                tracing::info!(stream_id, "state: playing");
                self.status.paused = false;
                false
            }
            NotificationPayload::StatePausing => {
                tracing::info!(stream_id, "state: paused");
                self.status.paused = true;
                false
            }
            NotificationPayload::TimeUpdate { position_seconds, length_seconds } => {
                tracing::info!(
                    stream_id,
                    position_seconds,
                    length_seconds,
                    "position {}/{}s",
                    position_seconds,
                    length_seconds
                );
                self.status.elapsed_ms = Some(u64::from(*position_seconds) * 1000);
                self.status.duration_ms = Some(u64::from(*length_seconds) * 1000);
                false
            }
            NotificationPayload::MetaInfo { title, artist, album } => {
                tracing::info!(stream_id, ?title, ?artist, ?album, "metadata");
                self.status.now_playing = title.clone();
                false
            }
            NotificationPayload::VolumeNotify { value, enabled } => {
                tracing::debug!(stream_id, value, enabled, "volume notify");
                self.status.volume = *value;
                false
            }
            NotificationPayload::ErrorMessage { text } => {
                tracing::error!(stream_id, error = %text, "playback error");
                self.status.end_reason = Some(PlaybackEndReason::Error);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notif(stream_id: u64, payload: NotificationPayload) -> Notification {
        Notification { stream_id, payload }
    }

    #[test]
    fn bos_then_eos_is_terminal() {
        let mut tracker = StatusTracker::new();
        assert!(!tracker.apply(&notif(1, NotificationPayload::Bos)));
        assert_eq!(tracker.status().stream_id, Some(1));
        assert!(tracker.apply(&notif(1, NotificationPayload::Eos)));
        assert_eq!(tracker.status().end_reason, Some(PlaybackEndReason::Eof));
    }

    #[test]
    fn error_message_is_terminal() {
        let mut tracker = StatusTracker::new();
        assert!(tracker.apply(&notif(1, NotificationPayload::ErrorMessage { text: "boom".into() })));
        assert_eq!(tracker.status().end_reason, Some(PlaybackEndReason::Error));
    }

    #[test]
    fn time_update_tracks_elapsed_and_duration() {
        let mut tracker = StatusTracker::new();
        tracker.apply(&notif(
            1,
            NotificationPayload::TimeUpdate { position_seconds: 5, length_seconds: 10 },
        ));
        assert_eq!(tracker.status().elapsed_ms, Some(5_000));
        assert_eq!(tracker.status().duration_ms, Some(10_000));
    }

    #[test]
    fn pause_and_play_toggle_paused_flag() {
        let mut tracker = StatusTracker::new();
        tracker.apply(&notif(1, NotificationPayload::StatePausing));
        assert!(tracker.status().paused);
        tracker.apply(&notif(1, NotificationPayload::StatePlaying));
        assert!(!tracker.status().paused);
    }
}
