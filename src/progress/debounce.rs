use std::time::{Duration, Instant};

/// Drops a repeat completion of the same exercise inside a short window.
///
/// The pose pipeline can report the terminal "completed" signal twice in
/// quick succession. A different exercise always passes, and a zero window
/// disables suppression.
#[derive(Debug, Clone)]
pub struct CompletionDebouncer {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl CompletionDebouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Returns `true` if this completion should be recorded.
    pub fn admit(&mut self, exercise_id: &str, now: Instant) -> bool {
        if let Some((last_id, at)) = &self.last {
            if last_id == exercise_id && now.saturating_duration_since(*at) < self.window {
                return false;
            }
        }
        self.last = Some((exercise_id.to_string(), now));
        true
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn clear(&mut self) {
        self.last = None;
    }
}
