use std::time::Duration;

/// Decides which captured frames are submitted for segmentation
///
/// Single writer: only the capture path calls `should_process`.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    interval: Duration,
    last_processed: Option<Duration>,
}

impl FrameThrottle {
    pub fn new(target_fps: f32) -> Self {
        let interval = if target_fps > 0.0 {
            Duration::from_secs_f64(1.0 / target_fps as f64)
        } else {
            Duration::ZERO
        };

        Self {
            interval,
            last_processed: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_processed(&self) -> Option<Duration> {
        self.last_processed
    }

    /// Returns true and records `now` if a full interval has passed since
    /// the last processed frame. The first frame always proceeds.
    pub fn should_process(&mut self, now: Duration) -> bool {
        let proceed = match self.last_processed {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.interval,
        };

        if proceed {
            self.last_processed = Some(now);
        }
        proceed
    }

    pub fn reset(&mut self) {
        self.last_processed = None;
    }
}
