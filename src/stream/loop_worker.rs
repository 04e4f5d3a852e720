use std::sync::Arc;

use tokio::{
    sync::{broadcast, mpsc, Mutex},
    time::{Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    engine::{EngineEvent, StretchEngine},
    pose::LandmarkFrame,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// One camera tick as queued by the driver.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// `None` is a tick without a usable frame.
    pub frame: Option<LandmarkFrame>,
    /// Capture time in milliseconds on the camera's own clock, if it sent one.
    pub captured_ms: Option<u64>,
    /// When the frame was handed to the stream.
    pub received: std::time::Instant,
}

/// Places frames on the local monotonic clock.
///
/// Stamped frames keep the spacing of their capture timestamps, anchored at
/// the arrival of the first stamped frame. Unstamped frames use their arrival
/// time. Placed times never run backwards.
#[derive(Debug, Default)]
struct FrameClock {
    anchor: Option<(u64, std::time::Instant)>,
    last: Option<std::time::Instant>,
}

impl FrameClock {
    fn place(&mut self, captured_ms: Option<u64>, received: std::time::Instant) -> std::time::Instant {
        let placed = match captured_ms {
            None => received,
            Some(ms) => match self.anchor {
                Some((base_ms, base)) if ms >= base_ms => base + Duration::from_millis(ms - base_ms),
                _ => {
                    // First stamped frame, or the camera clock restarted.
                    self.anchor = Some((ms, received));
                    received
                }
            },
        };

        let placed = self.last.map_or(placed, |last| placed.max(last));
        self.last = Some(placed);
        placed
    }
}

/// Feeds frames to the engine in arrival order. The watchdog keeps step
/// timeouts moving when the camera goes quiet.
pub async fn frame_loop(
    engine: Arc<Mutex<StretchEngine>>,
    mut frames: mpsc::Receiver<CapturedFrame>,
    events: broadcast::Sender<EngineEvent>,
    cancel_token: CancellationToken,
    watchdog: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + watchdog, watchdog);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut clock = FrameClock::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("frame loop shutting down");
                break;
            }
            captured = frames.recv() => {
                let Some(captured) = captured else {
                    log_info!("frame source closed");
                    break;
                };
                let at = clock.place(captured.captured_ms, captured.received);
                let produced = engine.lock().await.handle_frame(captured.frame.as_ref(), at);
                publish(&events, produced);
            }
            _ = ticker.tick() => {
                let now = std::time::Instant::now();
                let produced = engine.lock().await.poll(now);
                publish(&events, produced);
            }
        }
    }
}

fn publish(events: &broadcast::Sender<EngineEvent>, produced: Vec<EngineEvent>) {
    for event in produced {
        if events.send(event).is_err() {
            log_debug!("engine event dropped, no subscribers");
        }
    }
}
