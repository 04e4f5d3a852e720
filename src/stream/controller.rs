use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use log::info;
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    engine::{EngineEvent, StretchEngine},
    pose::LandmarkFrame,
};

use super::loop_worker::{frame_loop, CapturedFrame};

const FRAME_BUFFER: usize = 64;
const EVENT_CAPACITY: usize = 256;

/// Owns the camera-side loop. Stopping it tears down the exercise run so no
/// validator outlives the stream.
pub struct FrameStreamController {
    engine: Arc<Mutex<StretchEngine>>,
    events: broadcast::Sender<EngineEvent>,
    watchdog: Duration,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    frame_tx: Option<mpsc::Sender<CapturedFrame>>,
}

impl FrameStreamController {
    pub fn new(engine: Arc<Mutex<StretchEngine>>, watchdog: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            engine,
            events,
            watchdog,
            handle: None,
            cancel_token: None,
            frame_tx: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            bail!("frame stream already active");
        }

        let cancel_token = CancellationToken::new();
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_BUFFER);

        let handle = tokio::spawn(frame_loop(
            self.engine.clone(),
            frame_rx,
            self.events.clone(),
            cancel_token.clone(),
            self.watchdog,
        ));

        info!("Frame stream started");
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.frame_tx = Some(frame_tx);
        Ok(())
    }

    /// Queue one camera tick. `None` is a tick without a usable frame.
    /// `captured_ms` is the capture time on the camera's clock, when known;
    /// otherwise the frame is timed from this call.
    pub async fn push_frame(&self, frame: Option<LandmarkFrame>, captured_ms: Option<u64>) -> Result<()> {
        let sender = self
            .frame_tx
            .as_ref()
            .ok_or_else(|| anyhow!("frame stream is not running"))?;
        sender
            .send(CapturedFrame {
                frame,
                captured_ms,
                received: std::time::Instant::now(),
            })
            .await
            .map_err(|_| anyhow!("frame loop exited"))
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.frame_tx = None;
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let joined = match self.handle.take() {
            Some(handle) => handle.await.context("frame loop task failed to join"),
            None => Ok(()),
        };

        self.engine.lock().await.teardown();
        info!("Frame stream stopped");
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exercise::ExerciseCatalog,
        pose::{BodyPoint, ClassifierConfig, Landmark},
        settings::ProgressSettings,
    };

    fn engine() -> Arc<Mutex<StretchEngine>> {
        Arc::new(Mutex::new(StretchEngine::new(
            Arc::new(ExerciseCatalog::builtin().unwrap()),
            ClassifierConfig::default(),
            &ProgressSettings::default(),
        )))
    }

    #[tokio::test]
    async fn frames_flow_to_subscribers() {
        let mut stream = FrameStreamController::new(engine(), Duration::from_secs(60));
        let mut events = stream.subscribe();
        stream.start().unwrap();

        stream.push_frame(None, None).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, EngineEvent::Feedback { .. }));

        stream.stop().await.unwrap();
        assert!(!stream.is_active());
    }

    #[tokio::test]
    async fn stamped_frames_are_held_by_capture_time() {
        let engine = engine();
        engine
            .lock()
            .await
            .select_exercise("neck_roll", std::time::Instant::now())
            .unwrap();
        let upright = LandmarkFrame::new()
            .with(BodyPoint::RightShoulder, Landmark::new(0.35, 0.55, 0.95))
            .with(BodyPoint::LeftShoulder, Landmark::new(0.65, 0.55, 0.95))
            .with(BodyPoint::RightEye, Landmark::new(0.46, 0.30, 0.95))
            .with(BodyPoint::LeftEye, Landmark::new(0.54, 0.30, 0.95))
            .with(BodyPoint::RightEar, Landmark::new(0.42, 0.30, 0.95))
            .with(BodyPoint::LeftEar, Landmark::new(0.58, 0.30, 0.95));

        let mut stream = FrameStreamController::new(engine.clone(), Duration::from_secs(60));
        let mut events = stream.subscribe();
        stream.start().unwrap();

        // Captured 100ms apart but delivered in one burst.
        for i in 0..4u64 {
            stream.push_frame(Some(upright.clone()), Some(10_000 + i * 100)).await.unwrap();
        }

        let mut held_ms = Vec::new();
        while held_ms.len() < 4 {
            let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
                .await
                .unwrap()
                .unwrap();
            if let EngineEvent::Feedback { feedback } = event {
                held_ms.push(feedback.held_ms);
            }
        }
        assert_eq!(held_ms, vec![0, 100, 200, 300]);

        stream.stop().await.unwrap();
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let mut stream = FrameStreamController::new(engine(), Duration::from_secs(60));
        stream.start().unwrap();
        assert!(stream.start().is_err());
        stream.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_tears_down_active_run() {
        let engine = engine();
        engine
            .lock()
            .await
            .select_exercise("neck_roll", std::time::Instant::now())
            .unwrap();

        let mut stream = FrameStreamController::new(engine.clone(), Duration::from_millis(10));
        stream.start().unwrap();
        stream.stop().await.unwrap();

        let guard = engine.lock().await;
        assert!(!guard.session().has_active_validator());
        assert_eq!(guard.session().selected_exercise(), None);
        drop(guard);

        assert!(stream.push_frame(None, Some(0)).await.is_err());
    }
}
