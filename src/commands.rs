use std::time::Instant;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::{
    exercise::StepFeedback,
    focus::{ConfigOutcome, FocusConfig, FocusSessionState},
    pose::LandmarkFrame,
    progress::{CompletedExercise, ProgressSnapshot},
    AppState,
};

const DEFAULT_HISTORY_LIMIT: u32 = 20;

/// One line of driver input.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    ListExercises,
    SelectExercise {
        id: String,
    },
    StartExercise,
    ResetExercise,
    /// One camera tick: named `landmarks`, or the pose bridge's `flat`
    /// `[x, y, confidence] * 33` buffer. Neither means no usable frame.
    #[serde(rename_all = "camelCase")]
    Frame {
        #[serde(default)]
        landmarks: Option<LandmarkFrame>,
        #[serde(default)]
        flat: Option<Vec<f32>>,
        #[serde(default)]
        timestamp_ms: Option<u64>,
    },
    CameraStart,
    CameraStop,
    Progress,
    ResetProgress,
    ResetScore,
    History {
        #[serde(default)]
        limit: Option<u32>,
    },
    FocusStart,
    FocusPause,
    FocusResume,
    FocusStop,
    #[serde(rename_all = "camelCase")]
    FocusConfigure {
        work_duration_secs: u32,
        total_cycles: u32,
        #[serde(default)]
        auto_continue: Option<bool>,
    },
    FocusState,
    Quit,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Reply {
    Exercises {
        exercises: Vec<String>,
    },
    Exercise {
        feedback: StepFeedback,
    },
    Accepted,
    Progress {
        progress: ProgressSnapshot,
        score: u64,
    },
    History {
        completions: Vec<CompletedExercise>,
    },
    Focus {
        state: FocusSessionState,
    },
    FocusConfigured {
        outcome: ConfigOutcome,
        state: FocusSessionState,
    },
    Error {
        message: String,
    },
    Bye,
}

fn frame_payload(landmarks: Option<LandmarkFrame>, flat: Option<Vec<f32>>) -> Result<Option<LandmarkFrame>> {
    match (landmarks, flat) {
        (Some(_), Some(_)) => bail!("frame carries both named and flat landmarks"),
        (None, Some(flat)) => match LandmarkFrame::from_flat(&flat) {
            Some(frame) => Ok(Some(frame)),
            None => bail!("flat landmark buffer has {} values", flat.len()),
        },
        (landmarks, None) => Ok(landmarks),
    }
}

pub async fn dispatch(state: &AppState, command: Command) -> Result<Reply> {
    let reply = match command {
        Command::ListExercises => Reply::Exercises {
            exercises: state.engine.lock().await.list_exercises(),
        },
        Command::SelectExercise { id } => {
            let feedback = state.engine.lock().await.select_exercise(&id, Instant::now())?;
            Reply::Exercise { feedback }
        }
        Command::StartExercise => {
            let feedback = state.engine.lock().await.start_exercise(Instant::now())?;
            Reply::Exercise { feedback }
        }
        Command::ResetExercise => {
            state.engine.lock().await.reset_exercise();
            Reply::Accepted
        }
        Command::Frame {
            landmarks,
            flat,
            timestamp_ms,
        } => {
            let frame = frame_payload(landmarks, flat)?;
            state.stream.lock().await.push_frame(frame, timestamp_ms).await?;
            Reply::Accepted
        }
        Command::CameraStart => {
            let mut stream = state.stream.lock().await;
            if !stream.is_active() {
                stream.start()?;
            }
            Reply::Accepted
        }
        Command::CameraStop => {
            state.stream.lock().await.stop().await?;
            Reply::Accepted
        }
        Command::Progress => {
            let engine = state.engine.lock().await;
            Reply::Progress {
                progress: engine.progress(),
                score: engine.score(),
            }
        }
        Command::ResetProgress => {
            let mut engine = state.engine.lock().await;
            Reply::Progress {
                progress: engine.reset_daily_progress(),
                score: engine.score(),
            }
        }
        Command::ResetScore => {
            let mut engine = state.engine.lock().await;
            engine.reset_score();
            Reply::Progress {
                progress: engine.progress(),
                score: engine.score(),
            }
        }
        Command::History { limit } => Reply::History {
            completions: state
                .db
                .list_completions(limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
                .await?,
        },
        Command::FocusStart => Reply::Focus {
            state: state.focus.start().await?,
        },
        Command::FocusPause => Reply::Focus {
            state: state.focus.pause().await?,
        },
        Command::FocusResume => Reply::Focus {
            state: state.focus.resume().await?,
        },
        Command::FocusStop => Reply::Focus {
            state: state.focus.stop().await?,
        },
        Command::FocusConfigure {
            work_duration_secs,
            total_cycles,
            auto_continue,
        } => {
            let current = state.focus.snapshot().await.config();
            let config = FocusConfig {
                work_duration_secs,
                total_cycles,
                auto_continue: auto_continue.unwrap_or(current.auto_continue),
            };
            let outcome = state.focus.configure(config).await?;
            if outcome != ConfigOutcome::Unchanged {
                state.settings.update_focus(config)?;
            }
            Reply::FocusConfigured {
                outcome,
                state: state.focus.snapshot().await,
            }
        }
        Command::FocusState => Reply::Focus {
            state: state.focus.snapshot().await,
        },
        Command::Quit => Reply::Bye,
    };
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_from_json_lines() {
        let command: Command = serde_json::from_str(r#"{"type":"selectExercise","id":"neck_roll"}"#).unwrap();
        assert!(matches!(command, Command::SelectExercise { id } if id == "neck_roll"));

        let command: Command = serde_json::from_str(r#"{"type":"frame","landmarks":null}"#).unwrap();
        assert!(matches!(
            command,
            Command::Frame {
                landmarks: None,
                flat: None,
                timestamp_ms: None
            }
        ));

        let command: Command =
            serde_json::from_str(r#"{"type":"frame","landmarks":null,"timestampMs":1500}"#).unwrap();
        assert!(matches!(
            command,
            Command::Frame {
                timestamp_ms: Some(1500),
                ..
            }
        ));

        let command: Command = serde_json::from_str(
            r#"{"type":"focusConfigure","workDurationSecs":600,"totalCycles":2}"#,
        )
        .unwrap();
        assert!(matches!(
            command,
            Command::FocusConfigure {
                work_duration_secs: 600,
                total_cycles: 2,
                auto_continue: None
            }
        ));

        let command: Command = serde_json::from_str(
            r#"{"type":"frame","landmarks":{"left_shoulder":{"x":0.4,"y":0.5,"visibility":0.9}}}"#,
        )
        .unwrap();
        match command {
            Command::Frame {
                landmarks: Some(frame),
                ..
            } => assert_eq!(frame.len(), 1),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn flat_buffers_become_frames() {
        let mut flat = vec![0.5; 99];
        flat[2] = 0.8;
        let frame = frame_payload(None, Some(flat)).unwrap().unwrap();
        assert_eq!(frame.len(), 33);
        assert_eq!(frame.get(crate::pose::BodyPoint::Nose).map(|nose| nose.confidence), Some(0.8));

        assert!(frame_payload(None, Some(vec![0.5; 12])).is_err());
        assert!(frame_payload(Some(LandmarkFrame::new()), Some(vec![0.5; 99])).is_err());
        assert_eq!(frame_payload(None, None).unwrap(), None);
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(serde_json::from_str::<Command>(r#"{"type":"launchRocket"}"#).is_err());
    }

    #[test]
    fn replies_are_tagged() {
        let json = serde_json::to_value(Reply::Error {
            message: "boom".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");
    }
}
