use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::pose::{MovementType, Verdict};

use super::catalog::StepDefinition;

/// Longest gap between two good frames still counted as continuous.
const MAX_FRAME_GAP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationStatus {
    Idle,
    Validating,
    Succeeded,
    TimedOut,
}

impl ValidationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ValidationStatus::Succeeded | ValidationStatus::TimedOut)
    }
}

impl Default for ValidationStatus {
    fn default() -> Self {
        ValidationStatus::Idle
    }
}

/// Debounces per-frame verdicts for one step into a durable success or a timeout.
///
/// Good time is the wall-clock span between consecutive good ticks, so frame
/// rate does not change how long a pose has to be held. The first good tick of
/// a run only marks its start: gaps with nothing observed earn no credit. Any
/// bad frame wipes the accumulated time.
#[derive(Debug, Clone)]
pub struct StepValidator {
    movement: MovementType,
    hold: Duration,
    timeout: Duration,
    status: ValidationStatus,
    held: Duration,
    started_at: Option<Instant>,
    last_good: Option<Instant>,
}

impl StepValidator {
    pub fn new(step: &StepDefinition) -> Self {
        Self {
            movement: step.movement,
            hold: step.hold,
            timeout: step.timeout,
            status: ValidationStatus::Idle,
            held: Duration::ZERO,
            started_at: None,
            last_good: None,
        }
    }

    /// Start (or restart) an attempt at `now`.
    pub fn activate(&mut self, now: Instant) {
        self.status = ValidationStatus::Validating;
        self.held = Duration::ZERO;
        self.started_at = Some(now);
        self.last_good = None;
    }

    /// Feed one frame tick. `None` means the pose source had nothing to
    /// classify this tick, which counts as a bad frame.
    pub fn on_verdict(&mut self, verdict: Option<&Verdict>, now: Instant) -> ValidationStatus {
        if self.status != ValidationStatus::Validating {
            return self.status;
        }

        match verdict {
            Some(verdict) if verdict.ok => {
                if let Some(previous) = self.last_good {
                    let gap = now.saturating_duration_since(previous);
                    if gap > MAX_FRAME_GAP {
                        // Unobserved stall; the run restarts at this frame.
                        self.held = Duration::ZERO;
                    } else {
                        self.held += gap;
                    }
                }
                self.last_good = Some(now);
            }
            _ => {
                self.held = Duration::ZERO;
                self.last_good = None;
            }
        }

        self.settle(now)
    }

    /// Check the timeout without a frame, for when the pose source goes quiet.
    pub fn poll(&mut self, now: Instant) -> ValidationStatus {
        if self.status != ValidationStatus::Validating {
            return self.status;
        }
        self.settle(now)
    }

    fn settle(&mut self, now: Instant) -> ValidationStatus {
        let elapsed = self.elapsed(now);
        if self.held >= self.hold && elapsed <= self.timeout {
            self.status = ValidationStatus::Succeeded;
        } else if elapsed >= self.timeout {
            self.status = ValidationStatus::TimedOut;
        }
        self.status
    }

    pub fn status(&self) -> ValidationStatus {
        self.status
    }

    pub fn movement(&self) -> MovementType {
        self.movement
    }

    /// Unbroken good time in the current run.
    pub fn held(&self) -> Duration {
        self.held
    }

    pub fn required(&self) -> Duration {
        self.hold
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time since activation, zero while idle.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started_at
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default()
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.timeout.saturating_sub(self.elapsed(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(100);

    fn step(hold_ms: u64, timeout_ms: u64) -> StepDefinition {
        StepDefinition {
            name: "Hold".into(),
            movement: MovementType::InitialPosture,
            hold: Duration::from_millis(hold_ms),
            timeout: Duration::from_millis(timeout_ms),
            instruction: "Sit tall".into(),
            success_text: "Nice".into(),
            failure_text: "Try again".into(),
        }
    }

    fn good() -> Verdict {
        Verdict::pass()
    }

    fn bad() -> Verdict {
        Verdict::landmark_missing()
    }

    #[test]
    fn starts_idle_and_ignores_frames_until_activated() {
        let mut validator = StepValidator::new(&step(1000, 5000));
        let now = Instant::now();
        assert_eq!(validator.status(), ValidationStatus::Idle);
        assert_eq!(validator.on_verdict(Some(&good()), now + TICK), ValidationStatus::Idle);
        assert_eq!(validator.held(), Duration::ZERO);
    }

    #[test]
    fn sustained_good_frames_succeed() {
        let mut validator = StepValidator::new(&step(1000, 5000));
        let start = Instant::now();
        validator.activate(start);

        // The first good frame at tick 1 starts the run; ten more spans make 1s.
        for i in 1..=10 {
            let status = validator.on_verdict(Some(&good()), start + TICK * i);
            assert_eq!(status, ValidationStatus::Validating);
        }
        assert_eq!(
            validator.on_verdict(Some(&good()), start + TICK * 11),
            ValidationStatus::Succeeded
        );
        assert_eq!(validator.held(), Duration::from_millis(1000));
    }

    #[test]
    fn bad_frames_never_accumulate() {
        let mut validator = StepValidator::new(&step(1000, 5000));
        let start = Instant::now();
        validator.activate(start);

        for i in 1..49 {
            let status = validator.on_verdict(Some(&bad()), start + TICK * i);
            assert_eq!(status, ValidationStatus::Validating);
            assert_eq!(validator.held(), Duration::ZERO);
        }
    }

    #[test]
    fn missing_frame_resets_the_run() {
        let mut validator = StepValidator::new(&step(1000, 5000));
        let start = Instant::now();
        validator.activate(start);

        for i in 1..=5 {
            validator.on_verdict(Some(&good()), start + TICK * i);
        }
        assert_eq!(validator.held(), TICK * 4);
        validator.on_verdict(None, start + TICK * 6);
        assert_eq!(validator.held(), Duration::ZERO);
    }

    #[test]
    fn times_out_exactly_at_the_budget() {
        let mut validator = StepValidator::new(&step(1000, 3000));
        let start = Instant::now();
        validator.activate(start);

        let just_before = start + Duration::from_millis(2999);
        assert_eq!(validator.on_verdict(Some(&bad()), just_before), ValidationStatus::Validating);
        assert_eq!(
            validator.on_verdict(Some(&bad()), start + Duration::from_millis(3000)),
            ValidationStatus::TimedOut
        );
    }

    #[test]
    fn poll_times_out_without_frames() {
        let mut validator = StepValidator::new(&step(1000, 3000));
        let start = Instant::now();
        validator.activate(start);

        assert_eq!(validator.poll(start + Duration::from_secs(2)), ValidationStatus::Validating);
        assert_eq!(validator.poll(start + Duration::from_secs(3)), ValidationStatus::TimedOut);
        assert_eq!(validator.remaining(start + Duration::from_secs(4)), Duration::ZERO);
    }

    #[test]
    fn terminal_states_hold_until_reactivated() {
        let mut validator = StepValidator::new(&step(1000, 3000));
        let start = Instant::now();
        validator.activate(start);
        validator.poll(start + Duration::from_secs(3));
        assert_eq!(validator.status(), ValidationStatus::TimedOut);

        // Further frames change nothing.
        let later = start + Duration::from_secs(10);
        assert_eq!(validator.on_verdict(Some(&good()), later), ValidationStatus::TimedOut);

        validator.activate(later);
        assert_eq!(validator.status(), ValidationStatus::Validating);
        assert_eq!(validator.elapsed(later), Duration::ZERO);
        validator.on_verdict(Some(&good()), later + TICK);
        assert_eq!(
            validator.on_verdict(Some(&good()), later + TICK + Duration::from_secs(1)),
            ValidationStatus::Succeeded
        );
    }

    #[test]
    fn frame_rate_does_not_change_hold_time() {
        let start = Instant::now();

        let mut slow = StepValidator::new(&step(1000, 5000));
        slow.activate(start);
        slow.on_verdict(Some(&good()), start + Duration::from_millis(500));
        slow.on_verdict(Some(&good()), start + Duration::from_millis(1000));
        assert_eq!(
            slow.on_verdict(Some(&good()), start + Duration::from_millis(1500)),
            ValidationStatus::Succeeded
        );

        let mut fast = StepValidator::new(&step(1000, 5000));
        fast.activate(start);
        let tick = Duration::from_millis(10);
        let mut status = ValidationStatus::Validating;
        for i in 1..=101 {
            status = fast.on_verdict(Some(&good()), start + tick * i);
        }
        assert_eq!(status, ValidationStatus::Succeeded);
    }

    #[test]
    fn lone_good_frame_after_quiet_activation_earns_nothing() {
        let mut validator = StepValidator::new(&step(3000, 45000));
        let start = Instant::now();
        validator.activate(start);

        let status = validator.on_verdict(Some(&good()), start + Duration::from_secs(3));
        assert_eq!(status, ValidationStatus::Validating);
        assert_eq!(validator.held(), Duration::ZERO);
    }

    #[test]
    fn stall_after_bad_frame_earns_nothing() {
        let mut validator = StepValidator::new(&step(3000, 45000));
        let start = Instant::now();
        validator.activate(start);

        validator.on_verdict(Some(&bad()), start + TICK);
        let status = validator.on_verdict(Some(&good()), start + Duration::from_millis(3100));
        assert_eq!(status, ValidationStatus::Validating);
        assert_eq!(validator.held(), Duration::ZERO);

        // Polling through the stall does not bank time either.
        validator.poll(start + Duration::from_secs(5));
        assert_eq!(validator.held(), Duration::ZERO);
    }

    #[test]
    fn stall_between_good_frames_restarts_the_run() {
        let mut validator = StepValidator::new(&step(3000, 45000));
        let start = Instant::now();
        validator.activate(start);

        for i in 1..=10 {
            validator.on_verdict(Some(&good()), start + TICK * i);
        }
        assert_eq!(validator.held(), TICK * 9);

        let status = validator.on_verdict(Some(&good()), start + Duration::from_secs(5));
        assert_eq!(status, ValidationStatus::Validating);
        assert_eq!(validator.held(), Duration::ZERO);
    }
}
