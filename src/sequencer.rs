//! Orientation sequencing for a capture session.
//!
//! A session walks `Waiting -> Countdown -> Capturing` once per orientation
//! with shots, horizontal before vertical, then ends in `Complete`. The
//! transition function is pure; [`SessionState`] layers the progress counters
//! and the prompt shown to the subject on top of it.

use crate::plan::{CapturePlan, Orientation};
use std::fmt;
use thiserror::Error;

pub const ROTATE_PROMPT: &str = "Rotate phone to portrait (vertical) and press shutter when ready";
pub const COMPLETE_PROMPT: &str = "All photos taken! Return to user mode";
pub const RETRY_PROMPT: &str = "Capture interrupted. Press shutter to retake this orientation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Waiting(Orientation),
    Countdown(Orientation),
    Capturing(Orientation),
    Complete,
}

impl Phase {
    pub fn initial(plan: &CapturePlan) -> Self {
        Phase::Waiting(plan.initial_orientation())
    }

    pub fn orientation(&self) -> Option<Orientation> {
        match self {
            Phase::Waiting(o) | Phase::Countdown(o) | Phase::Capturing(o) => Some(*o),
            Phase::Complete => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Phase::Complete)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Waiting(o) => write!(f, "waiting ({o})"),
            Phase::Countdown(o) => write!(f, "countdown ({o})"),
            Phase::Capturing(o) => write!(f, "capturing ({o})"),
            Phase::Complete => f.write_str("complete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    ShutterPressed,
    CountdownFinished,
    BatchFinished,
    /// The camera failed part-way through the batch.
    BatchInterrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{trigger:?} is not accepted while {phase}")]
pub struct InvalidTransition {
    pub phase: Phase,
    pub trigger: Trigger,
}

pub fn transition(
    phase: Phase,
    trigger: Trigger,
    plan: &CapturePlan,
) -> Result<Phase, InvalidTransition> {
    let next = match (phase, trigger) {
        (Phase::Waiting(o), Trigger::ShutterPressed) => {
            if plan.count_for(o) == 0 {
                // Only reachable when the plan has no shots at all.
                Phase::Complete
            } else {
                Phase::Countdown(o)
            }
        }
        (Phase::Countdown(o), Trigger::CountdownFinished) => Phase::Capturing(o),
        (Phase::Capturing(Orientation::Horizontal), Trigger::BatchFinished) => {
            if plan.vertical_count > 0 {
                Phase::Waiting(Orientation::Vertical)
            } else {
                Phase::Complete
            }
        }
        (Phase::Capturing(Orientation::Vertical), Trigger::BatchFinished) => Phase::Complete,
        (Phase::Capturing(o), Trigger::BatchInterrupted) => Phase::Waiting(o),
        (phase, trigger) => return Err(InvalidTransition { phase, trigger }),
    };
    Ok(next)
}

/// Mutable session state, owned by the controller for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub phase: Phase,
    pub current_orientation: Orientation,
    pub shots_taken_in_phase: u32,
    pub countdown_remaining: u32,
    pub user_prompt: Option<String>,
}

impl SessionState {
    pub fn new(plan: &CapturePlan) -> Self {
        let phase = Phase::initial(plan);
        Self {
            phase,
            current_orientation: plan.initial_orientation(),
            shots_taken_in_phase: 0,
            countdown_remaining: 0,
            user_prompt: None,
        }
    }

    pub fn apply(&mut self, trigger: Trigger, plan: &CapturePlan) -> Result<Phase, InvalidTransition> {
        let next = transition(self.phase, trigger, plan)?;
        tracing::debug!(from = %self.phase, to = %next, ?trigger, "session transition");

        match next {
            Phase::Waiting(o) => {
                self.user_prompt = match (trigger, o) {
                    (Trigger::BatchInterrupted, _) => Some(RETRY_PROMPT.to_string()),
                    (_, Orientation::Vertical) => Some(ROTATE_PROMPT.to_string()),
                    _ => None,
                };
            }
            Phase::Countdown(_) => {
                self.shots_taken_in_phase = 0;
                self.user_prompt = None;
            }
            Phase::Capturing(_) => {
                self.countdown_remaining = 0;
            }
            Phase::Complete => {
                self.user_prompt = Some(COMPLETE_PROMPT.to_string());
            }
        }

        if let Some(orientation) = next.orientation() {
            self.current_orientation = orientation;
        }
        self.phase = next;
        Ok(next)
    }

    /// Count one successful shot. Never exceeds the planned count.
    pub fn record_shot(&mut self, plan: &CapturePlan) -> u32 {
        let planned = self.planned_in_phase(plan);
        self.shots_taken_in_phase = (self.shots_taken_in_phase + 1).min(planned);
        self.shots_taken_in_phase
    }

    pub fn planned_in_phase(&self, plan: &CapturePlan) -> u32 {
        plan.count_for(self.current_orientation)
    }

    /// Status banner text, e.g. `Portrait Shot | Horizontal: 2/5`.
    pub fn status_line(&self, plan: &CapturePlan) -> String {
        format!(
            "{} Shot | {}: {}/{}",
            plan.shot_type,
            self.current_orientation,
            self.shots_taken_in_phase,
            self.planned_in_phase(plan)
        )
    }
}
