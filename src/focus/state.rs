use serde::{Deserialize, Serialize};

use crate::samples::Posture;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum FocusState {
    #[default]
    Idle,
    /// Session running, no frame classified yet.
    Inferring,
    Concentrated,
    Distracted,
    /// Still distracted, and the alert for this stretch has gone out.
    AlertFired,
}

impl FocusState {
    pub fn is_active(&self) -> bool {
        !matches!(self, FocusState::Idle)
    }

    pub fn is_distracted(&self) -> bool {
        matches!(self, FocusState::Distracted | FocusState::AlertFired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusEvent {
    Start,
    Classified(Posture),
    Pause,
    AlertTimerElapsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Arm the alert timer unless one is already pending.
    Start,
    Cancel,
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: FocusState,
    pub timer: TimerAction,
    pub fire_alert: bool,
}

impl Transition {
    fn to(next: FocusState, timer: TimerAction) -> Self {
        Self {
            next,
            timer,
            fire_alert: false,
        }
    }

    fn stay(state: FocusState) -> Self {
        Self::to(state, TimerAction::Keep)
    }
}

/// Pure transition table. Side effects are described, not performed.
pub fn apply(state: FocusState, event: FocusEvent) -> Transition {
    use FocusState::*;

    match (state, event) {
        (Idle, FocusEvent::Start) => Transition::to(Inferring, TimerAction::Keep),
        (_, FocusEvent::Start) => Transition::stay(state),

        (_, FocusEvent::Pause) => Transition::to(Idle, TimerAction::Cancel),

        (Idle, FocusEvent::Classified(_)) => Transition::stay(Idle),
        (_, FocusEvent::Classified(Posture::Concentrated)) => {
            Transition::to(Concentrated, TimerAction::Cancel)
        }
        (Inferring | Concentrated, FocusEvent::Classified(Posture::Distracted)) => {
            Transition::to(Distracted, TimerAction::Start)
        }
        (Distracted | AlertFired, FocusEvent::Classified(Posture::Distracted)) => {
            Transition::stay(state)
        }

        (Distracted, FocusEvent::AlertTimerElapsed) => Transition {
            next: AlertFired,
            timer: TimerAction::Keep,
            fire_alert: true,
        },
        (_, FocusEvent::AlertTimerElapsed) => Transition::stay(state),
    }
}
