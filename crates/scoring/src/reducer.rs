use shared::domain::{
    BallOutcome, IgnoreReason, InningsState, ScoreCommand, TransitionEffect, BALLS_PER_OVER,
};

use crate::delivery::{classify, Classified, Delivery, DeliveryTarget};

/// Next state plus a report of what the command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: InningsState,
    pub effect: TransitionEffect,
}

impl Transition {
    fn ignored(state: &InningsState, reason: IgnoreReason) -> Self {
        Self {
            state: state.clone(),
            effect: TransitionEffect::Ignored { reason },
        }
    }
}

/// Applies one command. Never touches `state`.
pub fn apply(state: &InningsState, command: &ScoreCommand) -> InningsState {
    reduce(state, command).state
}

pub fn reduce(state: &InningsState, command: &ScoreCommand) -> Transition {
    match classify(command, state.current_over_deliveries.len()) {
        Classified::Delivery(delivery) => record_delivery(state, delivery),
        Classified::ClearLastBall => clear_last_ball(state),
        Classified::NewInnings { overs_limit } => new_innings(state, overs_limit),
        Classified::SetWicketsLimit { limit } => set_wickets_limit(state, limit),
    }
}

fn record_delivery(state: &InningsState, delivery: Delivery) -> Transition {
    if state.innings_ended {
        return Transition::ignored(state, IgnoreReason::InningsEnded);
    }

    let Delivery { outcome, target } = delivery;
    let mut next = state.clone();

    let mut effect = match target {
        DeliveryTarget::Edit { slot } => {
            let previous =
                std::mem::replace(&mut next.current_over_deliveries[slot], outcome.clone());
            retract(&mut next, &previous);
            TransitionEffect::Edited { ball: slot + 1 }
        }
        DeliveryTarget::Append { requested_ball } => {
            if next.legal_deliveries_buffered() < BALLS_PER_OVER {
                next.current_over_deliveries.push(outcome.clone());
                TransitionEffect::Appended {
                    ball: next.current_over_deliveries.len(),
                    requested_ball,
                }
            } else {
                TransitionEffect::Dropped
            }
        }
    };

    credit(&mut next, &outcome);
    next.legal_balls_in_current_over = next.legal_deliveries_buffered();

    if next.legal_balls_in_current_over >= BALLS_PER_OVER {
        next.completed_overs += 1;
        next.legal_balls_in_current_over = 0;
        next.current_over_deliveries.clear();
        if effect != TransitionEffect::Dropped {
            effect = TransitionEffect::OverCompleted {
                over: next.completed_overs,
            };
        }
    }

    next.innings_ended =
        next.total_wickets >= next.wickets_limit || next.completed_overs >= next.overs_limit;

    Transition {
        state: next,
        effect,
    }
}

fn clear_last_ball(state: &InningsState) -> Transition {
    if state.innings_ended {
        return Transition::ignored(state, IgnoreReason::InningsEnded);
    }

    let mut next = state.clone();
    let ball = next.current_over_deliveries.len();
    let Some(last) = next.current_over_deliveries.pop() else {
        return Transition::ignored(state, IgnoreReason::NothingToClear);
    };

    retract(&mut next, &last);
    // Clearing never completes an over; only an append can.
    next.legal_balls_in_current_over = next.legal_deliveries_buffered();

    Transition {
        state: next,
        effect: TransitionEffect::Cleared { ball },
    }
}

fn new_innings(state: &InningsState, overs_limit: Option<u32>) -> Transition {
    Transition {
        state: InningsState::new(
            overs_limit.unwrap_or(state.overs_limit),
            state.wickets_limit,
        ),
        effect: TransitionEffect::Reset,
    }
}

fn set_wickets_limit(state: &InningsState, limit: u32) -> Transition {
    if limit < 1 {
        return Transition::ignored(state, IgnoreReason::InvalidLimit);
    }
    if state.has_started() {
        return Transition::ignored(state, IgnoreReason::InningsStarted);
    }

    let mut next = state.clone();
    next.wickets_limit = limit;
    Transition {
        state: next,
        effect: TransitionEffect::Configured,
    }
}

fn credit(state: &mut InningsState, outcome: &BallOutcome) {
    state.total_runs = state.total_runs.saturating_add(outcome.runs_scored());
    if outcome.is_wicket() {
        state.total_wickets = state.total_wickets.saturating_add(1);
    }
}

fn retract(state: &mut InningsState, outcome: &BallOutcome) {
    debug_assert!(state.total_runs >= outcome.runs_scored());
    state.total_runs = state.total_runs.saturating_sub(outcome.runs_scored());
    if outcome.is_wicket() {
        debug_assert!(state.total_wickets > 0);
        state.total_wickets = state.total_wickets.saturating_sub(1);
    }
}

#[cfg(test)]
#[path = "tests/reducer_tests.rs"]
mod tests;
