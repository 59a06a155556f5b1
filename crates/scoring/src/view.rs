use std::fmt;

use serde::{Deserialize, Serialize};
use shared::domain::{InningsState, BALLS_PER_OVER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InningsStatus {
    NotStarted,
    InProgress,
    Complete,
}

impl fmt::Display for InningsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InningsStatus::NotStarted => "Not started",
            InningsStatus::InProgress => "In progress",
            InningsStatus::Complete => "Innings complete",
        };
        f.write_str(text)
    }
}

/// What a scoreboard shows for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreboardView {
    pub score: String,
    pub overs: String,
    pub limits: String,
    pub this_over: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_rate: Option<String>,
    pub status: InningsStatus,
}

impl ScoreboardView {
    pub fn from_state(state: &InningsState) -> Self {
        let status = if state.innings_ended {
            InningsStatus::Complete
        } else if state.has_started() || !state.current_over_deliveries.is_empty() {
            InningsStatus::InProgress
        } else {
            InningsStatus::NotStarted
        };

        Self {
            score: state.score_line(),
            overs: state.overs_line(),
            limits: format!(
                "{} overs, {} wickets",
                state.overs_limit, state.wickets_limit
            ),
            this_over: state.over_labels(),
            run_rate: run_rate(state),
            status,
        }
    }
}

fn run_rate(state: &InningsState) -> Option<String> {
    let balls = state.completed_overs * BALLS_PER_OVER + state.legal_balls_in_current_over;
    if balls == 0 {
        return None;
    }
    let per_over = f64::from(state.total_runs) * f64::from(BALLS_PER_OVER) / f64::from(balls);
    Some(format!("{per_over:.2}"))
}

impl fmt::Display for ScoreboardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}  ({} ov)  [{}]", self.score, self.overs, self.limits)?;
        if self.this_over.is_empty() {
            writeln!(f, "this over: -")?;
        } else {
            writeln!(f, "this over: {}", self.this_over.join(" "))?;
        }
        if let Some(rate) = &self.run_rate {
            writeln!(f, "run rate: {rate}")?;
        }
        write!(f, "{}", self.status)
    }
}
