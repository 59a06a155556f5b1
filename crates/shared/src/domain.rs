use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(SessionId);
id_newtype!(SnapshotId);

pub const BALLS_PER_OVER: u32 = 6;
/// Fixed penalty credited for every wide or no-ball, on top of any runs taken.
pub const EXTRA_PENALTY_RUNS: u32 = 1;
pub const DEFAULT_OVERS_LIMIT: u32 = 20;
pub const DEFAULT_WICKETS_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtraKind {
    Wide,
    NoBall,
}

impl ExtraKind {
    pub fn label_suffix(self) -> &'static str {
        match self {
            ExtraKind::Wide => "wd",
            ExtraKind::NoBall => "nb",
        }
    }
}

/// One delivery's result.
///
/// Fields are only reachable through the constructors, so `label` always
/// matches the rest of the outcome. Deserialization re-derives the label and
/// ignores whatever was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BallOutcomeRecord", into = "BallOutcomeRecord")]
pub struct BallOutcome {
    runs_scored: u32,
    is_wicket: bool,
    is_legal_delivery: bool,
    extra_kind: Option<ExtraKind>,
    label: String,
}

impl BallOutcome {
    pub fn runs(runs: u32) -> Self {
        Self::from_parts(runs, false, true, None)
    }

    pub fn wicket(runs_on_dismissal: u32) -> Self {
        Self::from_parts(runs_on_dismissal, true, true, None)
    }

    /// `runs` are the runs taken off the extra; the penalty run is added here.
    pub fn extra(kind: ExtraKind, runs: u32) -> Self {
        Self::from_parts(EXTRA_PENALTY_RUNS.saturating_add(runs), false, false, Some(kind))
    }

    fn from_parts(
        runs_scored: u32,
        is_wicket: bool,
        is_legal_delivery: bool,
        extra_kind: Option<ExtraKind>,
    ) -> Self {
        Self {
            runs_scored,
            is_wicket,
            is_legal_delivery,
            extra_kind,
            label: derive_label(runs_scored, is_wicket, extra_kind),
        }
    }

    pub fn runs_scored(&self) -> u32 {
        self.runs_scored
    }

    pub fn is_wicket(&self) -> bool {
        self.is_wicket
    }

    pub fn is_legal_delivery(&self) -> bool {
        self.is_legal_delivery
    }

    pub fn extra_kind(&self) -> Option<ExtraKind> {
        self.extra_kind
    }

    /// Display token. Presentation only.
    pub fn label(&self) -> &str {
        &self.label
    }
}

fn derive_label(runs_scored: u32, is_wicket: bool, extra_kind: Option<ExtraKind>) -> String {
    match extra_kind {
        Some(kind) => {
            let taken = runs_scored.saturating_sub(EXTRA_PENALTY_RUNS);
            if taken > 0 {
                format!("{taken}{}", kind.label_suffix())
            } else {
                kind.label_suffix().to_string()
            }
        }
        None if is_wicket && runs_scored == 0 => "W".to_string(),
        None if is_wicket => format!("W+{runs_scored}"),
        None => runs_scored.to_string(),
    }
}

#[derive(Serialize, Deserialize)]
struct BallOutcomeRecord {
    runs_scored: u32,
    is_wicket: bool,
    is_legal_delivery: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extra_kind: Option<ExtraKind>,
    #[serde(default)]
    label: String,
}

impl From<BallOutcomeRecord> for BallOutcome {
    fn from(value: BallOutcomeRecord) -> Self {
        Self::from_parts(
            value.runs_scored,
            value.is_wicket,
            value.is_legal_delivery,
            value.extra_kind,
        )
    }
}

impl From<BallOutcome> for BallOutcomeRecord {
    fn from(value: BallOutcome) -> Self {
        Self {
            runs_scored: value.runs_scored,
            is_wicket: value.is_wicket,
            is_legal_delivery: value.is_legal_delivery,
            extra_kind: value.extra_kind,
            label: value.label,
        }
    }
}

/// Running score of one innings. Transitions go through `scoring::reducer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InningsState {
    pub total_runs: u32,
    pub total_wickets: u32,
    pub completed_overs: u32,
    pub legal_balls_in_current_over: u32,
    #[serde(default)]
    pub current_over_deliveries: Vec<BallOutcome>,
    #[serde(default)]
    pub innings_ended: bool,
    pub overs_limit: u32,
    pub wickets_limit: u32,
}

impl Default for InningsState {
    fn default() -> Self {
        Self::new(DEFAULT_OVERS_LIMIT, DEFAULT_WICKETS_LIMIT)
    }
}

impl InningsState {
    /// Limits below 1 are raised to 1.
    pub fn new(overs_limit: u32, wickets_limit: u32) -> Self {
        Self {
            total_runs: 0,
            total_wickets: 0,
            completed_overs: 0,
            legal_balls_in_current_over: 0,
            current_over_deliveries: Vec::new(),
            innings_ended: false,
            overs_limit: overs_limit.max(1),
            wickets_limit: wickets_limit.max(1),
        }
    }

    /// True once any run, wicket, over or legal ball is on the card.
    pub fn has_started(&self) -> bool {
        self.total_runs != 0
            || self.total_wickets != 0
            || self.completed_overs != 0
            || self.legal_balls_in_current_over != 0
    }

    pub fn legal_deliveries_buffered(&self) -> u32 {
        self.current_over_deliveries
            .iter()
            .filter(|ball| ball.is_legal_delivery())
            .count() as u32
    }

    /// `"{runs}-{wickets}"`
    pub fn score_line(&self) -> String {
        format!("{}-{}", self.total_runs, self.total_wickets)
    }

    /// `"{overs}.{balls}"`
    pub fn overs_line(&self) -> String {
        format!(
            "{}.{}",
            self.completed_overs, self.legal_balls_in_current_over
        )
    }

    pub fn over_labels(&self) -> Vec<String> {
        self.current_over_deliveries
            .iter()
            .map(|ball| ball.label().to_string())
            .collect()
    }
}

/// One classified instruction for the scorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ScoreCommand {
    AddRuns {
        runs: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ball_number: Option<i32>,
    },
    DeclareWicket {
        #[serde(default)]
        runs_on_dismissal: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ball_number: Option<i32>,
    },
    DeclareExtra {
        kind: ExtraKind,
        #[serde(default)]
        runs: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ball_number: Option<i32>,
    },
    ClearLastBall,
    NewInnings {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        overs_limit: Option<u32>,
    },
    SetWicketsLimit {
        limit: u32,
    },
}

impl ScoreCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ScoreCommand::AddRuns { .. } => "add_runs",
            ScoreCommand::DeclareWicket { .. } => "declare_wicket",
            ScoreCommand::DeclareExtra { .. } => "declare_extra",
            ScoreCommand::ClearLastBall => "clear_last_ball",
            ScoreCommand::NewInnings { .. } => "new_innings",
            ScoreCommand::SetWicketsLimit { .. } => "set_wickets_limit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    InningsEnded,
    NothingToClear,
    InningsStarted,
    InvalidLimit,
}

/// What a single transition did, reported next to the new state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionEffect {
    /// `requested_ball` is set when an edit addressed a ball outside the
    /// current over and fell through to an append.
    Appended {
        ball: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        requested_ball: Option<i32>,
    },
    Edited {
        ball: usize,
    },
    OverCompleted {
        over: u32,
    },
    /// Totals applied but the delivery had no slot left in the over.
    Dropped,
    Cleared {
        ball: usize,
    },
    Reset,
    Configured,
    Ignored {
        reason: IgnoreReason,
    },
}
