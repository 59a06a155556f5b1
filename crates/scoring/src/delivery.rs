use shared::domain::{BallOutcome, ScoreCommand};

/// Where a classified delivery lands in the current over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryTarget {
    /// Zero-based slot of an already recorded ball in the current over.
    Edit { slot: usize },
    /// A new ball. `requested_ball` keeps a ball number that did not address
    /// anything in the current over (zero, negative or past the end).
    Append { requested_ball: Option<i32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub outcome: BallOutcome,
    pub target: DeliveryTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Delivery(Delivery),
    ClearLastBall,
    NewInnings { overs_limit: Option<u32> },
    SetWicketsLimit { limit: u32 },
}

/// Classifies `command` against an over that currently holds `recorded`
/// deliveries.
pub fn classify(command: &ScoreCommand, recorded: usize) -> Classified {
    let (outcome, ball_number) = match *command {
        ScoreCommand::AddRuns { runs, ball_number } => (BallOutcome::runs(runs), ball_number),
        ScoreCommand::DeclareWicket {
            runs_on_dismissal,
            ball_number,
        } => (BallOutcome::wicket(runs_on_dismissal), ball_number),
        ScoreCommand::DeclareExtra {
            kind,
            runs,
            ball_number,
        } => (BallOutcome::extra(kind, runs), ball_number),
        ScoreCommand::ClearLastBall => return Classified::ClearLastBall,
        ScoreCommand::NewInnings { overs_limit } => return Classified::NewInnings { overs_limit },
        ScoreCommand::SetWicketsLimit { limit } => return Classified::SetWicketsLimit { limit },
    };

    Classified::Delivery(Delivery {
        outcome,
        target: target_for(ball_number, recorded),
    })
}

fn target_for(ball_number: Option<i32>, recorded: usize) -> DeliveryTarget {
    let slot = ball_number
        .and_then(|n| usize::try_from(n).ok())
        .filter(|n| (1..=recorded).contains(n))
        .map(|n| n - 1);

    match slot {
        Some(slot) => DeliveryTarget::Edit { slot },
        None => DeliveryTarget::Append {
            requested_ball: ball_number,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::ExtraKind;

    fn delivery(command: ScoreCommand, recorded: usize) -> Delivery {
        match classify(&command, recorded) {
            Classified::Delivery(delivery) => delivery,
            other => panic!("expected a delivery, got {other:?}"),
        }
    }

    #[test]
    fn add_runs_is_a_legal_ball() {
        let d = delivery(
            ScoreCommand::AddRuns {
                runs: 4,
                ball_number: None,
            },
            0,
        );
        assert_eq!(d.outcome.runs_scored(), 4);
        assert!(d.outcome.is_legal_delivery());
        assert!(!d.outcome.is_wicket());
        assert_eq!(d.outcome.label(), "4");
        assert_eq!(
            d.target,
            DeliveryTarget::Append {
                requested_ball: None
            }
        );
    }

    #[test]
    fn wicket_with_runs_is_labelled_with_plus() {
        let d = delivery(
            ScoreCommand::DeclareWicket {
                runs_on_dismissal: 2,
                ball_number: None,
            },
            0,
        );
        assert!(d.outcome.is_wicket());
        assert!(d.outcome.is_legal_delivery());
        assert_eq!(d.outcome.runs_scored(), 2);
        assert_eq!(d.outcome.label(), "W+2");
    }

    #[test]
    fn extra_adds_penalty_run() {
        let d = delivery(
            ScoreCommand::DeclareExtra {
                kind: ExtraKind::Wide,
                runs: 4,
                ball_number: None,
            },
            0,
        );
        assert_eq!(d.outcome.runs_scored(), 5);
        assert!(!d.outcome.is_legal_delivery());
        assert_eq!(d.outcome.label(), "4wd");
    }

    #[test]
    fn ball_number_inside_over_targets_edit() {
        let d = delivery(
            ScoreCommand::AddRuns {
                runs: 1,
                ball_number: Some(2),
            },
            3,
        );
        assert_eq!(d.target, DeliveryTarget::Edit { slot: 1 });
    }

    #[test]
    fn out_of_range_ball_numbers_fall_back_to_append() {
        for requested in [0, -1, 4, i32::MAX] {
            let d = delivery(
                ScoreCommand::AddRuns {
                    runs: 1,
                    ball_number: Some(requested),
                },
                3,
            );
            assert_eq!(
                d.target,
                DeliveryTarget::Append {
                    requested_ball: Some(requested)
                },
                "ball number {requested}"
            );
        }
    }

    #[test]
    fn control_commands_are_not_deliveries() {
        assert_eq!(
            classify(&ScoreCommand::ClearLastBall, 2),
            Classified::ClearLastBall
        );
        assert_eq!(
            classify(&ScoreCommand::SetWicketsLimit { limit: 3 }, 0),
            Classified::SetWicketsLimit { limit: 3 }
        );
    }
}
