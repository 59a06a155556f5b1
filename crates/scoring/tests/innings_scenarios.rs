use scoring::{apply, command_from_call, reduce, InningsStatus, ScoreboardView};
use serde_json::json;
use shared::domain::{InningsState, ScoreCommand, TransitionEffect};
use shared::protocol::FunctionCall;

fn call(name: &str, args: serde_json::Value) -> ScoreCommand {
    command_from_call(&FunctionCall {
        call_id: None,
        name: name.to_string(),
        args,
    })
    .expect("valid function call")
}

fn view(state: &InningsState) -> (String, String, Vec<String>) {
    let view = ScoreboardView::from_state(state);
    (view.score, view.overs, view.this_over)
}

#[test]
fn spoken_over_plays_out_like_a_scorecard() {
    let mut state = InningsState::default();

    state = apply(&state, &call("add_runs", json!({ "runs": 4 })));
    assert_eq!(view(&state), ("4-0".into(), "0.1".into(), vec!["4".into()]));

    state = apply(&state, &call("declare_wicket", json!({})));
    assert_eq!(
        view(&state),
        ("4-1".into(), "0.2".into(), vec!["4".into(), "W".into()])
    );

    state = apply(
        &state,
        &call("declare_extra", json!({ "extra_type": "wide", "runs": 4 })),
    );
    assert_eq!(
        view(&state),
        (
            "9-1".into(),
            "0.2".into(),
            vec!["4".into(), "W".into(), "4wd".into()]
        )
    );

    state = apply(&state, &call("clear_last_ball", json!({})));
    assert_eq!(
        view(&state),
        ("4-1".into(), "0.2".into(), vec!["4".into(), "W".into()])
    );
}

#[test]
fn correction_by_ball_number_then_over_rolls() {
    let mut state = InningsState::default();
    for runs in [1, 2, 3] {
        state = apply(&state, &call("add_runs", json!({ "runs": runs })));
    }

    // "2nd ball was actually a four"
    let transition = reduce(
        &state,
        &call("add_runs", json!({ "runs": 4, "ball_number": 2 })),
    );
    assert_eq!(transition.effect, TransitionEffect::Edited { ball: 2 });
    state = transition.state;
    assert_eq!(state.total_runs, 8);
    assert_eq!(state.over_labels(), vec!["1", "4", "3"]);

    for _ in 0..3 {
        state = apply(&state, &call("add_runs", json!({ "runs": 0 })));
    }
    assert_eq!(state.completed_overs, 1);
    assert_eq!(state.overs_line(), "1.0");
    assert!(state.current_over_deliveries.is_empty());
}

#[test]
fn snapshot_resumes_mid_over() {
    let mut state = InningsState::new(2, 3);
    for command in [
        call("add_runs", json!({ "runs": 6 })),
        call("declare_extra", json!({ "extra_type": "nb" })),
        call("declare_wicket", json!({ "runs_on_dismissal": 1 })),
    ] {
        state = apply(&state, &command);
    }

    let stored = serde_json::to_string(&state).expect("serialize");
    let restored: InningsState = serde_json::from_str(&stored).expect("deserialize");
    assert_eq!(restored, state);

    let next = apply(&restored, &call("add_runs", json!({ "runs": 2 })));
    assert_eq!(next.score_line(), "10-1");
    assert_eq!(next.over_labels(), vec!["6", "nb", "W+1", "2"]);
}

#[test]
fn innings_closes_on_overs_limit_and_ignores_further_balls() {
    let mut state = InningsState::new(1, 10);
    for _ in 0..6 {
        state = apply(&state, &call("add_runs", json!({ "runs": 1 })));
    }
    assert!(state.innings_ended);
    assert_eq!(
        ScoreboardView::from_state(&state).status,
        InningsStatus::Complete
    );

    let after = reduce(&state, &call("add_runs", json!({ "runs": 6 })));
    assert_eq!(after.state, state);
    assert!(matches!(after.effect, TransitionEffect::Ignored { .. }));

    let fresh = apply(&state, &ScoreCommand::NewInnings { overs_limit: None });
    assert_eq!(fresh, InningsState::new(1, 10));
}
