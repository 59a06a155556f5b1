//! Mapping between the speech service's function calls and [`ScoreCommand`].
//!
//! The speech service only knows function names and loosely typed JSON
//! arguments; everything structural is checked here so the reducer can trust
//! what it receives.

use serde_json::{json, Map, Value};
use shared::{
    domain::{ExtraKind, ScoreCommand},
    error::{ApiException, ErrorCode},
    protocol::{FunctionCall, FunctionDeclaration, SpeechToolsResponse},
};
use thiserror::Error;

pub const MAX_RUNS_PER_BALL: i64 = 6;

pub const SYSTEM_INSTRUCTION: &str = "You are the scorer for a single cricket innings. \
Listen to the commentary and call exactly one function for every delivery described. \
Use add_runs for runs off the bat, declare_wicket when a batter is out, declare_extra \
for wides and no-balls, and clear_last_ball when the speaker asks to undo. When the \
speaker corrects an earlier ball of the current over (\"3rd ball was a four\"), pass its \
1-based position as ball_number. Do not invent deliveries that were not described.";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntentError {
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("arguments for `{0}` must be a JSON object")]
    ArgumentsNotObject(String),
    #[error("missing argument `{0}`")]
    MissingArgument(&'static str),
    #[error("argument `{name}` must be a whole number, got {value}")]
    NotAWholeNumber { name: &'static str, value: String },
    #[error("argument `{name}` must be between 0 and 6, got {value}")]
    RunsOutOfRange { name: &'static str, value: i64 },
    #[error("unknown extra type `{0}`")]
    UnknownExtra(String),
    #[error("argument `{0}` must be a string")]
    NotAString(&'static str),
    #[error("{0} limit must be at least 1")]
    LimitBelowOne(&'static str),
}

impl From<IntentError> for ApiException {
    fn from(value: IntentError) -> Self {
        ApiException::new(ErrorCode::Validation, value.to_string())
    }
}

/// Converts one function call into a command.
pub fn command_from_call(call: &FunctionCall) -> Result<ScoreCommand, IntentError> {
    let empty = Map::new();
    let args = match &call.args {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => return Err(IntentError::ArgumentsNotObject(call.name.clone())),
    };

    match normalize_name(&call.name).as_str() {
        "addruns" => Ok(ScoreCommand::AddRuns {
            runs: required_runs(args, "runs")?,
            ball_number: ball_number(args)?,
        }),
        "declarewicket" => Ok(ScoreCommand::DeclareWicket {
            runs_on_dismissal: optional_runs(args, "runs_on_dismissal")?,
            ball_number: ball_number(args)?,
        }),
        "declareextra" => Ok(ScoreCommand::DeclareExtra {
            kind: extra_kind(args)?,
            runs: optional_runs(args, "runs")?,
            ball_number: ball_number(args)?,
        }),
        "clearlastball" => Ok(ScoreCommand::ClearLastBall),
        _ => Err(IntentError::UnknownFunction(call.name.clone())),
    }
}

/// Range checks for a command that arrived already structured, without going
/// through [`command_from_call`].
pub fn validate_command(command: &ScoreCommand) -> Result<(), IntentError> {
    match command {
        ScoreCommand::AddRuns { runs, .. } => runs_in_range("runs", i64::from(*runs)).map(drop),
        ScoreCommand::DeclareWicket {
            runs_on_dismissal, ..
        } => runs_in_range("runs_on_dismissal", i64::from(*runs_on_dismissal)).map(drop),
        ScoreCommand::DeclareExtra { runs, .. } => runs_in_range("runs", i64::from(*runs)).map(drop),
        ScoreCommand::NewInnings {
            overs_limit: Some(0),
        } => Err(IntentError::LimitBelowOne("overs")),
        ScoreCommand::SetWicketsLimit { limit: 0 } => Err(IntentError::LimitBelowOne("wickets")),
        _ => Ok(()),
    }
}

/// `add_runs`, `addRuns` and `AddRuns` all name the same function.
fn normalize_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn whole_number(args: &Map<String, Value>, name: &'static str) -> Result<Option<i64>, IntentError> {
    let Some(value) = args.get(name) else {
        return Ok(None);
    };
    let not_whole = || IntentError::NotAWholeNumber {
        name,
        value: value.to_string(),
    };

    match value {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                Ok(Some(v))
            } else {
                // Speech services commonly send integers as doubles.
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() <= i64::MAX as f64 => {
                        Ok(Some(f as i64))
                    }
                    _ => Err(not_whole()),
                }
            }
        }
        Value::String(s) => s.trim().parse::<i64>().map(Some).map_err(|_| not_whole()),
        _ => Err(not_whole()),
    }
}

pub fn runs_in_range(name: &'static str, value: i64) -> Result<u32, IntentError> {
    if (0..=MAX_RUNS_PER_BALL).contains(&value) {
        Ok(value as u32)
    } else {
        Err(IntentError::RunsOutOfRange { name, value })
    }
}

fn required_runs(args: &Map<String, Value>, name: &'static str) -> Result<u32, IntentError> {
    let value = whole_number(args, name)?.ok_or(IntentError::MissingArgument(name))?;
    runs_in_range(name, value)
}

fn optional_runs(args: &Map<String, Value>, name: &'static str) -> Result<u32, IntentError> {
    match whole_number(args, name)? {
        Some(value) => runs_in_range(name, value),
        None => Ok(0),
    }
}

/// Passed through as-is; the reducer decides what an unknown position means.
fn ball_number(args: &Map<String, Value>) -> Result<Option<i32>, IntentError> {
    Ok(whole_number(args, "ball_number")?
        .map(|n| n.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32))
}

fn extra_kind(args: &Map<String, Value>) -> Result<ExtraKind, IntentError> {
    let raw = match args.get("extra_type").or_else(|| args.get("kind")) {
        None | Some(Value::Null) => return Err(IntentError::MissingArgument("extra_type")),
        Some(Value::String(raw)) => raw,
        Some(_) => return Err(IntentError::NotAString("extra_type")),
    };

    match normalize_name(raw).as_str() {
        "wide" | "wd" => Ok(ExtraKind::Wide),
        "noball" | "nb" => Ok(ExtraKind::NoBall),
        _ => Err(IntentError::UnknownExtra(raw.to_string())),
    }
}

fn ball_number_schema() -> Value {
    json!({
        "type": "integer",
        "description": "1-based position of a ball already recorded in the current over, \
only when correcting that ball. Omit for a new delivery."
    })
}

/// Functions the speech service may call, with JSON parameter schemas.
pub fn function_declarations() -> Vec<FunctionDeclaration> {
    vec![
        FunctionDeclaration {
            name: "add_runs".to_string(),
            description: "Record runs scored off a legal delivery.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "runs": {
                        "type": "integer",
                        "minimum": 0,
                        "maximum": MAX_RUNS_PER_BALL,
                        "description": "Runs scored off the bat."
                    },
                    "ball_number": ball_number_schema()
                },
                "required": ["runs"]
            }),
        },
        FunctionDeclaration {
            name: "declare_wicket".to_string(),
            description: "Record a dismissal on a legal delivery.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "runs_on_dismissal": {
                        "type": "integer",
                        "minimum": 0,
                        "maximum": MAX_RUNS_PER_BALL,
                        "description": "Runs completed before the wicket fell, usually 0."
                    },
                    "ball_number": ball_number_schema()
                }
            }),
        },
        FunctionDeclaration {
            name: "declare_extra".to_string(),
            description: "Record a wide or a no-ball. One penalty run is added automatically."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "extra_type": {
                        "type": "string",
                        "enum": ["wide", "no_ball"]
                    },
                    "runs": {
                        "type": "integer",
                        "minimum": 0,
                        "maximum": MAX_RUNS_PER_BALL,
                        "description": "Runs taken in addition to the penalty run."
                    },
                    "ball_number": ball_number_schema()
                },
                "required": ["extra_type"]
            }),
        },
        FunctionDeclaration {
            name: "clear_last_ball".to_string(),
            description: "Undo the most recent delivery of the current over.".to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
        },
    ]
}

pub fn speech_tools() -> SpeechToolsResponse {
    SpeechToolsResponse {
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
        function_declarations: function_declarations(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Value) -> FunctionCall {
        FunctionCall {
            call_id: Some("c-1".to_string()),
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn maps_add_runs_with_ball_number() {
        let cmd = command_from_call(&call("add_runs", json!({ "runs": 4, "ball_number": 1 })))
            .expect("command");
        assert_eq!(
            cmd,
            ScoreCommand::AddRuns {
                runs: 4,
                ball_number: Some(1)
            }
        );
    }

    #[test]
    fn accepts_camel_case_names_and_float_integers() {
        let cmd = command_from_call(&call("addRuns", json!({ "runs": 2.0 }))).expect("command");
        assert_eq!(
            cmd,
            ScoreCommand::AddRuns {
                runs: 2,
                ball_number: None
            }
        );
    }

    #[test]
    fn wicket_defaults_to_no_runs() {
        let cmd = command_from_call(&call("declare_wicket", Value::Null)).expect("command");
        assert_eq!(
            cmd,
            ScoreCommand::DeclareWicket {
                runs_on_dismissal: 0,
                ball_number: None
            }
        );
    }

    #[test]
    fn extra_type_spellings() {
        for (raw, expected) in [
            ("wide", ExtraKind::Wide),
            ("WD", ExtraKind::Wide),
            ("no_ball", ExtraKind::NoBall),
            ("no-ball", ExtraKind::NoBall),
            ("noball", ExtraKind::NoBall),
            ("nb", ExtraKind::NoBall),
        ] {
            let cmd = command_from_call(&call("declare_extra", json!({ "extra_type": raw })))
                .expect("command");
            assert_eq!(
                cmd,
                ScoreCommand::DeclareExtra {
                    kind: expected,
                    runs: 0,
                    ball_number: None
                },
                "{raw}"
            );
        }
    }

    #[test]
    fn clear_last_ball_ignores_arguments() {
        let cmd = command_from_call(&call("clear_last_ball", json!({ "anything": true })))
            .expect("command");
        assert_eq!(cmd, ScoreCommand::ClearLastBall);
    }

    #[test]
    fn rejects_out_of_range_runs() {
        let err = command_from_call(&call("add_runs", json!({ "runs": 7 }))).unwrap_err();
        assert_eq!(
            err,
            IntentError::RunsOutOfRange {
                name: "runs",
                value: 7
            }
        );
        let err = command_from_call(&call(
            "declare_extra",
            json!({ "extra_type": "wide", "runs": -1 }),
        ))
        .unwrap_err();
        assert!(matches!(err, IntentError::RunsOutOfRange { .. }));
    }

    #[test]
    fn rejects_missing_and_malformed_arguments() {
        assert_eq!(
            command_from_call(&call("add_runs", json!({}))).unwrap_err(),
            IntentError::MissingArgument("runs")
        );
        assert!(matches!(
            command_from_call(&call("add_runs", json!({ "runs": "four" }))).unwrap_err(),
            IntentError::NotAWholeNumber { name: "runs", .. }
        ));
        assert!(matches!(
            command_from_call(&call("add_runs", json!({ "runs": 1.5 }))).unwrap_err(),
            IntentError::NotAWholeNumber { .. }
        ));
        assert_eq!(
            command_from_call(&call("declare_extra", json!({ "extra_type": "bye" }))).unwrap_err(),
            IntentError::UnknownExtra("bye".to_string())
        );
        assert_eq!(
            command_from_call(&call("add_runs", json!([4]))).unwrap_err(),
            IntentError::ArgumentsNotObject("add_runs".to_string())
        );
    }

    #[test]
    fn non_string_extra_type_is_a_type_error() {
        assert_eq!(
            command_from_call(&call("declare_extra", json!({ "extra_type": 1 }))).unwrap_err(),
            IntentError::NotAString("extra_type")
        );
        assert_eq!(
            command_from_call(&call("declare_extra", json!({ "extra_type": null }))).unwrap_err(),
            IntentError::MissingArgument("extra_type")
        );
    }

    #[test]
    fn validate_command_checks_runs_and_limits() {
        assert!(validate_command(&ScoreCommand::AddRuns {
            runs: 6,
            ball_number: Some(9)
        })
        .is_ok());
        assert_eq!(
            validate_command(&ScoreCommand::AddRuns {
                runs: 100,
                ball_number: None
            }),
            Err(IntentError::RunsOutOfRange {
                name: "runs",
                value: 100
            })
        );
        assert_eq!(
            validate_command(&ScoreCommand::DeclareExtra {
                kind: ExtraKind::Wide,
                runs: u32::MAX,
                ball_number: None
            }),
            Err(IntentError::RunsOutOfRange {
                name: "runs",
                value: i64::from(u32::MAX)
            })
        );
        assert!(matches!(
            validate_command(&ScoreCommand::DeclareWicket {
                runs_on_dismissal: 7,
                ball_number: None
            }),
            Err(IntentError::RunsOutOfRange {
                name: "runs_on_dismissal",
                ..
            })
        ));
        assert_eq!(
            validate_command(&ScoreCommand::NewInnings {
                overs_limit: Some(0)
            }),
            Err(IntentError::LimitBelowOne("overs"))
        );
        assert!(validate_command(&ScoreCommand::NewInnings { overs_limit: None }).is_ok());
        assert_eq!(
            validate_command(&ScoreCommand::SetWicketsLimit { limit: 0 }),
            Err(IntentError::LimitBelowOne("wickets"))
        );
        assert!(validate_command(&ScoreCommand::ClearLastBall).is_ok());
    }

    #[test]
    fn rejects_unknown_function() {
        let err = command_from_call(&call("declare_innings", json!({}))).unwrap_err();
        assert_eq!(err, IntentError::UnknownFunction("declare_innings".to_string()));
        let api: ApiException = err.into();
        assert_eq!(api.code, ErrorCode::Validation);
    }

    #[test]
    fn ball_number_is_passed_through_unchecked() {
        let cmd = command_from_call(&call("add_runs", json!({ "runs": 1, "ball_number": -2 })))
            .expect("command");
        assert_eq!(
            cmd,
            ScoreCommand::AddRuns {
                runs: 1,
                ball_number: Some(-2)
            }
        );
    }

    #[test]
    fn declarations_cover_every_mapped_function() {
        let declarations = function_declarations();
        let names: Vec<&str> = declarations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["add_runs", "declare_wicket", "declare_extra", "clear_last_ball"]
        );
        for declaration in &declarations {
            let args = match declaration.name.as_str() {
                "add_runs" => json!({ "runs": 0 }),
                "declare_extra" => json!({ "extra_type": "wide" }),
                _ => json!({}),
            };
            assert!(command_from_call(&call(&declaration.name, args)).is_ok());
        }
    }
}
