//! Innings scoring core: delivery classification, the innings reducer, the
//! function-call intent mapping used by the speech front end, and a
//! presentation view of the running score.

pub mod delivery;
pub mod intent;
pub mod reducer;
pub mod view;

pub use delivery::{classify, Classified, Delivery, DeliveryTarget};
pub use intent::{
    command_from_call, function_declarations, speech_tools, validate_command, IntentError,
};
pub use reducer::{apply, reduce, Transition};
pub use view::{InningsStatus, ScoreboardView};
