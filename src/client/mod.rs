//! Client side: API calls, the presentation driver, and the terminal front end.

pub mod api;
pub mod driver;
pub mod resync;
pub mod reveal;
pub mod terminal;

pub use api::InterviewClient;
pub use driver::{ConversationMessage, InputMode, PresentationDriver, Speaker, Submission};
pub use resync::{Resolution, resolve_answer_conflict};
pub use reveal::{Reveal, spawn_reveal};
