//! Prompt lifecycle: sessions, the queue that shows them one at a time, and
//! the surfaces they are shown on.

mod machine;
mod session;
mod surface;

pub use machine::PromptMachine;
pub use session::{DismissReason, PromptSession, PromptStatus, TransitionError};
pub use surface::{
    parse_reply, CategoryChoice, PromptContext, PromptReply, PromptSurface, TerminalPrompt,
};
