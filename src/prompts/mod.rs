//! Custom prompts: `{{variable}}` templates that virtual servers expose as
//! synthetic tools and as prompts.

pub mod errors;
pub mod manager;
pub mod prompt;

pub use errors::PromptError;
pub use manager::{NewPrompt, PromptManager, PromptUpdate};
pub use prompt::CustomPrompt;
