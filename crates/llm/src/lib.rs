pub mod conversation;
pub mod normalize;
pub mod provider;
pub mod providers;

pub use conversation::{Conversation, TurnUsage};
pub use normalize::{normalize_response, Normalized};
pub use provider::{
    complete_with, image_mime_for_path, Completion, ImageInput, LlmError, LlmProvider, Message,
    Role, Usage,
};
pub use providers::{create_provider, ResponseFormat};
