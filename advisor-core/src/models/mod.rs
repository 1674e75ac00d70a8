pub mod category;
pub mod execution;
pub mod reply;
pub mod turn;

pub use category::{Category, CategoryPrediction};
pub use execution::{Artifact, ExecutionFailure, ExecutionResult};
pub use reply::AssistantReply;
pub use turn::{ChatMessage, ChatTurn, MessageRole, Role};
