//! Context assembler: token-bounded message list for the chat model
//!
//! Output is always `[system, ...kept history..., question]`. History is
//! walked newest to oldest and each turn is kept only while
//! `system + kept + candidate <= budget`. The walk stops at the first turn
//! that does not fit; older turns are not considered after that.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, ChatTurn, Role};
use crate::tokenizer::TokenCounter;

#[derive(Clone)]
pub struct ContextAssembler {
    counter: Arc<dyn TokenCounter>,
}

impl ContextAssembler {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self { counter }
    }

    pub fn counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }

    pub fn assemble(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        new_question: &str,
        token_budget: usize,
    ) -> Vec<ChatMessage> {
        let system_tokens = self.counter.count(system_prompt);
        let mut used = system_tokens;
        let mut kept = 0usize;

        for turn in history.iter().rev() {
            let tokens = self.counter.count(&turn.text);
            if used + tokens > token_budget {
                break;
            }
            used += tokens;
            kept += 1;
        }

        let start = history.len() - kept;
        tracing::debug!(
            counter = self.counter.name(),
            history = history.len(),
            kept,
            tokens = used,
            budget = token_budget,
            "Assembled conversation context"
        );

        let mut messages = Vec::with_capacity(kept + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(history[start..].iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(new_question));
        messages
    }
}

/// Summary numbers for a conversation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationStats {
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub estimated_tokens: usize,
    /// assistant / user, 0 when there are no user messages
    pub conversation_ratio: f32,
}

pub fn conversation_stats(history: &[ChatTurn], counter: &dyn TokenCounter) -> ConversationStats {
    let user_messages = history.iter().filter(|t| t.role == Role::User).count();
    let assistant_messages = history.iter().filter(|t| t.role == Role::Assistant).count();
    let estimated_tokens = history.iter().map(|t| counter.count(&t.text)).sum();
    let conversation_ratio = if user_messages > 0 {
        assistant_messages as f32 / user_messages as f32
    } else {
        0.0
    };

    ConversationStats {
        total_messages: history.len(),
        user_messages,
        assistant_messages,
        estimated_tokens,
        conversation_ratio,
    }
}
