use crate::chat::{ChatMessage, ChatModel};
use anyhow::Result;

/// Prompt turning a follow-up into a standalone question
pub const CONDENSE_PROMPT: &str = "You are a helpful AI assistant.

Given the conversation below and a follow-up question, rephrase the follow-up \
question so it can be understood without the conversation. Answer only with the \
rephrased question.

Conversation:
{chat_history}

Follow-up question:
{question}

Standalone question:";

/// One question/answer exchange
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// Questions and answers of the current session, oldest first
#[derive(Debug, Clone, Default)]
pub struct ChatHistory {
    turns: Vec<Turn>,
}

impl ChatHistory {
    pub fn push(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(Turn {
            question: question.into(),
            answer: answer.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Render as alternating `Human:`/`Assistant:` lines
    pub fn format(&self) -> String {
        self.turns
            .iter()
            .map(|turn| format!("Human: {}\nAssistant: {}", turn.question, turn.answer))
            .collect::<Vec<String>>()
            .join("\n")
    }
}

/// Rewrites follow-up questions using the conversation so far
pub struct QuestionCondenser<'a, C> {
    chat: &'a C,
}

impl<'a, C: ChatModel> QuestionCondenser<'a, C> {
    pub fn new(chat: &'a C) -> Self {
        QuestionCondenser { chat }
    }

    pub async fn condense(&self, question: &str, history: &ChatHistory) -> Result<String> {
        let prompt = CONDENSE_PROMPT
            .replace("{chat_history}", &history.format())
            .replace("{question}", question);

        let standalone = self.chat.complete(&[ChatMessage::user(prompt)]).await?;
        let standalone = standalone.trim();

        // Blank rewrite: keep the original wording
        if standalone.is_empty() {
            Ok(question.to_string())
        } else {
            Ok(standalone.to_string())
        }
    }
}
