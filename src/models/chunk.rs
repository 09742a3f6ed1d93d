use serde::{Deserialize, Serialize};

/// A passage of source text queued for extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Row identifier in the chunk store
    pub id: i64,
    /// Source passage the quotations are checked against
    pub text: String,
    /// Instruction preamble sent as the system message
    pub system_message: String,
    /// User prompt template containing a `{chunk}` placeholder
    pub prompt_template: String,
    /// Set once the chunk's results have been persisted
    pub processed: bool,
}

/// A chunk as supplied by ingestion, before it has a row id
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub text: String,
    pub system_message: String,
    pub prompt_template: String,
}

impl NewChunk {
    pub fn new(
        text: impl Into<String>,
        system_message: impl Into<String>,
        prompt_template: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            system_message: system_message.into(),
            prompt_template: prompt_template.into(),
        }
    }
}
