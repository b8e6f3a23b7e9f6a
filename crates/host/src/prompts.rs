//! Prompt templates served by `prompts/list` and `prompts/get`.

use mcp::{Content, GetPromptResult, Prompt, PromptMessage, PromptRole};

pub const INITIAL_PROMPTS: &str = "get_initial_prompts";

const INITIAL_INSTRUCTIONS: &str = "You are a helpful assistant that can help with weather-related questions.
For math expressions like '2 + 3 * 4', use the `calculate_expression` tool.
Answer general questions, such as ones about animals, from your own knowledge.";

pub fn definitions() -> Vec<Prompt> {
    vec![Prompt {
        name: INITIAL_PROMPTS.into(),
        description: Some("Seed instructions for a weather assistant session.".into()),
    }]
}

pub fn get(name: &str) -> Option<GetPromptResult> {
    match name {
        INITIAL_PROMPTS => Some(GetPromptResult {
            description: None,
            messages: vec![PromptMessage {
                role: PromptRole::User,
                content: Content::text(INITIAL_INSTRUCTIONS),
            }],
        }),
        _ => None,
    }
}
