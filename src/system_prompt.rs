//! System prompt construction
//!
//! The persona text is fixed; the tool catalog is rendered from whatever
//! the registry declares so the two never drift apart.

use crate::llm::ToolDefinition;
use std::fmt::Write;

/// Base system prompt establishing the agent's role
const BASE_PROMPT: &str = r"You are Household Mediator, an assistant that helps housemates stay organized by tracking pantry inventory, grocery lists, the shopping cart, and the shared grocery budget.";

const WRITE_RULE: &str = r"IMPORTANT: When the user asks you to add, save or change something, you MUST call the matching tool. Do not say you added something unless a tool result confirms it. If a tool returns an error, read it, fix your arguments or explain the problem to the user.";

const STYLE: &str =
    r"Be concise, neutral, and proactive about preventing conflicts between housemates.";

/// Build the system prompt for the given tool catalog
pub fn build_system_prompt(tools: &[ToolDefinition]) -> String {
    let mut prompt = String::from(BASE_PROMPT);

    if !tools.is_empty() {
        prompt.push_str("\n\nYou have access to the following tools:\n");
        for tool in tools {
            let summary = tool
                .description
                .split_terminator(". ")
                .next()
                .unwrap_or(tool.description.as_str())
                .trim_end_matches('.');
            let _ = writeln!(prompt, "- {}: {summary}", tool.name);
        }
        prompt.push('\n');
        prompt.push_str(WRITE_RULE);
    }

    prompt.push_str("\n\n");
    prompt.push_str(STYLE);
    prompt
}
