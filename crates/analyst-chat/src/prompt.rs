//! Mode-specific instruction templates and prompt assembly.

use analyst_core::types::{ConversationMode, Message, Role};
use analyst_llm::GenerationOptions;

pub const GATHERING_PROMPT: &str = "\
You are a Senior Business Analyst conducting a requirements gathering session.

CRITICAL RULES:
1. Ask EXACTLY ONE question per response
2. Never list multiple questions (no numbering, no bullet points)
3. Base the question on what the user has already told you
4. DO NOT create any documents, specifications, or requirements yet
5. DO NOT propose solutions or make recommendations

WHAT TO ASK ABOUT, roughly in this order:
- The business idea and the problem it solves
- Target customers, users and stakeholders
- Key features and operations
- Constraints such as budget, timeline and regulations
- How success will be measured

FORMAT:
- One clear, specific question that ends with a question mark
- Professional but conversational

GOOD EXAMPLES:
- What specific problem will your business solve?
- Who are your primary customers?
- What is your estimated budget for this project?

When the user says \"generate requirements\", \"create BRD\" or \"I'm done\", stop asking questions.";

pub const GENERATING_PROMPT: &str = "\
You are a Senior Business Analyst creating formal documentation.

The user has finished answering questions. Now create:
- Business Requirements Document (BRD) sections
- Functional Requirements
- Non-Functional Requirements
- A User Story in the form: As a [role], I want [goal], so that [benefit]
- Acceptance Criteria

Use ONLY the information from this conversation. DO NOT add details that were not discussed. \
Where information is missing, mark it as \"To be confirmed\".";

pub const GENERAL_PROMPT: &str = "You are a helpful assistant. Answer questions clearly and concisely.";

/// Heading placed above retrieved reference snippets.
pub const REFERENCE_HEADING: &str =
    "\n\n--- REFERENCE DOCUMENTS (advisory; ignore if not relevant) ---\n";

const HISTORY_HEADING: &str = "\n\nConversation so far:\n";

/// Instruction template for a mode.
pub fn template(mode: ConversationMode) -> &'static str {
    match mode {
        ConversationMode::Gathering => GATHERING_PROMPT,
        ConversationMode::Generating => GENERATING_PROMPT,
        ConversationMode::General => GENERAL_PROMPT,
    }
}

/// Sampling options for a mode.
///
/// Gathering keeps replies short and stops before a second numbered item
/// or an invented dialogue turn. `1.` is not a stop sequence so a reply
/// that opens with a numbered question still produces text.
pub fn options_for(mode: ConversationMode) -> GenerationOptions {
    match mode {
        ConversationMode::Gathering => {
            let mut stop = vec!["\n\n".to_string()];
            stop.extend((2..=9).map(|n| format!("{}.", n)));
            stop.extend(["User:", "You:", "Assistant:"].map(String::from));
            GenerationOptions::default()
                .temperature(0.3)
                .num_predict(150)
                .top_p(0.9)
                .repeat_penalty(1.2)
                .stop(stop)
        }
        ConversationMode::Generating | ConversationMode::General => GenerationOptions::default()
            .temperature(0.1)
            .num_predict(2048)
            .top_p(0.9)
            .top_k(40),
    }
}

/// Render history as `User: ...` / `Analyst: ...` lines.
pub fn render_history(history: &[Message]) -> String {
    history
        .iter()
        .filter_map(|m| {
            let speaker = match m.role {
                Role::User => "User",
                Role::Assistant => "Analyst",
                Role::System => return None,
            };
            Some(format!("{}: {}", speaker, m.content.trim()))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// System instruction plus the ordered message list sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    pub system: String,
    pub messages: Vec<Message>,
}

/// Build the prompt for one turn.
///
/// The reference section appears only when `context` has snippets.
pub fn assemble(
    mode: ConversationMode,
    history: &[Message],
    context: &[String],
    latest: &str,
) -> AssembledPrompt {
    let mut system = template(mode).to_string();

    if !context.is_empty() {
        system.push_str(REFERENCE_HEADING);
        system.push_str(&context.join("\n\n"));
    }

    let rendered = render_history(history);
    if !rendered.is_empty() {
        system.push_str(HISTORY_HEADING);
        system.push_str(&rendered);
    }

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system.clone()));
    messages.extend(history.iter().cloned());
    messages.push(Message::user(latest));

    AssembledPrompt { system, messages }
}
