// Prompt constants for annotation generation.
// Reuses the cross-cutting voice rules from llm_client::prompts.

use crate::llm_client::prompts::DIRECT_VOICE_INSTRUCTION;

/// Literal prefix of the first response line that carries the genre label.
pub const GENRE_PREFIX: &str = "GENRE:";

/// Labels the model is asked to choose from. Parsing accepts any label.
pub const GENRE_CHOICES: &[&str] = &["Fiction", "Non-Fiction", "Academic", "Educational", "Other"];

/// Annotation prompt template. Replace `{title}`, `{genres}`, `{rules}` and `{text}` before sending.
const ANNOTATION_PROMPT_TEMPLATE: &str = r#"You are creating educational study notes. Write directly about the concepts and ideas, not about the document itself.

Title: {title}

Source Material:
{text}

INSTRUCTIONS:
1. Start with: GENRE: [pick one: {genres}]

2. Then write your educational notes/annotation.

{rules}

Start your response with "GENRE:" followed by your direct educational content. Begin now:"#;

pub fn annotation_prompt(title: &str, text: &str) -> String {
    // Substitute the document text last so braces inside it are never re-expanded.
    ANNOTATION_PROMPT_TEMPLATE
        .replace("{title}", title)
        .replace("{genres}", &GENRE_CHOICES.join(", "))
        .replace("{rules}", DIRECT_VOICE_INSTRUCTION)
        .replace("{text}", text)
}
