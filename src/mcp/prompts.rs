use serde::Serialize;
use serde_json::Value;
use std::path::Path;

pub const APPOINTMENT_PROMPT: &str = "appointment_assistant_prompt";

#[derive(Debug, Clone, Serialize)]
pub struct PromptDef {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(skip)]
    pub file: &'static str,
}

const PROMPTS: &[PromptDef] = &[PromptDef {
    name: APPOINTMENT_PROMPT,
    description: "Loads and sets the main system prompt for the appointment booking assistant.",
    file: "appointment_prompt.md",
}];

pub fn prompt_catalog() -> &'static [PromptDef] {
    PROMPTS
}

pub fn prompt_by_name(name: &str) -> Option<&'static PromptDef> {
    PROMPTS.iter().find(|prompt| prompt.name == name)
}

/// Reads the prompt text; a missing file yields a notice instead of an error.
pub async fn load_prompt(dir: &Path, prompt: &PromptDef) -> String {
    let path = dir.join(prompt.file);
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(_) => format!("Prompt file not found: {}", path.display()),
    }
}

/// `prompts/get` result for `prompt`.
pub async fn render_prompt(dir: &Path, prompt: &PromptDef) -> Value {
    let text = load_prompt(dir, prompt).await;
    serde_json::json!({
        "description": prompt.description,
        "messages": [
            { "role": "user", "content": { "type": "text", "text": text } }
        ],
    })
}
