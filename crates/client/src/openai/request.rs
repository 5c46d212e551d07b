//! Chat completions request types and prompt construction.

use anjin_core::SummaryRequest;
use serde::{Deserialize, Serialize};

pub(crate) const SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes changelogs for developers.";

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Body of `POST /chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

/// User prompt for one package.
///
/// `project_context` is extra text about the project (typically the
/// requirements file) appended after the snippets.
pub fn build_prompt(request: &SummaryRequest, project_context: Option<&str>) -> String {
    let snippets = if request.snippets.is_empty() { "(none found)".to_string() } else { request.snippets.join("\n\n") };

    let mut prompt = format!(
        "Analyze the changelog for the Python package '{package}' between version {from} (in use) and {to} (latest) \
and summarize the changes likely to matter for the codebase below. Focus on API changes, new features, \
deprecations and breaking changes; skip minor or internal fixes unless they look important. \
Start with a one-line tl;dr saying whether the changes are likely relevant, then give brief bullet points. \
If nothing is relevant, answer \"No relevant changes\".\n\n\
Changelog:\n{changelog}\n\n\
Relevant code snippets from the codebase:\n{snippets}\n",
        package = request.package,
        from = request.from_version,
        to = request.to_version,
        changelog = request.changelog,
    );
    if let Some(context) = project_context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\nProject requirements:\n");
        prompt.push_str(context.trim_end());
        prompt.push('\n');
    }
    prompt
}
