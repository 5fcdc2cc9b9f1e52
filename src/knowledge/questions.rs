use std::sync::Arc;

use crate::chain::prompt::example_questions_prompt;
use crate::core::config::QuestionSettings;
use crate::llm::{ChatModel, ChatRequest, GenerationOptions};

/// Suggests starter questions for a freshly ingested knowledge base.
pub struct QuestionGenerator {
    model: Arc<dyn ChatModel>,
    settings: QuestionSettings,
}

impl QuestionGenerator {
    pub fn new(model: Arc<dyn ChatModel>, settings: QuestionSettings) -> Self {
        Self { model, settings }
    }

    /// Never fails: a model error is logged and yields no questions.
    pub async fn generate(&self, content: &str) -> Vec<String> {
        if self.settings.count == 0 {
            return Vec::new();
        }

        let prompt =
            example_questions_prompt(content, self.settings.count, self.settings.max_context_chars);
        let request = ChatRequest::from_prompt(prompt).with_options(GenerationOptions {
            temperature: Some(self.settings.temperature),
            max_tokens: None,
        });

        match self.model.complete(request).await {
            Ok(text) => parse_questions(&text, self.settings.count),
            Err(err) => {
                tracing::warn!("Example question generation failed: {}", err);
                Vec::new()
            }
        }
    }
}

/// One question per non-empty line, list markers removed, at most `limit`.
fn parse_questions(text: &str, limit: usize) -> Vec<String> {
    text.lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .take(limit)
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    let line = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .unwrap_or(line);

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest.trim();
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubChatModel;

    #[test]
    fn parses_lines_and_strips_markers() {
        let text = "\n1. What is ownership?\n\n- How does borrowing work?\n2) Why lifetimes?\nWhat is Rust?\nExtra?";
        assert_eq!(
            parse_questions(text, 4),
            vec![
                "What is ownership?",
                "How does borrowing work?",
                "Why lifetimes?",
                "What is Rust?",
            ]
        );
    }

    #[test]
    fn numbers_without_marker_are_kept() {
        assert_eq!(strip_list_marker("2024 was a year?"), "2024 was a year?");
    }

    #[tokio::test]
    async fn model_failure_yields_no_questions() {
        let generator = QuestionGenerator::new(
            Arc::new(StubChatModel::failing("quota exceeded")),
            QuestionSettings::default(),
        );
        assert!(generator.generate("content").await.is_empty());
    }

    #[tokio::test]
    async fn uses_question_temperature() {
        let model = Arc::new(StubChatModel::new(vec!["Q1?\nQ2?"]));
        let generator = QuestionGenerator::new(model.clone(), QuestionSettings::default());
        assert_eq!(generator.generate("content").await, vec!["Q1?", "Q2?"]);
        assert_eq!(model.requests()[0].temperature, Some(0.7));
    }
}
