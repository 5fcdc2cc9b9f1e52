//! Prompt templates for the retrieval pipeline and example-question generation.

use super::runnable::ChatTurn;
use crate::store::ScoredDocument;

const RESPONSE_TEMPLATE: &str = "\
You are an expert assistant answering questions about the documents in the \
current knowledge base.

Generate a comprehensive and informative answer of 80 words or less for the \
given question based solely on the provided search results (URL and content). \
You must only use information from the provided search results. Use an \
unbiased and journalistic tone. Combine search results together into a \
coherent answer. Do not repeat text. Cite search results using [${number}] \
notation. Only cite the most relevant results that answer the question \
accurately.

If there is nothing in the context relevant to the question at hand, just say \
\"Hmm, I'm not sure.\" Don't try to make up an answer.

Anything between the following `context` html blocks is retrieved from a \
knowledge bank, not part of the conversation with the user.

<context>
{context}
</context>";

const REPHRASE_TEMPLATE: &str = "\
Given the following conversation and a follow up question, rephrase the follow \
up question to be a standalone question.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone Question:";

const EXAMPLE_QUESTIONS_TEMPLATE: &str = "\
Based on the content below, write {count} meaningful example questions that \
help a reader understand and use this knowledge.

Requirements:
1. Each question is specific and unambiguous
2. Together they cover the main points of the content
3. Each question has practical value
4. One question per line, no numbering

Content:
{content}

Example questions (one per line):";

/// Renders retrieved chunks as `<doc id='i'>` blocks.
pub fn format_docs(docs: &[ScoredDocument]) -> String {
    docs.iter()
        .enumerate()
        .map(|(i, doc)| format!("<doc id='{}'>{}</doc>", i, doc.document.page_content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_chat_history(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|turn| format!("Human: {}\nAssistant: {}", turn.human, turn.ai))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn response_system_prompt(context: &str) -> String {
    RESPONSE_TEMPLATE.replace("{context}", context)
}

pub fn rephrase_prompt(history: &[ChatTurn], question: &str) -> String {
    REPHRASE_TEMPLATE
        .replace("{chat_history}", &format_chat_history(history))
        .replace("{question}", question)
}

/// Caps `content` at `max_chars` characters, marking the cut with `...`.
pub fn example_questions_prompt(content: &str, count: usize, max_chars: usize) -> String {
    let content = if content.chars().count() > max_chars {
        let mut cut: String = content.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    } else {
        content.to_string()
    };

    EXAMPLE_QUESTIONS_TEMPLATE
        .replace("{count}", &count.to_string())
        .replace("{content}", &content)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::store::Document;

    fn scored(text: &str) -> ScoredDocument {
        ScoredDocument {
            id: Uuid::new_v4(),
            document: Document::new(text),
            score: 1.0,
        }
    }

    #[test]
    fn docs_are_numbered_from_zero() {
        let rendered = format_docs(&[scored("alpha"), scored("beta")]);
        assert_eq!(rendered, "<doc id='0'>alpha</doc>\n<doc id='1'>beta</doc>");
        assert_eq!(format_docs(&[]), "");
    }

    #[test]
    fn rephrase_includes_history_and_question() {
        let history = vec![ChatTurn {
            human: "who wrote it?".into(),
            ai: "Ann".into(),
        }];
        let prompt = rephrase_prompt(&history, "when?");
        assert!(prompt.contains("Human: who wrote it?\nAssistant: Ann"));
        assert!(prompt.contains("Follow Up Input: when?"));
    }

    #[test]
    fn response_prompt_embeds_context() {
        let prompt = response_system_prompt("<doc id='0'>x</doc>");
        assert!(prompt.contains("<context>\n<doc id='0'>x</doc>\n</context>"));
    }

    #[test]
    fn example_prompt_truncates_long_content() {
        let long = "é".repeat(30);
        let prompt = example_questions_prompt(&long, 4, 10);
        assert!(prompt.contains(&format!("{}...", "é".repeat(10))));
        assert!(prompt.contains("write 4 meaningful"));
    }
}
