//! Answer-quality metrics
//!
//! - Exact match: normalized strings are equal
//! - Token F1: multiset token overlap between answer and reference
//! - ROUGE-L: F-measure over the longest common token subsequence
//! - Context recall: share of reference tokens present in retrieved context

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnswerMetrics {
    pub exact_match: f32,
    pub token_f1: f32,
    pub rouge_l: f32,
    pub context_recall: f32,
}

impl AnswerMetrics {
    pub fn compute(answer: &str, reference: &str, contexts: &[String]) -> Self {
        let answer_norm = normalize(answer);
        let reference_norm = normalize(reference);

        let answer_tokens = tokenize(&answer_norm);
        let reference_tokens = tokenize(&reference_norm);

        Self {
            exact_match: if answer_norm == reference_norm { 1.0 } else { 0.0 },
            token_f1: token_f1(&answer_tokens, &reference_tokens),
            rouge_l: rouge_l(&answer_tokens, &reference_tokens),
            context_recall: context_recall(&reference_tokens, contexts),
        }
    }

    pub fn average(metrics: &[Self]) -> Self {
        if metrics.is_empty() {
            return Self::default();
        }
        let n = metrics.len() as f32;
        Self {
            exact_match: metrics.iter().map(|m| m.exact_match).sum::<f32>() / n,
            token_f1: metrics.iter().map(|m| m.token_f1).sum::<f32>() / n,
            rouge_l: metrics.iter().map(|m| m.rouge_l).sum::<f32>() / n,
            context_recall: metrics.iter().map(|m| m.context_recall).sum::<f32>() / n,
        }
    }
}

impl std::fmt::Display for AnswerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  Exact Match:    {:.2}%", self.exact_match * 100.0)?;
        writeln!(f, "  Token F1:       {:.2}%", self.token_f1 * 100.0)?;
        writeln!(f, "  ROUGE-L:        {:.2}%", self.rouge_l * 100.0)?;
        writeln!(f, "  Context Recall: {:.2}%", self.context_recall * 100.0)
    }
}

/// Lowercase, punctuation to spaces, whitespace collapsed.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokenize(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().collect()
}

fn f_measure(overlap: f32, predicted: usize, reference: usize) -> f32 {
    if overlap == 0.0 {
        return 0.0;
    }
    let precision = overlap / predicted as f32;
    let recall = overlap / reference as f32;
    2.0 * precision * recall / (precision + recall)
}

fn token_f1(answer: &[&str], reference: &[&str]) -> f32 {
    if answer.is_empty() || reference.is_empty() {
        return if answer.is_empty() && reference.is_empty() { 1.0 } else { 0.0 };
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in reference {
        *counts.entry(*token).or_default() += 1;
    }
    let mut overlap = 0usize;
    for token in answer {
        if let Some(n) = counts.get_mut(token) {
            if *n > 0 {
                *n -= 1;
                overlap += 1;
            }
        }
    }

    f_measure(overlap as f32, answer.len(), reference.len())
}

fn rouge_l(answer: &[&str], reference: &[&str]) -> f32 {
    if answer.is_empty() || reference.is_empty() {
        return if answer.is_empty() && reference.is_empty() { 1.0 } else { 0.0 };
    }
    f_measure(lcs_len(answer, reference) as f32, answer.len(), reference.len())
}

fn lcs_len(a: &[&str], b: &[&str]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for x in a {
        let mut diagonal = 0;
        for (j, y) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if x == y { diagonal + 1 } else { above.max(row[j]) };
            diagonal = above;
        }
    }
    row[b.len()]
}

fn context_recall(reference: &[&str], contexts: &[String]) -> f32 {
    if reference.is_empty() {
        return 1.0;
    }
    let context_text: String = contexts.iter().map(|c| normalize(c)).collect::<Vec<_>>().join(" ");
    let available: HashSet<&str> = context_text.split_whitespace().collect();
    let found = reference.iter().filter(|t| available.contains(*t)).count();
    found as f32 / reference.len() as f32
}
