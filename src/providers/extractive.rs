/*!
 * In-process extractive summarizer.
 *
 * Ranks the sentences of the corpus by how strongly their content words
 * represent the corpus as a whole (normalized term frequency), and returns the
 * best ones verbatim. Deterministic: equal scores keep corpus order.
 */

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::errors::ProviderError;
use crate::providers::Summarizer;

/// A sentence: text up to and including terminal punctuation (plus closing
/// quotes), or an unterminated tail.
static SENTENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[^.!?\u{2026}]+(?:[.!?\u{2026}]+["'\u{201D}\u{2019})\]]*|$)"#).unwrap()
});

static WORD_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "and", "or", "but", "if", "then", "so", "to", "of", "in", "on", "at",
        "by", "for", "with", "from", "up", "out", "as", "is", "are", "was", "were", "be", "been",
        "am", "do", "does", "did", "have", "has", "had", "i", "you", "he", "she", "it", "we",
        "they", "me", "him", "her", "us", "them", "my", "your", "his", "its", "our", "their",
        "this", "that", "these", "those", "what", "who", "not", "no", "yes", "oh", "just", "can",
        "will", "would", "could", "should", "there", "here", "all", "too", "very", "s", "t",
        "don", "m", "re", "ll", "ve", "d", "okay", "ok", "yeah", "hey",
    ]
    .into_iter()
    .collect()
});

/// Term-frequency extractive summarizer
#[derive(Debug, Default)]
pub struct ExtractiveSummarizer;

#[derive(Debug)]
struct ScoredSentence {
    text: String,
    position: usize,
    score: f64,
}

impl ExtractiveSummarizer {
    pub fn new() -> Self {
        Self
    }

    /// Split candidate texts into sentences, keeping corpus order
    pub fn split_sentences(texts: &[String]) -> Vec<String> {
        texts
            .iter()
            .flat_map(|text| {
                SENTENCE_REGEX
                    .find_iter(text)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn content_words(sentence: &str) -> Vec<String> {
        WORD_REGEX
            .find_iter(&sentence.to_lowercase())
            .map(|m| m.as_str().to_string())
            .filter(|w| !STOP_WORDS.contains(w.as_str()) && !w.chars().all(|c| c.is_ascii_digit()))
            .collect()
    }

    /// Rank sentences, best first
    pub fn rank(texts: &[String]) -> Vec<String> {
        let sentences = Self::split_sentences(texts);

        let mut frequencies: HashMap<String, usize> = HashMap::new();
        for sentence in &sentences {
            for word in Self::content_words(sentence) {
                *frequencies.entry(word).or_insert(0) += 1;
            }
        }
        let max_frequency = frequencies.values().copied().max().unwrap_or(1) as f64;

        let mut seen = HashSet::new();
        let mut scored: Vec<ScoredSentence> = Vec::new();
        for (position, sentence) in sentences.into_iter().enumerate() {
            if !seen.insert(sentence.clone()) {
                continue;
            }
            let words = Self::content_words(&sentence);
            let score = if words.is_empty() {
                0.0
            } else {
                words
                    .iter()
                    .map(|w| frequencies.get(w).copied().unwrap_or(0) as f64 / max_frequency)
                    .sum::<f64>()
                    / words.len() as f64
            };
            scored.push(ScoredSentence { text: sentence, position, score });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });

        scored.into_iter().map(|s| s.text).collect()
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn select(&self, texts: &[String], count: usize) -> Result<Vec<String>, ProviderError> {
        let mut ranked = Self::rank(texts);
        ranked.truncate(count);
        Ok(ranked)
    }

    fn name(&self) -> String {
        "built-in extractive".to_string()
    }
}
