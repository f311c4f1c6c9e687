/*!
 * Segment selection.
 *
 * The summarizer ranks phrases; each phrase claims the first unpicked
 * candidate containing it; the picks are then packed greedily under the
 * duration budget.
 */

use log::{debug, info, warn};

use crate::app_config::BudgetPolicy;
use crate::errors::RecapError;
use crate::providers::Summarizer;
use crate::recap::{CandidateSegment, SelectedSegment};
use crate::subtitle_processor::normalize_whitespace;

/// Selection parameters
#[derive(Debug, Clone, Copy)]
pub struct SelectionParams {
    /// Cap on the number of phrases requested
    pub max_segments: usize,
    /// Budget in seconds; the summed duration of the selection never exceeds it
    pub budget_secs: f64,
    pub policy: BudgetPolicy,
}

/// Index of the first unpicked candidate containing `phrase`.
/// Exact (whitespace-normalized) match wins over a case-insensitive one.
fn match_phrase(phrase: &str, texts: &[String], lowered: &[String], picked: &[bool]) -> Option<usize> {
    let needle = normalize_whitespace(phrase);
    if needle.is_empty() {
        return None;
    }

    let unpicked = |i: &usize| !picked[*i];
    (0..texts.len())
        .filter(unpicked)
        .find(|&i| texts[i].contains(&needle))
        .or_else(|| {
            let needle = needle.to_lowercase();
            (0..texts.len()).filter(unpicked).find(|&i| lowered[i].contains(&needle))
        })
}

/// Candidate indices claimed by the phrases, in phrase order
pub fn match_phrases(phrases: &[String], candidates: &[CandidateSegment]) -> Vec<usize> {
    let texts: Vec<String> = candidates.iter().map(|c| normalize_whitespace(&c.text)).collect();
    let lowered: Vec<String> = texts.iter().map(|t| t.to_lowercase()).collect();
    let mut picked = vec![false; candidates.len()];
    let mut order = Vec::new();

    for phrase in phrases {
        match match_phrase(phrase, &texts, &lowered, &picked) {
            Some(i) => {
                picked[i] = true;
                order.push(i);
            }
            None => debug!("Summarizer phrase matched no candidate: {:?}", phrase),
        }
    }

    order
}

/// Greedy budget walk over `order`
pub fn apply_budget(order: &[usize], candidates: &[CandidateSegment], budget_secs: f64, policy: BudgetPolicy) -> Vec<usize> {
    let mut total = 0.0;
    let mut kept = Vec::new();

    for &i in order {
        let duration = candidates[i].duration();
        if total + duration > budget_secs {
            match policy {
                BudgetPolicy::Stop => break,
                BudgetPolicy::Skip => continue,
            }
        }
        total += duration;
        kept.push(i);
    }

    kept
}

/// Select the recap segments from the corpus
pub async fn select_segments(
    candidates: &[CandidateSegment],
    summarizer: &dyn Summarizer,
    params: SelectionParams,
) -> Result<Vec<SelectedSegment>, RecapError> {
    if candidates.is_empty() {
        return Err(RecapError::EmptyCorpus);
    }

    let count = params.max_segments.min(candidates.len());
    let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
    let phrases = summarizer.select(&texts, count).await?;
    debug!("{} returned {} phrase(s)", summarizer.name(), phrases.len());

    let mut order = match_phrases(&phrases, candidates);
    if order.is_empty() {
        warn!(
            "No summarizer phrase matched a candidate, falling back to the first {} candidate(s)",
            count
        );
        order = (0..count).collect();
    }

    let kept = apply_budget(&order, candidates, params.budget_secs, params.policy);
    let total: f64 = kept.iter().map(|&i| candidates[i].duration()).sum();
    info!(
        "Selected {} of {} matched segment(s), {:.1}s of {}s budget ({} policy)",
        kept.len(),
        order.len(),
        total,
        params.budget_secs,
        params.policy
    );

    Ok(kept
        .into_iter()
        .enumerate()
        .map(|(order, corpus_index)| SelectedSegment {
            order,
            corpus_index,
            segment: candidates[corpus_index].clone(),
        })
        .collect())
}
