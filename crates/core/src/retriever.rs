//! Hybrid BM25 + symbol + dense scorer, context assembly, and confidence estimation.
//!
//! Grounded directly on the original Python `_retrieve_context` in `reasoners/qa.py`: the exact
//! IDF formula, the flat +5 symbol boost, the `score * 3` dense boost gated at similarity > 0.3,
//! the 0.5 score floor, the top-5 cutoff, and the `ratio = top_score / (|keywords| * ln(N+1) + bias)`
//! confidence thresholds. The teacher's own `TermDocFreq`-based IDF (in `types.rs`) uses a
//! different smoothing and is not reused here — the spec's formula is exact and must match.

use std::collections::BTreeMap;

use crate::config::Config;
use crate::extractor::extract_keywords;
use crate::types::{ProjectIndex, SessionTurn, SymbolLocation};

/// Capability interface for optional dense-vector search. Implementations that have no model
/// loaded (or the `semantic` feature disabled) return `available() == false` and an empty result
/// set, letting BM25 + symbol matching carry retrieval alone.
pub trait DenseSearch {
    fn available(&self) -> bool;
    /// Returns `(relative_path, chunk_index, cosine_similarity)` tuples, best first.
    fn search(&self, query: &str, project_id: &str, top_k: usize) -> Vec<(String, u32, f32)>;
}

/// Default no-op implementation, used when embeddings are disabled or unavailable.
pub struct NoDenseSearch;

impl DenseSearch for NoDenseSearch {
    fn available(&self) -> bool {
        false
    }

    fn search(&self, _query: &str, _project_id: &str, _top_k: usize) -> Vec<(String, u32, f32)> {
        Vec::new()
    }
}

/// Capability interface for the language model that turns an assembled context blob into prose.
/// The core defines this seam but never implements it (§1 "out of scope", §6): wiring an actual
/// model call is the hosting binary's responsibility.
pub trait AnswerModel {
    fn answer(&self, question: &str, context: &str) -> String;
}

/// Default implementation used when no model is configured: hands the retrieved context back
/// verbatim so the caller can see exactly what would have been sent to a real model.
pub struct NoAnswerModel;

impl AnswerModel for NoAnswerModel {
    fn answer(&self, _question: &str, context: &str) -> String {
        if context.is_empty() {
            "No language model is configured, and no relevant context was found.".to_string()
        } else {
            format!("No language model is configured. Retrieved context:\n\n{context}")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

pub struct RetrievalResult {
    pub context: String,
    pub top_files: Vec<String>,
    pub symbol_hits: BTreeMap<String, Vec<SymbolLocation>>,
    pub confidence: Confidence,
    pub top_score: f64,
}

/// Core BM25-flavored IDF: rare keywords score higher than common ones.
fn idf(total_files: usize, df: usize) -> f64 {
    ((total_files as f64 - df as f64 + 0.5) / (df as f64 + 0.5) + 1.0).ln()
}

/// Hybrid retrieval over an already-loaded project index. `query` should already be the
/// follow-up-enriched query when a session has prior turns (see `enrich_query`).
pub fn retrieve_context(
    query: &str,
    index: &ProjectIndex,
    config: &Config,
    dense: &dyn DenseSearch,
) -> RetrievalResult {
    let query_keywords = extract_keywords(query, config.query_keyword_top_n);
    let query_words: Vec<String> = query.to_lowercase().split_whitespace().map(|s| s.to_string()).collect();
    let total_files = index.total_files();

    let mut symbol_hits: BTreeMap<String, Vec<SymbolLocation>> = BTreeMap::new();
    for word in &query_words {
        if let Some(locations) = index.symbol_map.get(word) {
            symbol_hits.insert(word.clone(), locations.clone());
        }
    }

    let mut file_scores: BTreeMap<String, f64> = BTreeMap::new();
    for kw in &query_keywords {
        let Some(files_with_kw) = index.keyword_map.get(kw) else { continue };
        if files_with_kw.is_empty() {
            continue;
        }
        let df = files_with_kw.len();
        let weight = idf(total_files, df);
        for file_path in files_with_kw {
            *file_scores.entry(file_path.clone()).or_insert(0.0) += weight;
        }
    }

    for locations in symbol_hits.values() {
        for loc in locations {
            *file_scores.entry(loc.file.clone()).or_insert(0.0) += config.symbol_boost;
        }
    }

    if dense.available() && total_files > 0 {
        for (rel_path, _chunk_idx, score) in dense.search(query, &index.project_id, 10) {
            if score > config.dense_boost_threshold {
                *file_scores.entry(rel_path).or_insert(0.0) += score as f64 * config.dense_boost_scale;
            }
        }
    }

    let mut ranked: Vec<(String, f64)> =
        file_scores.into_iter().filter(|(_, score)| *score >= config.score_floor).collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let top_files: Vec<String> = ranked.iter().take(config.top_files).map(|(p, _)| p.clone()).collect();

    let mut context_parts: Vec<String> = Vec::new();
    let mut chars_used = 0usize;
    'files: for file_path in &top_files {
        let Some(entry) = index.file_index.get(file_path) else { continue };
        for chunk in &entry.chunks {
            let sym_label = chunk.symbol.as_deref().map(|s| format!(" ({s})")).unwrap_or_default();
            let part = format!(
                "=== {file_path} [lines {}-{}]{sym_label} ===\n{}",
                chunk.start_line, chunk.end_line, chunk.content
            );
            if chars_used + part.len() > config.context_char_budget {
                break 'files;
            }
            chars_used += part.len();
            context_parts.push(part);
        }
    }

    for (sym_name, locations) in &symbol_hits {
        for loc in locations {
            context_parts.push(format!(
                "\n[Symbol `{sym_name}` defined in {} at line {} ({})]",
                loc.file,
                loc.line,
                loc.kind.as_str()
            ));
        }
    }

    let top_score = ranked.first().map(|(_, s)| *s).unwrap_or(0.0);
    let max_possible = if total_files > 0 {
        query_keywords.len() as f64 * ((total_files as f64 + 1.0).ln()) + config.confidence_bias
    } else {
        1.0
    };
    let ratio = if max_possible > 0.0 { top_score / max_possible } else { 0.0 };
    let confidence = if ratio >= 0.3 {
        Confidence::High
    } else if ratio >= 0.1 {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    RetrievalResult { context: context_parts.join("\n\n"), top_files, symbol_hits, confidence, top_score }
}

/// Append the last two turns' top-5 keywords to `question`, per SPEC_FULL.md §4.5's follow-up
/// enrichment rule. The session is read-only here; writing the new turn happens after the
/// upstream answer is produced, to avoid a read/write cycle within one call.
pub fn enrich_query(question: &str, history: &[SessionTurn]) -> String {
    if history.is_empty() {
        return question.to_string();
    }
    let mut prev_keywords = Vec::new();
    for turn in history.iter().rev().take(2) {
        prev_keywords.extend(extract_keywords(&turn.question, 5));
    }
    if prev_keywords.is_empty() {
        return question.to_string();
    }
    format!("{question} {}", prev_keywords.join(" "))
}
