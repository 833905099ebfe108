//! Extraction of candidate actions from raw generations.
//!
//! A generation is cut into delimiter-terminated fragments ("actions"). The
//! first fragment is the action the planner may commit; the following ones
//! form the lookahead chain recorded in the trajectory pool. When the
//! generator returned token-level data the parser also computes the
//! length-normalized likelihood of the chosen span.

use crate::core::types::{Sample, ScoredText};

/// Parsed view of one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAction {
    /// First fragment, the candidate to commit.
    pub action: String,
    /// Bounded run of consecutive fragments starting with `action`.
    pub chain: Vec<String>,
    /// `exp(mean token logprob)` over the chain's token span, when token data exists.
    pub probability: Option<f64>,
}

/// Splits generations into action chains.
#[derive(Debug, Clone)]
pub struct ActionParser {
    delimiter: char,
    lookahead_actions: usize,
    lookahead_tokens: Option<usize>,
}

impl ActionParser {
    pub fn new(delimiter: char, lookahead_actions: usize, lookahead_tokens: Option<usize>) -> Self {
        Self {
            delimiter,
            lookahead_actions,
            lookahead_tokens,
        }
    }

    /// Parse one sample.
    ///
    /// `echo_prefixes` lists text the generator may have repeated back (the
    /// answer prefix and every committed action); each one found is cut off
    /// together with everything before it. Returns `None` when nothing but
    /// whitespace remains.
    pub fn parse(&self, sample: &Sample, echo_prefixes: &[&str]) -> Option<ParsedAction> {
        let text = sample.text();
        let start = strip_echo(text, echo_prefixes);
        let remainder = &text[start..];
        if remainder.trim().is_empty() {
            return None;
        }

        match sample {
            Sample::Scored(scored) if !scored.tokens.is_empty() => {
                self.parse_scored(scored, start)
            }
            _ => {
                let chain: Vec<String> = self
                    .fragments(remainder)
                    .into_iter()
                    .take(self.lookahead_actions)
                    .map(|(fragment, _)| fragment.to_string())
                    .collect();
                build(chain, None)
            }
        }
    }

    fn parse_scored(&self, scored: &ScoredText, start: usize) -> Option<ParsedAction> {
        let text = scored.text.as_str();
        let char_start = char_offset(text, start);

        match self.lookahead_tokens {
            Some(limit) => {
                let (token_start, token_end) =
                    token_span(&scored.tokens, char_start, text.chars().count());
                let token_end = token_end.min(token_start + limit);
                let window = scored.tokens[token_start..token_end.max(token_start)].concat();
                let chain: Vec<String> = self
                    .fragments(&window)
                    .into_iter()
                    .map(|(fragment, _)| fragment.to_string())
                    .collect();
                let probability = normalized_likelihood(&scored.logprobs, token_start, token_end);
                build(chain, probability)
            }
            None => {
                let remainder = &text[start..];
                let kept: Vec<(&str, usize)> = self
                    .fragments(remainder)
                    .into_iter()
                    .take(self.lookahead_actions)
                    .collect();
                let span_end = kept.last().map_or(start, |(_, end)| start + end);
                let (token_start, token_end) =
                    token_span(&scored.tokens, char_start, char_offset(text, span_end));
                let probability = normalized_likelihood(&scored.logprobs, token_start, token_end);
                let chain = kept
                    .into_iter()
                    .map(|(fragment, _)| fragment.to_string())
                    .collect();
                build(chain, probability)
            }
        }
    }

    /// Delimiter-terminated fragments of `text` with their end byte offsets.
    ///
    /// Leading whitespace stays on the fragment so committed actions
    /// concatenate back into the original text. Fragments with nothing but
    /// whitespace besides the delimiter are dropped.
    fn fragments<'t>(&self, text: &'t str) -> Vec<(&'t str, usize)> {
        let mut end = 0;
        let mut out = Vec::new();
        for piece in text.split_inclusive(self.delimiter) {
            end += piece.len();
            if !piece.trim_end_matches(self.delimiter).trim().is_empty() {
                out.push((piece, end));
            }
        }
        out
    }
}

fn build(chain: Vec<String>, probability: Option<f64>) -> Option<ParsedAction> {
    let action = chain.first()?.clone();
    Some(ParsedAction {
        action,
        chain,
        probability,
    })
}

/// Byte offset just past the echoed prefixes.
fn strip_echo(text: &str, prefixes: &[&str]) -> usize {
    let mut offset = 0;
    for prefix in prefixes.iter().filter(|prefix| !prefix.is_empty()) {
        if let Some(pos) = text[offset..].find(prefix) {
            offset += pos + prefix.len();
        }
    }
    offset
}

fn char_offset(text: &str, byte_offset: usize) -> usize {
    text[..byte_offset].chars().count()
}

/// Map a character range onto token slice indices.
///
/// Each bound becomes the first token boundary at or after it, found through
/// the cumulative token lengths. Offsets past the last boundary map to the
/// token count.
fn token_span(tokens: &[String], char_start: usize, char_end: usize) -> (usize, usize) {
    let mut boundaries = Vec::with_capacity(tokens.len() + 1);
    let mut total = 0;
    boundaries.push(0);
    for token in tokens {
        total += token.chars().count();
        boundaries.push(total);
    }
    let slice_index = |offset: usize| {
        boundaries
            .iter()
            .position(|&boundary| boundary >= offset)
            .unwrap_or(tokens.len())
    };
    (slice_index(char_start), slice_index(char_end))
}

/// `exp(sum(logprobs[start..end])) ^ (1 / len)`.
///
/// `len` is the span length, or the full token count when the span is empty.
fn normalized_likelihood(logprobs: &[f64], start: usize, end: usize) -> Option<f64> {
    if logprobs.is_empty() {
        return None;
    }
    let end = end.min(logprobs.len());
    let (sum, len) = if end > start {
        (logprobs[start..end].iter().sum::<f64>(), end - start)
    } else {
        (0.0, logprobs.len())
    };
    Some((sum / len as f64).exp())
}
