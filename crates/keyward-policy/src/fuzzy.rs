//! Approximate substring matching.
//!
//! [`detect_partial_match`] answers "does `a` contain something close to a
//! meaningful fragment of `b`?". It is used to catch passwords built around
//! non-secret material such as a username, a URL domain or the vault's file
//! name.
//!
//! Both inputs are cut into overlapping substrings of at least
//! [`MIN_SUBSTRING_LEN`] characters. The substrings of `a` form a search
//! index; the substrings of `b` are queried against it, whole string first,
//! then longer before shorter. Each query is a case-insensitive Bitap search
//! with location 0 and distance 100, scored as
//! `errors / pattern_len + offset / 100`. Queries longer than 32 characters
//! are split into 32-character chunks whose scores are averaged. A score of
//! 0 is an exact match.
//!
//! Substring lists of plain inputs are memoized in a small bounded cache.
//! Lists derived from a [`Secret`] are never cached and are zeroed after use,
//! and a [`PartialMatch`] carries no text.

use std::sync::{Arc, LazyLock};

use keyward_vault::Secret;
use moka::sync::Cache;
use zeroize::Zeroizing;

/// Shortest generated substring, in characters.
pub const MIN_SUBSTRING_LEN: usize = 5;
const MIN_SUBSTRING_STEP: usize = 2;
const MAX_PATTERN_BITS: usize = 32;
const MATCH_DISTANCE: f64 = 100.0;
const SUBSTRING_CACHE_CAPACITY: u64 = 32;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How close a fragment must be to count as a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strictness {
    Loose,
    #[default]
    Normal,
    Strict,
}

impl Strictness {
    /// Maximum accepted score.
    pub fn threshold(self) -> f64 {
        match self {
            Self::Loose => 0.4,
            Self::Normal => 0.3,
            Self::Strict => 0.2,
        }
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, Copy)]
pub enum MatchInput<'a> {
    Plain(&'a str),
    Secret(&'a Secret),
}

impl<'a> From<&'a str> for MatchInput<'a> {
    fn from(s: &'a str) -> Self {
        Self::Plain(s)
    }
}

impl<'a> From<&'a String> for MatchInput<'a> {
    fn from(s: &'a String) -> Self {
        Self::Plain(s)
    }
}

impl<'a> From<&'a Secret> for MatchInput<'a> {
    fn from(s: &'a Secret) -> Self {
        Self::Secret(s)
    }
}

impl MatchInput<'_> {
    /// Character length, `None` for binary secrets.
    fn char_len(&self) -> Option<usize> {
        match self {
            Self::Plain(s) => Some(s.chars().count()),
            Self::Secret(s) => s.expose_str().map(|_| s.len()),
        }
    }
}

/// Best hit of a partial match. Indices refer to the substring lists, whole
/// string first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialMatch {
    /// 0 for an exact match, higher is weaker.
    pub score: f64,
    /// Which substring of `a` matched.
    pub item_index: usize,
    /// Which substring of `b` was the successful query.
    pub query_index: usize,
}

// ---------------------------------------------------------------------------
// Substrings
// ---------------------------------------------------------------------------

type CacheKey = (String, usize);

static SUBSTRING_CACHE: LazyLock<Cache<CacheKey, Arc<Vec<String>>>> =
    LazyLock::new(|| Cache::new(SUBSTRING_CACHE_CAPACITY));

enum Substrings {
    Shared(Arc<Vec<String>>),
    Sensitive(Zeroizing<Vec<String>>),
}

impl std::ops::Deref for Substrings {
    type Target = [String];

    fn deref(&self) -> &[String] {
        match self {
            Self::Shared(v) => v,
            Self::Sensitive(v) => v,
        }
    }
}

/// Every substring of `chars` with length `MIN_SUBSTRING_LEN + k * step`
/// below the full length, plus the full string. Ordered whole string first,
/// then longer substrings before shorter ones, later positions first.
fn possible_substrings(chars: &[char], step: usize) -> Vec<String> {
    let n = chars.len();
    if n <= MIN_SUBSTRING_LEN {
        return vec![chars.iter().collect()];
    }

    let mut out = Vec::new();
    let mut len = MIN_SUBSTRING_LEN;
    while len < n {
        for start in 0..=n - len {
            out.push(chars[start..start + len].iter().collect());
        }
        len += step;
    }
    out.push(chars.iter().collect());
    out.reverse();
    out
}

fn substrings_of(input: MatchInput<'_>, step: usize) -> Option<Substrings> {
    match input {
        MatchInput::Plain(s) => {
            let key = (s.to_string(), step);
            let list = SUBSTRING_CACHE.get_with(key, || {
                let chars: Vec<char> = s.chars().collect();
                Arc::new(possible_substrings(&chars, step))
            });
            Some(Substrings::Shared(list))
        }
        MatchInput::Secret(secret) => {
            let text = secret.expose_str()?;
            let chars = Zeroizing::new(text.chars().collect::<Vec<char>>());
            Some(Substrings::Sensitive(Zeroizing::new(possible_substrings(
                &chars, step,
            ))))
        }
    }
}

// ---------------------------------------------------------------------------
// Bitap
// ---------------------------------------------------------------------------

fn lowercase_chars(s: &str) -> Zeroizing<Vec<char>> {
    Zeroizing::new(s.chars().flat_map(char::to_lowercase).collect())
}

fn compute_score(pattern_len: usize, errors: usize, current: usize, expected: usize) -> f64 {
    let accuracy = errors as f64 / pattern_len as f64;
    let proximity = expected.abs_diff(current) as f64;
    accuracy + proximity / MATCH_DISTANCE
}

/// Bitmask of the positions of `c` in `pattern`, highest bit first.
fn char_mask(pattern: &[char], c: char) -> u32 {
    let len = pattern.len();
    pattern
        .iter()
        .enumerate()
        .filter(|(_, p)| **p == c)
        .fold(0u32, |acc, (i, _)| acc | (1u32 << (len - i - 1)))
}

fn find_from(text: &[char], pattern: &[char], from: usize) -> Option<usize> {
    if pattern.len() > text.len() || from > text.len() - pattern.len() {
        return None;
    }
    (from..=text.len() - pattern.len()).find(|&i| text[i..i + pattern.len()] == *pattern)
}

/// Single Bitap pass for a pattern of at most 32 characters.
/// Returns `(is_match, score)`.
fn bitap(text: &[char], pattern: &[char], location: usize, threshold: f64) -> (bool, f64) {
    let pattern_len = pattern.len();
    let text_len = text.len();
    let expected = location.min(text_len);
    let mut threshold = threshold;

    // Exact occurrences tighten the threshold before the fuzzy pass.
    let mut from = expected;
    while let Some(index) = find_from(text, pattern, from) {
        threshold = threshold.min(compute_score(pattern_len, 0, index, expected));
        from = index + pattern_len;
    }

    let mut best_location: Option<usize> = None;
    let mut last_bits: Vec<u32> = Vec::new();
    let mut final_score = 1.0;
    let mut bin_max = pattern_len + text_len;
    let mask = 1u32 << (pattern_len - 1);

    for errors in 0..pattern_len {
        let mut bin_min = 0;
        let mut bin_mid = bin_max;
        while bin_min < bin_mid {
            if compute_score(pattern_len, errors, expected + bin_mid, expected) <= threshold {
                bin_min = bin_mid;
            } else {
                bin_max = bin_mid;
            }
            bin_mid = (bin_max - bin_min) / 2 + bin_min;
        }
        bin_max = bin_mid;

        let mut start = (expected as isize - bin_mid as isize + 1).max(1) as usize;
        let finish = (expected + bin_mid).min(text_len) + pattern_len;

        let mut bits = vec![0u32; finish + 2];
        bits[finish + 1] = (1u32 << errors) - 1;
        let last = |k: usize| last_bits.get(k).copied().unwrap_or(0);

        let mut j = finish;
        while j >= start {
            let current = j - 1;
            let char_match = text.get(current).map_or(0, |&c| char_mask(pattern, c));

            bits[j] = ((bits[j + 1] << 1) | 1) & char_match;
            if errors > 0 {
                bits[j] |= ((last(j + 1) | last(j)) << 1) | 1 | last(j + 1);
            }

            if bits[j] & mask != 0 {
                final_score = compute_score(pattern_len, errors, current, expected);
                if final_score <= threshold {
                    threshold = final_score;
                    best_location = Some(current);
                    if current <= expected {
                        break;
                    }
                    start = (2 * expected as isize - current as isize).max(1) as usize;
                }
            }
            j -= 1;
        }

        if compute_score(pattern_len, errors + 1, expected, expected) > threshold {
            break;
        }
        last_bits = bits;
    }

    (best_location.is_some(), f64::max(0.001, final_score))
}

/// A lowercased query split into Bitap-sized chunks.
struct Query {
    whole: Zeroizing<Vec<char>>,
    chunks: Vec<(usize, usize)>,
}

impl Query {
    fn new(pattern: &str) -> Self {
        let whole = lowercase_chars(pattern);
        let len = whole.len();
        let mut chunks = Vec::new();
        if len > MAX_PATTERN_BITS {
            let remainder = len % MAX_PATTERN_BITS;
            let end = len - remainder;
            let mut i = 0;
            while i < end {
                chunks.push((i, i + MAX_PATTERN_BITS));
                i += MAX_PATTERN_BITS;
            }
            if remainder > 0 {
                chunks.push((len - MAX_PATTERN_BITS, len));
            }
        } else {
            chunks.push((0, len));
        }
        Self { whole, chunks }
    }

    /// `(is_match, score)` of this query against one lowercased text.
    fn search_in(&self, text: &[char], threshold: f64) -> (bool, f64) {
        if *self.whole == text {
            return (true, 0.0);
        }
        let mut any = false;
        let mut total = 0.0;
        for &(start, end) in &self.chunks {
            let (is_match, score) = bitap(text, &self.whole[start..end], start, threshold);
            any |= is_match;
            total += score;
        }
        if any {
            (true, total / self.chunks.len() as f64)
        } else {
            (false, 1.0)
        }
    }
}

/// Indexed item: lowercased text, position, field-length norm.
struct Record {
    text: Zeroizing<Vec<char>>,
    index: usize,
    norm: f64,
}

fn field_norm(s: &str) -> f64 {
    let tokens = s.split(' ').filter(|t| !t.is_empty()).count().max(1) as f64;
    (1000.0 / tokens.sqrt()).round() / 1000.0
}

struct SearchIndex {
    records: Vec<Record>,
    threshold: f64,
}

impl SearchIndex {
    fn new(items: &[String], strictness: Strictness) -> Self {
        let records = items
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.trim().is_empty())
            .map(|(index, s)| Record {
                text: lowercase_chars(s),
                index,
                norm: field_norm(s),
            })
            .collect();
        Self {
            records,
            threshold: strictness.threshold(),
        }
    }

    /// Best `(score, item_index)` for `pattern`, if any item matches.
    fn search(&self, pattern: &str) -> Option<(f64, usize)> {
        if pattern.is_empty() {
            return None;
        }
        let query = Query::new(pattern);
        self.records
            .iter()
            .filter_map(|r| {
                let (is_match, score) = query.search_in(&r.text, self.threshold);
                is_match.then(|| (score.powf(r.norm), r.index))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Whether `a` contains an approximate occurrence of a fragment of `b`.
///
/// Returns `None` when either side is empty or a binary secret.
pub fn detect_partial_match<'a, 'b>(
    a: impl Into<MatchInput<'a>>,
    b: impl Into<MatchInput<'b>>,
    strictness: Strictness,
) -> Option<PartialMatch> {
    let (a, b) = (a.into(), b.into());
    let (len_a, len_b) = (a.char_len()?, b.char_len()?);
    if len_a == 0 || len_b == 0 {
        return None;
    }

    let step = MIN_SUBSTRING_STEP.max(len_a.min(len_b) / 5);
    let items = substrings_of(a, step)?;
    let queries = substrings_of(b, step)?;

    let index = SearchIndex::new(&items, strictness);
    queries.iter().enumerate().find_map(|(query_index, q)| {
        index.search(q).map(|(score, item_index)| PartialMatch {
            score,
            item_index,
            query_index,
        })
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
