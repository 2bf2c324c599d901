//! Canonical team keys.
//!
//! Raw team names arrive in every imaginable casing and punctuation
//! ("PHX Utd 2015 - Premier", "Phoenix United 2015 Premier"). Identity and
//! joins run on the normalized form: lowercased, punctuation-stripped,
//! club-suffix folded, token-sorted. The matcher layers further reductions
//! on top for its normalized tier.

use std::collections::HashSet;

/// Multi-word club suffixes folded before token sorting. Longest phrase
/// first so "futbol club" never half-folds.
const PHRASE_FOLDS: &[(&str, &str)] = &[
    ("soccer club", "sc"),
    ("football club", "fc"),
    ("futbol club", "fc"),
    ("athletic club", "ac"),
    ("sports club", "sc"),
];

/// Single-token abbreviations expanded by the matcher's normalized tier.
const TOKEN_FOLDS: &[(&str, &str)] = &[
    ("utd", "united"),
    ("phx", "phoenix"),
    ("acad", "academy"),
    ("prem", "premier"),
    ("sel", "select"),
    ("ath", "athletic"),
    ("assoc", "association"),
];

/// Canonical team key: lowercase, strip punctuation, fold club suffix
/// phrases, sort tokens. Idempotent.
pub fn normalize_team_name(raw: &str) -> String {
    let mut lowered = raw.to_lowercase();
    for (ch, rep) in [('&', " and ")] {
        lowered = lowered.replace(ch, rep);
    }
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut joined = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    for (phrase, folded) in PHRASE_FOLDS {
        while let Some(idx) = find_phrase(&joined, phrase) {
            joined.replace_range(idx..idx + phrase.len(), folded);
        }
    }
    let mut tokens: Vec<&str> = joined.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Matcher reduction: drop gender/age tokens ("b", "14b", "u11", "boys"),
/// expand common club abbreviations, re-sort. Input is expected to already
/// be a `normalize_team_name` key.
pub fn reduce_team_key(key: &str) -> String {
    let mut tokens: Vec<String> = key
        .split_whitespace()
        .filter(|t| !is_age_or_gender_token(t))
        .map(|t| {
            TOKEN_FOLDS
                .iter()
                .find(|(abbr, _)| *abbr == t)
                .map(|(_, full)| full.to_string())
                .unwrap_or_else(|| t.to_string())
        })
        .collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Token-set similarity: intersection over union of whitespace tokens.
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let ta: HashSet<&str> = a.split_whitespace().collect();
    let tb: HashSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let inter = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    inter / union
}

/// One-sided token overlap: fraction of `query` tokens present in
/// `candidate`. Used when picking the best profile-search result.
pub fn token_overlap(query: &str, candidate: &str) -> f64 {
    let tq: HashSet<&str> = query.split_whitespace().collect();
    if tq.is_empty() {
        return 0.0;
    }
    let tc: HashSet<&str> = candidate.split_whitespace().collect();
    tq.intersection(&tc).count() as f64 / tq.len() as f64
}

fn is_age_or_gender_token(token: &str) -> bool {
    match token {
        "b" | "g" | "boys" | "girls" | "male" | "female" => return true,
        _ => {}
    }
    // "u11", "u9"
    if let Some(rest) = token.strip_prefix('u') {
        if !rest.is_empty() && rest.len() <= 2 && rest.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
    }
    // "14b", "11g"
    if token.len() >= 2 && token.is_ascii() {
        let (digits, tail) = token.split_at(token.len() - 1);
        if (tail == "b" || tail == "g")
            && digits.len() <= 2
            && digits.chars().all(|c| c.is_ascii_digit())
        {
            return true;
        }
    }
    false
}

/// Find `phrase` at a token boundary inside `haystack`.
fn find_phrase(haystack: &str, phrase: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = haystack[from..].find(phrase) {
        let idx = from + rel;
        let end = idx + phrase.len();
        let left_ok = idx == 0 || haystack.as_bytes()[idx - 1] == b' ';
        let right_ok = end == haystack.len() || haystack.as_bytes()[end] == b' ';
        if left_ok && right_ok {
            return Some(idx);
        }
        from = idx + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "Phoenix Rising FC 2015 Boys Premier",
            "  AZ  Arsenal   Soccer Club - U11 ",
            "Barça Academy (West) 14B",
            "RSL-AZ North B11",
        ] {
            let once = normalize_team_name(raw);
            assert_eq!(normalize_team_name(&once), once, "not idempotent: {raw}");
        }
    }

    #[test]
    fn suffix_phrases_fold() {
        assert_eq!(
            normalize_team_name("Desert Foothills Soccer Club 2014"),
            normalize_team_name("Desert Foothills SC 2014"),
        );
    }

    #[test]
    fn reduction_drops_age_and_gender_tokens() {
        let key = normalize_team_name("PHX UTD 2015 Premier B");
        let reduced = reduce_team_key(&key);
        assert_eq!(reduced, "2015 phoenix premier united");
    }

    #[test]
    fn similarity_is_intersection_over_union() {
        let a = "2015 phoenix premier united";
        let b = "2015 phoenix premier west";
        let sim = token_set_similarity(a, b);
        assert!((sim - 3.0 / 5.0).abs() < 1e-12);
    }
}
