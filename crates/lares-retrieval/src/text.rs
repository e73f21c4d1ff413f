//! Fuzzy text scoring for device-name and room matching.
//!
//! Scores are indel ratios over characters: `2 * lcs / (len_a + len_b)`,
//! where `lcs` is the longest-common-subsequence length. Substitutions
//! count as delete plus insert, which keeps prefix matches strong: a name
//! that extends another ("大白" vs "大白空调") still scores well above 0.5.
//! All ratios are in `[0.0, 1.0]`; empty input always scores `0.0`.

use std::collections::BTreeSet;

/// Indel similarity between two strings.
pub fn fuzzy_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_chars(&a, &b)
}

/// Best [`fuzzy_ratio`] between the shorter string and any equally long
/// window of the longer one. Catches names embedded in larger labels.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (short, long) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };
    if short.is_empty() || long.is_empty() {
        return 0.0;
    }
    if short.len() == long.len() {
        return ratio_chars(&short, &long);
    }

    let mut best = 0.0f64;
    for window in long.windows(short.len()) {
        let ratio = ratio_chars(&short, window);
        if ratio > best {
            best = ratio;
        }
        if best >= 1.0 {
            break;
        }
    }
    best
}

/// Word-order-insensitive similarity over whitespace tokens.
///
/// Degenerates to [`fuzzy_ratio`] for unsegmented text such as Chinese.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let sect: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let diff_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let diff_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    let sect_joined = sect.join(" ");
    let a_joined = join_with_base(&sect_joined, &diff_a);
    let b_joined = join_with_base(&sect_joined, &diff_b);

    fuzzy_ratio(&sect_joined, &a_joined)
        .max(fuzzy_ratio(&sect_joined, &b_joined))
        .max(fuzzy_ratio(&a_joined, &b_joined))
}

/// Best of the three ratios. The general-purpose "how alike are these".
pub fn similarity(a: &str, b: &str) -> f64 {
    fuzzy_ratio(a, b)
        .max(partial_ratio(a, b))
        .max(token_set_ratio(a, b))
}

/// Whether the text contains any CJK unified ideograph.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

fn ratio_chars(a: &[char], b: &[char]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let lcs = lcs_len(a, b);
    (2.0 * lcs as f64) / (a.len() + b.len()) as f64
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn join_with_base(base: &str, extra: &[&str]) -> String {
    if extra.is_empty() {
        return base.to_string();
    }
    if base.is_empty() {
        return extra.join(" ");
    }
    format!("{} {}", base, extra.join(" "))
}
