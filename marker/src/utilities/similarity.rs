//! Normalised string similarity in `[0.0, 1.0]`, where `1.0` means identical.
//!
//! All measures work on Unicode scalar values, not bytes. Two empty strings are identical.

use crate::rules::SimilarityAlgorithm;

/// Jaro-Winkler only boosts pairs already at least this similar.
const WINKLER_BOOST_THRESHOLD: f64 = 0.7;
const WINKLER_PREFIX_SCALE: f64 = 0.1;
const WINKLER_MAX_PREFIX: usize = 4;

pub fn similarity(a: &str, b: &str, algorithm: SimilarityAlgorithm) -> f64 {
    match algorithm {
        SimilarityAlgorithm::Levenshtein => levenshtein(a, b),
        SimilarityAlgorithm::JaroWinkler => jaro_winkler(a, b),
        SimilarityAlgorithm::TokenSort => token_sort(a, b),
    }
}

/// `1 - edit_distance / longer_length`.
pub fn levenshtein(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(&a, &b) as f64 / longest as f64
}

fn edit_distance(a: &[char], b: &[char]) -> usize {
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

pub fn jaro(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    jaro_chars(&a, &b)
}

fn jaro_chars(a: &[char], b: &[char]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let window = (a.len().max(b.len()) / 2).saturating_sub(1);
    let mut b_used = vec![false; b.len()];
    let mut a_matches = Vec::new();
    for (i, ca) in a.iter().enumerate() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(b.len());
        for j in start..end {
            if !b_used[j] && b[j] == *ca {
                b_used[j] = true;
                a_matches.push(*ca);
                break;
            }
        }
    }
    if a_matches.is_empty() {
        return 0.0;
    }

    let b_matches = b
        .iter()
        .zip(&b_used)
        .filter(|(_, used)| **used)
        .map(|(c, _)| *c);
    let transpositions = a_matches
        .iter()
        .zip(b_matches)
        .filter(|(x, y)| **x != *y)
        .count()
        / 2;

    let m = a_matches.len() as f64;
    (m / a.len() as f64 + m / b.len() as f64 + (m - transpositions as f64) / m) / 3.0
}

/// Jaro similarity with the Winkler common-prefix boost.
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let base = jaro_chars(&a, &b);
    if base <= WINKLER_BOOST_THRESHOLD {
        return base;
    }
    let prefix = a
        .iter()
        .zip(&b)
        .take(WINKLER_MAX_PREFIX)
        .take_while(|(x, y)| x == y)
        .count();
    base + prefix as f64 * WINKLER_PREFIX_SCALE * (1.0 - base)
}

/// Insertion/deletion similarity of the two strings after sorting their words.
pub fn token_sort(a: &str, b: &str) -> f64 {
    let a: Vec<char> = sorted_tokens(a).chars().collect();
    let b: Vec<char> = sorted_tokens(b).chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * longest_common_subsequence(&a, &b) as f64 / total as f64
}

fn sorted_tokens(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_levenshtein() {
        assert!(close(levenshtein("kitten", "sitting"), 1.0 - 3.0 / 7.0));
        assert_eq!(levenshtein("", ""), 1.0);
        assert_eq!(levenshtein("abc", ""), 0.0);
        assert_eq!(levenshtein("same", "same"), 1.0);
    }

    #[test]
    fn test_jaro_winkler() {
        assert!(close(jaro("MARTHA", "MARHTA"), 0.9444));
        assert!(close(jaro_winkler("MARTHA", "MARHTA"), 0.9611));
        assert!(close(jaro_winkler("DIXON", "DICKSONX"), 0.8133));
        assert_eq!(jaro_winkler("abc", "xyz"), 0.0);
    }

    #[test]
    fn test_token_sort_ignores_word_order() {
        assert_eq!(token_sort("world hello", "hello  world"), 1.0);
        assert!(token_sort("new york mets", "new york yankees") < 1.0);
        assert_eq!(token_sort("", ""), 1.0);
    }

    #[test]
    fn test_multibyte_input() {
        assert!(close(levenshtein("café", "cafe"), 0.75));
    }
}
