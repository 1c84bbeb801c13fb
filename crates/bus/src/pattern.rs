// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topic binding patterns.
//!
//! Routing keys form a dotted hierarchy. In a binding pattern, `*` matches
//! exactly one word and `#` matches zero or more words, so `subtitle.*`
//! matches `subtitle.ready` but not `subtitle.translate.requested`, while
//! `subtitle.#` matches both.

/// Whether `pattern` matches `routing_key`.
pub fn matches(pattern: &str, routing_key: &str) -> bool {
    let pattern_words: Vec<&str> = pattern.split('.').collect();
    let key_words: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern_words, &key_words)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    let Some((first, rest)) = pattern.split_first() else {
        return key.is_empty();
    };
    if *first == "#" {
        (0..=key.len()).any(|skip| match_words(rest, &key[skip..]))
    } else {
        match key.split_first() {
            Some((head, tail)) => (*first == "*" || first == head) && match_words(rest, tail),
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "pattern_tests.rs"]
mod tests;
