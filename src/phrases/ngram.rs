//! Token n-gram extraction

/// One n-gram occurrence inside a tokenized sentence.
/// `start..end` is the token span (end exclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NGram {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Split a line into tokens on whitespace
pub fn tokenize(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

/// All n-grams of order `n`, left to right
pub fn extract_ngrams(tokens: &[&str], n: usize) -> Vec<NGram> {
    if n == 0 || n > tokens.len() {
        return vec![];
    }
    tokens
        .windows(n)
        .enumerate()
        .map(|(start, window)| NGram {
            text: window.join(" "),
            start,
            end: start + n,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bigrams() {
        let tokens = tokenize("a b c");
        let grams = extract_ngrams(&tokens, 2);
        assert_eq!(grams.len(), 2);
        assert_eq!(grams[0].text, "a b");
        assert_eq!(grams[1].text, "b c");
        assert_eq!((grams[1].start, grams[1].end), (1, 3));
    }

    #[test]
    fn test_order_longer_than_sentence() {
        let tokens = tokenize("a b");
        assert!(extract_ngrams(&tokens, 3).is_empty());
        assert!(extract_ngrams(&tokens, 0).is_empty());
    }

    #[test]
    fn test_tokenize_collapses_whitespace() {
        assert_eq!(tokenize("  a\tb   c "), vec!["a", "b", "c"]);
    }
}
