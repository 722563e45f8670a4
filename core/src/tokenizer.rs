use crate::{Document, Term, TransformedDocument};

/// Tokenize text into lowercase terms split on whitespace runs.
/// Punctuation is kept as part of the term and no stemming is applied.
pub fn tokenize(text: &str) -> Vec<Term> {
    text.to_lowercase().split_whitespace().map(str::to_string).collect()
}

pub fn transform(doc: &Document) -> TransformedDocument {
    TransformedDocument { doc_id: doc.doc_id.clone(), terms: tokenize(&doc.text) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Red is  a\tColor");
        assert_eq!(t, vec!["red", "is", "a", "color"]);
    }

    #[test]
    fn keeps_punctuation() {
        assert_eq!(tokenize("Hello, world!"), vec!["hello,", "world!"]);
    }

    #[test]
    fn blank_text_has_no_terms() {
        assert!(tokenize(" \n\t ").is_empty());
    }
}
