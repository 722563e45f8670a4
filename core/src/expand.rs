//! Synonym expansion applied to raw query strings before they reach the index.

use crate::error::{Error, Result};
use crate::tokenizer::tokenize;
use crate::Term;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// word -> synonyms, as read from a JSON object of string arrays.
pub type Thesaurus = HashMap<String, Vec<String>>;

pub fn load_thesaurus(path: &Path) -> Result<Thesaurus> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let thesaurus: Thesaurus = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::malformed(path, e.line(), e.to_string()))?;
    tracing::info!(path = %path.display(), entries = thesaurus.len(), "loaded thesaurus");
    Ok(thesaurus)
}

/// Expand each distinct query word into itself followed by its synonyms.
///
/// Words keep their first-occurrence order. Synonyms are tokenized the same way as
/// documents, so a multi-word synonym contributes several terms.
pub fn expand_query(query: &str, thesaurus: &Thesaurus) -> Vec<(Term, Vec<Term>)> {
    let mut expanded: Vec<(Term, Vec<Term>)> = Vec::new();
    for word in tokenize(query) {
        if expanded.iter().any(|(w, _)| *w == word) {
            continue;
        }
        let mut terms = vec![word.clone()];
        if let Some(synonyms) = thesaurus.get(&word) {
            terms.extend(synonyms.iter().flat_map(|s| tokenize(s)));
        }
        expanded.push((word, terms));
    }
    expanded
}

pub fn flatten_expansion(expanded: Vec<(Term, Vec<Term>)>) -> Vec<Term> {
    expanded.into_iter().flat_map(|(_, terms)| terms).collect()
}
