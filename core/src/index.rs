//! TF-IDF inverted index.
//!
//! All statistics live in one [`IndexState`] behind a `parking_lot::RwLock`:
//! `add_document` holds the write lock for the whole update so readers never
//! observe postings, document frequencies and the total out of step.

use crate::error::{Error, Result};
use crate::persist::{load_index, save_index, PersistedIndex, PostingRecord, TermRecord};
use crate::{DocId, Term, TransformedDocument};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// How inverse document frequency is derived from `N` (total documents) and `df`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdfWeighting {
    /// `ln(N / df)`
    #[default]
    Standard,
    /// `ln(1 + N / df)`; never reaches zero for a seen term.
    Smoothed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexConfig {
    pub idf: IdfWeighting,
}

#[derive(Debug, Default)]
struct IndexState {
    term_to_postings: HashMap<Term, HashMap<DocId, u32>>,
    /// Cached `term_to_postings[term].len()`.
    document_frequency: HashMap<Term, u32>,
    total_documents_count: u64,
    indexed: HashSet<DocId>,
}

impl IndexState {
    fn term_frequency(&self, term: &str, doc_id: &str) -> u32 {
        self.term_to_postings
            .get(term)
            .and_then(|postings| postings.get(doc_id))
            .copied()
            .unwrap_or(0)
    }

    fn document_frequency(&self, term: &str) -> u32 {
        self.document_frequency.get(term).copied().unwrap_or(0)
    }

    fn inverse_document_frequency(&self, term: &str, weighting: IdfWeighting) -> f64 {
        let df = self.document_frequency(term);
        if self.total_documents_count == 0 || df == 0 {
            return 0.0;
        }
        let ratio = self.total_documents_count as f64 / df as f64;
        match weighting {
            IdfWeighting::Standard => ratio.ln(),
            IdfWeighting::Smoothed => (1.0 + ratio).ln(),
        }
    }

    fn tf_idf(&self, term: &str, doc_id: &str, weighting: IdfWeighting) -> f64 {
        let tf = self.term_frequency(term, doc_id);
        if tf == 0 {
            return 0.0;
        }
        tf as f64 * self.inverse_document_frequency(term, weighting)
    }

    fn combine_term_scores<S: AsRef<str>>(&self, terms: &[S], doc_id: &str, weighting: IdfWeighting) -> f64 {
        terms.iter().map(|t| self.tf_idf(t.as_ref(), doc_id, weighting)).sum()
    }

    /// Documents containing every distinct query term.
    fn candidates<S: AsRef<str>>(&self, terms: &[S]) -> Vec<&DocId> {
        let distinct: HashSet<&str> = terms.iter().map(AsRef::as_ref).collect();
        let mut lists = Vec::with_capacity(distinct.len());
        for term in distinct {
            match self.term_to_postings.get(term) {
                Some(postings) => lists.push(postings),
                None => return Vec::new(),
            }
        }
        // Walk the shortest list and probe the rest.
        lists.sort_by_key(|postings| postings.len());
        let Some((first, rest)) = lists.split_first() else {
            return Vec::new();
        };
        first
            .keys()
            .filter(|doc_id| rest.iter().all(|postings| postings.contains_key(*doc_id)))
            .collect()
    }

    fn search_scored<S: AsRef<str>>(&self, terms: &[S], k: usize, weighting: IdfWeighting) -> Vec<(DocId, f64)> {
        if terms.is_empty() || k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(DocId, f64)> = self
            .candidates(terms)
            .into_iter()
            .map(|doc_id| (doc_id.clone(), self.combine_term_scores(terms, doc_id, weighting)))
            .collect();
        // Score descending, then doc id ascending so equal scores have a stable order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }

    fn to_persisted(&self) -> PersistedIndex {
        let mut terms: Vec<TermRecord> = self
            .term_to_postings
            .iter()
            .map(|(term, postings)| {
                let mut scores: Vec<PostingRecord> = postings
                    .iter()
                    .map(|(doc_id, &score)| PostingRecord { doc_id: doc_id.clone(), score })
                    .collect();
                scores.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
                TermRecord { term: term.clone(), scores }
            })
            .collect();
        terms.sort_by(|a, b| a.term.cmp(&b.term));
        let with_terms: HashSet<&DocId> = self.term_to_postings.values().flat_map(|p| p.keys()).collect();
        let mut empty_documents: Vec<DocId> =
            self.indexed.iter().filter(|id| !with_terms.contains(id)).cloned().collect();
        empty_documents.sort();
        PersistedIndex { total_documents_count: self.total_documents_count, empty_documents, terms }
    }

    fn from_persisted(persisted: PersistedIndex) -> Self {
        let mut state = IndexState {
            total_documents_count: persisted.total_documents_count,
            indexed: persisted.empty_documents.into_iter().collect(),
            ..Default::default()
        };
        for record in persisted.terms {
            let postings: HashMap<DocId, u32> =
                record.scores.into_iter().map(|p| (p.doc_id, p.score)).collect();
            state.indexed.extend(postings.keys().cloned());
            // Recomputed rather than trusted from disk.
            state.document_frequency.insert(record.term.clone(), postings.len() as u32);
            state.term_to_postings.insert(record.term, postings);
        }
        state
    }
}

/// Inverted index mapping terms to per-document raw frequencies, ranked by TF-IDF.
///
/// Safe to share across threads: mutations take the write lock, queries the read lock.
/// A doc id may be added once; re-adding is rejected with [`Error::DuplicateDocument`].
#[derive(Debug, Default)]
pub struct TfIdfIndex {
    config: IndexConfig,
    state: RwLock<IndexState>,
}

impl TfIdfIndex {
    pub fn new() -> Self { Self::default() }

    pub fn with_config(config: IndexConfig) -> Self {
        Self { config, state: RwLock::default() }
    }

    pub fn config(&self) -> IndexConfig { self.config }

    pub fn add_document(&self, doc: &TransformedDocument) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        if state.indexed.contains(&doc.doc_id) {
            tracing::warn!(doc_id = %doc.doc_id, "rejected duplicate document");
            return Err(Error::DuplicateDocument { doc_id: doc.doc_id.clone() });
        }

        let mut counts: HashMap<&str, u32> = HashMap::new();
        for term in &doc.terms {
            *counts.entry(term.as_str()).or_insert(0) += 1;
        }
        let distinct_terms = counts.len();
        for (term, count) in counts {
            let postings = state.term_to_postings.entry(term.to_string()).or_default();
            if postings.insert(doc.doc_id.clone(), count).is_none() {
                *state.document_frequency.entry(term.to_string()).or_insert(0) += 1;
            }
        }
        state.total_documents_count += 1;
        state.indexed.insert(doc.doc_id.clone());
        tracing::debug!(doc_id = %doc.doc_id, distinct_terms, "indexed document");
        Ok(())
    }

    pub fn contains_document(&self, doc_id: &str) -> bool {
        self.state.read().indexed.contains(doc_id)
    }

    pub fn total_documents(&self) -> u64 { self.state.read().total_documents_count }

    pub fn num_terms(&self) -> usize { self.state.read().term_to_postings.len() }

    pub fn term_frequency(&self, term: &str, doc_id: &str) -> u32 {
        self.state.read().term_frequency(term, doc_id)
    }

    pub fn document_frequency(&self, term: &str) -> u32 {
        self.state.read().document_frequency(term)
    }

    pub fn inverse_document_frequency(&self, term: &str) -> f64 {
        self.state.read().inverse_document_frequency(term, self.config.idf)
    }

    pub fn tf_idf(&self, term: &str, doc_id: &str) -> f64 {
        self.state.read().tf_idf(term, doc_id, self.config.idf)
    }

    pub fn combine_term_scores<S: AsRef<str>>(&self, terms: &[S], doc_id: &str) -> f64 {
        self.state.read().combine_term_scores(terms, doc_id, self.config.idf)
    }

    /// Top `k` doc ids containing all query terms, best first.
    pub fn search<S: AsRef<str>>(&self, terms: &[S], k: usize) -> Vec<DocId> {
        self.search_scored(terms, k).into_iter().map(|(doc_id, _)| doc_id).collect()
    }

    pub fn search_scored<S: AsRef<str>>(&self, terms: &[S], k: usize) -> Vec<(DocId, f64)> {
        self.state.read().search_scored(terms, k, self.config.idf)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let persisted = self.state.read().to_persisted();
        save_index(path, &persisted)?;
        tracing::info!(
            path = %path.display(),
            num_terms = persisted.terms.len(),
            total = persisted.total_documents_count,
            "wrote index"
        );
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        Self::read_with_config(path, IndexConfig::default())
    }

    pub fn read_with_config(path: &Path, config: IndexConfig) -> Result<Self> {
        let state = IndexState::from_persisted(load_index(path)?);
        Ok(Self { config, state: RwLock::new(state) })
    }
}
