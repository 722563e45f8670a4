use serde::{Deserialize, Serialize};

pub mod error;
pub mod expand;
pub mod index;
pub mod persist;
pub mod store;
pub mod tokenizer;

pub use error::{Error, Result};
pub use index::{IdfWeighting, IndexConfig, TfIdfIndex};
pub use expand::{expand_query, flatten_expansion, Thesaurus};
pub use store::{DocumentStore, HashDocumentStore, ListDocumentStore, StoreKind};

/// Externally assigned document identifier.
pub type DocId = String;
pub type Term = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: DocId,
    pub text: String,
}

impl Document {
    pub fn new(doc_id: impl Into<DocId>, text: impl Into<String>) -> Self {
        Self { doc_id: doc_id.into(), text: text.into() }
    }
}

/// A document after tokenization. Consumed once by the index and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedDocument {
    pub doc_id: DocId,
    pub terms: Vec<Term>,
}

/// Tokenizes every document in order.
pub fn transform_documents<'a, I>(documents: I) -> Vec<TransformedDocument>
where
    I: IntoIterator<Item = &'a Document>,
{
    documents.into_iter().map(tokenizer::transform).collect()
}

/// Builds a fresh index from everything currently held by `store`.
pub fn build_index(store: &dyn DocumentStore, config: IndexConfig) -> Result<TfIdfIndex> {
    let index = TfIdfIndex::with_config(config);
    for doc in transform_documents(store.list_all()) {
        index.add_document(&doc)?;
    }
    tracing::info!(num_docs = index.total_documents(), num_terms = index.num_terms(), "index built");
    Ok(index)
}
