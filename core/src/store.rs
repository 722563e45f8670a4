//! Identity-keyed document storage.
//!
//! Two strategies implement [`DocumentStore`]: [`ListDocumentStore`] keeps every
//! insert in order (duplicates included, first match wins on lookup) and
//! [`HashDocumentStore`] keys by doc id with last-write-wins.

use crate::error::Result;
use crate::persist::{load_documents, save_documents};
use crate::Document;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub trait DocumentStore: Send + Sync {
    fn add_document(&mut self, doc: Document);
    fn get_by_doc_id(&self, doc_id: &str) -> Option<&Document>;
    fn list_all(&self) -> Vec<&Document>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool { self.len() == 0 }
    fn write(&self, path: &Path) -> Result<()>;
    fn read(path: &Path) -> Result<Self>
    where
        Self: Sized;
}

#[derive(Debug, Clone, Default)]
pub struct ListDocumentStore {
    docs: Vec<Document>,
}

impl ListDocumentStore {
    pub fn new() -> Self { Self::default() }
}

impl From<Vec<Document>> for ListDocumentStore {
    fn from(docs: Vec<Document>) -> Self { Self { docs } }
}

impl DocumentStore for ListDocumentStore {
    fn add_document(&mut self, doc: Document) {
        self.docs.push(doc);
    }

    fn get_by_doc_id(&self, doc_id: &str) -> Option<&Document> {
        self.docs.iter().find(|d| d.doc_id == doc_id)
    }

    fn list_all(&self) -> Vec<&Document> { self.docs.iter().collect() }

    fn len(&self) -> usize { self.docs.len() }

    fn write(&self, path: &Path) -> Result<()> {
        save_documents(path, self.docs.iter())
    }

    fn read(path: &Path) -> Result<Self> {
        Ok(Self { docs: load_documents(path)? })
    }
}

#[derive(Debug, Clone, Default)]
pub struct HashDocumentStore {
    docs: HashMap<String, Document>,
}

impl HashDocumentStore {
    pub fn new() -> Self { Self::default() }
}

impl DocumentStore for HashDocumentStore {
    fn add_document(&mut self, doc: Document) {
        if let Some(old) = self.docs.insert(doc.doc_id.clone(), doc) {
            tracing::debug!(doc_id = %old.doc_id, "replaced stored document");
        }
    }

    fn get_by_doc_id(&self, doc_id: &str) -> Option<&Document> { self.docs.get(doc_id) }

    fn list_all(&self) -> Vec<&Document> { self.docs.values().collect() }

    fn len(&self) -> usize { self.docs.len() }

    fn write(&self, path: &Path) -> Result<()> {
        save_documents(path, self.docs.values())
    }

    fn read(path: &Path) -> Result<Self> {
        let mut store = Self::new();
        for doc in load_documents(path)? {
            store.add_document(doc);
        }
        Ok(store)
    }
}

/// Store strategy chosen by the caller at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    List,
    #[default]
    Hash,
}

impl StoreKind {
    pub fn empty(self) -> Box<dyn DocumentStore> {
        match self {
            StoreKind::List => Box::new(ListDocumentStore::new()),
            StoreKind::Hash => Box::new(HashDocumentStore::new()),
        }
    }

    pub fn read(self, path: &Path) -> Result<Box<dyn DocumentStore>> {
        Ok(match self {
            StoreKind::List => Box::new(ListDocumentStore::read(path)?),
            StoreKind::Hash => Box::new(HashDocumentStore::read(path)?),
        })
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "list" => Ok(StoreKind::List),
            "hash" => Ok(StoreKind::Hash),
            other => Err(format!("unknown store kind '{other}', expected 'list' or 'hash'")),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreKind::List => "list",
            StoreKind::Hash => "hash",
        })
    }
}
