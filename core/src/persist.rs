//! Line-delimited JSON codecs shared by the document stores and the index.
//!
//! Both files start with a metadata record on line 1 followed by one record per
//! line. Readers report the 1-based line number of the first offending record.

use crate::error::{Error, Result};
use crate::{DocId, Document, Term};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{create_dir_all, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRecord {
    pub total_documents_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexMeta {
    total_documents_count: u64,
    /// Indexed documents without any term; they appear in no posting list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    empty_documents: Vec<DocId>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexMetaLine {
    #[serde(rename = "__metadata__")]
    metadata: IndexMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingRecord {
    pub doc_id: DocId,
    /// Raw term frequency of the term in `doc_id`.
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRecord {
    pub term: Term,
    pub scores: Vec<PostingRecord>,
}

/// Ground truth of an index on disk: the total, the postings, and the ids of
/// indexed documents that had no terms. Document frequencies are not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PersistedIndex {
    pub total_documents_count: u64,
    pub empty_documents: Vec<DocId>,
    pub terms: Vec<TermRecord>,
}

/// File layout of an index directory.
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn documents(&self) -> PathBuf { self.root.join("documents.jsonl") }
    pub fn index(&self) -> PathBuf { self.root.join("index.jsonl") }

    pub fn ensure_root(&self) -> Result<()> {
        create_dir_all(&self.root).map_err(|e| Error::io(&self.root, e))
    }
}

pub fn save_documents<'a, I>(path: &Path, docs: I) -> Result<()>
where
    I: ExactSizeIterator<Item = &'a Document>,
{
    let mut out = LineWriter::create(path)?;
    out.record(&MetaRecord { total_documents_count: docs.len() as u64 })?;
    for doc in docs {
        out.record(doc)?;
    }
    out.finish()
}

pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let mut lines = open_lines(path)?;
    let meta: MetaRecord = match lines.next() {
        Some(line) => {
            let (line_no, text) = line?;
            parse_line(path, line_no, &text)?
        }
        None => return Err(Error::malformed(path, 1, "missing metadata record")),
    };

    let mut docs = Vec::new();
    let mut last_line = 1;
    for line in lines {
        let (line_no, text) = line?;
        last_line = line_no;
        docs.push(parse_line::<Document>(path, line_no, &text)?);
    }
    if docs.len() as u64 != meta.total_documents_count {
        return Err(Error::malformed(
            path,
            last_line,
            format!("metadata declares {} documents but {} were found", meta.total_documents_count, docs.len()),
        ));
    }
    tracing::info!(path = %path.display(), num_docs = docs.len(), "loaded documents");
    Ok(docs)
}

pub fn save_index(path: &Path, state: &PersistedIndex) -> Result<()> {
    let mut out = LineWriter::create(path)?;
    out.record(&IndexMetaLine {
        metadata: IndexMeta {
            total_documents_count: state.total_documents_count,
            empty_documents: state.empty_documents.clone(),
        },
    })?;
    for term in &state.terms {
        out.record(term)?;
    }
    out.finish()
}

pub fn load_index(path: &Path) -> Result<PersistedIndex> {
    let mut lines = open_lines(path)?;
    let meta: IndexMetaLine = match lines.next() {
        Some(line) => {
            let (line_no, text) = line?;
            parse_line(path, line_no, &text)?
        }
        None => return Err(Error::malformed(path, 1, "missing metadata record")),
    };

    let mut seen_terms: HashSet<Term> = HashSet::new();
    let mut indexed_docs: HashSet<DocId> = HashSet::new();
    let empty_documents = meta.metadata.empty_documents;
    let mut seen_empty: HashSet<&str> = HashSet::new();
    for doc_id in &empty_documents {
        if !seen_empty.insert(doc_id) {
            return Err(Error::malformed(path, 1, format!("empty document '{doc_id}' listed twice")));
        }
    }
    let mut terms = Vec::new();
    let mut last_line = 1;
    for line in lines {
        let (line_no, text) = line?;
        last_line = line_no;
        let record: TermRecord = parse_line(path, line_no, &text)?;
        if !seen_terms.insert(record.term.clone()) {
            return Err(Error::malformed(path, line_no, format!("duplicate term '{}'", record.term)));
        }
        if record.scores.is_empty() {
            return Err(Error::malformed(path, line_no, format!("term '{}' has no postings", record.term)));
        }
        let mut seen_docs: HashSet<&str> = HashSet::new();
        for posting in &record.scores {
            if posting.score == 0 {
                return Err(Error::malformed(
                    path,
                    line_no,
                    format!("zero frequency for '{}' in document '{}'", record.term, posting.doc_id),
                ));
            }
            if !seen_docs.insert(&posting.doc_id) {
                return Err(Error::malformed(
                    path,
                    line_no,
                    format!("document '{}' listed twice for '{}'", posting.doc_id, record.term),
                ));
            }
            if seen_empty.contains(posting.doc_id.as_str()) {
                return Err(Error::malformed(
                    path,
                    line_no,
                    format!("document '{}' is listed as empty but has postings", posting.doc_id),
                ));
            }
            indexed_docs.insert(posting.doc_id.clone());
        }
        terms.push(record);
    }

    let total = meta.metadata.total_documents_count;
    let known = (indexed_docs.len() + empty_documents.len()) as u64;
    if known > total {
        return Err(Error::malformed(
            path,
            last_line,
            format!("index references {known} documents but the total is {total}"),
        ));
    }
    tracing::info!(path = %path.display(), num_terms = terms.len(), total, "loaded index");
    Ok(PersistedIndex { total_documents_count: total, empty_documents, terms })
}

struct LineWriter {
    path: PathBuf,
    inner: BufWriter<File>,
}

impl LineWriter {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        Ok(Self { path: path.to_path_buf(), inner: BufWriter::new(file) })
    }

    fn record<T: Serialize>(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer(&mut self.inner, value).map_err(|e| {
            Error::io(&self.path, e.into())
        })?;
        self.inner.write_all(b"\n").map_err(|e| Error::io(&self.path, e))
    }

    fn finish(mut self) -> Result<()> {
        self.inner.flush().map_err(|e| Error::io(&self.path, e))?;
        tracing::debug!(path = %self.path.display(), "flushed");
        Ok(())
    }
}

/// Lines of `path` paired with their 1-based line numbers. Blank lines are skipped
/// after line 1, which must hold the metadata record.
fn open_lines(path: &Path) -> Result<impl Iterator<Item = Result<(usize, String)>>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let owned = path.to_path_buf();
    Ok(BufReader::new(file)
        .lines()
        .enumerate()
        .map(move |(i, line)| line.map(|l| (i + 1, l)).map_err(|e| Error::io(&owned, e)))
        .filter(|line| !matches!(line, Ok((n, text)) if *n > 1 && text.trim().is_empty())))
}

fn parse_line<T: DeserializeOwned>(path: &Path, line_no: usize, text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| Error::malformed(path, line_no, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn documents_file_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        let docs = vec![Document::new("a", "x  y")];
        save_documents(&path, docs.iter()).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"total_documents_count":1}"#);
        assert_eq!(lines[1], r#"{"doc_id":"a","text":"x  y"}"#);
    }

    #[test]
    fn index_file_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        let state = PersistedIndex {
            total_documents_count: 3,
            empty_documents: vec![],
            terms: vec![TermRecord {
                term: "red".into(),
                scores: vec![PostingRecord { doc_id: "0".into(), score: 2 }],
            }],
        };
        save_index(&path, &state).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines[0], r#"{"__metadata__":{"total_documents_count":3}}"#);
        assert_eq!(lines[1], r#"{"term":"red","scores":[{"doc_id":"0","score":2}]}"#);
        assert_eq!(load_index(&path).unwrap(), state);
    }

    #[test]
    fn empty_file_is_missing_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.jsonl");
        fs::write(&path, "").unwrap();
        assert!(matches!(load_documents(&path), Err(Error::MalformedPersistedState { line: 1, .. })));
        assert!(matches!(load_index(&path), Err(Error::MalformedPersistedState { line: 1, .. })));
    }

    #[test]
    fn reports_offending_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        fs::write(&path, "{\"total_documents_count\":2}\n{\"doc_id\":\"a\",\"text\":\"x\"}\n{\"doc_id\":\"b\"}\n").unwrap();
        match load_documents(&path) {
            Err(Error::MalformedPersistedState { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn document_count_must_match_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        fs::write(&path, "{\"total_documents_count\":2}\n{\"doc_id\":\"a\",\"text\":\"x\"}\n").unwrap();
        assert!(matches!(load_documents(&path), Err(Error::MalformedPersistedState { .. })));
    }

    #[test]
    fn document_line_is_not_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        fs::write(&path, "{\"doc_id\":\"a\",\"text\":\"x\"}\n").unwrap();
        assert!(matches!(load_documents(&path), Err(Error::MalformedPersistedState { line: 1, .. })));
    }

    #[test]
    fn rejects_inconsistent_postings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        let meta = "{\"__metadata__\":{\"total_documents_count\":1}}\n";

        fs::write(&path, format!("{meta}{{\"term\":\"a\",\"scores\":[{{\"doc_id\":\"0\",\"score\":0}}]}}\n")).unwrap();
        assert!(matches!(load_index(&path), Err(Error::MalformedPersistedState { line: 2, .. })));

        let line = "{\"term\":\"a\",\"scores\":[{\"doc_id\":\"0\",\"score\":1}]}\n";
        fs::write(&path, format!("{meta}{line}{line}")).unwrap();
        assert!(matches!(load_index(&path), Err(Error::MalformedPersistedState { line: 3, .. })));

        fs::write(&path, format!("{meta}{{\"term\":\"a\",\"scores\":[{{\"doc_id\":\"0\",\"score\":1}},{{\"doc_id\":\"1\",\"score\":1}}]}}\n")).unwrap();
        assert!(matches!(load_index(&path), Err(Error::MalformedPersistedState { .. })));
    }

    #[test]
    fn metadata_must_be_on_the_first_line() {
        let dir = tempdir().unwrap();
        let docs = dir.path().join("docs.jsonl");
        fs::write(&docs, "\n\n{\"total_documents_count\":0}\n").unwrap();
        assert!(matches!(load_documents(&docs), Err(Error::MalformedPersistedState { line: 1, .. })));

        let index = dir.path().join("index.jsonl");
        fs::write(&index, "\n{\"__metadata__\":{\"total_documents_count\":0}}\n").unwrap();
        assert!(matches!(load_index(&index), Err(Error::MalformedPersistedState { line: 1, .. })));
    }

    #[test]
    fn blank_lines_after_metadata_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        fs::write(&path, "{\"total_documents_count\":1}\n\n{\"doc_id\":\"a\",\"text\":\"x\"}\n\n").unwrap();
        assert_eq!(load_documents(&path).unwrap(), vec![Document::new("a", "x")]);
    }

    #[test]
    fn empty_documents_ride_in_the_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        let state = PersistedIndex { total_documents_count: 2, empty_documents: vec!["e".into()], ..Default::default() };
        save_index(&path, &state).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().next().unwrap(), r#"{"__metadata__":{"total_documents_count":2,"empty_documents":["e"]}}"#);
        assert_eq!(load_index(&path).unwrap(), state);

        let line = "{\"term\":\"a\",\"scores\":[{\"doc_id\":\"e\",\"score\":1}]}\n";
        fs::write(&path, format!("{{\"__metadata__\":{{\"total_documents_count\":2,\"empty_documents\":[\"e\"]}}}}\n{line}")).unwrap();
        assert!(matches!(load_index(&path), Err(Error::MalformedPersistedState { line: 2, .. })));

        fs::write(&path, "{\"__metadata__\":{\"total_documents_count\":1,\"empty_documents\":[\"e\",\"f\"]}}\n").unwrap();
        assert!(matches!(load_index(&path), Err(Error::MalformedPersistedState { .. })));
    }

    #[test]
    fn missing_file_is_io_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.jsonl");
        assert!(matches!(load_index(&path), Err(Error::Io { .. })));
    }
}
