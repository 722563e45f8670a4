use proptest::prelude::*;
use tfidf_core::persist::IndexPaths;
use tfidf_core::{
    build_index, Document, DocumentStore, Error, HashDocumentStore, IndexConfig, ListDocumentStore, TfIdfIndex,
    TransformedDocument,
};
use tempfile::tempdir;

fn vocabulary() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["red", "blue", "green", "sky", "sea", "a"]).prop_map(String::from)
}

fn corpus() -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(prop::collection::vec(vocabulary(), 0..12), 1..8)
}

fn index_corpus(docs: &[Vec<String>]) -> TfIdfIndex {
    let index = TfIdfIndex::new();
    for (i, terms) in docs.iter().enumerate() {
        index.add_document(&TransformedDocument { doc_id: i.to_string(), terms: terms.clone() }).unwrap();
    }
    index
}

proptest! {
    #[test]
    fn term_frequency_matches_counts(docs in corpus()) {
        let index = index_corpus(&docs);
        for (i, terms) in docs.iter().enumerate() {
            for term in terms {
                let expected = terms.iter().filter(|t| *t == term).count() as u32;
                prop_assert_eq!(index.term_frequency(term, &i.to_string()), expected);
            }
        }
        prop_assert_eq!(index.total_documents(), docs.len() as u64);
    }

    #[test]
    fn document_frequency_matches_distinct_documents(docs in corpus(), term in vocabulary()) {
        let index = index_corpus(&docs);
        let expected = docs.iter().filter(|terms| terms.contains(&term)).count() as u32;
        prop_assert_eq!(index.document_frequency(&term), expected);
    }

    #[test]
    fn idf_never_increases_with_document_frequency(
        (total, df_a, df_b) in (1usize..20).prop_flat_map(|total| (Just(total), 1..=total, 1..=total))
    ) {
        let idf_for = |df: usize| {
            let index = TfIdfIndex::new();
            for i in 0..total {
                let terms = if i < df { vec!["t".to_string()] } else { vec![] };
                index.add_document(&TransformedDocument { doc_id: i.to_string(), terms }).unwrap();
            }
            index.inverse_document_frequency("t")
        };
        let (lo, hi) = if df_a <= df_b { (df_a, df_b) } else { (df_b, df_a) };
        prop_assert!(idf_for(lo) >= idf_for(hi));
    }

    #[test]
    fn search_is_repeatable_and_survives_round_trip(docs in corpus(), query in prop::collection::vec(vocabulary(), 0..3)) {
        let index = index_corpus(&docs);
        let first = index.search_scored(query.as_slice(), 5);
        prop_assert_eq!(&first, &index.search_scored(query.as_slice(), 5));
        prop_assert!(first.len() <= 5);
        if query.is_empty() {
            prop_assert!(first.is_empty());
        }

        let dir = tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        index.write(&path).unwrap();
        let loaded = TfIdfIndex::read(&path).unwrap();
        prop_assert_eq!(loaded.search_scored(query.as_slice(), 5), first);
    }
}

#[test]
fn pipeline_from_store_to_files_and_back() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::new(dir.path().join("out"));
    paths.ensure_root().unwrap();

    let mut store = HashDocumentStore::new();
    store.add_document(Document::new("a", "Red is a color"));
    store.add_document(Document::new("b", "red and blue"));
    let index = build_index(&store, IndexConfig::default()).unwrap();
    store.write(&paths.documents()).unwrap();
    index.write(&paths.index()).unwrap();

    let store = HashDocumentStore::read(&paths.documents()).unwrap();
    let index = TfIdfIndex::read(&paths.index()).unwrap();
    let hits: Vec<&str> = index
        .search(&["red"], 10)
        .iter()
        .filter_map(|id| store.get_by_doc_id(id))
        .map(|d| d.text.as_str())
        .collect();
    assert_eq!(hits, vec!["Red is a color", "red and blue"]);
}

#[test]
fn list_store_with_repeated_ids_cannot_build_an_index() {
    let mut store = ListDocumentStore::new();
    store.add_document(Document::new("a", "one"));
    store.add_document(Document::new("a", "two"));
    let err = build_index(&store, IndexConfig::default()).unwrap_err();
    assert!(matches!(err, Error::DuplicateDocument { .. }));
}
