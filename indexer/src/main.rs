use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tfidf_core::persist::IndexPaths;
use tfidf_core::tokenizer::tokenize;
use tfidf_core::{
    build_index, expand::load_thesaurus, expand_query, flatten_expansion, Document, IdfWeighting, IndexConfig,
    StoreKind, TfIdfIndex,
};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query a TF-IDF inverted index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory) of {"doc_id", "text"} records
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Document store strategy: list (ordered) or hash (keyed)
        #[arg(long, default_value_t = StoreKind::Hash)]
        store: StoreKind,
    },
    /// Run a ranked query against a built index directory
    Search {
        #[arg(long, default_value = "./index")]
        index: String,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 10)]
        k: usize,
        /// JSON object mapping words to synonym lists
        #[arg(long)]
        thesaurus: Option<PathBuf>,
        /// Use smoothed IDF = ln(1 + N/df) instead of ln(N/df)
        #[arg(long, default_value_t = false)]
        smoothed_idf: bool,
        #[arg(long, default_value_t = StoreKind::Hash)]
        store: StoreKind,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, store } => {
            build(Path::new(&input), Path::new(&output), store)?;
            Ok(())
        }
        Commands::Search { index, query, k, thesaurus, smoothed_idf, store } => {
            let idf = if smoothed_idf { IdfWeighting::Smoothed } else { IdfWeighting::Standard };
            let hits = search(Path::new(&index), &query, k, thesaurus.as_deref(), IndexConfig { idf }, store)?;
            for hit in hits {
                println!("{}\t{:.4}\t{}", hit.doc_id, hit.score, hit.text);
            }
            Ok(())
        }
    }
}

struct Hit {
    doc_id: String,
    score: f64,
    text: String,
}

fn build(input: &Path, output: &Path, kind: StoreKind) -> Result<(u64, usize)> {
    let out_paths = IndexPaths::new(output);
    out_paths.ensure_root()?;

    let mut store = kind.empty();
    for file in input_files(input) {
        for doc in read_documents(&file)? {
            store.add_document(doc);
        }
    }
    tracing::info!(num_docs = store.len(), store = %kind, "ingested documents");

    let index = build_index(&*store, IndexConfig::default())?;
    store.write(&out_paths.documents())?;
    index.write(&out_paths.index())?;

    tracing::info!(output = %output.display(), "index build complete");
    Ok((index.total_documents(), index.num_terms()))
}

fn search(
    index_dir: &Path,
    query: &str,
    k: usize,
    thesaurus: Option<&Path>,
    config: IndexConfig,
    kind: StoreKind,
) -> Result<Vec<Hit>> {
    let paths = IndexPaths::new(index_dir);
    let store = kind.read(&paths.documents())?;
    let index = TfIdfIndex::read_with_config(&paths.index(), config)?;

    let terms = match thesaurus {
        Some(path) => flatten_expansion(expand_query(query, &load_thesaurus(path)?)),
        None => tokenize(query),
    };
    tracing::debug!(?terms, "query terms");

    let hits = index
        .search_scored(terms.as_slice(), k)
        .into_iter()
        .map(|(doc_id, score)| {
            let text = store.get_by_doc_id(&doc_id).map(|d| d.text.clone()).unwrap_or_default();
            Hit { doc_id, score, text }
        })
        .collect();
    Ok(hits)
}

fn input_files(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

/// `.jsonl` files hold one record per line; anything else is a single record or an array.
fn read_documents(file: &Path) -> Result<Vec<Document>> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut docs = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() { continue; }
            let doc: Document = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}: invalid document record", file.display(), i + 1))?;
            docs.push(doc);
        }
        return Ok(docs);
    }

    let json: serde_json::Value =
        serde_json::from_reader(reader).with_context(|| format!("parsing {}", file.display()))?;
    let docs = match json {
        serde_json::Value::Array(arr) => {
            arr.into_iter().map(serde_json::from_value).collect::<Result<Vec<Document>, _>>()?
        }
        serde_json::Value::Object(_) => vec![serde_json::from_value(json)?],
        _ => {
            tracing::warn!(file = %file.display(), "skipping file without document records");
            Vec::new()
        }
    };
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_corpus(dir: &Path) {
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(
            dir.join("a.jsonl"),
            "{\"doc_id\":\"0\",\"text\":\"red is a color\"}\n\n{\"doc_id\":\"1\",\"text\":\"red and blue\"}\n",
        )
        .unwrap();
        fs::write(dir.join("nested/b.json"), "[{\"doc_id\":\"2\",\"text\":\"blue sky exam\"}]").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();
    }

    #[test]
    fn builds_and_searches_a_directory() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        write_corpus(input.path());

        let (docs, _terms) = build(input.path(), output.path(), StoreKind::Hash).unwrap();
        assert_eq!(docs, 3);

        let hits = search(output.path(), "Red", 10, None, IndexConfig::default(), StoreKind::Hash).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1"]);
        assert_eq!(hits[1].text, "red and blue");
    }

    #[test]
    fn expands_queries_with_a_thesaurus() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        write_corpus(input.path());
        build(input.path(), output.path(), StoreKind::List).unwrap();

        let thesaurus = input.path().join("thesaurus.json");
        fs::write(&thesaurus, "{\"sky\": [\"exam\"]}").unwrap();
        let hits =
            search(output.path(), "sky", 10, Some(&thesaurus), IndexConfig::default(), StoreKind::List).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, "2");
    }

    #[test]
    fn expansion_terms_must_all_match() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        write_corpus(input.path());
        build(input.path(), output.path(), StoreKind::Hash).unwrap();

        // Expanded terms are AND-ed, so a synonym absent from doc 2 removes it.
        let thesaurus = input.path().join("thesaurus.json");
        fs::write(&thesaurus, "{\"sky\": [\"heaven\"]}").unwrap();
        let hits =
            search(output.path(), "sky", 10, Some(&thesaurus), IndexConfig::default(), StoreKind::Hash).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn reports_bad_records_with_line_numbers() {
        let input = tempdir().unwrap();
        let file = input.path().join("bad.jsonl");
        fs::write(&file, "{\"doc_id\":\"0\",\"text\":\"ok\"}\n{\"doc_id\":\"1\"}\n").unwrap();
        let err = read_documents(&file).unwrap_err();
        assert!(err.to_string().contains(":2:"));
    }
}
