//! TF-IDF (+ optional full-text) search over a static knowledge corpus (C7).
//!
//! The corpus is a flat list of `{doc_id, title, category, content, source}`
//! documents, loaded from the `{category, items: [{title, content}]}` JSON
//! shape described in §6.2 (one file per category, `doc_id = "<stem>_<index>"`).

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Highest-scoring TF-IDF result is always <= 1.0 (cosine similarity of two
/// unit vectors); only hits above this floor are returned.
const SCORE_THRESHOLD: f64 = 0.1;
const MAX_FEATURES: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub title: String,
    pub category: String,
    pub content: String,
    pub source: String,
}

/// The on-disk corpus file shape: one category per file, a flat list of
/// `{title, content}` items.
#[derive(Debug, Deserialize)]
pub struct CorpusFile {
    pub category: String,
    pub items: Vec<CorpusItem>,
}

#[derive(Debug, Deserialize)]
pub struct CorpusItem {
    pub title: String,
    pub content: String,
}

impl CorpusFile {
    /// Expands to `Document`s with `doc_id = "<stem>_<index>"` (§6.2).
    pub fn into_documents(self, stem: &str) -> Vec<Document> {
        self.items
            .into_iter()
            .enumerate()
            .map(|(i, item)| Document {
                doc_id: format!("{stem}_{i}"),
                title: item.title,
                category: self.category.clone(),
                content: item.content,
                source: stem.to_string(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub title: String,
    pub content: String,
    pub score: f64,
}

struct Vectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

/// TF-IDF over unigrams + bigrams, English stop words removed, capped at
/// `MAX_FEATURES` terms by corpus-wide frequency (§4.8 "Build").
struct TfIdfIndex {
    vectorizer: Vectorizer,
    doc_vectors: Vec<Vec<f64>>,
}

fn stopwords() -> &'static HashSet<&'static str> {
    use std::sync::OnceLock;
    static WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    WORDS.get_or_init(|| {
        [
            "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "he",
            "in", "is", "it", "its", "of", "on", "or", "that", "the", "to", "was", "were", "will",
            "with", "this", "these", "those", "but", "not", "can", "could", "should", "would",
            "about", "above", "after", "again", "all", "also", "any", "because", "been", "before",
            "being", "below", "between", "both", "each", "few", "further", "how", "i", "if",
            "into", "more", "most", "no", "nor", "only", "other", "our", "out", "over", "own",
            "same", "so", "some", "such", "than", "then", "there", "they", "through", "too",
            "under", "until", "up", "very", "we", "what", "when", "where", "which", "while",
            "who", "whom", "why", "you", "your",
        ]
        .into_iter()
        .collect()
    })
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|tok| tok.len() >= 2 && !stopwords().contains(tok))
        .map(|tok| tok.to_string())
        .collect()
}

/// Unigrams followed by bigrams (adjacent-token pairs), matching sklearn's
/// `ngram_range=(1, 2)`.
fn ngrams(tokens: &[String]) -> Vec<String> {
    let mut terms: Vec<String> = tokens.to_vec();
    for pair in tokens.windows(2) {
        terms.push(format!("{} {}", pair[0], pair[1]));
    }
    terms
}

fn term_counts(terms: &[String]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for term in terms {
        *counts.entry(term.clone()).or_insert(0) += 1;
    }
    counts
}

impl TfIdfIndex {
    fn build(documents: &[Document]) -> Self {
        let doc_terms: Vec<Vec<String>> =
            documents.iter().map(|d| ngrams(&tokenize(&format!("{}. {}", d.title, d.content)))).collect();

        let mut corpus_frequency: HashMap<String, usize> = HashMap::new();
        let mut doc_frequency: HashMap<String, usize> = HashMap::new();
        for terms in &doc_terms {
            let counts = term_counts(terms);
            for (term, count) in &counts {
                *corpus_frequency.entry(term.clone()).or_insert(0) += count;
                *doc_frequency.entry(term.clone()).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(&String, &usize)> = corpus_frequency.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let vocabulary: HashMap<String, usize> =
            ranked.into_iter().take(MAX_FEATURES).enumerate().map(|(i, (term, _))| (term.clone(), i)).collect();

        let n_docs = documents.len() as f64;
        let mut idf = vec![0.0; vocabulary.len()];
        for (term, &col) in &vocabulary {
            let df = *doc_frequency.get(term).unwrap_or(&0) as f64;
            idf[col] = ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0;
        }

        let vectorizer = Vectorizer { vocabulary, idf };

        let doc_vectors = doc_terms.iter().map(|terms| vectorizer.vectorize(&term_counts(terms))).collect();

        Self { vectorizer, doc_vectors }
    }

    fn search(&self, documents: &[Document], query: &str, k: usize) -> Vec<SearchHit> {
        let query_terms = ngrams(&tokenize(query));
        let query_vector = self.vectorizer.vectorize(&term_counts(&query_terms));

        let mut scored: Vec<(usize, f64)> = self
            .doc_vectors
            .iter()
            .enumerate()
            .map(|(i, vec)| (i, cosine_similarity(&query_vector, vec)))
            .filter(|(_, score)| *score > SCORE_THRESHOLD)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| {
                let doc = &documents[i];
                SearchHit { doc_id: doc.doc_id.clone(), title: doc.title.clone(), content: doc.content.clone(), score }
            })
            .collect()
    }
}

impl Vectorizer {
    fn vectorize(&self, counts: &HashMap<String, usize>) -> Vec<f64> {
        let mut vector = vec![0.0; self.idf.len()];
        for (term, count) in counts {
            if let Some(&col) = self.vocabulary.get(term) {
                vector[col] = *count as f64 * self.idf[col];
            }
        }
        l2_normalize(&mut vector);
        vector
    }
}

fn l2_normalize(vector: &mut [f64]) {
    let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Keyword match used as the first hybrid stage: ranks documents by the
/// count of distinct query terms whose text appears as a substring of
/// title+content.
fn keyword_search(documents: &[Document], query: &str, k: usize) -> Vec<SearchHit> {
    let terms = tokenize(query);
    if terms.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, usize)> = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let haystack = format!("{} {}", doc.title, doc.content).to_lowercase();
            let hits = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
            (i, hits)
        })
        .filter(|(_, hits)| *hits > 0)
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1));
    let max_hits = scored.first().map(|(_, h)| *h).unwrap_or(1).max(1) as f64;

    scored
        .into_iter()
        .take(k)
        .map(|(i, hits)| {
            let doc = &documents[i];
            SearchHit { doc_id: doc.doc_id.clone(), title: doc.title.clone(), content: doc.content.clone(), score: hits as f64 / max_hits }
        })
        .collect()
}

/// Rebuilt synchronously under an exclusive lock on every `add_document`;
/// readers observing a rebuild in flight wait rather than see a torn index
/// (§5 "KnowledgeIndex matrix is rebuilt under exclusive lock").
pub struct KnowledgeIndex {
    inner: RwLock<Inner>,
}

struct Inner {
    documents: Vec<Document>,
    tfidf: TfIdfIndex,
}

impl KnowledgeIndex {
    pub fn build(documents: Vec<Document>) -> Self {
        let tfidf = TfIdfIndex::build(&documents);
        Self { inner: RwLock::new(Inner { documents, tfidf }) }
    }

    pub fn empty() -> Self {
        Self::build(Vec::new())
    }

    pub fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
        let inner = self.inner.read().expect("knowledge index lock poisoned");
        inner.tfidf.search(&inner.documents, query, k)
    }

    /// Full-text keyword pass first; if it returns at least one hit, its
    /// normalized ranks are returned as-is. Otherwise falls back to TF-IDF
    /// (§4.8 "Hybrid").
    pub fn hybrid_search(&self, query: &str, k: usize) -> Vec<SearchHit> {
        let inner = self.inner.read().expect("knowledge index lock poisoned");
        let keyword_hits = keyword_search(&inner.documents, query, k);
        if !keyword_hits.is_empty() {
            return keyword_hits;
        }
        inner.tfidf.search(&inner.documents, query, k)
    }

    pub fn add_document(&self, document: Document) {
        let mut inner = self.inner.write().expect("knowledge index lock poisoned");
        inner.documents.push(document);
        inner.tfidf = TfIdfIndex::build(&inner.documents);
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("knowledge index lock poisoned").documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads every `*.json` file in `dir` as a `CorpusFile`, expanding each
    /// into documents keyed by `"<stem>_<index>"`.
    pub fn load_corpus_dir(dir: &std::path::Path) -> anyhow::Result<Self> {
        let mut documents = Vec::new();
        if !dir.exists() {
            return Ok(Self::build(documents));
        }

        let mut entries: Vec<std::path::PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        entries.sort();

        for path in entries {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("doc").to_string();
            let raw = std::fs::read_to_string(&path)?;
            let file: CorpusFile = serde_json::from_str(&raw)?;
            documents.extend(file.into_documents(&stem));
        }

        Ok(Self::build(documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, title: &str, content: &str) -> Document {
        Document { doc_id: id.into(), title: title.into(), category: "tax".into(), content: content.into(), source: "test".into() }
    }

    #[test]
    fn search_finds_relevant_document_above_threshold() {
        let index = KnowledgeIndex::build(vec![
            doc("d1", "Section 80C deductions", "Section 80C allows deductions up to 1.5 lakh for PPF, ELSS, and life insurance premium."),
            doc("d2", "GST registration", "GST registration is mandatory once turnover crosses the threshold limit."),
        ]);

        let hits = index.search("80C deduction limit", 5);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].doc_id, "d1");
    }

    #[test]
    fn search_returns_nothing_for_unrelated_query() {
        let index = KnowledgeIndex::build(vec![doc("d1", "Section 80C deductions", "Section 80C allows deductions for PPF and ELSS.")]);
        let hits = index.search("weather forecast tomorrow", 5);
        assert!(hits.is_empty());
    }

    #[test]
    fn hybrid_search_prefers_keyword_hits() {
        let index = KnowledgeIndex::build(vec![
            doc("d1", "PMEGP scheme", "PMEGP offers subsidy for new micro enterprises set up by first-time entrepreneurs."),
            doc("d2", "Mudra loan", "Mudra loans are available under Shishu, Kishore, and Tarun categories."),
        ]);

        let hits = index.hybrid_search("PMEGP subsidy", 5);
        assert_eq!(hits[0].doc_id, "d1");
    }

    #[test]
    fn add_document_makes_it_searchable() {
        let index = KnowledgeIndex::build(vec![doc("d1", "GST basics", "GST is a destination-based tax on consumption.")]);
        index.add_document(doc("d2", "Income tax slabs", "The new regime has revised income tax slab rates for individuals."));
        assert_eq!(index.len(), 2);

        let hits = index.search("income tax slab rates", 5);
        assert_eq!(hits[0].doc_id, "d2");
    }
}
