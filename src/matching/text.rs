//! Lexical similarity with smoothed TF-IDF.
//!
//! idf(t) = ln((1 + n) / (1 + df(t))) + 1
//!
//! Document vectors are raw term counts weighted by idf and L2-normalized, so
//! cosine similarity reduces to a sparse dot product.

use std::collections::HashMap;

type SparseVector = HashMap<String, f64>;

/// Splits text into lowercase alphanumeric words of at least two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

/// TF-IDF vectors for a fixed document collection.
#[derive(Debug, Clone, Default)]
pub struct TextIndex {
    idf: HashMap<String, f64>,
    vectors: Vec<SparseVector>,
}

impl TextIndex {
    #[allow(clippy::cast_precision_loss)]
    pub fn build<'a, I>(documents: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let term_counts: Vec<HashMap<String, f64>> =
            documents.into_iter().map(count_terms).collect();

        let mut document_frequency: HashMap<&str, usize> = HashMap::new();
        for counts in &term_counts {
            for term in counts.keys() {
                *document_frequency.entry(term.as_str()).or_default() += 1;
            }
        }

        let n = term_counts.len() as f64;
        let idf: HashMap<String, f64> = document_frequency
            .into_iter()
            .map(|(term, df)| (term.to_string(), ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0))
            .collect();

        let vectors = term_counts
            .into_iter()
            .map(|counts| weigh(counts, &idf))
            .collect();

        Self { idf, vectors }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Vectorizes a query. Terms outside the vocabulary are ignored.
    fn vectorize(&self, text: &str) -> SparseVector {
        let mut counts = count_terms(text);
        counts.retain(|term, _| self.idf.contains_key(term));
        weigh(counts, &self.idf)
    }

    /// Cosine similarity of the query against every document, in index order.
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let query = self.vectorize(query);
        self.vectors.iter().map(|doc| dot(&query, doc)).collect()
    }

    /// The `k` best documents as `(position, score)`, ties broken by position.
    pub fn top_k(&self, query: &str, k: usize) -> Vec<(usize, f64)> {
        rank(&self.scores(query), k)
    }
}

/// Orders scores descending, ties by position, and keeps the first `k`.
pub fn rank(scores: &[f64], k: usize) -> Vec<(usize, f64)> {
    let mut ranked: Vec<(usize, f64)> = scores.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}

fn count_terms(text: &str) -> HashMap<String, f64> {
    let mut counts = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0.0) += 1.0;
    }
    counts
}

fn weigh(counts: HashMap<String, f64>, idf: &HashMap<String, f64>) -> SparseVector {
    let mut vector: SparseVector = counts
        .into_iter()
        .map(|(term, tf)| {
            let weight = tf * idf.get(&term).copied().unwrap_or(1.0);
            (term, weight)
        })
        .collect();

    let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for weight in vector.values_mut() {
            *weight /= norm;
        }
    }
    vector
}

fn dot(a: &SparseVector, b: &SparseVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, w)| large.get(term).map(|v| w * v))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> TextIndex {
        TextIndex::build([
            "Sunny flat in Chamberí Madrid with terrace",
            "Penthouse in Barcelona Eixample with pool",
            "Studio in Madrid Malasaña",
        ])
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Bright 2-bed flat, Via Brera 1 (Milano)!"),
            vec!["bright", "bed", "flat", "via", "brera", "milano"]
        );
        assert!(tokenize("a b c").is_empty());
    }

    #[test]
    fn test_tokenize_unicode() {
        assert_eq!(tokenize("Chamberí ÁTICO"), vec!["chamberí", "ático"]);
    }

    #[test]
    fn test_identical_document_scores_one() {
        let idx = index();
        let scores = idx.scores("Penthouse in Barcelona Eixample with pool");
        assert!((scores[1] - 1.0).abs() < 1e-9);
        assert!(scores[0] < scores[1]);
    }

    #[test]
    fn test_scores_bounded() {
        for score in index().scores("Madrid flat terrace") {
            assert!((0.0..=1.0 + 1e-9).contains(&score));
        }
    }

    #[test]
    fn test_unknown_query_scores_zero() {
        assert!(index().scores("zzz qqq").iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_top_k_orders_by_score() {
        let top = index().top_k("Madrid flat", 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0, 0);
        assert_eq!(top[1].0, 2);
    }

    #[test]
    fn test_rank_ties_keep_position() {
        let ranked = rank(&[0.5, 0.9, 0.5, 0.1], 3);
        assert_eq!(ranked.iter().map(|r| r.0).collect::<Vec<_>>(), vec![1, 0, 2]);
    }

    #[test]
    fn test_empty_index() {
        let idx = TextIndex::build(std::iter::empty());
        assert!(idx.is_empty());
        assert!(idx.scores("anything").is_empty());
    }
}
