use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use regex::Regex;

/// A similarity model trained on labelled text and queried with new text.
///
/// Implementations must be insensitive to the order of `train` calls.
pub trait SimilarityScorer {
    fn train(&mut self, label: &str, text: &str);

    /// Score per trained label. Labels sharing no token with `text` may be
    /// omitted; an untrained scorer returns an empty map.
    fn score(&self, text: &str) -> HashMap<String, f64>;
}

#[derive(Debug, Default, Clone)]
struct LabelCounts {
    tokens: HashMap<String, u64>,
    total: u64,
}

/// Token-frequency Bayes scorer.
///
/// For each query token the per-label relative frequencies are normalised
/// into `P(label | token)` and added to the label's score, weighted by how
/// often the token occurs in the query. Training only adds to counts, so
/// the order of `train` calls cannot change a score.
#[derive(Debug, Clone)]
pub struct BayesScorer {
    tokenizer: Regex,
    labels: BTreeMap<String, LabelCounts>,
}

impl BayesScorer {
    pub fn new() -> Result<Self> {
        let tokenizer =
            Regex::new(r"[\p{L}\p{N}]+").context("failed to compile tokenizer regex")?;
        Ok(Self {
            tokenizer,
            labels: BTreeMap::new(),
        })
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    fn tokenize(&self, text: &str) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for token in self.tokenizer.find_iter(text) {
            *counts.entry(token.as_str().to_lowercase()).or_insert(0) += 1;
        }
        counts
    }
}

impl SimilarityScorer for BayesScorer {
    fn train(&mut self, label: &str, text: &str) {
        let tokens = self.tokenize(text);
        let entry = self.labels.entry(label.to_string()).or_default();
        for (token, count) in tokens {
            *entry.tokens.entry(token).or_insert(0) += count;
            entry.total += count;
        }
    }

    fn score(&self, text: &str) -> HashMap<String, f64> {
        let mut scores = BTreeMap::<&str, f64>::new();

        for (token, query_count) in self.tokenize(text) {
            let rates: Vec<(&str, f64)> = self
                .labels
                .iter()
                .filter(|(_, counts)| counts.total > 0)
                .filter_map(|(label, counts)| {
                    let hits = *counts.tokens.get(&token)?;
                    Some((label.as_str(), hits as f64 / counts.total as f64))
                })
                .collect();

            let rate_sum: f64 = rates.iter().map(|(_, rate)| rate).sum();
            if rate_sum <= 0.0 {
                continue;
            }

            for (label, rate) in rates {
                *scores.entry(label).or_insert(0.0) += query_count as f64 * rate / rate_sum;
            }
        }

        scores
            .into_iter()
            .map(|(label, score)| (label.to_string(), score))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAINING: [(&str, &str); 4] = [
        ("/docs/bank/stmt_jan.pdf", "relevé de compte banque solde débit"),
        ("/docs/bank/stmt_feb.pdf", "relevé compte solde crédit virement"),
        ("/docs/health/visit.pdf", "consultation médecin ordonnance"),
        ("/docs/tax/2023.pdf", "impôt revenu déclaration solde"),
    ];

    fn trained(order: &[usize]) -> BayesScorer {
        let mut scorer = BayesScorer::new().unwrap();
        for &index in order {
            let (label, text) = TRAINING[index];
            scorer.train(label, text);
        }
        scorer
    }

    #[test]
    fn untrained_scorer_returns_empty_map() {
        let scorer = BayesScorer::new().unwrap();
        assert!(scorer.score("relevé de compte").is_empty());
    }

    #[test]
    fn training_order_does_not_change_scores() {
        let query = "Relevé de compte: solde, virement, ordonnance";
        let forward = trained(&[0, 1, 2, 3]).score(query);
        let reversed = trained(&[3, 2, 1, 0]).score(query);
        let shuffled = trained(&[2, 0, 3, 1]).score(query);

        assert_eq!(forward, reversed);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn closest_document_scores_highest() {
        let scores = trained(&[0, 1, 2, 3]).score("ordonnance du médecin");

        let (best, _) = scores
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert_eq!(best, "/docs/health/visit.pdf");
        assert!(!scores.contains_key("/docs/tax/2023.pdf"));
    }

    #[test]
    fn each_query_token_distributes_at_most_its_count() {
        let scorer = trained(&[0, 1, 2, 3]);
        let scores = scorer.score("solde solde inconnu");
        let total: f64 = scores.values().sum();

        // "solde" twice is shared by three labels, "inconnu" is unseen.
        assert!((total - 2.0).abs() < 1e-9, "total = {total}");
    }

    #[test]
    fn tokenizer_is_case_insensitive_and_unicode_aware() {
        let mut scorer = BayesScorer::new().unwrap();
        scorer.train("a", "Électricité FACTURE");
        scorer.train("b", "eau");

        let scores = scorer.score("électricité facture");
        assert_eq!(scores.len(), 1);
        assert!((scores["a"] - 2.0).abs() < 1e-9);
        assert_eq!(scorer.label_count(), 2);
    }
}
