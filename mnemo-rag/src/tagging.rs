//! Domain keyword tagging
//!
//! Matches chunk text against a built-in keyword map and emits category
//! tags for downstream retrieval filters. Matching is whole-word and
//! case-insensitive; each tag is emitted at most once per chunk, on the
//! first keyword that hits.
//!
//! The built-in catalog covers the EB-1A extraordinary-ability criteria
//! used by the case-ingestion flow.

use std::collections::BTreeMap;

use regex::Regex;

/// EB-1A criteria categories and their trigger keywords
fn builtin_catalog() -> Vec<(&'static str, Vec<&'static str>)> {
    vec![
        (
            "eb1a_awards",
            vec![
                "award",
                "prize",
                "recognition",
                "honor",
                "medal",
                "scholarship",
                "grant",
                "fellowship",
                "distinguished",
                "excellence",
                "outstanding",
                "best",
                "winner",
                "recipient",
                "rewarded",
            ],
        ),
        (
            "eb1a_membership",
            vec![
                "member",
                "fellow",
                "society",
                "association",
                "academy",
                "organization",
                "institute",
                "professional body",
                "elected",
                "inducted",
                "admission",
            ],
        ),
        (
            "eb1a_press",
            vec![
                "published",
                "featured",
                "interview",
                "article about",
                "media coverage",
                "press",
                "newspaper",
                "magazine",
                "journal featured",
                "profiled",
                "highlighted",
                "reported on",
            ],
        ),
        (
            "eb1a_judging",
            vec![
                "judge",
                "reviewer",
                "evaluated",
                "assessed",
                "panel",
                "committee",
                "referee",
                "peer review",
                "adjudicator",
                "examiner",
                "appraiser",
            ],
        ),
        (
            "eb1a_contribution",
            vec![
                "developed",
                "invented",
                "pioneered",
                "breakthrough",
                "innovation",
                "novel",
                "original",
                "first",
                "unique",
                "groundbreaking",
                "revolutionary",
                "created",
                "designed",
                "implemented",
            ],
        ),
        (
            "eb1a_scholarly",
            vec![
                "publication",
                "journal",
                "paper",
                "research",
                "citation",
                "cited",
                "author",
                "co-author",
                "published in",
                "conference",
                "proceedings",
                "dissertation",
                "thesis",
            ],
        ),
        (
            "eb1a_leadership",
            vec![
                "director",
                "head",
                "lead",
                "chief",
                "manager",
                "supervisor",
                "president",
                "chairman",
                "founder",
                "co-founder",
                "executive",
                "senior",
                "principal",
                "team lead",
            ],
        ),
        (
            "eb1a_salary",
            vec![
                "salary",
                "compensation",
                "earnings",
                "income",
                "remuneration",
                "wages",
                "pay",
                "bonus",
                "stock options",
                "total compensation",
            ],
        ),
        (
            "eb1a_commercial",
            vec![
                "revenue",
                "sales",
                "market",
                "commercial",
                "profit",
                "business",
                "product",
                "customers",
                "clients",
                "adoption",
                "deployment",
                "implementation",
                "success",
            ],
        ),
    ]
}

/// Whole-word keyword tagger over a category catalog
pub struct DomainTagger {
    categories: Vec<(String, Vec<Regex>)>,
}

impl DomainTagger {
    /// Tagger with the built-in EB-1A criteria catalog
    #[must_use]
    pub fn new() -> Self {
        Self::with_catalog(
            builtin_catalog()
                .into_iter()
                .map(|(tag, keywords)| {
                    (
                        tag.to_string(),
                        keywords.into_iter().map(String::from).collect(),
                    )
                })
                .collect(),
        )
    }

    /// Tagger over a custom `tag -> keywords` catalog
    ///
    /// Keywords are matched whole-word and case-insensitively; multi-word
    /// keywords match as phrases.
    #[must_use]
    pub fn with_catalog(catalog: Vec<(String, Vec<String>)>) -> Self {
        let categories = catalog
            .into_iter()
            .map(|(tag, keywords)| {
                let patterns = keywords
                    .iter()
                    .filter_map(|keyword| {
                        Regex::new(&format!(r"(?i)\b{}\b", regex::escape(keyword))).ok()
                    })
                    .collect();
                (tag, patterns)
            })
            .collect();
        Self { categories }
    }

    /// Tags whose keyword sets hit `text`, one emission per tag
    #[must_use]
    pub fn classify(&self, text: &str) -> Vec<String> {
        let mut tags = Vec::new();
        for (tag, patterns) in &self.categories {
            if patterns.iter().any(|p| p.is_match(text)) {
                tags.push(tag.clone());
            }
        }
        tags
    }

    /// Classify a batch of texts, returning per-text tags plus aggregate
    /// counts per tag
    #[must_use]
    pub fn classify_all(&self, texts: &[&str]) -> (Vec<Vec<String>>, BTreeMap<String, usize>) {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let per_text: Vec<Vec<String>> = texts
            .iter()
            .map(|text| {
                let tags = self.classify(text);
                for tag in &tags {
                    *counts.entry(tag.clone()).or_default() += 1;
                }
                tags
            })
            .collect();
        (per_text, counts)
    }
}

impl Default for DomainTagger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nobel_prize_hits_awards() {
        let tagger = DomainTagger::new();
        let tags = tagger.classify("He received the Nobel Prize for his research.");
        assert!(tags.contains(&"eb1a_awards".to_string()));
        // "research" also lands in the scholarly category.
        assert!(tags.contains(&"eb1a_scholarly".to_string()));
    }

    #[test]
    fn matching_is_case_insensitive_whole_word() {
        let tagger = DomainTagger::new();
        assert!(tagger
            .classify("She is a MEMBER of the academy")
            .contains(&"eb1a_membership".to_string()));
        // "remembered" must not hit the "member" keyword.
        let tags = tagger.classify("It is remembered fondly");
        assert!(!tags.contains(&"eb1a_membership".to_string()));
    }

    #[test]
    fn each_tag_emitted_once() {
        let tagger = DomainTagger::new();
        let tags = tagger.classify("An award and a prize and a medal");
        let awards = tags.iter().filter(|t| *t == "eb1a_awards").count();
        assert_eq!(awards, 1);
    }

    #[test]
    fn no_keywords_no_tags() {
        let tagger = DomainTagger::new();
        assert!(tagger.classify("nothing relevant whatsoever").is_empty());
    }

    #[test]
    fn classify_all_counts_mentions() {
        let tagger = DomainTagger::new();
        let (per_text, counts) = tagger.classify_all(&[
            "Won an award for the product",
            "Another award recipient",
        ]);
        assert_eq!(per_text.len(), 2);
        assert_eq!(counts["eb1a_awards"], 2);
    }

    #[test]
    fn custom_catalog() {
        let tagger = DomainTagger::with_catalog(vec![(
            "visa_type".to_string(),
            vec!["H-1B".to_string(), "EB-1A".to_string()],
        )]);
        assert_eq!(tagger.classify("Filed an EB-1A petition"), vec!["visa_type"]);
    }
}
