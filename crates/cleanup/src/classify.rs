use serde::Serialize;

use crate::config::{ClassifyConfig, IndicatorSet};
use crate::model::{AgencyRecord, Category};
use crate::scoring::Weights;
use crate::urls::host;

/// Signals scored against each indicator set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Phone,
    Domain,
    Address,
    Description,
    Name,
}

/// How one record scored against one indicator set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionScore {
    pub label: String,
    pub score: f64,
    pub phone: bool,
    pub domain: bool,
    pub address_hits: usize,
    pub description_hits: usize,
    pub name_hits: usize,
}

pub struct Classifier<'a> {
    config: &'a ClassifyConfig,
    weights: Weights<Signal>,
}

impl<'a> Classifier<'a> {
    pub fn new(config: &'a ClassifyConfig) -> Self {
        let w = &config.weights;
        Self {
            config,
            weights: Weights::new([
                (Signal::Phone, w.phone),
                (Signal::Domain, w.domain),
                (Signal::Address, w.address),
                (Signal::Description, w.description),
                (Signal::Name, w.name),
            ]),
        }
    }

    /// Score a record against every indicator set, in config order.
    pub fn scores(&self, record: &AgencyRecord) -> Vec<RegionScore> {
        let phone = compact_phone(&record.phone);
        let domain = host(&record.website);
        let address = record.address.to_lowercase();
        let description = record.description.to_lowercase();
        let name = record.name.to_lowercase();

        self.config
            .regions
            .iter()
            .map(|set| {
                let phone_hit = phone_matches(&phone, set);
                let domain_hit = domain.as_deref().is_some_and(|d| domain_matches(d, set));
                let address_hits = count_tokens(&address, &set.address_tokens);
                let description_hits = count_tokens(&description, &set.keywords);
                let name_hits = count_tokens(&name, &set.name_tokens);

                let score = self.weights.score([
                    (Signal::Phone, phone_hit as usize),
                    (Signal::Domain, domain_hit as usize),
                    (Signal::Address, address_hits),
                    (Signal::Description, description_hits),
                    (Signal::Name, name_hits),
                ]);

                RegionScore {
                    label: set.label.clone(),
                    score,
                    phone: phone_hit,
                    domain: domain_hit,
                    address_hits,
                    description_hits,
                    name_hits,
                }
            })
            .collect()
    }

    /// Pick a category from the ranked scores.
    ///
    /// No set at threshold → insufficient data. Top two both at threshold and
    /// closer than the margin → dual region. Otherwise the top set wins.
    pub fn decide(&self, scores: &[RegionScore]) -> Category {
        let mut ranked: Vec<&RegionScore> = scores.iter().collect();
        // stable: equal scores keep config order
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let Some(top) = ranked.first() else {
            return Category::InsufficientData;
        };
        if top.score < self.config.threshold {
            return Category::InsufficientData;
        }
        if let Some(second) = ranked.get(1) {
            if second.score >= self.config.threshold && top.score - second.score < self.config.margin {
                return Category::DualRegion;
            }
        }
        Category::Region(top.label.clone())
    }

    pub fn classify(&self, record: &AgencyRecord) -> Category {
        self.decide(&self.scores(record))
    }
}

/// Digits and a leading `+` only.
fn compact_phone(phone: &str) -> String {
    phone
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

fn phone_matches(compact: &str, set: &IndicatorSet) -> bool {
    !compact.is_empty()
        && set
            .phone_prefixes
            .iter()
            .map(|p| compact_phone(p))
            .any(|p| !p.is_empty() && compact.starts_with(&p))
}

fn domain_matches(domain: &str, set: &IndicatorSet) -> bool {
    set.domain_suffixes
        .iter()
        .any(|s| domain.ends_with(&s.to_lowercase()))
        || set
            .domain_keywords
            .iter()
            .any(|k| domain.contains(&k.to_lowercase()))
}

/// Number of distinct tokens that occur in `haystack` (already lowercased).
fn count_tokens(haystack: &str, tokens: &[String]) -> usize {
    if haystack.trim().is_empty() {
        return 0;
    }
    let mut seen: Vec<String> = Vec::new();
    for token in tokens {
        let token = token.to_lowercase();
        if !token.is_empty() && haystack.contains(&token) && !seen.contains(&token) {
            seen.push(token);
        }
    }
    seen.len()
}

/// Classify every record in place. Returns how many categories changed.
pub fn classify_records(records: &mut [AgencyRecord], config: &ClassifyConfig) -> usize {
    let classifier = Classifier::new(config);
    let mut changed = 0;
    for record in records.iter_mut() {
        let category = classifier.classify(record);
        if category != record.category {
            log::debug!("type #{} '{}': {} -> {}", record.id, record.name, record.category, category);
            record.category = category;
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(phone: &str, website: &str, address: &str, description: &str) -> AgencyRecord {
        let mut r = AgencyRecord::new(1, "Agency");
        r.phone = phone.into();
        r.website = website.into();
        r.address = address.into();
        r.description = description.into();
        r
    }

    fn classify(r: &AgencyRecord) -> Category {
        let config = ClassifyConfig::default();
        Classifier::new(&config).classify(r)
    }

    #[test]
    fn strong_region_a() {
        let r = record("+34 600 000 000", "https://casasol.es", "Av. Ricardo Soriano, Marbella", "");
        let config = ClassifyConfig::default();
        let scores = Classifier::new(&config).scores(&r);
        assert_eq!(scores[0].label, "marbella");
        assert_eq!(scores[0].score, 7.0);
        assert!(scores[0].score > config.threshold);
        assert_eq!(scores[1].score, 0.0);
        assert_eq!(classify(&r), Category::Region("marbella".into()));
    }

    #[test]
    fn polish_city_with_diacritics() {
        let config = ClassifyConfig::default();
        let classifier = Classifier::new(&config);
        for city in ["Częstochowa", "Białystok", "Toruń", "Rzeszów"] {
            let r = record("", "", &format!("ul. Mickiewicza 5, {city}"), "");
            let polish = classifier.scores(&r).into_iter().find(|s| s.label == "polish").unwrap();
            assert_eq!(polish.address_hits, 1, "{city}");
        }

        let r = record("", "", "ul. Mickiewicza 5, 42-200 Częstochowa, Polska", "");
        assert_eq!(classify(&r), Category::Region("polish".into()));
    }

    #[test]
    fn phone_alone_is_enough() {
        let r = record("+48 22 123 45 67", "", "", "");
        assert_eq!(classify(&r), Category::Region("polish".into()));
        let r = record("0048 22 123 45 67", "", "", "");
        assert_eq!(classify(&r), Category::Region("polish".into()));
    }

    #[test]
    fn no_signals_is_insufficient() {
        let r = record("", "", "", "");
        assert_eq!(classify(&r), Category::InsufficientData);
    }

    #[test]
    fn single_keyword_is_insufficient() {
        let r = record("", "", "", "Agency with offices in Spain");
        assert_eq!(classify(&r), Category::InsufficientData);
    }

    #[test]
    fn conflicting_strong_signals_are_dual() {
        let r = record("+48 600 100 200", "https://sol.es", "", "");
        assert_eq!(classify(&r), Category::DualRegion);
    }

    #[test]
    fn clear_margin_wins_over_weaker_region() {
        // polish phone (3) vs spanish domain + two address tokens (5)
        let r = record("+48 600 100 200", "https://sol.es", "Marbella, Malaga", "");
        assert_eq!(classify(&r), Category::Region("marbella".into()));
    }

    #[test]
    fn tokens_counted_once() {
        let r = record("", "", "Marbella, Marbella, MARBELLA", "");
        let config = ClassifyConfig::default();
        let scores = Classifier::new(&config).scores(&r);
        assert_eq!(scores[0].address_hits, 1);
    }

    #[test]
    fn domain_keyword_counts_as_domain() {
        let r = record("", "https://marbella-villas.com", "", "");
        let config = ClassifyConfig::default();
        let scores = Classifier::new(&config).scores(&r);
        assert!(scores[0].domain);
        assert!(!scores[1].domain);
    }

    #[test]
    fn suffix_is_on_host_not_path() {
        let r = record("", "https://example.com/offers.pl", "", "");
        let config = ClassifyConfig::default();
        let scores = Classifier::new(&config).scores(&r);
        assert!(!scores[1].domain);
    }

    #[test]
    fn identical_records_same_category() {
        let a = record("+34 952 000 000", "https://x.com", "Warsaw office", "polska");
        let b = a.clone();
        assert_eq!(classify(&a), classify(&b));
    }

    #[test]
    fn zero_margin_breaks_ties_by_config_order() {
        let mut config = ClassifyConfig::default();
        config.margin = 0.0;
        let r = record("+48 600 100 200", "https://sol.es", "", "");
        // a zero margin never yields dual; the first configured set wins ties
        assert_eq!(Classifier::new(&config).classify(&r), Category::Region("marbella".into()));
    }

    #[test]
    fn classify_records_counts_changes() {
        let mut records = vec![record("+34 1", "", "", ""), record("", "", "", "")];
        let config = ClassifyConfig::default();
        assert_eq!(classify_records(&mut records, &config), 2);
        assert_eq!(classify_records(&mut records, &config), 0);
    }
}
