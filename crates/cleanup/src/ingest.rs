use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::CleanupError;
use crate::model::{AgencyRecord, NewAgency};
use crate::names::normalize_name;
use crate::store::RecordStore;
use crate::urls::{host, repair_candidate};

/// Phrases that mark a list header or filler line rather than an agency.
const HEADER_PHRASES: &[&str] = &[
    "agencies with",
    "other international",
    "find real estate",
    "search for",
    "look for",
    "list of",
    "here are",
    "the following",
    "some examples",
    "additional agencies",
    "more agencies",
    "other agencies",
    "for example",
    "examples include",
    "such as",
    "various agencies",
    "several agencies",
    "real estate companies",
    "international agencies",
    "local agencies",
];

fn fenced_json_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*(\[.*?\])\s*```").expect("fenced json pattern"))
}

fn list_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:\d+[.)]\s*|[-*]\s+)").expect("list item pattern"))
}

/// Labels that introduce a detail line, even when bulleted.
const FIELD_LABELS: &[&str] = &["website", "web", "url", "phone", "tel", "address", "description", "email"];

fn is_field_line(line: &str) -> bool {
    let body = line.trim_start_matches(['-', '*', ' ']).to_lowercase();
    FIELD_LABELS.iter().any(|l| body.starts_with(l))
}

fn scheme_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("url pattern"))
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\+?[\d\s\-()]{7,}").expect("phone pattern"))
}

/// A plausible agency name: at least 3 characters and not a list header.
pub fn is_valid_name(name: &str) -> bool {
    let name = name.trim();
    if name.chars().count() < 3 {
        return false;
    }
    let lower = name.to_lowercase();
    !HEADER_PHRASES.iter().any(|p| lower.contains(p))
}

/// Extract candidate agencies from a discovery response.
///
/// Tries a fenced ```` ```json ```` block, then the whole text as a JSON
/// array, then numbered or bulleted text. A fenced block that does not parse
/// is an error; anything else that is not JSON falls through to text.
pub fn parse_response(text: &str) -> Result<Vec<NewAgency>, CleanupError> {
    if let Some(caps) = fenced_json_re().captures(text) {
        let items: Vec<Value> = serde_json::from_str(&caps[1])
            .map_err(|e| CleanupError::Ingest(format!("fenced JSON block: {e}")))?;
        return Ok(from_json_items(&items));
    }

    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(from_json_items(&items));
    }

    Ok(from_text(text))
}

fn from_json_items(items: &[Value]) -> Vec<NewAgency> {
    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let name = normalize_name(&scalar(obj.get("name")?));
            if !is_valid_name(&name) {
                log::warn!("ingest: rejected name '{name}'");
                return None;
            }
            let field = |key: &str| obj.get(key).map(scalar).unwrap_or_default();
            Some(NewAgency {
                name,
                website: field("website"),
                phone: field("phone"),
                address: field("address"),
                description: field("description"),
                additional_info: String::new(),
            })
        })
        .collect()
}

/// Strings as-is, numbers and booleans stringified, null and containers empty.
fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn from_text(text: &str) -> Vec<NewAgency> {
    let mut agencies = Vec::new();
    let mut current: Option<NewAgency> = None;

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            agencies.extend(current.take());
            continue;
        }

        let is_item = list_item_re().is_match(line) || line.starts_with("**");
        if is_item && !is_field_line(line) {
            agencies.extend(current.take());
            let name = list_item_re().replace(line, "");
            let name = normalize_name(name.trim_end_matches(':'));
            if is_valid_name(&name) {
                current = Some(NewAgency {
                    name,
                    ..NewAgency::default()
                });
            } else {
                log::warn!("ingest: skipped list item '{line}'");
            }
            continue;
        }

        let Some(agency) = current.as_mut() else {
            continue;
        };
        let lower = line.to_lowercase();
        if lower.contains("website") || lower.contains("http") {
            agency.website = match scheme_url_re().find(line) {
                Some(m) => m.as_str().to_string(),
                None => strip_label(line, "website"),
            };
        } else if lower.contains("phone") || line.contains('+') {
            if let Some(m) = phone_re().find(line) {
                agency.phone = m.as_str().trim().to_string();
            }
        } else if lower.contains("address") {
            agency.address = strip_label(line, "address");
        } else if lower.contains("description") || line.chars().count() > 50 {
            agency.description = strip_label(line, "description");
        }
    }
    agencies.extend(current);
    agencies
}

/// Drop a leading "Label:" (any case, optional bullet).
fn strip_label(line: &str, label: &str) -> String {
    let trimmed = line.trim_start_matches(['-', '*', ' ']);
    match trimmed.get(..label.len()) {
        Some(head) if head.eq_ignore_ascii_case(label) => {
            trimmed[label.len()..].trim_start_matches([':', '*', ' ']).trim().to_string()
        }
        _ => trimmed.to_string(),
    }
}

pub fn provenance_note(date: NaiveDate) -> String {
    format!("Discovered via AI search on {}", date.format("%Y-%m-%d"))
}

/// Candidates split into what to insert and what already exists.
#[derive(Debug, Default)]
pub struct IngestPlan {
    pub accepted: Vec<NewAgency>,
    pub skipped: Vec<NewAgency>,
}

/// Drop candidates whose lowercased name or website host is already known,
/// either in the store or earlier in the same batch.
pub fn plan(candidates: Vec<NewAgency>, existing: &[AgencyRecord], date: NaiveDate) -> IngestPlan {
    let mut names: BTreeSet<String> = existing.iter().map(|r| r.name.trim().to_lowercase()).collect();
    let mut hosts: BTreeSet<String> = existing.iter().filter_map(|r| website_host(&r.website)).collect();
    let mut out = IngestPlan::default();

    for mut candidate in candidates {
        let name = candidate.name.trim().to_lowercase();
        let site = website_host(&candidate.website);
        let known_host = site.as_ref().is_some_and(|h| hosts.contains(h));
        if names.contains(&name) || known_host {
            log::info!("ingest: '{}' already known, skipped", candidate.name);
            out.skipped.push(candidate);
            continue;
        }
        names.insert(name);
        hosts.extend(site);
        candidate.additional_info = provenance_note(date);
        out.accepted.push(candidate);
    }
    out
}

fn website_host(website: &str) -> Option<String> {
    repair_candidate(website).and_then(|url| host(&url))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub parsed: usize,
    pub inserted: Vec<i64>,
    pub skipped: Vec<String>,
}

/// Parse a discovery response and insert the new agencies as pending.
pub fn ingest<S: RecordStore + ?Sized>(store: &mut S, text: &str, date: NaiveDate) -> Result<IngestReport, CleanupError> {
    let candidates = parse_response(text)?;
    let parsed = candidates.len();
    let existing = store.fetch_all()?;
    let plan = plan(candidates, &existing, date);

    let mut inserted = Vec::with_capacity(plan.accepted.len());
    for agency in &plan.accepted {
        inserted.push(store.insert_new(agency)?);
    }
    log::info!("ingest: {parsed} parsed, {} inserted, {} skipped", inserted.len(), plan.skipped.len());

    Ok(IngestReport {
        parsed,
        inserted,
        skipped: plan.skipped.into_iter().map(|a| a.name).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcessingStatus;
    use crate::store::MemoryStore;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn fenced_json_block() {
        let text = "Here are some agencies:\n```json\n[\n  {\"name\": \"Casa Sol\", \"website\": \"casasol.es\", \"phone\": 34600000000},\n  {\"website\": \"nameless.es\"}\n]\n```\nGood luck!";
        let agencies = parse_response(text).unwrap();
        assert_eq!(agencies.len(), 1);
        assert_eq!(agencies[0].name, "Casa Sol");
        assert_eq!(agencies[0].phone, "34600000000");
    }

    #[test]
    fn broken_fence_is_error() {
        let text = "```json\n[{\"name\": \"A\",]\n```";
        assert!(matches!(parse_response(text), Err(CleanupError::Ingest(_))));
    }

    #[test]
    fn bare_json_array() {
        let text = r#"[{"name": "Dom Polska", "address": null}, {"name": "Here are the results"}]"#;
        let agencies = parse_response(text).unwrap();
        assert_eq!(agencies.len(), 1);
        assert_eq!(agencies[0].name, "Dom Polska");
        assert_eq!(agencies[0].address, "");
    }

    #[test]
    fn numbered_text_fallback() {
        let text = "\
Here are agencies I found:

1. **Costa Homes**
   Website: https://costahomes.es
   Phone: +34 952 000 000
   Address: Calle Mayor 1, Marbella
2. Warsaw Estates
   - Website: https://warsawestates.pl
   - Description: Boutique agency focused on apartments in central Warsaw.
";
        let agencies = parse_response(text).unwrap();
        assert_eq!(agencies.len(), 2);
        assert_eq!(agencies[0].name, "Costa Homes");
        assert_eq!(agencies[0].website, "https://costahomes.es");
        assert_eq!(agencies[0].phone, "+34 952 000 000");
        assert_eq!(agencies[0].address, "Calle Mayor 1, Marbella");
        assert_eq!(agencies[1].name, "Warsaw Estates");
        assert_eq!(
            agencies[1].description,
            "Boutique agency focused on apartments in central Warsaw."
        );
    }

    #[test]
    fn header_and_short_names_rejected() {
        assert!(!is_valid_name("AB"));
        assert!(!is_valid_name("List of agencies in Marbella"));
        assert!(is_valid_name("ABC Realty"));
    }

    #[test]
    fn plan_skips_known_names_and_hosts() {
        let mut known = AgencyRecord::new(1, "Casa Sol");
        known.website = "https://www.casasol.es/".into();
        let candidates = vec![
            NewAgency { name: "casa sol".into(), ..NewAgency::default() },
            NewAgency { name: "Sol Homes".into(), website: "casasol.es".into(), ..NewAgency::default() },
            NewAgency { name: "Luna Homes".into(), ..NewAgency::default() },
            NewAgency { name: "Luna Homes".into(), ..NewAgency::default() },
        ];
        let plan = plan(candidates, &[known], day());
        assert_eq!(plan.accepted.len(), 1);
        assert_eq!(plan.accepted[0].name, "Luna Homes");
        assert_eq!(plan.accepted[0].additional_info, "Discovered via AI search on 2024-05-01");
        assert_eq!(plan.skipped.len(), 3);
    }

    #[test]
    fn ingest_inserts_pending() {
        let mut store = MemoryStore::new();
        let report = ingest(&mut store, r#"[{"name": "Prime Properties", "phone": "+34 1"}]"#, day()).unwrap();
        assert_eq!(report.inserted, vec![1]);
        let r = store.get(1).unwrap();
        assert_eq!(r.status, ProcessingStatus::Pending);
        assert_eq!(r.category, crate::model::Category::Unclassified);
    }
}
