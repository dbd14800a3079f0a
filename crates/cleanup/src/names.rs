use std::sync::OnceLock;

use regex::Regex;

use crate::model::AgencyRecord;

/// "<digits><punctuation>" list markers followed by whitespace or the end of
/// the name, e.g. "12. " or "3) ".
fn ordinal_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+[.):\-](?:\s+|$)").expect("ordinal prefix pattern"))
}

/// Strip list numbering and markdown bold from a display name.
///
/// Repeats until nothing changes, so `normalize_name(normalize_name(x)) ==
/// normalize_name(x)` for every input.
pub fn normalize_name(raw: &str) -> String {
    let mut name = raw.trim();
    loop {
        let before = name;

        if let Some(m) = ordinal_prefix().find(name) {
            name = name[m.end()..].trim();
        }
        if let Some(rest) = name.strip_prefix("**") {
            let inner = rest.strip_suffix("**").unwrap_or(rest);
            if !inner.contains("**") {
                name = inner.trim();
            }
        }

        if name == before {
            return name.to_string();
        }
    }
}

/// Normalize every record's name in place. Returns how many changed; records
/// whose name is already clean are not touched.
pub fn normalize_names(records: &mut [AgencyRecord]) -> usize {
    let mut changed = 0;
    for record in records.iter_mut() {
        let cleaned = normalize_name(&record.name);
        if cleaned != record.name {
            log::debug!("name #{}: '{}' -> '{}'", record.id, record.name, cleaned);
            record.name = cleaned;
            changed += 1;
        }
    }
    changed
}
