use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::config::UrlConfig;
use crate::model::AgencyRecord;

const LEADING_JUNK: &[char] = &['[', '(', '<', '"', '\'', '*', '`'];
const TRAILING_JUNK: &[char] = &[')', ']', '>', '.', ',', ';', ':', '/', '!', '?', '"', '\'', '*', '`'];

fn markdown_link() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // [text](url) or a capture that lost its head: text](url)
    RE.get_or_init(|| Regex::new(r"\]\(([^)\s]+)\)").expect("markdown link pattern"))
}

fn domain_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,}(?::\d+)?(?:[/?#]\S*)?$")
            .expect("domain shape pattern")
    })
}

fn scheme_in_text() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)https?://[^\s<>"'\[\]{}|\\^`]+"#).expect("scheme url pattern"))
}

fn www_in_text() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\bwww\.[^\s<>"'\[\]{}|\\^`]+"#).expect("www pattern"))
}

fn bare_domain_in_text() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b[a-z0-9][a-z0-9.-]*\.([a-z]{2,})\b(?:/[^\s<>"'\[\]{}|\\^`]*)?"#)
            .expect("bare domain pattern")
    })
}

fn email_in_text() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b[a-z0-9._%+-]+@([a-z0-9.-]+\.[a-z]{2,})\b").expect("email pattern")
    })
}

/// Turn one captured value into a usable URL, or `None` if it is not one.
///
/// - markdown links resolve to their target
/// - leading brackets and trailing punctuation are trimmed
/// - a scheme-less value with a plausible domain shape gets `https://`
pub fn repair_candidate(raw: &str) -> Option<String> {
    let mut s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(caps) = markdown_link().captures(s) {
        if let Some(target) = caps.get(1) {
            s = target.as_str();
        }
    }

    s = s.trim_start_matches(|c: char| c.is_whitespace() || LEADING_JUNK.contains(&c));
    let lower = s.to_ascii_lowercase();

    if lower.starts_with("http://") || lower.starts_with("https://") {
        // free text after the URL ("https://x.es (main office)") is not part of it
        let head = s.split_whitespace().next().unwrap_or("");
        let url = trim_trailing(head);
        if !is_plausible(url) {
            return None;
        }
        let scheme_len = if lower.starts_with("https://") { 8 } else { 7 };
        return Some(format!("{}{}", &lower[..scheme_len], &url[scheme_len..]));
    }

    let candidate = trim_trailing(s);
    if domain_shape().is_match(candidate) {
        let url = format!("https://{candidate}");
        if is_plausible(&url) {
            return Some(url);
        }
    }

    None
}

/// Closing brackets go only when they have no opener inside the value.
fn trim_trailing(mut s: &str) -> &str {
    loop {
        s = s.trim_end_matches(|c: char| {
            c.is_whitespace() || (TRAILING_JUNK.contains(&c) && !matches!(c, ')' | ']'))
        });
        match s.chars().last() {
            Some(close @ (')' | ']')) if !is_balanced_closer(s, close) => s = &s[..s.len() - 1],
            _ => return s,
        }
    }
}

fn is_balanced_closer(s: &str, close: char) -> bool {
    let open = if close == ')' { '(' } else { '[' };
    s.matches(open).count() >= s.matches(close).count()
}

/// Scheme is http(s), a dotted host parses, and no whitespace anywhere.
fn is_plausible(url: &str) -> bool {
    if url.chars().any(char::is_whitespace) {
        return false;
    }
    match Url::parse(url) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed
                    .host_str()
                    .is_some_and(|h| h.contains('.') && !h.starts_with('.') && !h.ends_with('.'))
        }
        Err(_) => false,
    }
}

/// Find the first URL-shaped substring in free text.
///
/// Preference order: explicit scheme, `www.` prefix, bare domain with a known
/// TLD, then the domain of a non-free-mail email address.
pub fn extract_from_text(text: &str, config: &UrlConfig) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }

    for m in scheme_in_text().find_iter(text) {
        if let Some(url) = repair_candidate(m.as_str()) {
            return Some(url);
        }
    }

    for m in www_in_text().find_iter(text) {
        if let Some(url) = repair_candidate(m.as_str()) {
            return Some(url);
        }
    }

    for caps in bare_domain_in_text().captures_iter(text) {
        let (Some(whole), Some(tld)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        // skip the domain half of an email and fragments of a longer token
        let before = text[..whole.start()].chars().next_back();
        let after = text[whole.end()..].chars().next();
        if matches!(before, Some('@' | '.' | '/' | '-')) || after == Some('@') {
            continue;
        }
        let tld = tld.as_str().to_ascii_lowercase();
        if !config.known_tlds.iter().any(|t| t.eq_ignore_ascii_case(&tld)) {
            continue;
        }
        if let Some(url) = repair_candidate(whole.as_str()) {
            return Some(url);
        }
    }

    for caps in email_in_text().captures_iter(text) {
        let Some(domain) = caps.get(1) else { continue };
        let domain = domain.as_str().to_ascii_lowercase();
        if config.ignored_email_domains.iter().any(|d| d.eq_ignore_ascii_case(&domain)) {
            continue;
        }
        if let Some(url) = repair_candidate(&domain) {
            return Some(url);
        }
    }

    None
}

/// Resolve a record's website: repair the field itself, else look inside the
/// field's text, else inside the description. Empty means "no known site".
pub fn repair_website(website: &str, description: &str, config: &UrlConfig) -> String {
    repair_candidate(website)
        .or_else(|| extract_from_text(website, config))
        .or_else(|| extract_from_text(description, config))
        .unwrap_or_default()
}

/// Repair every record's website in place. Returns how many changed.
pub fn repair_websites(records: &mut [AgencyRecord], config: &UrlConfig) -> usize {
    let mut changed = 0;
    for record in records.iter_mut() {
        let repaired = repair_website(&record.website, &record.description, config);
        if repaired != record.website {
            if record.website.trim().is_empty() {
                log::debug!("website #{}: extracted '{}'", record.id, repaired);
            } else if repaired.is_empty() {
                log::debug!("website #{}: dropped unusable '{}'", record.id, record.website);
            } else {
                log::debug!("website #{}: '{}' -> '{}'", record.id, record.website, repaired);
            }
            record.website = repaired;
            changed += 1;
        }
    }
    changed
}

/// Lowercased host of a repaired website, without a leading `www.`.
pub fn host(website: &str) -> Option<String> {
    let parsed = Url::parse(website.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cfg() -> UrlConfig {
        UrlConfig::default()
    }

    #[test]
    fn bare_domain_gets_scheme() {
        assert_eq!(repair_candidate("example.com").as_deref(), Some("https://example.com"));
        assert_eq!(repair_candidate("www.casa.es/contact").as_deref(), Some("https://www.casa.es/contact"));
    }

    #[test]
    fn markdown_artifacts_trimmed() {
        assert_eq!(repair_candidate("[https://a.com/).").as_deref(), Some("https://a.com"));
        assert_eq!(repair_candidate("https://a.com,").as_deref(), Some("https://a.com"));
        assert_eq!(repair_candidate("(https://a.com/page)").as_deref(), Some("https://a.com/page"));
    }

    #[test]
    fn balanced_parens_stay() {
        assert_eq!(
            repair_candidate("https://a.com/foo(bar)").as_deref(),
            Some("https://a.com/foo(bar)")
        );
        assert_eq!(
            repair_candidate("(https://a.com/foo(bar)).").as_deref(),
            Some("https://a.com/foo(bar)")
        );
        assert_eq!(
            extract_from_text("Visit https://a.com/path/(x)", &cfg()).as_deref(),
            Some("https://a.com/path/(x)")
        );
        assert_eq!(repair_website("https://a.com/foo(bar)", "", &cfg()), "https://a.com/foo(bar)");
    }

    #[test]
    fn markdown_link_target_used() {
        assert_eq!(
            repair_candidate("[Sol Homes](https://solhomes.es/)").as_deref(),
            Some("https://solhomes.es")
        );
        assert_eq!(
            repair_candidate("Sol Homes](https://solhomes.es)").as_deref(),
            Some("https://solhomes.es")
        );
    }

    #[test]
    fn scheme_url_kept() {
        assert_eq!(repair_candidate("http://foo.es").as_deref(), Some("http://foo.es"));
        assert_eq!(repair_candidate("https://x.pl (main office)").as_deref(), Some("https://x.pl"));
    }

    #[test]
    fn malformed_rejected() {
        assert_eq!(repair_candidate(""), None);
        assert_eq!(repair_candidate("N/A"), None);
        assert_eq!(repair_candidate("not available"), None);
        assert_eq!(repair_candidate("e.g."), None);
        assert_eq!(repair_candidate("https://localhost"), None);
        assert_eq!(repair_candidate("casa sol.es"), None);
    }

    #[test]
    fn description_fallback() {
        assert_eq!(
            repair_website("", "Visit us at http://foo.es today", &cfg()),
            "http://foo.es"
        );
        assert_eq!(
            repair_website("n/a", "Find us on www.dom.pl.", &cfg()),
            "https://www.dom.pl"
        );
        assert_eq!(
            repair_website("", "Check costa-homes.com for listings", &cfg()),
            "https://costa-homes.com"
        );
    }

    #[test]
    fn email_domain_fallback() {
        assert_eq!(
            repair_website("", "Write to info@sol-homes.es", &cfg()),
            "https://sol-homes.es"
        );
        // free-mail providers are not agency sites
        assert_eq!(repair_website("", "Write to agent@gmail.com", &cfg()), "");
    }

    #[test]
    fn unknown_tld_in_text_ignored() {
        assert_eq!(repair_website("", "Open Mon.-Fri. from 9 to 5", &cfg()), "");
        assert_eq!(repair_website("", "see file.txt", &cfg()), "");
    }

    #[test]
    fn nothing_found_is_empty() {
        assert_eq!(repair_website("", "", &cfg()), "");
        assert_eq!(repair_website("   ", "Family-run agency", &cfg()), "");
    }

    #[test]
    fn host_strips_www() {
        assert_eq!(host("https://www.Casa.es/x").as_deref(), Some("casa.es"));
        assert_eq!(host("https://casa.es").as_deref(), Some("casa.es"));
        assert_eq!(host(""), None);
    }

    #[test]
    fn changed_count() {
        let mut a = AgencyRecord::new(1, "A");
        a.website = "a.es".into();
        let mut b = AgencyRecord::new(2, "B");
        b.website = "https://b.es".into();
        let mut records = vec![a, b];
        assert_eq!(repair_websites(&mut records, &cfg()), 1);
        assert_eq!(records[0].website, "https://a.es");
        assert_eq!(repair_websites(&mut records, &cfg()), 0);
    }

    proptest! {
        #[test]
        fn output_has_scheme_and_no_trailing_junk(
            website in "[a-z\\[\\]().,/: ]{0,6}(https?://)?[a-z]{1,8}\\.(es|pl|com)[/).,\\]]{0,3}",
            description in "[a-z .@]{0,30}",
        ) {
            let out = repair_website(&website, &description, &cfg());
            if !out.is_empty() {
                prop_assert!(out.starts_with("http://") || out.starts_with("https://"));
                let last = out.chars().last().unwrap();
                prop_assert!(
                    !TRAILING_JUNK.contains(&last) || (matches!(last, ')' | ']') && is_balanced_closer(&out, last)),
                    "{}",
                    out
                );
                prop_assert_eq!(repair_website(&out, &description, &cfg()), out.clone());
            }
        }
    }
}
