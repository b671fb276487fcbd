/// Domain extraction and matching logic for focus tracking and blocking
use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

/// Extract the normalized domain of a tab URL
///
/// Algorithm:
/// 1. Parse URL (must be absolute)
/// 2. Reject anything that is not http or https (chrome://, about:, extension pages, ...)
/// 3. Take the lowercase hostname
/// 4. Strip a leading "www."
///
/// Examples:
/// - https://www.google.com/search → google.com
/// - https://mail.google.com → mail.google.com
/// - chrome://extensions → None
pub fn extract_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    let host = parsed.host_str()?;
    let domain = strip_www(&host.to_lowercase()).to_string();

    if domain.is_empty() { None } else { Some(domain) }
}

/// Normalize a domain typed by the user ("reddit.com", "https://www.reddit.com/r/rust")
///
/// Input without a scheme is treated as https. The result must look like a hostname.
pub fn normalize_domain_input(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let candidate = if input.starts_with("http://") || input.starts_with("https://") {
        input.to_string()
    } else {
        format!("https://{input}")
    };

    extract_domain(&candidate).filter(|domain| hostname_pattern().is_match(domain))
}

/// Whether `candidate` is `blocked` or one of its subdomains
///
/// Both sides are compared with "www." stripped, so blocking `example.com`
/// covers `mail.example.com` but never `example.com.evil.com`.
pub fn matches_domain(candidate: &str, blocked: &str) -> bool {
    let candidate = strip_www(candidate);
    let blocked = strip_www(blocked);

    if blocked.is_empty() {
        return false;
    }

    candidate == blocked
        || candidate
            .strip_suffix(blocked)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Get the top N domains by accumulated time
pub fn top_domains(totals: &HashMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut domain_vec: Vec<(String, u64)> = totals
        .iter()
        .map(|(domain, ms)| (domain.clone(), *ms))
        .collect();

    // Sort by time descending, then by domain name ascending
    domain_vec.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    domain_vec.into_iter().take(n).collect()
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

fn hostname_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)*$")
            .unwrap_or_else(|_| unreachable!("hostname pattern is a valid regex"))
    })
}
