//! Domain trust scoring.
//!
//! Pure lookup, no I/O: exact domain table first, then the registrable
//! parent domain, then TLD suffixes, then a neutral default.  Malformed
//! URLs score 0.3; blocklisted domains score 0.0 and are removed during
//! candidate filtering.

use url::Url;

/// Domains whose results are never worth showing for financial guidance.
const BLOCKLIST: &[&str] = &[
    "pinterest.com",
    "quora.com",
    "answers.com",
    "ehow.com",
    "wikihow.com",
    "slideshare.net",
    "scribd.com",
];

/// Exact-domain trust table.  Government and regulator sites outrank
/// everything; established financial publications and institutions sit in
/// the 0.8–0.9 band.
const DOMAIN_SCORES: &[(&str, f32)] = &[
    // Government / regulatory.
    ("irs.gov", 1.0),
    ("treasury.gov", 1.0),
    ("consumerfinance.gov", 1.0),
    ("sec.gov", 1.0),
    ("federalreserve.gov", 1.0),
    ("ssa.gov", 1.0),
    ("fdic.gov", 1.0),
    ("ftc.gov", 1.0),
    ("investor.gov", 1.0),
    ("medicare.gov", 1.0),
    ("studentaid.gov", 1.0),
    ("hud.gov", 1.0),
    // Major financial publications.
    ("investopedia.com", 0.9),
    ("wsj.com", 0.9),
    ("bloomberg.com", 0.9),
    ("nerdwallet.com", 0.85),
    ("bankrate.com", 0.85),
    ("morningstar.com", 0.85),
    ("kiplinger.com", 0.8),
    ("forbes.com", 0.8),
    ("fool.com", 0.8),
    ("marketwatch.com", 0.8),
    ("cnbc.com", 0.8),
    // Recognized institutions.
    ("fidelity.com", 0.85),
    ("vanguard.com", 0.85),
    ("schwab.com", 0.85),
    ("chase.com", 0.8),
    ("bankofamerica.com", 0.8),
    ("wellsfargo.com", 0.8),
];

const DEFAULT_SCORE: f32 = 0.5;
const MALFORMED_SCORE: f32 = 0.3;

fn exact_score(host: &str) -> Option<f32> {
    DOMAIN_SCORES
        .iter()
        .find(|(domain, _)| *domain == host)
        .map(|(_, score)| *score)
}

fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str().map(|h| h.to_lowercase())
}

/// Whether the URL's host is (or is a subdomain of) a blocklisted domain.
pub fn is_blocklisted(url: &str) -> bool {
    let Some(host) = host_of(url) else {
        return false;
    };
    BLOCKLIST
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

/// Trust score for a URL on a 0.0 – 1.0 scale.
pub fn score_url(url: &str) -> f32 {
    let Some(host) = host_of(url) else {
        return MALFORMED_SCORE;
    };

    if is_blocklisted(url) {
        return 0.0;
    }

    if let Some(score) = exact_score(&host) {
        return score;
    }

    // Walk up to the registrable parent: "www.irs.gov" → "irs.gov".
    let mut rest = host.as_str();
    while let Some(dot) = rest.find('.') {
        rest = &rest[dot + 1..];
        if let Some(score) = exact_score(rest) {
            return score;
        }
    }

    if host.ends_with(".gov") {
        1.0
    } else if host.ends_with(".edu") {
        0.95
    } else {
        DEFAULT_SCORE
    }
}
