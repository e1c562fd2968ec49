//! Heuristic attack signature detection.
//!
//! # Responsibilities
//! - Scan the decoded URL for path traversal, SQL injection and XSS
//! - Scan request bodies for SQL injection and XSS, except on endpoints
//!   that legitimately carry HTML or scraped content
//! - Report every hit; block only in production
//!
//! # Design Decisions
//! - Signatures are a static ordered list of (name, pattern)
//! - Patterns are compiled by the `regex` crate, whose finite automata run
//!   in time linear in the input; no signature can backtrack
//!   catastrophically
//! - `[\s+]` stands for whitespace so form-encoded spaces are covered

use percent_encoding::percent_decode_str;
use regex::Regex;
use std::sync::LazyLock;

use crate::config::GuardConfig;
use crate::security::context::{ClientContext, GuardOutcome, Rejection, RejectionCode, MSG_INVALID_REQUEST};
use crate::security::events::{SecurityEvent, SecurityEventKind};
use crate::security::state::SecurityState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreatCategory {
    PathTraversal,
    SqlInjection,
    Xss,
}

#[derive(Debug)]
pub struct Signature {
    pub name: &'static str,
    pub category: ThreatCategory,
    regex: Regex,
}

const SIGNATURES: &[(&str, ThreatCategory, &str)] = &[
    ("path_traversal", ThreatCategory::PathTraversal, r"\.\."),
    (
        "encoded_path_traversal",
        ThreatCategory::PathTraversal,
        r"(?i)%2e%2e|%252e|\.\.%2f|\.\.%5c|%c0%ae",
    ),
    (
        "sql_union_select",
        ThreatCategory::SqlInjection,
        r"(?i)\bunion[\s+]+(?:all[\s+]+)?select\b",
    ),
    (
        "sql_tautology",
        ThreatCategory::SqlInjection,
        r#"(?i)['"\s+)]or[\s+]+(?:\d+[\s+]*=[\s+]*\d|'[^']*'[\s+]*=[\s+]*'|"[^"]*"[\s+]*=[\s+]*")"#,
    ),
    (
        "sql_drop_statement",
        ThreatCategory::SqlInjection,
        r"(?i);[\s+]*drop[\s+]+(?:table|database)\b",
    ),
    (
        "sql_comment",
        ThreatCategory::SqlInjection,
        r#"['"][\s+]*--|/\*.*?\*/"#,
    ),
    ("xss_script_tag", ThreatCategory::Xss, r"(?i)<[\s/]*script"),
    ("xss_javascript_uri", ThreatCategory::Xss, r"(?i)javascript[\s+]*:"),
    (
        "xss_event_handler",
        ThreatCategory::Xss,
        r#"(?i)[\s"'/<+]on[a-z]{3,}[\s+]*="#,
    ),
    ("xss_vbscript_uri", ThreatCategory::Xss, r"(?i)vbscript[\s+]*:"),
];

static COMPILED: LazyLock<Vec<Signature>> = LazyLock::new(|| {
    SIGNATURES
        .iter()
        .filter_map(|&(name, category, pattern)| match Regex::new(pattern) {
            Ok(regex) => Some(Signature {
                name,
                category,
                regex,
            }),
            Err(e) => {
                tracing::error!(signature = name, error = %e, "Invalid detection signature skipped");
                None
            }
        })
        .collect()
});

/// The compiled signature list, in evaluation order.
pub fn signatures() -> &'static [Signature] {
    &COMPILED
}

/// Signature names matching a request URL (path and query).
pub fn scan_url(uri: &str) -> Vec<&'static str> {
    let decoded = percent_decode_str(uri).decode_utf8_lossy();
    signatures()
        .iter()
        .filter(|s| s.regex.is_match(&decoded) || s.regex.is_match(uri))
        .map(|s| s.name)
        .collect()
}

/// Signature names matching a request body. Path traversal is a URL-only
/// concern and is not checked here.
pub fn scan_body(body: &str) -> Vec<&'static str> {
    let decoded = percent_decode_str(body).decode_utf8_lossy();
    signatures()
        .iter()
        .filter(|s| s.category != ThreatCategory::PathTraversal)
        .filter(|s| s.regex.is_match(body) || s.regex.is_match(&decoded))
        .map(|s| s.name)
        .collect()
}

/// Endpoints that legitimately receive HTML or SQL-looking payloads.
pub fn body_scan_exempt(config: &GuardConfig, path: &str) -> bool {
    config
        .body_scan_exempt_paths
        .iter()
        .any(|p| path.starts_with(p.as_str()))
}

impl SecurityState {
    /// Pattern detector guard.
    pub fn inspect_patterns(&self, ctx: &ClientContext) -> GuardOutcome {
        let config = self.config();
        let mut matched = scan_url(&ctx.uri);

        if !body_scan_exempt(&config, &ctx.path) {
            if let Some(body) = ctx.raw_body.as_ref().filter(|b| !b.is_empty()) {
                for name in scan_body(&String::from_utf8_lossy(body)) {
                    if !matched.contains(&name) {
                        matched.push(name);
                    }
                }
            }
        }

        if matched.is_empty() {
            return GuardOutcome::Continue;
        }

        let block = config.is_production();
        self.emit(
            SecurityEvent::new(
                SecurityEventKind::SuspiciousPattern,
                &ctx.ip,
                ctx.method.as_str(),
                &ctx.path,
            )
            .with_detail(matched)
            .blocked(block),
        );

        if block {
            GuardOutcome::Reject(Rejection::new(RejectionCode::InvalidRequest, MSG_INVALID_REQUEST))
        } else {
            GuardOutcome::Continue
        }
    }
}
