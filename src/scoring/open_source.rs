//! Open-source detection.
//!
//! Rule cascade, first hit wins: known license, repository link, explicit
//! flag, tag/name heuristic, otherwise not open source.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::SourceConfig;

/// SPDX identifiers accepted as open source (compared normalized)
const KNOWN_OPEN_SOURCE_LICENSES: &[&str] = &[
    "MIT",
    "APACHE-2.0",
    "GPL-2.0",
    "GPL-3.0",
    "LGPL-2.1",
    "LGPL-3.0",
    "AGPL-3.0",
    "BSD-2-CLAUSE",
    "BSD-3-CLAUSE",
    "ISC",
    "MPL-2.0",
    "EPL-2.0",
    "UNLICENSE",
    "0BSD",
];

fn repository_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:https?://|git@)(?:www\.)?(?:github\.com|gitlab\.com|bitbucket\.org|codeberg\.org|git\.sr\.ht)[/:][^/\s]+/[^/\s]+",
        )
        .expect("repository pattern is valid")
    })
}

fn heuristic_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(?:open[\s_-]?source|oss|foss)\b").expect("heuristic pattern is valid")
    })
}

/// Which rule decided the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpenSourceRule {
    License,
    Repository,
    ExplicitFlag,
    Heuristic,
    NoEvidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSourceVerdict {
    pub is_open_source: bool,
    pub rule: OpenSourceRule,
    pub evidence: Option<String>,
}

impl OpenSourceVerdict {
    fn yes(rule: OpenSourceRule, evidence: impl Into<String>) -> Self {
        Self {
            is_open_source: true,
            rule,
            evidence: Some(evidence.into()),
        }
    }
}

/// Normalize "Apache 2.0", "gpl-3.0-or-later" and friends to bare SPDX ids
fn normalize_license(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase().replace([' ', '_'], "-");
    let upper = upper
        .strip_suffix("-OR-LATER")
        .or_else(|| upper.strip_suffix("-ONLY"))
        .or_else(|| upper.strip_suffix('+'))
        .unwrap_or(&upper)
        .to_string();
    match upper.as_str() {
        "APACHE-2" | "APACHE" => "APACHE-2.0".to_string(),
        "GPLV3" | "GPL-3" => "GPL-3.0".to_string(),
        "GPLV2" | "GPL-2" => "GPL-2.0".to_string(),
        _ => upper,
    }
}

pub fn is_known_license(raw: &str) -> bool {
    let normalized = normalize_license(raw);
    KNOWN_OPEN_SOURCE_LICENSES.contains(&normalized.as_str())
}

pub fn is_repository_link(raw: &str) -> bool {
    repository_pattern().is_match(raw.trim())
}

/// Run the detection cascade for an app
pub fn detect_open_source(app_name: &str, source: &SourceConfig) -> OpenSourceVerdict {
    if let Some(license) = source.license.as_deref().filter(|l| is_known_license(l)) {
        return OpenSourceVerdict::yes(OpenSourceRule::License, license);
    }

    if let Some(repo) = source.repository.as_deref().filter(|r| is_repository_link(r)) {
        return OpenSourceVerdict::yes(OpenSourceRule::Repository, repo);
    }

    if let Some(flag) = source.open_source {
        return OpenSourceVerdict {
            is_open_source: flag,
            rule: OpenSourceRule::ExplicitFlag,
            evidence: Some(format!("openSource: {}", flag)),
        };
    }

    let heuristic = heuristic_pattern();
    if let Some(tag) = source.tags.iter().find(|t| heuristic.is_match(t)) {
        return OpenSourceVerdict::yes(OpenSourceRule::Heuristic, format!("tag '{}'", tag));
    }
    if heuristic.is_match(app_name) {
        return OpenSourceVerdict::yes(OpenSourceRule::Heuristic, format!("name '{}'", app_name));
    }

    OpenSourceVerdict {
        is_open_source: false,
        rule: OpenSourceRule::NoEvidence,
        evidence: None,
    }
}
