//! Configuration validation with unknown field detection.

use serde_json::{Map, Value};
use std::collections::HashSet;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &[
    "home",
    "bootstrap",
    "scanner",
    "deployer",
    "registry",
    "shutdown_timeout_secs",
    "logging",
];

/// Known fields for each section.
const KNOWN_BOOTSTRAP: &[&str] = &["enabled", "watched_dir", "poll_interval_ms", "initial_delay_ms"];
const KNOWN_SCANNER: &[&str] = &["enabled", "watched_dir", "poll_interval_ms"];
const KNOWN_DEPLOYER: &[&str] = &["poll_interval_ms"];
const KNOWN_REGISTRY: &[&str] = &["data_dir"];
const KNOWN_LOGGING: &[&str] = &["format", "level", "file"];

const KNOWN_LOG_FORMATS: &[&str] = &["pretty", "component", "json"];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

/// Report keys of `obj` not listed in `known`. Returns whether any were found.
fn check_keys(
    obj: &Map<String, Value>,
    known: &[&str],
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut has_unknown = false;
    for key in obj.keys() {
        if known_set.contains(key.as_str()) {
            continue;
        }
        has_unknown = true;
        let msg = match suggest_field(key, known) {
            Some(suggestion) => format!("Unknown field '{}', {}", key, suggestion),
            None => format!("Unknown field '{}'", key),
        };
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        diagnostics.push(Diagnostic::new(DiagnosticLevel::Error, path, msg));
    }
    has_unknown
}

/// Validate a raw JSON config value against known field names.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "",
                "Config must be a JSON object",
            ));
            return diagnostics;
        }
    };

    diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON"));

    let mut has_unknown = check_keys(obj, KNOWN_TOP_LEVEL, "", &mut diagnostics);
    let sections: [(&str, &[&str]); 5] = [
        ("bootstrap", KNOWN_BOOTSTRAP),
        ("scanner", KNOWN_SCANNER),
        ("deployer", KNOWN_DEPLOYER),
        ("registry", KNOWN_REGISTRY),
        ("logging", KNOWN_LOGGING),
    ];
    for (section, known) in sections {
        if let Some(section_obj) = obj.get(section).and_then(|v| v.as_object()) {
            has_unknown |= check_keys(section_obj, known, section, &mut diagnostics);
        }
    }

    if !has_unknown {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "All fields recognized",
        ));
    }

    // A zero interval would spin the poll loop.
    for section in ["bootstrap", "scanner", "deployer"] {
        let interval = obj
            .get(section)
            .and_then(|v| v.get("poll_interval_ms"))
            .and_then(|v| v.as_u64());
        if interval == Some(0) {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                format!("{}.poll_interval_ms", section),
                "Must be greater than 0",
            ));
        }
    }

    if let Some(format) = obj
        .get("logging")
        .and_then(|v| v.get("format"))
        .and_then(|v| v.as_str())
    {
        if !KNOWN_LOG_FORMATS.contains(&format) {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "logging.format",
                format!(
                    "Unknown format '{}', expected one of {}",
                    format,
                    KNOWN_LOG_FORMATS.join(", ")
                ),
            ));
        }
    }

    let watched = |section: &str| {
        obj.get(section)
            .and_then(|v| v.get("watched_dir"))
            .and_then(|v| v.as_str())
            .map(|s| s.trim_end_matches('/').to_string())
    };
    if let (Some(bootstrap), Some(scanner)) = (watched("bootstrap"), watched("scanner")) {
        if bootstrap == scanner {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Warn,
                "scanner.watched_dir",
                "Same directory as bootstrap.watched_dir, packages would be deployed twice",
            ));
        }
    }

    diagnostics
}
