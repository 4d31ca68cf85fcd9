//! Lenient parser for the summary text convention:
//!
//! ```text
//! Entities:
//! - Alice
//! - Acme Corp
//!
//! Relationships:
//! Alice -> works_at -> Acme Corp
//! ```
//!
//! Lines that do not fit the grammar are ignored, never rejected. Every
//! ignored line is logged at debug level and counted by reason.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metrics;

/// Leading list markers: digits, `.`, `-`, `*`, bullet and spaces.
static ENTITY_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9.\-*• ]+").expect("valid entity marker regex"));

static SOURCE_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\-*• ]+").expect("valid source marker regex"));

/// Quoted keys emitted when the backend answers with JSON.
static STRUCTURED_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(id|name|type|attributes)":"#).expect("valid structured key regex")
});

const ATTRIBUTE_PREFIXES: [&str; 4] = ["name:", "type:", "attributes:", "popularity:"];

/// Directed, labeled relationship between two entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub relation: String,
    pub target: String,
}

/// Entities and relationships found in one summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSummary {
    pub entities: Vec<String>,
    pub relationships: Vec<Relationship>,
    /// Non-blank lines that matched no rule.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Entities,
    Relationships,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    OutsideSection,
    StructuredData,
    AttributeLine,
    EmptyEntity,
    NoArrow,
    TooFewParts,
    EmptyEndpoint,
}

impl SkipReason {
    fn as_str(&self) -> &'static str {
        match self {
            SkipReason::OutsideSection => "outside_section",
            SkipReason::StructuredData => "structured_data",
            SkipReason::AttributeLine => "attribute_line",
            SkipReason::EmptyEntity => "empty_entity",
            SkipReason::NoArrow => "no_arrow",
            SkipReason::TooFewParts => "too_few_parts",
            SkipReason::EmptyEndpoint => "empty_endpoint",
        }
    }
}

fn is_structured(line: &str) -> bool {
    line.starts_with(['{', '}', '[', ']']) || STRUCTURED_KEY.is_match(line)
}

fn parse_entity(line: &str) -> Result<String, SkipReason> {
    let stripped = ENTITY_MARKERS.replace(line, "");
    let entity = stripped.replace("**", "");
    let entity = entity.trim();
    if entity.is_empty() {
        return Err(SkipReason::EmptyEntity);
    }
    if ATTRIBUTE_PREFIXES.iter().any(|p| entity.contains(p)) {
        return Err(SkipReason::AttributeLine);
    }
    Ok(entity.to_string())
}

fn parse_relationship(line: &str) -> Result<Relationship, SkipReason> {
    if !line.contains("->") {
        return Err(SkipReason::NoArrow);
    }
    let parts: Vec<&str> = line.split("->").map(str::trim).collect();
    if parts.len() < 3 {
        return Err(SkipReason::TooFewParts);
    }
    let source = SOURCE_MARKERS.replace(parts[0], "").trim().to_string();
    let target = parts[2].to_string();
    if source.is_empty() || target.is_empty() {
        return Err(SkipReason::EmptyEndpoint);
    }
    Ok(Relationship {
        source,
        relation: parts[1].to_string(),
        target,
    })
}

/// Parse one summary into entities and relationships.
pub fn parse_summary(summary: &str) -> ParsedSummary {
    let mut parsed = ParsedSummary::default();
    let mut section = Section::None;

    for raw in summary.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let lower = line.to_lowercase();
        if lower.contains("entities:") || (lower == "entities" && section != Section::Relationships) {
            section = Section::Entities;
            continue;
        }
        if lower.contains("relationships:") || lower == "relationships" {
            section = Section::Relationships;
            continue;
        }

        let outcome = if is_structured(line) {
            Err(SkipReason::StructuredData)
        } else {
            match section {
                Section::None => Err(SkipReason::OutsideSection),
                Section::Entities => parse_entity(line).map(|e| parsed.entities.push(e)),
                Section::Relationships => {
                    parse_relationship(line).map(|r| parsed.relationships.push(r))
                }
            }
        };

        if let Err(reason) = outcome {
            parsed.skipped += 1;
            metrics::record_skipped_line(reason.as_str());
            debug!(reason = reason.as_str(), line, "Skipped summary line");
        }
    }

    if parsed.skipped > 0 {
        debug!(
            entities = parsed.entities.len(),
            relationships = parsed.relationships.len(),
            skipped = parsed.skipped,
            "Parsed summary with skipped lines"
        );
    }
    parsed
}
