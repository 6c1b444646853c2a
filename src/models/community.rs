//! Community clustering types.
//!
//! Communities are recreated by each detection run; a community is keyed by
//! `(id, level)` where level 0 is the finest partition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Significance grade assigned by the summarizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Significance {
    /// Peripheral cluster.
    Low,
    /// Notable cluster.
    Medium,
    /// Central cluster.
    High,
}

impl Significance {
    /// Parses a significance string (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            _ => None,
        }
    }

    /// Canonical upper-case string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

/// A cluster of entities produced by community detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    /// Cluster id from the detection algorithm.
    pub id: i64,
    /// Hierarchy depth; 0 is the finest level.
    pub level: u32,
    /// Parent community at `level + 1`, when part of a hierarchy.
    pub parent_id: Option<i64>,
    /// Report title.
    pub title: Option<String>,
    /// LLM-generated summary.
    pub summary: Option<String>,
    /// Themes identified by the summarizer.
    #[serde(default)]
    pub themes: Vec<String>,
    /// Significance grade.
    pub significance: Option<Significance>,
    /// Rating in [0, 10] from the summarizer.
    pub rating: Option<f32>,
    /// Number of member entities.
    pub member_count: u64,
    /// When the summary was last generated.
    pub summary_timestamp: Option<DateTime<Utc>>,
}

impl Community {
    /// Creates an unsummarized community.
    #[must_use]
    pub const fn new(id: i64, level: u32, member_count: u64) -> Self {
        Self {
            id,
            level,
            parent_id: None,
            title: None,
            summary: None,
            themes: Vec::new(),
            significance: None,
            rating: None,
            member_count,
            summary_timestamp: None,
        }
    }

    /// Comma-joined themes, for consumers of the legacy string form.
    #[must_use]
    pub fn themes_csv(&self) -> String {
        self.themes.join(", ")
    }
}

/// A single finding inside a community report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// One-line finding.
    pub summary: String,
    /// Supporting explanation.
    #[serde(default)]
    pub explanation: String,
    /// Importance in [0, 10].
    #[serde(default)]
    pub rating: f32,
}

/// Structured report returned by the community summarization prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityReport {
    /// Report title.
    pub title: String,
    /// Narrative summary.
    pub summary: String,
    /// Importance in [0, 10].
    #[serde(default)]
    pub rating: f32,
    /// Significance grade.
    #[serde(default = "default_significance")]
    pub significance: Significance,
    /// Themes covered by the community.
    #[serde(default)]
    pub themes: Vec<String>,
    /// Detailed findings.
    #[serde(default)]
    pub findings: Vec<Finding>,
}

fn default_significance() -> Significance {
    Significance::Medium
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_parses_with_defaults() {
        let json = r#"{"title": "Acme cluster", "summary": "Widget makers."}"#;
        let report: CommunityReport = serde_json::from_str(json).expect("parse");
        assert_eq!(report.significance, Significance::Medium);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn themes_csv_joins_in_order() {
        let mut community = Community::new(3, 0, 5);
        community.themes = vec!["antitrust".to_string(), "mergers".to_string()];
        assert_eq!(community.themes_csv(), "antitrust, mergers");
    }
}
