//! Sync report builder
//!
//! Turns apply outcomes, export counts and plans into per-type summaries:
//! - One `EntityTypeSummary` per entity type per run
//! - Colored status lines for the console
//! - A JSON `SyncReport` with every summary and failure

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use colored::{ColoredString, Colorize};
use serde::Serialize;

use crate::sync::error::{ApplyError, OperationFailure};
use crate::sync::logic::execution::{ApplyOutcome, ApplyPlan};
use crate::sync::logic::schema_diff::SchemaDiffReport;
use crate::sync::types::{ChangeStatus, Classification};

/// Number of ids per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub new: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub retained: usize,
}

impl StatusCounts {
    pub fn from_classification(classification: &Classification) -> Self {
        Self {
            new: classification.new.len(),
            updated: classification.updated.len(),
            deleted: classification.deleted.len(),
            unchanged: classification.unchanged.len(),
            retained: 0,
        }
    }

    pub fn get(&self, status: ChangeStatus) -> usize {
        match status {
            ChangeStatus::New => self.new,
            ChangeStatus::Modified => self.updated,
            ChangeStatus::Deleted => self.deleted,
            ChangeStatus::Unchanged => self.unchanged,
            ChangeStatus::Retained => self.retained,
        }
    }

    pub fn total(&self) -> usize {
        self.new + self.updated + self.deleted + self.unchanged + self.retained
    }
}

/// Summary of one entity type in one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntityTypeSummary {
    pub name: String,
    pub label: String,
    pub counts: StatusCounts,
    /// Descriptors per status (unchanged entries are not listed)
    pub descriptors: BTreeMap<ChangeStatus, Vec<String>>,
    pub failures: Vec<OperationFailure>,
    /// Error that aborted the type, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

const LISTED: [ChangeStatus; 4] = [
    ChangeStatus::New,
    ChangeStatus::Modified,
    ChangeStatus::Deleted,
    ChangeStatus::Retained,
];

impl EntityTypeSummary {
    pub fn new(name: impl Into<String>, label: impl Into<String>, counts: StatusCounts) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            counts,
            ..Default::default()
        }
    }

    pub fn from_outcome(label: &str, outcome: &ApplyOutcome) -> Self {
        let mut counts = StatusCounts::from_classification(&outcome.classification);
        counts.retained = outcome.retained.len();

        let descriptors = LISTED
            .into_iter()
            .map(|status| {
                let listed = outcome
                    .described(status)
                    .into_iter()
                    .map(str::to_string)
                    .collect::<Vec<_>>();
                (status, listed)
            })
            .filter(|(_, listed)| !listed.is_empty())
            .collect();

        Self {
            descriptors,
            failures: outcome.failures.clone(),
            ..Self::new(&outcome.entity_type, label, counts)
        }
    }

    /// Summary of a plan that was not applied
    pub fn from_plan(label: &str, plan: &ApplyPlan) -> Self {
        let mut classification = plan.classification.clone();
        classification.deleted = plan.deletions.iter().cloned().collect();
        let mut counts = StatusCounts::from_classification(&classification);
        counts.retained = plan.retained.len();

        let mut descriptors = BTreeMap::new();
        let mut list = |status: ChangeStatus, ids: Vec<&String>| {
            if !ids.is_empty() {
                let described = ids
                    .into_iter()
                    .map(|id| plan.descriptors.get(id).unwrap_or(id).clone())
                    .collect::<Vec<String>>();
                descriptors.insert(status, described);
            }
        };
        list(ChangeStatus::New, plan.create_order().collect());
        list(ChangeStatus::Modified, plan.classification.updated.iter().collect());
        list(ChangeStatus::Deleted, plan.deletions.iter().collect());
        list(ChangeStatus::Retained, plan.retained.iter().collect());

        Self {
            descriptors,
            ..Self::new(&plan.entity_type, label, counts)
        }
    }

    /// Summary of a type that was aborted before any change
    pub fn failed(name: &str, label: &str, error: &ApplyError) -> Self {
        let failures = match error {
            ApplyError::Operations { failures, .. } => failures.clone(),
            _ => Vec::new(),
        };
        Self {
            failures,
            ..Self::errored(name, label, error)
        }
    }

    /// Summary of a step that failed outside the executor (fetch, file I/O)
    pub fn errored(name: &str, label: &str, error: impl std::fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(name, label, StatusCounts::default())
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.error.is_none()
    }

    /// `Flows       :: 🌱 2 new. 🔧 1 modified. 🗑  0 deleted. 🌲 3 unchanged.`
    pub fn status_line(&self) -> String {
        let head = format!("{:<11} ::", self.label);
        if let Some(error) = &self.error {
            return format!("{} {} {}", head, "✗".red().bold(), error.red());
        }
        if self.counts.total() == 0 {
            return format!("{} {}.", head, status_text("none", "🫥 ", None));
        }

        let mut parts: Vec<String> = [
            ChangeStatus::New,
            ChangeStatus::Modified,
            ChangeStatus::Deleted,
            ChangeStatus::Unchanged,
        ]
        .into_iter()
        .map(|status| {
            status_text(status.label(), status.symbol(), Some(self.counts.get(status))).to_string()
        })
        .collect();

        if self.counts.retained > 0 {
            let status = ChangeStatus::Retained;
            parts.push(
                status_text(status.label(), status.symbol(), Some(self.counts.retained))
                    .to_string(),
            );
        }
        if !self.failures.is_empty() {
            parts.push(format!("{} {} failed", "✗".red(), self.failures.len()));
        }

        format!("{} {}.", head, parts.join(". "))
    }
}

/// Colored `icon count label` text for one status
pub fn status_text(status: &str, icon: &str, count: Option<usize>) -> ColoredString {
    let text = match count {
        Some(n) => format!("{} {} {}", icon, n, status),
        None => format!("{} {}", icon, status),
    };
    match status {
        "new" => text.cyan(),
        "modified" => text.yellow(),
        "deleted" => text.red(),
        "unchanged" => text.green(),
        "retained" => text.magenta(),
        _ => text.blue(),
    }
}

/// Section banner, e.g. `── Schema ──`
pub fn banner(title: &str) -> String {
    format!("── {} ──", title).bold().to_string()
}

/// Receives one summary per entity type
pub trait ReportSink {
    fn record(&mut self, summary: &EntityTypeSummary);
}

/// Logs status lines, optionally followed by descriptors
#[derive(Debug, Clone, Default)]
pub struct ConsoleSink {
    pub show_descriptors: bool,
}

impl ConsoleSink {
    pub fn new(show_descriptors: bool) -> Self {
        Self { show_descriptors }
    }
}

impl ReportSink for ConsoleSink {
    fn record(&mut self, summary: &EntityTypeSummary) {
        if summary.is_success() {
            log::info!("{}", summary.status_line());
        } else {
            log::error!("{}", summary.status_line());
        }

        if self.show_descriptors {
            for (status, names) in &summary.descriptors {
                for name in names {
                    log::info!("    {} {}", status.symbol(), name);
                }
            }
        }

        for failure in &summary.failures {
            log::error!("    {}", failure);
        }
    }
}

/// Report of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub command: String,
    pub url: String,
    pub started_at: DateTime<Local>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Local>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaDiffReport>,
    /// Collection deletions dropped from the schema diff
    pub dropped_schema_deletions: Vec<String>,
    pub summaries: Vec<EntityTypeSummary>,
}

impl SyncReport {
    pub fn new(command: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            url: url.into(),
            started_at: Local::now(),
            finished_at: None,
            schema: None,
            dropped_schema_deletions: Vec::new(),
            summaries: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now());
    }

    pub fn failed_types(&self) -> Vec<&str> {
        self.summaries
            .iter()
            .filter(|s| !s.is_success())
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.summaries.iter().any(|s| !s.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &OperationFailure> {
        self.summaries.iter().flat_map(|s| s.failures.iter())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize sync report")
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        log::info!("Sync report written to: {}", path.display());
        Ok(())
    }
}

impl ReportSink for SyncReport {
    fn record(&mut self, summary: &EntityTypeSummary) {
        self.summaries.push(summary.clone());
    }
}

/// Forwards every summary to several sinks
pub struct Fanout<'a> {
    sinks: Vec<&'a mut dyn ReportSink>,
}

impl<'a> Fanout<'a> {
    pub fn new(sinks: Vec<&'a mut dyn ReportSink>) -> Self {
        Self { sinks }
    }
}

impl ReportSink for Fanout<'_> {
    fn record(&mut self, summary: &EntityTypeSummary) {
        for sink in self.sinks.iter_mut() {
            sink.record(summary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::error::OperationKind;
    use std::collections::BTreeSet;

    fn outcome() -> ApplyOutcome {
        let mut classification = Classification::default();
        classification.new = BTreeSet::from(["f1".to_string(), "f2".to_string()]);
        classification.updated = BTreeSet::from(["f3".to_string()]);
        classification.unchanged = BTreeSet::from(["f4".to_string(), "f5".to_string(), "f6".to_string()]);

        ApplyOutcome {
            entity_type: "flows".to_string(),
            classification,
            retained: BTreeSet::new(),
            retried: Vec::new(),
            failures: Vec::new(),
            descriptors: [("f1", "Signup-f1"), ("f2", "Digest-f2"), ("f3", "Cleanup-f3")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_status_line_matches_console_format() {
        colored::control::set_override(false);
        let summary = EntityTypeSummary::from_outcome("Flows", &outcome());

        assert_eq!(
            summary.status_line(),
            "Flows       :: 🌱 2 new. 🔧 1 modified. 🗑  0 deleted. 🌲 3 unchanged."
        );
        assert_eq!(
            summary.descriptors[&ChangeStatus::New],
            vec!["Signup-f1".to_string(), "Digest-f2".to_string()]
        );
        assert!(!summary.descriptors.contains_key(&ChangeStatus::Deleted));
    }

    #[test]
    fn test_empty_summary_says_none() {
        colored::control::set_override(false);
        let summary = EntityTypeSummary::new("webhooks", "Webhooks", StatusCounts::default());
        assert_eq!(summary.status_line(), "Webhooks    :: 🫥  none.");
    }

    #[test]
    fn test_failed_summary_keeps_failures() {
        let error = ApplyError::Operations {
            entity_type: "roles".to_string(),
            failures: vec![OperationFailure {
                entity_type: "roles".to_string(),
                operation: OperationKind::Delete,
                ids: vec!["r1".to_string()],
                message: "403".to_string(),
            }],
        };

        let summary = EntityTypeSummary::failed("roles", "Roles", &error);
        assert!(!summary.is_success());
        assert_eq!(summary.failures.len(), 1);

        let mut report = SyncReport::new("apply", "http://localhost:8055");
        report.record(&summary);
        assert!(report.has_failures());
        assert_eq!(report.failed_types(), vec!["roles"]);
    }

    #[test]
    fn test_report_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/sync.json");

        let mut report = SyncReport::new("apply", "http://localhost:8055");
        report.record(&EntityTypeSummary::from_outcome("Flows", &outcome()));
        report.finish();
        report.write_json(&path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["command"], "apply");
        assert_eq!(written["summaries"][0]["counts"]["new"], 2);
        assert_eq!(written["summaries"][0]["descriptors"]["modified"][0], "Cleanup-f3");
    }
}
