//! Report body composition.
//!
//! The generation endpoint hands a [`ComposeInput`] to a [`ReportComposer`]
//! and persists whatever comes back. [`BaselineComposer`] is the built-in
//! deterministic implementation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::CoreError;
use crate::types::DbId;

/// Sections every report body carries, in display order.
pub const REPORT_SECTIONS: &[&str] = &[
    "overview",
    "supplements",
    "medications",
    "nutrition",
    "exercise",
    "lifestyle",
    "labs",
    "mood",
    "symptoms",
];

pub const BASELINE_SUMMARY: &str = "We created a basic report based on the data available. \
Keep logging daily so we can make this more detailed next week.";

/// Summary stored on reports that were generated without credits.
pub const LOCKED_SUMMARY: &str =
    "Your weekly report is ready to unlock with a subscription or top-up credits.";

#[derive(Debug, Clone)]
pub struct ComposeInput {
    pub user_id: DbId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Summary of the previous ready report, if any.
    pub previous_summary: Option<String>,
}

/// One recommendation inside a section bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportItem {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ComposedReport {
    pub summary: String,
    pub data_summary: Value,
    pub report: Value,
}

/// Produces the body of a weekly report.
pub trait ReportComposer: Send + Sync {
    fn compose(&self, input: &ComposeInput) -> Result<ComposedReport, CoreError>;
}

/// Empty `{working, suggested, avoid}` buckets for every known section.
pub fn empty_sections() -> Map<String, Value> {
    REPORT_SECTIONS
        .iter()
        .map(|key| {
            (
                (*key).to_string(),
                json!({ "working": [], "suggested": [], "avoid": [] }),
            )
        })
        .collect()
}

/// Coerce an arbitrary sections object into the canonical shape: every
/// known section present, every bucket an array, unknown keys dropped.
pub fn normalize_sections(incoming: &Value) -> Map<String, Value> {
    let mut sections = empty_sections();
    let Some(incoming) = incoming.as_object() else {
        return sections;
    };

    for key in REPORT_SECTIONS {
        let Some(src) = incoming.get(*key).and_then(Value::as_object) else {
            continue;
        };
        let mut bucket = Map::new();
        for name in ["working", "suggested", "avoid"] {
            let items = match src.get(name) {
                Some(Value::Array(items)) => Value::Array(items.clone()),
                _ => Value::Array(Vec::new()),
            };
            bucket.insert(name.to_string(), items);
        }
        sections.insert((*key).to_string(), Value::Object(bucket));
    }
    sections
}

/// Data summary recorded on locked reports.
pub fn locked_data_summary() -> Value {
    json!({ "lockedReason": "insufficient_credits" })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineComposer;

impl ReportComposer for BaselineComposer {
    fn compose(&self, input: &ComposeInput) -> Result<ComposedReport, CoreError> {
        if input.period_end < input.period_start {
            return Err(CoreError::Validation(format!(
                "period_end {} precedes period_start {}",
                input.period_end, input.period_start
            )));
        }

        let days = (input.period_end - input.period_start).num_days() + 1;
        let mut sections = empty_sections();
        if let Some(previous) = input.previous_summary.as_deref().filter(|s| !s.is_empty()) {
            sections.insert(
                "overview".to_string(),
                json!({
                    "working": [ReportItem {
                        name: "Last week".to_string(),
                        reason: previous.to_string(),
                    }],
                    "suggested": [],
                    "avoid": [],
                }),
            );
        }

        Ok(ComposedReport {
            summary: BASELINE_SUMMARY.to_string(),
            data_summary: json!({
                "coverage": {
                    "periodStart": input.period_start,
                    "periodEnd": input.period_end,
                    "daysInPeriod": days,
                },
                "dataWarning": null,
            }),
            report: json!({
                "summary": BASELINE_SUMMARY,
                "sections": Value::Object(sections),
            }),
        })
    }
}
