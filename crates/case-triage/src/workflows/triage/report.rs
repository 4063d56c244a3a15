use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    ActionDirective, CaseStatus, ItemStatus, PendencyKind, TriageResult, TriageWarning,
};

#[derive(Debug, Clone, Serialize)]
pub struct ItemRowView {
    pub name: String,
    pub mandatory: bool,
    pub status: ItemStatus,
    pub status_label: &'static str,
    pub source_label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendencyView {
    pub item_name: String,
    pub kind: PendencyKind,
    pub kind_label: &'static str,
    pub description: String,
    pub required_action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_deadline: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionView {
    pub kind_label: &'static str,
    pub detail: String,
}

/// Structured payload handed to report renderers.
#[derive(Debug, Clone, Serialize)]
pub struct TriageReport {
    pub case_id: String,
    pub status: CaseStatus,
    pub status_label: &'static str,
    pub generated_at: DateTime<Utc>,
    pub conforming: usize,
    pub total: usize,
    pub items: Vec<ItemRowView>,
    pub pendencies: Vec<PendencyView>,
    pub actions: Vec<ActionView>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl TriageReport {
    pub fn from_result(result: &TriageResult) -> Self {
        let items: Vec<ItemRowView> = result
            .items
            .iter()
            .map(|entry| {
                let status = entry.status();
                ItemRowView {
                    name: entry.item.name.clone(),
                    mandatory: entry.item.mandatory,
                    status,
                    status_label: status.label(),
                    source_label: entry.source.label(),
                    document: entry
                        .matched_document
                        .as_ref()
                        .map(|document| document.filename.clone()),
                }
            })
            .collect();

        let pendencies = result
            .pendencies
            .iter()
            .map(|pendency| PendencyView {
                item_name: pendency.item_name.clone(),
                kind: pendency.kind,
                kind_label: pendency.kind.label(),
                description: pendency.description.clone(),
                required_action: pendency.required_action.clone(),
                suggested_deadline: pendency.suggested_deadline.clone(),
            })
            .collect();

        let actions = result.actions.iter().map(action_view).collect();

        let warnings = result
            .warnings
            .iter()
            .map(|warning| match warning {
                TriageWarning::UnknownCandidate { item_name, named } => {
                    format!("{item_name}: classifier named unknown document '{named}'")
                }
                TriageWarning::ClassifierUnavailable {
                    item_name,
                    attempts,
                    detail,
                } => format!("{item_name}: classifier unavailable after {attempts} attempts ({detail})"),
                TriageWarning::RemediationFailed { item_name, detail } => {
                    format!("{item_name}: automatic generation failed ({detail})")
                }
            })
            .collect();

        Self {
            case_id: result.case_id.to_string(),
            status: result.overall_status,
            status_label: result.overall_status.label(),
            generated_at: result.generated_at,
            conforming: items
                .iter()
                .filter(|row| row.status == ItemStatus::Conforme)
                .count(),
            total: items.len(),
            items,
            pendencies,
            actions,
            warnings,
        }
    }
}

fn action_view(action: &ActionDirective) -> ActionView {
    let detail = match action {
        ActionDirective::MoveCard { target_phase } => format!("move card to {target_phase}"),
        ActionDirective::NotifyChannel { recipient, message } => {
            format!("notify {recipient}: {message}")
        }
        ActionDirective::GenerateDocument {
            document_type,
            identifier,
            ..
        } => format!("{document_type} generated for {identifier}"),
    };
    ActionView {
        kind_label: action.label(),
        detail,
    }
}

/// Both renderings of one result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedReport {
    pub detailed: String,
    pub summary: String,
}

/// Phrases the structured payload for humans. Swappable for a language model.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, report: &TriageReport) -> RenderedReport;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownReportRenderer;

impl ReportRenderer for MarkdownReportRenderer {
    fn render(&self, report: &TriageReport) -> RenderedReport {
        RenderedReport {
            detailed: detailed(report),
            summary: summary(report),
        }
    }
}

fn detailed(report: &TriageReport) -> String {
    let mut out = String::new();
    writeln!(out, "# Triage report: case {}", report.case_id).expect("write title");
    writeln!(out).expect("write blank");
    writeln!(out, "- **Status**: {}", report.status_label).expect("write status");
    writeln!(
        out,
        "- **Generated at**: {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
    .expect("write timestamp");
    writeln!(
        out,
        "- **Conforming items**: {}/{}",
        report.conforming, report.total
    )
    .expect("write counts");

    out.push_str("\n## Checklist\n\n| Item | Mandatory | Status | Document |\n|---|---|---|---|\n");
    for row in &report.items {
        writeln!(
            out,
            "| {} | {} | {} | {} |",
            row.name,
            if row.mandatory { "yes" } else { "no" },
            row.status_label,
            row.document.as_deref().unwrap_or("-")
        )
        .expect("write item row");
    }

    out.push_str("\n## Pendencies\n\n");
    if report.pendencies.is_empty() {
        out.push_str("No pendencies.\n");
    }
    for pendency in &report.pendencies {
        writeln!(
            out,
            "- **{}** ({}): {}",
            pendency.item_name, pendency.kind_label, pendency.description
        )
        .expect("write pendency");
        writeln!(out, "  - Action: {}", pendency.required_action).expect("write action");
        if let Some(deadline) = &pendency.suggested_deadline {
            writeln!(out, "  - Deadline: {deadline}").expect("write deadline");
        }
    }

    out.push_str("\n## Actions\n\n");
    for (index, action) in report.actions.iter().enumerate() {
        writeln!(out, "{}. `{}` {}", index + 1, action.kind_label, action.detail)
            .expect("write action row");
    }

    if !report.warnings.is_empty() {
        out.push_str("\n## Warnings\n\n");
        for warning in &report.warnings {
            writeln!(out, "- {warning}").expect("write warning");
        }
    }

    out
}

fn summary(report: &TriageReport) -> String {
    let mut out = String::new();
    writeln!(out, "Case {}: {}", report.case_id, report.status_label).expect("write headline");
    writeln!(
        out,
        "{}/{} items conforming",
        report.conforming, report.total
    )
    .expect("write counts");

    let blocking: Vec<&str> = report
        .pendencies
        .iter()
        .filter(|pendency| pendency.kind == PendencyKind::Blocking)
        .map(|pendency| pendency.item_name.as_str())
        .collect();
    if !blocking.is_empty() {
        writeln!(out, "Blocking: {}", blocking.join(", ")).expect("write blocking");
    }
    out
}
