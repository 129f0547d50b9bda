//! Output formatting for classification and batch reports.

use crate::report::{BatchReport, ClassificationReport};

/// Supported output formats.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OutputFormat {
    Json,
    Yaml,
    Markdown,
    Table,
}

/// Formats a classification report in the requested output format.
pub fn format_report(
    report: &ClassificationReport,
    format: OutputFormat,
) -> Result<String, String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)
            .map_err(|e| format!("JSON serialization failed: {e}")),
        OutputFormat::Yaml => {
            serde_yaml::to_string(report).map_err(|e| format!("YAML serialization failed: {e}"))
        }
        OutputFormat::Markdown => Ok(report_to_markdown(report)),
        OutputFormat::Table => Ok(report_to_table(report)),
    }
}

/// Formats a batch report in the requested output format.
pub fn format_batch(batch: &BatchReport, format: OutputFormat) -> Result<String, String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(batch)
            .map_err(|e| format!("JSON serialization failed: {e}")),
        OutputFormat::Yaml => {
            serde_yaml::to_string(batch).map_err(|e| format!("YAML serialization failed: {e}"))
        }
        OutputFormat::Markdown => Ok(batch_to_markdown(batch)),
        OutputFormat::Table => Ok(batch_to_table(batch)),
    }
}

fn verdict(report: &ClassificationReport) -> String {
    match (&report.winner, report.winner_name()) {
        (Some(id), Some(name)) => format!("{id} ({name})"),
        (Some(id), None) => id.to_string(),
        (None, _) => "not test data".to_string(),
    }
}

fn report_to_markdown(report: &ClassificationReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("# Classification: {}\n\n", report.source));
    out.push_str(&format!("- **Verdict:** {}\n", verdict(report)));
    out.push_str(&format!("- **Confidence:** {:.3}\n", report.confidence));
    out.push_str(&format!(
        "- **Gate:** {} ({:.3}, {})\n",
        if report.gate.passed { "passed" } else { "rejected" },
        report.gate.confidence,
        report.gate.path
    ));
    if report.gate.passed {
        out.push_str(&format!("- **Calibration:** {}\n", report.calibration_path));
    }
    if let Some(ratio) = report.top_two_ratio {
        out.push_str(&format!("- **Top-two ratio:** {ratio:.2}\n"));
    }

    if !report.ranked.is_empty() {
        out.push_str("\n## Hypotheses\n\n");
        out.push_str("| Hypothesis | Posterior | Likelihood | Completeness | Quality | Uniqueness |\n");
        out.push_str("|------------|-----------|------------|--------------|---------|------------|\n");
        for entry in &report.ranked {
            out.push_str(&format!(
                "| `{}` | {:.4} | {:.4} | {:.2} | {:.2} | {:.2} |\n",
                entry.hypothesis,
                entry.posterior,
                entry.likelihood,
                entry.metrics.completeness,
                entry.metrics.quality,
                entry.metrics.uniqueness,
            ));
        }
    }

    out
}

fn report_to_table(report: &ClassificationReport) -> String {
    let mut out = String::new();
    let status = if report.gate.passed { "OK" } else { "REJECT" };
    let winner = report
        .winner
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string);
    out.push_str(&format!(
        "{:<32} {:<6} {:<14} conf={:.3} gate={:.3}",
        report.source, status, winner, report.confidence, report.gate.confidence,
    ));
    if let Some(ratio) = report.top_two_ratio {
        out.push_str(&format!(" ratio={ratio:.2}"));
    }
    out.push('\n');
    out
}

fn batch_to_markdown(batch: &BatchReport) -> String {
    let mut out = String::new();

    out.push_str("# Batch Classification\n\n");
    out.push_str(&format!("- **Documents:** {}\n", batch.total));
    out.push_str(&format!("- **Classified:** {}\n", batch.classified));
    out.push_str(&format!("- **Rejected by gate:** {}\n", batch.rejected));
    out.push_str(&format!("- **Failed:** {}\n", batch.failures.len()));

    let counts = batch.winner_counts();
    if !counts.is_empty() {
        out.push_str("\n## Formats\n\n");
        out.push_str("| Hypothesis | Documents |\n");
        out.push_str("|------------|-----------|\n");
        for (hypothesis, count) in counts {
            out.push_str(&format!("| `{hypothesis}` | {count} |\n"));
        }
    }

    if !batch.reports.is_empty() {
        out.push_str("\n## Documents\n\n");
        out.push_str("| Source | Verdict | Confidence |\n");
        out.push_str("|--------|---------|------------|\n");
        for report in &batch.reports {
            out.push_str(&format!(
                "| {} | {} | {:.3} |\n",
                report.source,
                verdict(report),
                report.confidence
            ));
        }
    }

    if !batch.failures.is_empty() {
        out.push_str("\n## Failures\n\n");
        for failure in &batch.failures {
            out.push_str(&format!(
                "- {} [{}]: {}\n",
                failure.source, failure.code, failure.detail
            ));
        }
    }

    out
}

fn batch_to_table(batch: &BatchReport) -> String {
    let mut out = String::new();
    for report in &batch.reports {
        out.push_str(&report_to_table(report));
    }
    for failure in &batch.failures {
        out.push_str(&format!("{:<32} FAIL   [{}]\n", failure.source, failure.code));
    }
    out.push_str(&format!(
        "{} documents: {} classified, {} rejected, {} failed\n",
        batch.total,
        batch.classified,
        batch.rejected,
        batch.failures.len()
    ));
    out
}
