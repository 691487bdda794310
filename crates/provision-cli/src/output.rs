use provision_core::runner::{PhaseReport, StepStatus};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    // Calculate column widths
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  ").trim_end());

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

pub fn status_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Applied => "applied",
        StepStatus::Skipped => "skipped",
        StepStatus::NotApplicable => "n/a",
        StepStatus::Failed => "FAILED",
    }
}

/// Human-readable phase report: one row per attempted step, then the outcome.
pub fn print_report(report: &PhaseReport) {
    if !report.steps.is_empty() {
        let rows = report
            .steps
            .iter()
            .map(|s| {
                vec![
                    s.position.to_string(),
                    s.name.clone(),
                    status_label(s.status).to_string(),
                    s.detail.clone().unwrap_or_default(),
                ]
            })
            .collect();
        print_table(&["#", "STEP", "STATUS", "DETAIL"], rows);
    }
    println!("{} phase: {}", report.phase, report.outcome);
}
