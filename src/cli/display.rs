//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use crate::cluster::{
    CycleRecord, Exclusion, Outcome, Preview, ReplaceError, ReplacementPlan, RosterEntry,
    RunSummary,
};
use crate::config::ReplaceConfig;

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "  (none)\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();

    for (i, header) in headers.iter().enumerate() {
        if i > 0 {
            output.push_str("   ");
        }
        output.push_str(&format!(
            "{:width$}",
            header.to_uppercase(),
            width = widths[i]
        ));
    }
    output.push('\n');

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                output.push_str("   ");
            }
            if i < widths.len() {
                output.push_str(&format!("{:width$}", cell, width = widths[i]));
            } else {
                output.push_str(cell);
            }
        }
        output.push('\n');
    }

    output
}

fn format_roster(entries: &[RosterEntry]) -> String {
    let rows = entries
        .iter()
        .map(|e| {
            vec![
                e.pool.name.clone(),
                e.initial.to_string(),
                e.remaining.to_string(),
            ]
        })
        .collect();
    format_table(&["pool", "initial", "remaining"], rows)
}

fn describe_exclusion(reason: &Exclusion) -> String {
    match reason {
        Exclusion::Target => "target pool".to_string(),
        Exclusion::InfraName(pattern) => format!("infra name /{}/", pattern),
        Exclusion::InfraLabel => "infra label".to_string(),
        Exclusion::NoReplicas => "no replicas".to_string(),
    }
}

// ============================================================================
// Dry-run display
// ============================================================================

/// Projected schedule for `--dry-run`
pub fn format_preview(preview: &Preview, config: &ReplaceConfig) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "masterswap v{} - Dry Run Mode\n\n",
        env!("CARGO_PKG_VERSION")
    ));
    output.push_str(&format!("Cluster:       {}\n", config.cluster_name));
    output.push_str(&format!("Cloud type:    {}\n", config.cloud_type));
    output.push_str(&format!("Manifest:      {}\n", config.manifest_path().display()));
    output.push_str(&format!("Instance type: {}\n", config.instance_type));
    output.push_str(&format!(
        "Target pool:   {} (currently {})\n",
        config.target,
        preview
            .target_replicas
            .map(|r| r.to_string())
            .unwrap_or_else(|| "absent".to_string())
    ));
    output.push_str(&format!(
        "Requested:     {} replicas, budget {:?}\n\n",
        config.requested_replicas, config.cycle_budget
    ));

    output.push_str(&format!(
        "Source pools ({} replicas):\n",
        preview.discovery.total_replicas
    ));
    output.push_str(&format_roster(preview.plan.entries()));

    if !preview.discovery.excluded.is_empty() {
        output.push_str("\nExcluded:\n");
        for (pool, reason) in &preview.discovery.excluded {
            output.push_str(&format!("  - {} ({})\n", pool.name, describe_exclusion(reason)));
        }
    }
    if !preview.discovery.skipped.is_empty() {
        output.push_str("\nSkipped (unreadable):\n");
        for skipped in &preview.discovery.skipped {
            output.push_str(&format!("  - {}: {}\n", skipped.pool.name, skipped.reason));
        }
    }

    output.push_str("\nSchedule:\n");
    let rows = preview
        .plan
        .schedule()
        .into_iter()
        .map(|c| {
            vec![
                c.index.to_string(),
                format!("{} -> {}", preview.plan.target().name, c.target_replicas),
                match (c.source, c.source_replicas) {
                    (Some(pool), Some(replicas)) => format!("{} -> {}", pool.name, replicas),
                    _ => "(roster exhausted)".to_string(),
                },
            ]
        })
        .collect();
    output.push_str(&format_table(&["cycle", "scale up", "scale down"], rows));

    if config.requested_replicas != preview.plan.total_original() {
        output.push_str(&format!(
            "\nWarning: requested {} replicas but found {} old masters\n",
            config.requested_replicas,
            preview.plan.total_original()
        ));
    }

    output.push_str("\nNo changes made. Remove --dry-run to execute.\n");
    output
}

// ============================================================================
// Run report
// ============================================================================

fn format_cycles(cycles: &[CycleRecord]) -> String {
    let rows = cycles
        .iter()
        .map(|c| {
            vec![
                c.index.to_string(),
                format!("{} -> {}", c.scale_up.pool.name, c.scale_up.replicas),
                format!("{}s", c.scale_up.duration_secs()),
                c.scale_down
                    .as_ref()
                    .map(|d| format!("{} -> {}", d.pool.name, d.replicas))
                    .unwrap_or_else(|| "-".to_string()),
                c.scale_down
                    .as_ref()
                    .map(|d| format!("{}s", d.duration_secs()))
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    format_table(&["cycle", "scale up", "took", "scale down", "took"], rows)
}

/// Final report of a successful run
pub fn format_summary(summary: &RunSummary) -> String {
    let mut output = String::new();

    let outcome = match summary.outcome {
        Outcome::Completed => "completed",
        Outcome::CompletedEarly => "completed early (roster exhausted)",
        Outcome::NothingToDo => "nothing to do (no source pools)",
    };
    output.push_str(&format!("Replacement {}\n", outcome));
    output.push_str(&format!("Run:      {}\n", summary.run_id));
    output.push_str(&format!(
        "Target:   {} at {} replicas\n",
        summary.target, summary.target_replicas
    ));
    output.push_str(&format!(
        "Cycles:   {} of {} completed\n",
        summary.cycles_completed(),
        summary.cycles_planned
    ));
    output.push_str(&format!(
        "Duration: {}s\n\n",
        (summary.finished_at - summary.started_at).num_seconds()
    ));

    if !summary.cycles.is_empty() {
        output.push_str(&format_cycles(&summary.cycles));
        output.push('\n');
    }
    if !summary.pools.is_empty() {
        output.push_str("Retired pools:\n");
        output.push_str(&format_roster(&summary.pools));
    }
    if !summary.skipped.is_empty() {
        output.push_str("\nSkipped (unreadable):\n");
        for skipped in &summary.skipped {
            output.push_str(&format!("  - {}: {}\n", skipped.pool.name, skipped.reason));
        }
    }

    output
}

/// Report for an aborted run: the error and the state the cluster was left in
pub fn format_abort(
    error: &ReplaceError,
    plan: Option<&ReplacementPlan>,
    cycles: &[CycleRecord],
) -> String {
    let mut output = String::new();

    output.push_str(&format!("Replacement ABORTED ({}): {}\n", error.kind(), error));

    let Some(plan) = plan else {
        output.push_str("Aborted before any replacement cycle; no pool was resized by a cycle.\n");
        return output;
    };

    output.push_str(&format!(
        "\nLast state: {} at {} replicas, {} old replicas remaining\n\n",
        plan.target(),
        plan.target_replicas(),
        plan.remaining_total()
    ));
    output.push_str(&format_roster(plan.entries()));

    if !cycles.is_empty() {
        output.push_str("\nFinished cycles:\n");
        output.push_str(&format_cycles(cycles));
    }

    output.push_str("\nThe cluster was not rolled back. Inspect it before resuming manually.\n");
    output
}
