//! Text and JSON rendering of plans and reports.

use anyhow::{Context, Result};
use std::fmt::Write;

use nightshift_scheduler::{SchedulePlan, ScheduleReport};

pub fn print_plan(plan: &SchedulePlan, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(plan).context("failed to serialize plan")?;
        println!("{out}");
    } else {
        print!("{}", render_plan(plan));
    }
    Ok(())
}

pub fn print_report(report: &ScheduleReport, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(report).context("failed to serialize report")?;
        println!("{out}");
    } else {
        print!("{}", render_report(report));
    }
    Ok(())
}

fn render_plan(plan: &SchedulePlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} plan for {}", plan.action, plan.filter);
    let _ = writeln!(out, "  matched:  {}", plan.matched.len());
    push_ids(&mut out, "excluded", plan.excluded.iter());
    push_ids(&mut out, "skipped", plan.skipped.iter());
    push_ids(&mut out, "targets", plan.targets.iter());
    out
}

fn render_report(report: &ScheduleReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}={} (run {})",
        report.action, report.tag_key, report.tag_value, report.run_id
    );
    let _ = writeln!(out, "  matched:  {}", report.matched.len());
    push_ids(&mut out, "excluded", report.excluded.iter());
    push_ids(&mut out, "skipped", report.skipped.iter());
    push_ids(&mut out, "targets", report.targets.iter());
    let watched: usize = report.alarms.iter().map(|a| a.alarm_names.len()).sum();
    let _ = writeln!(
        out,
        "  alarms:   {} watched, {} changed",
        watched,
        report.alarms_mutated.len()
    );
    for failure in &report.alarm_failures {
        let _ = writeln!(
            out,
            "  alarm failure: {} ({:?}): {}",
            failure.instance_id, failure.phase, failure.error
        );
    }
    let elapsed = report.finished_at - report.started_at;
    let _ = writeln!(out, "  took:     {}ms", elapsed.num_milliseconds());
    out
}

fn push_ids<'a>(out: &mut String, label: &str, ids: impl Iterator<Item = &'a String>) {
    let ids: Vec<&str> = ids.map(String::as_str).collect();
    let head = format!("{label}:");
    if ids.is_empty() {
        let _ = writeln!(out, "  {head:<10}none");
    } else {
        let _ = writeln!(out, "  {head:<10}{}", ids.join(" "));
    }
}
