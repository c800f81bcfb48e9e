//! Format checking reports for human consumption.

use crate::checker::{CheckReport, FoundBug, ReplayReport};
use weft_replay::BugRecord;

/// Format a checking report for human consumption.
pub fn format_report(report: &CheckReport) -> String {
    let mut output = String::new();
    let stats = &report.stats;

    output.push_str("═══════════════════════════════════════════════════════════════════════\n");
    output.push_str(&format!("  weft report: {}\n", report.program));
    output.push_str("═══════════════════════════════════════════════════════════════════════\n\n");

    // Summary
    output.push_str(&format!("Strategy:               {}\n", report.strategy));
    output.push_str(&format!("Seed:                   {}\n", report.seed));
    output.push_str(&format!("Iterations:             {}\n", stats.iterations));
    output.push_str(&format!("Unique schedules:       {}\n", stats.unique_schedules));
    output.push_str(&format!("Total events:           {}\n", stats.total_events));
    output.push_str(&format!("Elapsed:                {:.2?}\n", stats.elapsed));
    if report.stopped_early {
        output.push_str("Stopped early:          fail-fast\n");
    }
    output.push('\n');

    // Outcomes
    output.push_str("─── Outcomes ──────────────────────────────────────────────────────────\n");
    output.push_str(&format!("Completed:              {}\n", stats.completed));
    output.push_str(&format!("Deadlocks:              {}\n", stats.deadlocks));
    output.push_str(&format!("Assertion failures:     {}\n", stats.assertion_failures));
    if stats.budget_exceeded > 0 {
        output.push_str(&format!("Budget exceeded:        {}\n", stats.budget_exceeded));
    }
    if stats.replay_mismatches > 0 {
        output.push_str(&format!("Replay mismatches:      {}\n", stats.replay_mismatches));
    }
    if stats.pruned > 0 {
        output.push_str(&format!("Pruned by assume:       {}\n", stats.pruned));
    }
    output.push('\n');

    // Bug details
    if !report.bugs.is_empty() {
        output.push_str("─── Bugs Found ────────────────────────────────────────────────────────\n");
        for (i, bug) in report.bugs.iter().take(10).enumerate() {
            output.push_str(&format!("\n{}. Iteration {}\n", i + 1, bug.iteration));
            output.push_str(&format_bug(bug));
        }
        if report.bugs.len() > 10 {
            output.push_str(&format!("\n... and {} more\n", report.bugs.len() - 10));
        }
        output.push('\n');
    } else {
        output.push_str("─── No Bugs Found ─────────────────────────────────────────────────────\n");
        output.push_str("No deadlocks or assertion failures detected.\n\n");
    }

    output.push_str("═══════════════════════════════════════════════════════════════════════\n");

    output
}

/// Format one bug with its reproduction details.
pub fn format_bug(bug: &FoundBug) -> String {
    let mut output = String::new();

    output.push_str(&format!("   Outcome:      {}\n", bug.outcome));
    output.push_str(&format!("   Events:       {}\n", bug.trace.len()));
    output.push_str(&format!("   Grants:       {}\n", bug.trace.grants.len()));
    if let Some(event) = bug.trace.failure_event() {
        output.push_str(&format!("   Last event:   {}\n", event));
    }
    match &bug.record_path {
        Some(path) => output.push_str(&format!("   Record:       {}\n", path.display())),
        None => output.push_str("   Record:       not persisted\n"),
    }

    output
}

/// Format the result of replaying a bug record.
pub fn format_replay(record: &BugRecord, replay: &ReplayReport) -> String {
    let mut output = String::new();

    output.push_str("═══════════════════════════════════════════════════════════════════════\n");
    output.push_str(&format!("  weft replay: {}\n", record.file_stem()));
    output.push_str("═══════════════════════════════════════════════════════════════════════\n\n");
    output.push_str(&format!("Recorded outcome:       {}\n", record.outcome));
    output.push_str(&format!("Replayed outcome:       {}\n", replay.result.outcome));
    if replay.reproduced(record) {
        output.push_str("✅ Bug reproduced\n\n");
    } else {
        output.push_str("❌ Replay did not reproduce the recording\n\n");
    }
    output.push_str(&replay.verification.to_string());
    output
}
