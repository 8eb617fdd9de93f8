//! Terminal rendering of health reports

use colored::Colorize;
use tabled::{
    builder::Builder,
    settings::{Alignment, Modify, Style, object::Rows},
};

use super::runner::HealthCheckReport;

/// Renders the report as a table followed by a summary
pub fn format_report(report: &HealthCheckReport) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Check", "Status", "Duration", "Message"]);
    for (name, result) in &report.results {
        builder.push_record([
            name.clone(),
            result.status.as_colored_str(),
            format!("{:.2?}", result.duration),
            result.message.clone(),
        ]);
    }

    let mut table = builder.build();
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    format!("{}\n{}", table, format_summary(report))
}

fn format_summary(report: &HealthCheckReport) -> String {
    let mut lines = vec![
        String::new(),
        "Summary".bold().underline().to_string(),
        format!("  Total checks: {}", report.total),
        format!("  {} Passed: {}", "✓".green(), report.passed),
    ];
    if report.warned > 0 {
        lines.push(format!("  {} Warned: {}", "⚠".yellow(), report.warned));
    }
    if report.failed > 0 {
        lines.push(format!("  {} Failed: {}", "✗".red(), report.failed));
    }
    lines.push(String::new());

    let overall = match (report.is_healthy(), report.has_warnings()) {
        (false, _) => "Overall: UNHEALTHY".red().bold(),
        (true, true) => "Overall: HEALTHY (with warnings)".yellow().bold(),
        (true, false) => "Overall: HEALTHY".green().bold(),
    };
    lines.push(format!("  {}", overall));
    lines.join("\n")
}

/// Renders the findings of every check that reported any
pub fn format_details(report: &HealthCheckReport) -> String {
    let mut out = String::new();
    for (name, result) in &report.results {
        if result.details.is_empty() {
            continue;
        }
        out.push_str(&format!("\n{} details:\n", name.bold()));
        for line in &result.details {
            out.push_str(&format!("  {}\n", line));
        }
    }
    out
}

/// Prints table, summary and details to stdout
pub fn print_report(report: &HealthCheckReport) {
    println!("{}", format_report(report));
    print!("{}", format_details(report));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{CheckResult, HealthCheckRunner, SystemCheck};

    struct Noisy;

    impl SystemCheck for Noisy {
        fn name(&self) -> &'static str {
            "Noisy"
        }

        fn check(&self) -> CheckResult {
            CheckResult::warn("skipped a device").with_detail("raw device 'glove': unknown kind")
        }
    }

    #[test]
    fn test_report_lists_checks_and_details() {
        colored::control::set_override(false);
        let report = HealthCheckRunner::new().add_check(Noisy).run();
        let table = format_report(&report);
        assert!(table.contains("Noisy"));
        assert!(table.contains("HEALTHY (with warnings)"));
        let details = format_details(&report);
        assert!(details.contains("unknown kind"));
    }
}
