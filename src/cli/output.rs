//! Output formatting for CLI results

use clap::ValueEnum;
use colored::Colorize;

use crate::models::{Severity, StoredRule, Violation};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored text
    Text,
    /// Machine-readable JSON
    Json,
}

fn severity_colored(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::High => severity.to_string().red().bold(),
        Severity::Medium => severity.to_string().yellow(),
        Severity::Low => severity.to_string().normal(),
    }
}

/// Render recorded violations for the validate command.
pub fn render_violations(violations: &[Violation], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(violations).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Text => {
            if violations.is_empty() {
                return format!("{} no violations", "OK".green().bold());
            }
            let mut out = format!(
                "{} {} violation(s)\n",
                "FAIL".red().bold(),
                violations.len()
            );
            for v in violations {
                out.push_str(&format!(
                    "  [{}] {} ({}): {} observed {}, expected {}\n",
                    severity_colored(v.severity),
                    v.rule_id,
                    v.subject,
                    v.field,
                    v.observed.describe(),
                    v.expected
                ));
            }
            out
        }
    }
}

/// Render a rule summary for the rules command.
pub fn render_rules(rules: &[StoredRule], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(rules).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Text => {
            let mut out = format!("{} rule(s)\n", rules.len());
            for r in rules {
                out.push_str(&format!(
                    "  {} v{} [{}] {} : {} {} {}\n",
                    r.id().bold(),
                    r.version,
                    severity_colored(r.severity()),
                    r.spec.subject,
                    r.spec.field,
                    r.spec.operator,
                    r.spec.threshold.describe()
                ));
            }
            out
        }
    }
}
