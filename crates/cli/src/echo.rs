use std::time::Duration;

use owo_colors::OwoColorize;
use waymark_core::{BatchSummary, DomainResult};

use crate::VERSION;

/// Print a styled banner for verbose mode
pub fn print_banner() {
    eprintln!(
        "\n{} {} {}",
        "Waymark".bold().bright_blue(),
        "v".dimmed(),
        VERSION.dimmed()
    );
    eprintln!("{}", "Extract page metadata from archived snapshots\n".dimmed());
}

/// Print a domain that just started
pub fn print_progress(domain: &str) {
    eprintln!("{} {}", "→".dimmed(), domain.bright_cyan());
}

/// Print one finished domain with its snapshot counts
pub fn print_domain_result(result: &DomainResult) {
    let failed = result.error_count();
    let counts = format!("{} snapshots", result.snapshots.len());
    if failed == 0 {
        eprintln!("{} {} {}", "✓".green(), result.domain.bright_green(), counts.dimmed());
    } else {
        eprintln!(
            "{} {} {} {}",
            "✓".yellow(),
            result.domain.bright_yellow(),
            counts.dimmed(),
            format!("({} failed)", failed).yellow()
        );
    }

    if let Some(category) = &result.category {
        eprintln!("  {} {}", "Category:".dimmed(), category.bright_white());
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message.bright_green());
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message.bright_yellow());
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message.bright_red());
}

/// Print the batch summary
pub fn print_summary(summary: &BatchSummary, elapsed: Duration) {
    eprintln!("{}", "═".repeat(60).dimmed());
    eprintln!(
        "  {} {}  {} {}  {} {}",
        "Domains:".dimmed(),
        summary.total.to_string().bright_white(),
        "Succeeded:".dimmed(),
        summary.successful.to_string().bright_green(),
        "Failed:".dimmed(),
        if summary.failed == 0 {
            summary.failed.to_string().dimmed().to_string()
        } else {
            summary.failed.to_string().bright_red().to_string()
        }
    );
    eprintln!("  {} {:.2}s", "Elapsed:".dimmed(), elapsed.as_secs_f64());
}
