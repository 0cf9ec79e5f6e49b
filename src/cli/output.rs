// Output formatting for the final supervision report

use crate::process::ProcessState;
use crate::supervisor::{SupervisorReport, UnitReport};
use chrono::Local;
use colored::*;
use std::time::Duration;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Print the per-unit terminal states and the overall outcome
pub fn print_report(report: &SupervisorReport) {
    print_unit_table(&report.units);

    match &report.first_failure {
        Some(name) => {
            let unit = report.unit(name);
            let cause = unit
                .and_then(|u| u.failure.as_ref())
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "{} first failure: {} ({})",
                "✗".red().bold(),
                name.cyan(),
                cause
            );
        }
        None => {
            println!("{} all units accounted for", "✓".green().bold());
        }
    }

    println!(
        "  finished at {} with exit code {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        report.exit_code
    );
}

fn print_unit_table(units: &[UnitReport]) {
    #[derive(Tabled)]
    struct UnitRow {
        #[tabled(rename = "Unit")]
        name: String,
        #[tabled(rename = "Mode")]
        mode: String,
        #[tabled(rename = "State")]
        state: String,
        #[tabled(rename = "PID")]
        pid: String,
        #[tabled(rename = "Uptime")]
        uptime: String,
        #[tabled(rename = "Exit")]
        exit: String,
    }

    let rows: Vec<UnitRow> = units
        .iter()
        .map(|u| UnitRow {
            name: u.name.clone(),
            mode: u.mode.to_string(),
            state: format_state_colored(&u.state),
            pid: u.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            uptime: u
                .uptime_secs
                .map(|s| format_duration(Duration::from_secs(s)))
                .unwrap_or_else(|| "-".to_string()),
            exit: u
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    println!("{}", table);
}

fn format_state_colored(state: &ProcessState) -> String {
    match state {
        ProcessState::Exited => state.to_string().green().to_string(),
        ProcessState::Failed => state.to_string().red().bold().to_string(),
        ProcessState::Running | ProcessState::Starting => state.to_string().cyan().to_string(),
        _ => state.to_string().yellow().to_string(),
    }
}

/// Format a duration as a compact human-readable string
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
