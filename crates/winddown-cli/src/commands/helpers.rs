//! Helper utility functions for CLI commands

use anyhow::Result;
use chrono::{DateTime, Local};
use std::collections::BTreeSet;
use tabled::{Table, Tabled};
use winddown_core::{BlockSet, Weekday};

#[derive(Tabled)]
struct AppRow {
    #[tabled(rename = "App")]
    name: String,
    #[tabled(rename = "Process")]
    app_id: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
}

#[derive(Tabled)]
struct SiteRow {
    #[tabled(rename = "Site")]
    name: String,
    #[tabled(rename = "Domains")]
    domains: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}

/// Parse a day list: `weekdays`, `weekend`, `all`, or a comma separated
/// list of day names or numbers (1 = Sunday).
pub fn parse_days(input: &str) -> Result<BTreeSet<Weekday>> {
    match input.trim().to_ascii_lowercase().as_str() {
        "weekdays" => return Ok(Weekday::weekdays()),
        "weekend" => return Ok(Weekday::weekend()),
        "all" | "every" => return Ok(Weekday::ALL.into_iter().collect()),
        _ => {}
    }

    let days = input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse::<Weekday>)
        .collect::<Result<BTreeSet<_>, _>>()?;
    if days.is_empty() {
        anyhow::bail!("No days given");
    }
    Ok(days)
}

pub fn format_transition(at: &DateTime<Local>) -> String {
    at.format("%a %Y-%m-%d %H:%M").to_string()
}

pub fn print_block_set(block_set: &BlockSet) {
    if block_set.apps.is_empty() {
        println!("\nNo blocked apps");
    } else {
        let rows: Vec<AppRow> = block_set
            .apps
            .iter()
            .map(|app| AppRow {
                name: app.name.clone(),
                app_id: app.app_id.clone(),
                enabled: yes_no(app.enabled),
            })
            .collect();
        println!("\n{}", Table::new(rows));
    }

    if block_set.websites.is_empty() {
        println!("\nNo blocked sites");
    } else {
        let rows: Vec<SiteRow> = block_set
            .websites
            .iter()
            .map(|site| SiteRow {
                name: site.name.clone(),
                domains: site.all_domains().join(", "),
                enabled: yes_no(site.enabled),
            })
            .collect();
        println!("\n{}", Table::new(rows));
    }
}
