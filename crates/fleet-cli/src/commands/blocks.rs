//! Blocklist commands

use anyhow::Result;
use colored::Colorize;
use fleet_lib::BlockEntry;
use tabled::Tabled;

use crate::client::{ApiClient, BlockRequest, BlockedResponse, Pattern};
use crate::output::{print_json, print_success, print_table, OutputFormat};

/// Row for block table
#[derive(Tabled)]
struct BlockRow {
    #[tabled(rename = "Instance Type")]
    instance_type: String,
    #[tabled(rename = "Capacity")]
    capacity_type: String,
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Blocked At")]
    blocked_at: String,
    #[tabled(rename = "Expires In")]
    expires_in: String,
}

impl From<&BlockEntry> for BlockRow {
    fn from(entry: &BlockEntry) -> Self {
        Self {
            instance_type: entry.key.instance_type.to_string(),
            capacity_type: entry.key.capacity_type.to_string(),
            zone: entry.key.zone.to_string(),
            reason: entry.reason.clone(),
            blocked_at: entry.blocked_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            expires_in: format!("{}s", entry.expires_in_secs),
        }
    }
}

/// List live blocks
pub async fn list_blocks(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let entries: Vec<BlockEntry> = client.get("v1/blocks").await?;

    match format {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Table => {
            let rows: Vec<BlockRow> = entries.iter().map(BlockRow::from).collect();
            print_table(&rows);
        }
    }

    Ok(())
}

/// Block an offering pattern
pub async fn add_block(
    client: &ApiClient,
    pattern: Pattern,
    reason: String,
    format: OutputFormat,
) -> Result<()> {
    let label = describe(&pattern);
    let response: BlockedResponse = client
        .post("v1/blocks", &BlockRequest { pattern, reason })
        .await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_success(&format!("Blocked {}", label.cyan())),
    }

    Ok(())
}

/// Check whether a concrete offering is blocked
pub async fn check_block(client: &ApiClient, pattern: Pattern, format: OutputFormat) -> Result<()> {
    let response: BlockedResponse = client.get_with_query("v1/blocks/check", &pattern).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            let label = describe(&pattern);
            if response.blocked {
                println!("{} is {}", label, "blocked".red().bold());
            } else {
                println!("{} is {}", label, "not blocked".green());
            }
        }
    }

    Ok(())
}

/// Render a pattern as `type/capacity/zone`, with `*` for wildcards
pub(crate) fn describe(pattern: &Pattern) -> String {
    let part = |value: &Option<String>| value.clone().unwrap_or_else(|| "*".to_string());
    format!(
        "{}/{}/{}",
        part(&pattern.instance_type),
        part(&pattern.capacity_type),
        part(&pattern.zone)
    )
}
