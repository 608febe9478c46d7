//! Failure reporting commands

use anyhow::Result;
use colored::Colorize;
use fleet_lib::{FailureOutcome, FailureReport};
use std::path::Path;

use super::blocks::describe;
use super::read_json_file;
use crate::client::{ApiClient, CountResponse, Pattern};
use crate::output::{print_info, print_json, print_warning, OutputFormat};

/// Show the insufficient-capacity count for a pattern
pub async fn failure_count(client: &ApiClient, pattern: Pattern, format: OutputFormat) -> Result<()> {
    let response: CountResponse = client.get_with_query("v1/failures/count", &pattern).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => println!(
            "{}: {} insufficient capacity failures",
            describe(&pattern).cyan(),
            response.count
        ),
    }

    Ok(())
}

/// Submit a failed launch for classification
pub async fn report_failure(client: &ApiClient, file: &Path, format: OutputFormat) -> Result<()> {
    let report: FailureReport = read_json_file(file)?;
    let outcome: FailureOutcome = client.post("v1/failures", &report).await?;

    match format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Table => match &outcome {
            FailureOutcome::Recorded { key, count, refresh } => {
                print_info(&format!("Recorded shortage #{} for {}", count, key));
                if *refresh {
                    print_info("Next catalog build will refresh vendor inventory");
                }
            }
            FailureOutcome::Escalated {
                key,
                count,
                threshold,
            } => print_warning(&format!(
                "Shortage count {} exceeded {}; {} is now blocked",
                count, threshold, key
            )),
            FailureOutcome::Blocked { key, reason } => {
                print_warning(&format!("{} blocked: {}", key, reason))
            }
        },
    }

    Ok(())
}
