//! Launch selection command

use anyhow::Result;
use colored::Colorize;
use fleet_lib::{NodeClass, SchedulingRequest, Selection};
use serde::Serialize;
use std::path::Path;

use super::read_json_file;
use crate::client::ApiClient;
use crate::output::{color_capacity_type, format_bytes, format_cpu, print_json, OutputFormat};

#[derive(Serialize)]
struct LaunchRequest {
    node_class: NodeClass,
    request: SchedulingRequest,
}

/// Ask the resolver where to launch a machine for a scheduling request
pub async fn launch(
    client: &ApiClient,
    node_class: &Path,
    request: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let body = LaunchRequest {
        node_class: read_json_file(node_class)?,
        request: match request {
            Some(path) => read_json_file(path)?,
            None => SchedulingRequest::default(),
        },
    };
    let selection: Selection = client.post("v1/launch", &body).await?;

    match format {
        OutputFormat::Json => print_json(&selection)?,
        OutputFormat::Table => {
            let it = &selection.instance_type;
            let allocatable = it.allocatable();
            println!("{}", "Launch Target".bold());
            println!("{}", "=".repeat(50));
            println!("Instance type:          {}", it.name.cyan());
            println!(
                "Capacity type:          {}",
                color_capacity_type(selection.capacity_type.as_str())
            );
            println!("Zone:                   {} ({})", selection.zone, selection.zone_id);
            println!("Subnet:                 {}", selection.subnet_id);
            println!("Price:                  {:.4}/h", selection.price);
            println!();
            println!("{}", "Allocatable".bold());
            println!("{}", "-".repeat(50));
            println!("CPU:                    {}", format_cpu(allocatable.cpu_millis()));
            println!("Memory:                 {}", format_bytes(allocatable.memory_bytes()));
            println!("Pods:                   {}", allocatable.pods());
        }
    }

    Ok(())
}
