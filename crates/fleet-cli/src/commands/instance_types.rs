//! Instance type catalog commands

use anyhow::Result;
use colored::Colorize;
use fleet_lib::{InstanceType, NodeClass};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::read_json_file;
use crate::client::ApiClient;
use crate::output::{format_bytes, format_cpu, format_price, print_json, print_table, OutputFormat};

#[derive(Serialize)]
struct ListRequest {
    node_class: NodeClass,
    refresh: bool,
}

/// Row for instance type table
#[derive(Tabled)]
struct InstanceTypeRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Pods")]
    pods: i64,
    #[tabled(rename = "Alloc CPU")]
    allocatable_cpu: String,
    #[tabled(rename = "Alloc Memory")]
    allocatable_memory: String,
    #[tabled(rename = "Offerings")]
    offerings: String,
    #[tabled(rename = "Cheapest")]
    cheapest: String,
}

impl From<&InstanceType> for InstanceTypeRow {
    fn from(it: &InstanceType) -> Self {
        let allocatable = it.allocatable();
        Self {
            name: it.name.clone(),
            cpu: format_cpu(it.capacity.cpu_millis()),
            memory: format_bytes(it.capacity.memory_bytes()),
            pods: it.capacity.pods(),
            allocatable_cpu: format_cpu(allocatable.cpu_millis()),
            allocatable_memory: format_bytes(allocatable.memory_bytes()),
            offerings: format!("{}/{}", it.offerings.available().count(), it.offerings.len()),
            cheapest: format_price(it.cheapest_available().map(|o| o.price)),
        }
    }
}

/// List the catalog for a node class
pub async fn list_instance_types(
    client: &ApiClient,
    node_class: &Path,
    refresh: bool,
    format: OutputFormat,
) -> Result<()> {
    let request = ListRequest {
        node_class: read_json_file(node_class)?,
        refresh,
    };
    let catalog: Vec<InstanceType> = client.post("v1/instance-types", &request).await?;

    match format {
        OutputFormat::Json => print_json(&catalog)?,
        OutputFormat::Table => {
            println!(
                "{} ({} instance types)",
                format!("Catalog for {}", request.node_class.name).bold(),
                catalog.len()
            );
            let rows: Vec<InstanceTypeRow> = catalog.iter().map(InstanceTypeRow::from).collect();
            print_table(&rows);
        }
    }

    Ok(())
}
