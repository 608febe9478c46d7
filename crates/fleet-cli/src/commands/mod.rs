//! Subcommand implementations

pub mod blocks;
pub mod failures;
pub mod instance_types;
pub mod launch;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Read a JSON document such as a node class or scheduling request
pub(crate) fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_lib::{NodeClass, SchedulingRequest};

    #[test]
    fn test_read_node_class_and_request() {
        let dir = tempfile::tempdir().unwrap();
        let node_class = dir.path().join("nodeclass.json");
        std::fs::write(
            &node_class,
            r#"{"name": "default", "subnets": [{"id": "subnet-3", "zone": "ap-guangzhou-3"}],
                "kubelet": {"maxPods": 64}}"#,
        )
        .unwrap();
        let request = dir.path().join("request.json");
        std::fs::write(
            &request,
            r#"{"requirements": [{"key": "karpenter.sh/capacity-type", "operator": "In", "values": ["spot"]}],
                "resources": {"cpu": "2"}}"#,
        )
        .unwrap();

        let nc: NodeClass = read_json_file(&node_class).unwrap();
        assert_eq!(nc.subnets[0].zone, "ap-guangzhou-3");
        assert_eq!(nc.kubelet.max_pods, Some(64));

        let req: SchedulingRequest = read_json_file(&request).unwrap();
        assert!(req.requirements.allows("karpenter.sh/capacity-type", "spot"));
        assert!(!req.requirements.allows("karpenter.sh/capacity-type", "on-demand"));
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = read_json_file::<NodeClass>(Path::new("/nonexistent/nodeclass.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/nodeclass.json"));
    }
}
