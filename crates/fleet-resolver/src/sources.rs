//! Vendor sources backed by an inventory snapshot directory
//!
//! Layout:
//! - `cluster.json`: server version and network settings
//! - `quota-on-demand.json`, `quota-spot.json`: raw quota survey responses
//! - `pod-limits/<zone>.json`: ENI limit list for one zone
//!
//! Files are read on every uncached fetch, so replacing a snapshot file is
//! picked up on the next survey refresh.

use async_trait::async_trait;
use fleet_lib::catalog::{ClusterInfoSource, PodLimitSource, QuotaSource};
use fleet_lib::{CapacityType, ClusterInfo, FetchError, PodLimits, QuotaResponse, RawInstanceTypeQuota};
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const QUOTA_OPERATION: &str = "DescribeZoneInstanceConfigInfos";
const POD_LIMIT_OPERATION: &str = "DescribeVpcCniPodLimits";
const CLUSTER_OPERATION: &str = "DescribeClusters";

#[derive(Debug, Clone)]
pub struct SnapshotInventory {
    dir: PathBuf,
}

impl SnapshotInventory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn quota_path(&self, capacity_type: CapacityType) -> PathBuf {
        self.dir.join(format!("quota-{}.json", capacity_type.as_str()))
    }

    fn pod_limit_path(&self, zone: &str) -> PathBuf {
        self.dir.join("pod-limits").join(format!("{zone}.json"))
    }

    async fn read(&self, operation: &str, path: &Path) -> Result<Vec<u8>, FetchError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| FetchError::request(operation, format!("{}: {e}", path.display())))
    }
}

fn decode_json<T: DeserializeOwned>(operation: &str, body: &[u8]) -> Result<T, FetchError> {
    serde_json::from_slice(body).map_err(|e| FetchError::decode(operation, e.to_string()))
}

#[async_trait]
impl QuotaSource for SnapshotInventory {
    async fn instance_type_quotas(
        &self,
        zones: &[String],
        capacity_type: CapacityType,
        refresh: bool,
    ) -> Result<Vec<RawInstanceTypeQuota>, FetchError> {
        let path = self.quota_path(capacity_type);
        debug!(path = %path.display(), refresh = refresh, "Reading quota snapshot");
        let body = self.read(QUOTA_OPERATION, &path).await?;
        let response = QuotaResponse::decode(&body)?;
        Ok(response
            .items
            .into_iter()
            .filter(|q| zones.contains(&q.zone))
            .collect())
    }
}

#[async_trait]
impl PodLimitSource for SnapshotInventory {
    async fn pod_limits(&self, zone: &str) -> Result<Vec<PodLimits>, FetchError> {
        let path = self.pod_limit_path(zone);
        match tokio::fs::read(&path).await {
            Ok(body) => decode_json(POD_LIMIT_OPERATION, &body),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(FetchError::request(
                POD_LIMIT_OPERATION,
                format!("{}: {e}", path.display()),
            )),
        }
    }
}

#[async_trait]
impl ClusterInfoSource for SnapshotInventory {
    async fn cluster_info(&self) -> Result<ClusterInfo, FetchError> {
        let body = self
            .read(CLUSTER_OPERATION, &self.dir.join("cluster.json"))
            .await?;
        decode_json(CLUSTER_OPERATION, &body)
    }
}
