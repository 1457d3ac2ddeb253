//! Ordered-replica-failover client (component C4): tries each configured
//! metadata replica in turn, moving to the next on any failover-eligible
//! error, and gives up with [`SyncError::ClusterUnavailable`] only once every
//! replica has been tried for the current call.

use driftsync_block::BlockStoreClient;
use driftsync_core::{FileInfoMap, FileMetaData, SyncError};
use driftsync_meta::MetaStoreClient;

#[derive(Debug, Clone)]
pub struct ClusterClient {
    meta_addrs: Vec<String>,
}

impl ClusterClient {
    pub fn new(meta_addrs: Vec<String>) -> Self {
        ClusterClient { meta_addrs }
    }

    async fn connect(&self, addr: &str) -> Result<MetaStoreClient, SyncError> {
        MetaStoreClient::connect(format!("http://{addr}")).await
    }

    pub async fn get_file_info_map(&self) -> Result<FileInfoMap, SyncError> {
        for addr in &self.meta_addrs {
            let mut client = match self.connect(addr).await {
                Ok(c) => c,
                Err(_) => continue,
            };
            match client.get_file_info_map().await {
                Ok(map) => return Ok(map),
                Err(e) if e.is_client_failover() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(SyncError::ClusterUnavailable)
    }

    pub async fn update_file(&self, meta: &FileMetaData) -> Result<i32, SyncError> {
        for addr in &self.meta_addrs {
            let mut client = match self.connect(addr).await {
                Ok(c) => c,
                Err(_) => continue,
            };
            match client.update_file(meta).await {
                Ok(version) => return Ok(version),
                Err(e) if e.is_client_failover() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(SyncError::ClusterUnavailable)
    }

    pub async fn get_block_store_addr(&self) -> Result<String, SyncError> {
        for addr in &self.meta_addrs {
            let mut client = match self.connect(addr).await {
                Ok(c) => c,
                Err(_) => continue,
            };
            match client.get_block_store_addr().await {
                Ok(addr) => return Ok(addr),
                Err(e) if e.is_client_failover() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(SyncError::ClusterUnavailable)
    }

    pub async fn connect_block_store(&self) -> Result<BlockStoreClient, SyncError> {
        let addr = self.get_block_store_addr().await?;
        BlockStoreClient::connect(format!("http://{addr}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_cluster_is_unavailable() {
        let client = ClusterClient::new(Vec::new());
        let err = client.get_file_info_map().await.unwrap_err();
        assert_eq!(err, SyncError::ClusterUnavailable);
    }

    #[tokio::test]
    async fn unreachable_replicas_report_cluster_unavailable() {
        let client = ClusterClient::new(vec![
            "127.0.0.1:1".to_string(),
            "127.0.0.1:2".to_string(),
        ]);
        let err = client.get_file_info_map().await.unwrap_err();
        assert_eq!(err, SyncError::ClusterUnavailable);
    }
}
