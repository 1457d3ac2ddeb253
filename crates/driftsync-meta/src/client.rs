//! Client for a single replicated-metadata-server replica.
//!
//! Used two ways: internally by a leader's replication loop to send
//! `AppendEntries`/heartbeats to its peers, and externally (wrapped by
//! `driftsync-client`'s ordered-failover cluster client) to talk to whichever
//! replica currently answers as leader.

use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

use driftsync_core::{FileInfoMap, FileMetaData, SyncError, Term};
use driftsync_proto::raft_meta_store_client::RaftMetaStoreClient as TonicMetaClient;
use driftsync_proto::{
    AppendEntriesRequest as ProtoAppendEntriesRequest,
    AppendEntriesResponse as ProtoAppendEntriesResponse, FileInfoMap as ProtoFileInfoMap,
    FileMetaData as ProtoFileMetaData, InternalState,
};

use crate::raft::{AppendEntriesRequest, AppendEntriesResponse};

const DEFAULT_DEADLINE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct MetaStoreClient {
    client: TonicMetaClient<Channel>,
}

impl MetaStoreClient {
    pub async fn connect<D>(dst: D) -> Result<Self, SyncError>
    where
        D: TryInto<Endpoint>,
        D::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let endpoint = dst
            .try_into()
            .map_err(|e| SyncError::from_transport_error(e.into(), "invalid meta store endpoint"))?;
        let client = TonicMetaClient::connect(endpoint)
            .await
            .map_err(|e| SyncError::from_transport_error(e, "failed to connect to meta store"))?;
        Ok(Self { client })
    }

    /// Like `connect`, but doesn't require the destination to already be
    /// accepting connections: the channel connects lazily on first RPC.
    /// Used to build peer clients at bootstrap, where replicas come up in
    /// no particular order relative to each other.
    pub fn connect_lazy<D>(dst: D) -> Result<Self, SyncError>
    where
        D: TryInto<Endpoint>,
        D::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let endpoint = dst
            .try_into()
            .map_err(|e| SyncError::from_transport_error(e.into(), "invalid meta store endpoint"))?;
        let client = TonicMetaClient::new(endpoint.connect_lazy());
        Ok(Self { client })
    }

    fn request<M>(msg: M) -> Request<M> {
        let mut request = Request::new(msg);
        request.set_timeout(DEFAULT_DEADLINE);
        request
    }

    pub async fn get_file_info_map(&mut self) -> Result<FileInfoMap, SyncError> {
        let response = self
            .client
            .get_file_info_map(Self::request(()))
            .await
            .map_err(status_to_sync_error)?;
        Ok(from_proto_map(response.into_inner()))
    }

    /// Returns the new version, or `-1` on a version mismatch (not an error).
    pub async fn update_file(&mut self, meta: &FileMetaData) -> Result<i32, SyncError> {
        let response = self
            .client
            .update_file(Self::request(to_proto_meta(meta)))
            .await
            .map_err(status_to_sync_error)?;
        Ok(response.into_inner().version)
    }

    pub async fn get_block_store_addr(&mut self) -> Result<String, SyncError> {
        let response = self
            .client
            .get_block_store_addr(Self::request(()))
            .await
            .map_err(status_to_sync_error)?;
        Ok(response.into_inner().addr)
    }

    pub async fn append_entries(
        &mut self,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, SyncError> {
        let response = self
            .client
            .append_entries(Self::request(ProtoAppendEntriesRequest {
                term: req.term.0,
                prev_log_index: req.prev_log_index,
                prev_log_term: req.prev_log_term,
                entries: req
                    .entries
                    .into_iter()
                    .map(|e| driftsync_proto::LogEntry {
                        term: e.term.0,
                        file_meta_data: Some(to_proto_meta(&e.file_meta_data)),
                    })
                    .collect(),
                leader_commit: req.leader_commit,
            }))
            .await
            .map_err(status_to_sync_error)?;
        Ok(from_proto_append_response(response.into_inner()))
    }

    pub async fn set_leader(&mut self) -> Result<bool, SyncError> {
        let response = self
            .client
            .set_leader(Self::request(()))
            .await
            .map_err(status_to_sync_error)?;
        Ok(response.into_inner().success)
    }

    pub async fn send_heartbeat(&mut self) -> Result<bool, SyncError> {
        let response = self
            .client
            .send_heartbeat(Self::request(()))
            .await
            .map_err(status_to_sync_error)?;
        Ok(response.into_inner().success)
    }

    pub async fn crash(&mut self) -> Result<(), SyncError> {
        self.client
            .crash(Self::request(()))
            .await
            .map_err(status_to_sync_error)?;
        Ok(())
    }

    pub async fn restore(&mut self) -> Result<(), SyncError> {
        self.client
            .restore(Self::request(()))
            .await
            .map_err(status_to_sync_error)?;
        Ok(())
    }

    pub async fn is_crashed(&mut self) -> Result<bool, SyncError> {
        let response = self
            .client
            .is_crashed(Self::request(()))
            .await
            .map_err(status_to_sync_error)?;
        Ok(response.into_inner().is_crashed)
    }

    pub async fn get_internal_state(&mut self) -> Result<InternalState, SyncError> {
        let response = self
            .client
            .get_internal_state(Self::request(()))
            .await
            .map_err(status_to_sync_error)?;
        Ok(response.into_inner())
    }
}

pub fn to_proto_meta(meta: &FileMetaData) -> ProtoFileMetaData {
    ProtoFileMetaData {
        filename: meta.filename.clone(),
        version: meta.version,
        block_hash_list: meta.block_hash_list.clone(),
    }
}

pub fn from_proto_meta(meta: ProtoFileMetaData) -> FileMetaData {
    FileMetaData::new(meta.filename, meta.version, meta.block_hash_list)
}

fn from_proto_map(map: ProtoFileInfoMap) -> FileInfoMap {
    map.entries
        .into_iter()
        .map(|(name, meta)| (name, from_proto_meta(meta)))
        .collect()
}

fn from_proto_append_response(resp: ProtoAppendEntriesResponse) -> AppendEntriesResponse {
    AppendEntriesResponse {
        server_id: resp.server_id,
        term: Term(resp.term),
        success: resp.success,
        matched_index: resp.matched_index,
    }
}

/// Convert a tonic `Status` to a [`SyncError`], recovering the kind embedded
/// by the server in the message when possible.
pub fn status_to_sync_error(status: Status) -> SyncError {
    let message = status.message();
    if message.starts_with("ERR_SERVER_CRASHED") {
        SyncError::ServerCrashed
    } else if message.starts_with("ERR_NOT_LEADER") {
        SyncError::NotLeader
    } else if message.starts_with("ERR_SERVERS_UNREACHABLE") {
        SyncError::ServersUnreachable
    } else if message.starts_with("ERR_LEADERSHIP_LOST") {
        SyncError::LeadershipLost
    } else if status.code() == tonic::Code::NotFound {
        SyncError::not_found(message.to_string())
    } else {
        SyncError::from_transport_error(message, "meta store RPC failed")
    }
}
