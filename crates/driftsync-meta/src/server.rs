//! gRPC adapter: translates `RaftMetaStore` tonic requests into
//! [`ReplicatedMetaServer`] calls.

use std::sync::Arc;
use tonic::{Request, Response, Status};

use driftsync_core::{LogEntry, SyncError, Term};
use driftsync_proto::raft_meta_store_server::RaftMetaStore;
use driftsync_proto::{
    AppendEntriesRequest as ProtoAppendEntriesRequest,
    AppendEntriesResponse as ProtoAppendEntriesResponse, BlockStoreAddr, CrashResponse,
    FileInfoMap as ProtoFileInfoMap, FileMetaData as ProtoFileMetaData,
    HeartbeatResponse, InternalState, IsCrashedResponse, RestoreResponse, SetLeaderResponse,
    UpdateResult,
};

use crate::client::{from_proto_meta, to_proto_meta};
use crate::raft::{AppendEntriesRequest, ReplicatedMetaServer};

pub struct MetaServer {
    inner: Arc<ReplicatedMetaServer>,
}

impl MetaServer {
    pub fn new(inner: Arc<ReplicatedMetaServer>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Arc<ReplicatedMetaServer> {
        &self.inner
    }
}

#[tonic::async_trait]
impl RaftMetaStore for MetaServer {
    async fn get_file_info_map(&self, _: Request<()>) -> Result<Response<ProtoFileInfoMap>, Status> {
        let map = self
            .inner
            .get_file_info_map()
            .await
            .map_err(sync_error_to_status)?;
        Ok(Response::new(ProtoFileInfoMap {
            entries: map
                .into_iter()
                .map(|(name, meta)| (name, to_proto_meta(&meta)))
                .collect(),
        }))
    }

    async fn update_file(
        &self,
        request: Request<ProtoFileMetaData>,
    ) -> Result<Response<UpdateResult>, Status> {
        let meta = from_proto_meta(request.into_inner());
        let outcome = self
            .inner
            .update_file(meta)
            .await
            .map_err(sync_error_to_status)?;
        Ok(Response::new(UpdateResult {
            version: outcome.version(),
        }))
    }

    async fn get_block_store_addr(
        &self,
        _: Request<()>,
    ) -> Result<Response<BlockStoreAddr>, Status> {
        let addr = self
            .inner
            .get_block_store_addr()
            .map_err(sync_error_to_status)?;
        Ok(Response::new(BlockStoreAddr { addr }))
    }

    async fn append_entries(
        &self,
        request: Request<ProtoAppendEntriesRequest>,
    ) -> Result<Response<ProtoAppendEntriesResponse>, Status> {
        let req = request.into_inner();
        let domain_req = AppendEntriesRequest {
            term: Term(req.term),
            prev_log_index: req.prev_log_index,
            prev_log_term: req.prev_log_term,
            entries: req
                .entries
                .into_iter()
                .map(|e| LogEntry {
                    term: Term(e.term),
                    file_meta_data: from_proto_meta(
                        e.file_meta_data
                            .unwrap_or_else(|| ProtoFileMetaData {
                                filename: String::new(),
                                version: 0,
                                block_hash_list: Vec::new(),
                            }),
                    ),
                })
                .collect(),
            leader_commit: req.leader_commit,
        };
        let resp = self
            .inner
            .append_entries(domain_req)
            .map_err(sync_error_to_status)?;
        Ok(Response::new(ProtoAppendEntriesResponse {
            server_id: resp.server_id,
            term: resp.term.0,
            success: resp.success,
            matched_index: resp.matched_index,
        }))
    }

    async fn set_leader(&self, _: Request<()>) -> Result<Response<SetLeaderResponse>, Status> {
        let success = self.inner.set_leader().map_err(sync_error_to_status)?;
        Ok(Response::new(SetLeaderResponse { success }))
    }

    async fn send_heartbeat(&self, _: Request<()>) -> Result<Response<HeartbeatResponse>, Status> {
        let success = self
            .inner
            .send_heartbeat()
            .await
            .map_err(sync_error_to_status)?;
        Ok(Response::new(HeartbeatResponse { success }))
    }

    async fn crash(&self, _: Request<()>) -> Result<Response<CrashResponse>, Status> {
        self.inner.crash();
        Ok(Response::new(CrashResponse { success: true }))
    }

    async fn restore(&self, _: Request<()>) -> Result<Response<RestoreResponse>, Status> {
        self.inner.restore();
        Ok(Response::new(RestoreResponse { success: true }))
    }

    async fn is_crashed(&self, _: Request<()>) -> Result<Response<IsCrashedResponse>, Status> {
        let is_crashed = self
            .inner
            .is_crashed_flag()
            .map_err(sync_error_to_status)?;
        Ok(Response::new(IsCrashedResponse { is_crashed }))
    }

    async fn get_internal_state(&self, _: Request<()>) -> Result<Response<InternalState>, Status> {
        let snapshot = self
            .inner
            .get_internal_state()
            .map_err(sync_error_to_status)?;
        Ok(Response::new(InternalState {
            term: snapshot.term.0,
            commit_index: snapshot.commit_index,
            last_applied: snapshot.last_applied,
            is_leader: snapshot.is_leader,
            is_crashed: snapshot.is_crashed,
            log: snapshot
                .log
                .into_iter()
                .map(|e| driftsync_proto::LogEntry {
                    term: e.term.0,
                    file_meta_data: Some(to_proto_meta(&e.file_meta_data)),
                })
                .collect(),
        }))
    }
}

/// Map a [`SyncError`] to the `tonic::Code` closest to its meaning. The
/// error's stable kind tag is embedded as the status message prefix so
/// `status_to_sync_error` on the client side can recover the exact kind.
pub fn sync_error_to_status(error: SyncError) -> Status {
    match &error {
        SyncError::ServerCrashed => Status::unavailable(error.to_string()),
        SyncError::NotLeader => Status::failed_precondition(error.to_string()),
        SyncError::ServersUnreachable => Status::unavailable(error.to_string()),
        SyncError::LeadershipLost => Status::failed_precondition(error.to_string()),
        SyncError::NotFound { .. } => Status::not_found(error.to_string()),
        SyncError::ClusterUnavailable => Status::unavailable(error.to_string()),
        SyncError::Io { .. } => Status::internal(error.to_string()),
        SyncError::Parse { .. } => Status::internal(error.to_string()),
        SyncError::Transport { .. } => Status::internal(error.to_string()),
    }
}
