//! The replicated metadata server (component C3): wraps [`MetadataStore`]
//! (C2) behind a leader/follower replicated log with externally triggered
//! leadership and a crash/restore chaos hook.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::RwLock;

use driftsync_core::{FileInfoMap, FileMetaData, LogEntry, ReplicaId, SyncError, Term};

use crate::client::MetaStoreClient;
use crate::meta_store::{MetadataStore, UpdateOutcome};

/// How long the replication loop backs off between unsuccessful rounds while
/// retrying indefinitely toward a commit or a quorum confirmation.
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct AppendEntriesRequest {
    pub term: Term,
    pub prev_log_index: i64,
    pub prev_log_term: i64,
    pub entries: Vec<LogEntry>,
    pub leader_commit: i64,
}

#[derive(Debug, Clone)]
pub struct AppendEntriesResponse {
    pub server_id: u64,
    pub term: Term,
    pub success: bool,
    pub matched_index: i64,
}

#[derive(Debug, Clone, Default)]
pub struct InternalStateSnapshot {
    pub term: Term,
    pub commit_index: i64,
    pub last_applied: i64,
    pub is_leader: bool,
    pub is_crashed: bool,
    pub log: Vec<LogEntry>,
}

struct ServerState {
    term: Term,
    log: Vec<LogEntry>,
    commit_index: i64,
    last_applied: i64,
    is_leader: bool,
    next_index: HashMap<ReplicaId, i64>,
    match_index: HashMap<ReplicaId, i64>,
}

impl ServerState {
    fn new() -> Self {
        ServerState {
            term: Term::ZERO,
            log: Vec::new(),
            commit_index: -1,
            last_applied: -1,
            is_leader: false,
            next_index: HashMap::new(),
            match_index: HashMap::new(),
        }
    }
}

struct RoundOutcome {
    successes: HashSet<ReplicaId>,
    unreachable: HashSet<ReplicaId>,
}

/// One replica of the replicated metadata server.
pub struct ReplicatedMetaServer {
    replica_id: ReplicaId,
    state: RwLock<ServerState>,
    is_crashed: RwLock<bool>,
    metadata: MetadataStore,
    applied_results: RwLock<HashMap<i64, UpdateOutcome>>,
    block_store_addr: String,
    peers: Vec<(ReplicaId, MetaStoreClient)>,
}

impl ReplicatedMetaServer {
    pub fn new(
        replica_id: ReplicaId,
        block_store_addr: String,
        peers: Vec<(ReplicaId, MetaStoreClient)>,
    ) -> Self {
        ReplicatedMetaServer {
            replica_id,
            state: RwLock::new(ServerState::new()),
            is_crashed: RwLock::new(false),
            metadata: MetadataStore::new(),
            applied_results: RwLock::new(HashMap::new()),
            block_store_addr,
            peers,
        }
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    fn fail_if_crashed(&self) -> Result<(), SyncError> {
        if *self.is_crashed.read() {
            Err(SyncError::ServerCrashed)
        } else {
            Ok(())
        }
    }

    fn is_crashed(&self) -> bool {
        *self.is_crashed.read()
    }

    pub fn crash(&self) {
        *self.is_crashed.write() = true;
    }

    /// Clears the crash flag. Any RPC that was fast-failing on it will start
    /// succeeding on its next attempt; the leader's indefinite replication
    /// retry loop naturally picks this up on its next backoff tick.
    pub fn restore(&self) {
        *self.is_crashed.write() = false;
    }

    pub fn is_crashed_flag(&self) -> Result<bool, SyncError> {
        Ok(self.is_crashed())
    }

    pub fn get_block_store_addr(&self) -> Result<String, SyncError> {
        self.fail_if_crashed()?;
        Ok(self.block_store_addr.clone())
    }

    pub fn get_internal_state(&self) -> Result<InternalStateSnapshot, SyncError> {
        self.fail_if_crashed()?;
        let state = self.state.read();
        Ok(InternalStateSnapshot {
            term: state.term,
            commit_index: state.commit_index,
            last_applied: state.last_applied,
            is_leader: state.is_leader,
            is_crashed: false,
            log: state.log.clone(),
        })
    }

    /// §4.3.1: unconditionally (unless crashed) promote this replica. Runs
    /// no election; the caller guarantees at most one leader per term.
    pub fn set_leader(&self) -> Result<bool, SyncError> {
        self.fail_if_crashed()?;
        let mut state = self.state.write();
        state.is_leader = true;
        state.term = state.term.next();
        let end = state.log.len() as i64;
        for (peer_id, _) in &self.peers {
            state.next_index.insert(*peer_id, end);
            state.match_index.insert(*peer_id, -1);
        }
        Ok(true)
    }

    /// §4.3.3: append to the log, replicate, and block until a cluster
    /// majority (including self) has acknowledged the resulting index.
    pub async fn update_file(&self, meta: FileMetaData) -> Result<UpdateOutcome, SyncError> {
        self.fail_if_crashed()?;
        let (term, index) = {
            let mut state = self.state.write();
            if !state.is_leader {
                return Err(SyncError::NotLeader);
            }
            let current_term = state.term;
            state.log.push(LogEntry {
                term: current_term,
                file_meta_data: meta,
            });
            (current_term, state.log.len() as i64 - 1)
        };

        loop {
            {
                let state = self.state.read();
                if !state.is_leader || state.term != term {
                    return Err(SyncError::LeadershipLost);
                }
                if state.commit_index >= index {
                    drop(state);
                    let applied = self.applied_results.read();
                    return Ok(applied
                        .get(&index)
                        .cloned()
                        .expect("committed index must have an applied outcome"));
                }
            }
            if self.is_crashed() {
                return Err(SyncError::ServerCrashed);
            }
            self.replication_round(term).await;
            {
                let state = self.state.read();
                if state.commit_index >= index {
                    drop(state);
                    let applied = self.applied_results.read();
                    return Ok(applied
                        .get(&index)
                        .cloned()
                        .expect("committed index must have an applied outcome"));
                }
            }
            tokio::time::sleep(RETRY_BACKOFF).await;
        }
    }

    /// §4.3.4: confirm quorum via a heartbeat round before serving a read.
    pub async fn get_file_info_map(&self) -> Result<FileInfoMap, SyncError> {
        self.fail_if_crashed()?;
        loop {
            {
                let state = self.state.read();
                if !state.is_leader {
                    return Err(SyncError::NotLeader);
                }
            }
            if self.is_crashed() {
                return Err(SyncError::ServerCrashed);
            }
            if self.peers.is_empty() {
                // A lone leader trivially holds a quorum of itself.
                return Ok(self.metadata.snapshot());
            }
            let term = self.state.read().term;
            let round = self.replication_round(term).await;

            let still_leader = self.state.read().is_leader;
            if !still_leader {
                return Err(SyncError::NotLeader);
            }

            let total_peers = self.peers.len();
            if peer_majority(round.successes.len(), total_peers) {
                return Ok(self.metadata.snapshot());
            }
            if peer_majority(round.unreachable.len(), total_peers) {
                return Err(SyncError::ServersUnreachable);
            }
            tokio::time::sleep(RETRY_BACKOFF).await;
        }
    }

    /// §4.3.6. A no-op on a follower (returns `false`); drives one
    /// replication round on the leader and reports quorum liveness.
    pub async fn send_heartbeat(&self) -> Result<bool, SyncError> {
        self.fail_if_crashed()?;
        let (is_leader, term) = {
            let state = self.state.read();
            (state.is_leader, state.term)
        };
        if !is_leader {
            return Ok(false);
        }
        if self.peers.is_empty() {
            return Ok(true);
        }
        let round = self.replication_round(term).await;
        let total_peers = self.peers.len();
        if peer_majority(round.successes.len(), total_peers) {
            Ok(true)
        } else if peer_majority(round.unreachable.len(), total_peers) {
            Err(SyncError::ServersUnreachable)
        } else {
            Ok(false)
        }
    }

    /// §4.3.5: follower-side (or stale-leader-side) handling of an incoming
    /// `AppendEntries`.
    pub fn append_entries(
        &self,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, SyncError> {
        self.fail_if_crashed()?;
        let mut state = self.state.write();

        if req.term > state.term {
            state.term = req.term;
            state.is_leader = false;
        }
        if req.term < state.term {
            return Ok(AppendEntriesResponse {
                server_id: self.replica_id.0 as u64,
                term: state.term,
                success: false,
                matched_index: -1,
            });
        }

        if req.prev_log_index >= 0 {
            let idx = req.prev_log_index as usize;
            let term_matches = state
                .log
                .get(idx)
                .map(|e| e.term == Term(req.prev_log_term))
                .unwrap_or(false);
            if !term_matches {
                return Ok(AppendEntriesResponse {
                    server_id: self.replica_id.0 as u64,
                    term: state.term,
                    success: false,
                    matched_index: -1,
                });
            }
        }

        let start = (req.prev_log_index + 1) as usize;
        for (offset, entry) in req.entries.iter().enumerate() {
            let pos = start + offset;
            match state.log.get(pos) {
                Some(existing) if existing.term == entry.term => {
                    // Already present and matching: no-op.
                }
                Some(_) => {
                    state.log.truncate(pos);
                    state.log.push(entry.clone());
                }
                None => {
                    state.log.push(entry.clone());
                }
            }
        }

        if req.leader_commit > state.commit_index {
            state.commit_index = req.leader_commit.min(state.log.len() as i64 - 1);
        }
        self.apply_committed(&mut state);

        let matched_index = req.prev_log_index + req.entries.len() as i64;
        Ok(AppendEntriesResponse {
            server_id: self.replica_id.0 as u64,
            term: state.term,
            success: true,
            matched_index,
        })
    }

    /// Apply every committed-but-unapplied entry to the metadata store, in
    /// log-index order, recording each one's outcome for leader-side callers
    /// waiting on `update_file`.
    fn apply_committed(&self, state: &mut ServerState) {
        if state.last_applied >= state.commit_index {
            return;
        }
        let mut applied = self.applied_results.write();
        let mut idx = state.last_applied + 1;
        while idx <= state.commit_index {
            let entry = state.log[idx as usize].clone();
            let outcome = self.metadata.update_file(entry.file_meta_data);
            applied.insert(idx, outcome);
            idx += 1;
        }
        state.last_applied = state.commit_index;
    }

    /// Send one round of `AppendEntries` to every peer in parallel, update
    /// replication cursors from the replies, step down on a higher term, and
    /// advance `commit_index` if a cluster majority now acknowledges it.
    async fn replication_round(&self, term: Term) -> RoundOutcome {
        let requests: Vec<(ReplicaId, AppendEntriesRequest)> = {
            let state = self.state.read();
            self.peers
                .iter()
                .map(|(peer_id, _)| {
                    let next = *state.next_index.get(peer_id).unwrap_or(&(state.log.len() as i64));
                    let prev_log_index = next - 1;
                    let prev_log_term = if prev_log_index >= 0 {
                        state.log[prev_log_index as usize].term.0
                    } else {
                        0
                    };
                    let entries = state.log[next.max(0) as usize..].to_vec();
                    (
                        *peer_id,
                        AppendEntriesRequest {
                            term,
                            prev_log_index,
                            prev_log_term,
                            entries,
                            leader_commit: state.commit_index,
                        },
                    )
                })
                .collect()
        };

        let futures = requests.into_iter().map(|(peer_id, req)| {
            let client = self
                .peers
                .iter()
                .find(|(id, _)| *id == peer_id)
                .map(|(_, c)| c.clone());
            async move {
                let Some(mut client) = client else {
                    return (peer_id, None);
                };
                let sent_up_to = req.prev_log_index + req.entries.len() as i64;
                let result = client.append_entries(req).await;
                (peer_id, result.ok().map(|resp| (resp, sent_up_to)))
            }
        });

        let results = futures_util::future::join_all(futures).await;

        let mut outcome = RoundOutcome {
            successes: HashSet::new(),
            unreachable: HashSet::new(),
        };
        let mut stepped_down = false;
        {
            let mut state = self.state.write();
            for (peer_id, reply) in results {
                match reply {
                    None => {
                        outcome.unreachable.insert(peer_id);
                    }
                    Some((resp, sent_up_to)) => {
                        if resp.term > state.term {
                            state.term = resp.term;
                            state.is_leader = false;
                            stepped_down = true;
                        }
                        if resp.success {
                            outcome.successes.insert(peer_id);
                            state.next_index.insert(peer_id, sent_up_to + 1);
                            state.match_index.insert(peer_id, sent_up_to);
                        } else {
                            let current = *state.next_index.get(&peer_id).unwrap_or(&0);
                            state.next_index.insert(peer_id, (current - 1).max(0));
                        }
                    }
                }
            }

            if !stepped_down && state.is_leader {
                self.advance_commit_index(&mut state, term);
            }
        }
        outcome
    }

    /// Advance `commit_index` as far as a cluster majority (including self)
    /// acknowledges, restricted to entries from the current term.
    fn advance_commit_index(&self, state: &mut ServerState, term: Term) {
        let cluster_size = self.peers.len() + 1;
        let mut candidate = state.commit_index;
        loop {
            let next = candidate + 1;
            if next >= state.log.len() as i64 {
                break;
            }
            if state.log[next as usize].term != term {
                break;
            }
            let acks = 1 + self
                .peers
                .iter()
                .filter(|(id, _)| state.match_index.get(id).copied().unwrap_or(-1) >= next)
                .count();
            if cluster_majority(acks, cluster_size) {
                candidate = next;
            } else {
                break;
            }
        }
        if candidate > state.commit_index {
            state.commit_index = candidate;
            self.apply_committed(state);
        }
    }
}

fn cluster_majority(acks: usize, cluster_size: usize) -> bool {
    acks * 2 > cluster_size
}

fn peer_majority(count: usize, total_peers: usize) -> bool {
    total_peers > 0 && count * 2 > total_peers
}
