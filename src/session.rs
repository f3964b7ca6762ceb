//! Per-switch session state.
//!
//! UDP gives us no connection handle, so a switch is identified by its peer
//! address (and, once FEATURES_REPLY arrives, its datapath id). Everything
//! the engine knows about one switch lives in a `Session`; all sessions live
//! in one `SessionTable` owned by the controller and guarded by a single
//! mutex, since the dispatch loop and the keepalive timer both touch it.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use log::info;

use crate::packet::MacAddr;

/// Handshake progress of a session. Advances strictly forward; the only way
/// back is eviction (`Dead`) on keepalive timeout or a fatal HELLO failure.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionStage {
    AwaitingHello,
    AwaitingFeatures,
    Configuring,
    Ready,
    Dead,
}

/// State for one switch, keyed by peer address.
#[derive(Debug)]
pub struct Session {
    pub peer: SocketAddr,
    pub datapath_id: Option<u64>,
    /// Negotiated wire version: the lower of ours and the peer's HELLO.
    pub version: u8,
    stage: SessionStage,
    pub last_seen: Instant,
    mac_table: HashMap<MacAddr, u32>,
    pub pending_xids: HashSet<u32>,
}

impl Session {
    pub fn new(peer: SocketAddr, version: u8) -> Session {
        Session {
            peer,
            datapath_id: None,
            version,
            stage: SessionStage::AwaitingHello,
            last_seen: Instant::now(),
            mac_table: HashMap::new(),
            pending_xids: HashSet::new(),
        }
    }

    pub fn stage(&self) -> SessionStage {
        self.stage
    }

    /// Advance the handshake stage, logging the transition.
    pub fn set_stage(&mut self, stage: SessionStage) {
        if stage != self.stage {
            info!(
                "session {}: stage {:?} -> {:?}",
                self.peer, self.stage, stage
            );
            self.stage = stage;
        }
    }

    /// Refresh the liveness timestamp; called for every inbound message that
    /// reaches dispatch for this session.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Record where a source MAC was last seen. Last-writer-wins; entries are
    /// never explicitly removed (switch-side idle timeouts age out the actual
    /// forwarding rules).
    pub fn learn(&mut self, mac: MacAddr, port: u32) -> Option<u32> {
        self.mac_table.insert(mac, port)
    }

    /// Port a destination MAC was learned on, if any.
    pub fn lookup(&self, mac: &MacAddr) -> Option<u32> {
        self.mac_table.get(mac).copied()
    }

    pub fn mac_table_len(&self) -> usize {
        self.mac_table.len()
    }
}

/// All live sessions, keyed by peer address. The caller is responsible for
/// locking; see `OfpController`.
#[derive(Default)]
pub struct SessionTable {
    sessions: HashMap<SocketAddr, Session>,
}

impl SessionTable {
    pub fn new() -> SessionTable {
        SessionTable::default()
    }

    pub fn get_mut(&mut self, peer: &SocketAddr) -> Option<&mut Session> {
        self.sessions.get_mut(peer)
    }

    pub fn get(&self, peer: &SocketAddr) -> Option<&Session> {
        self.sessions.get(peer)
    }

    /// Insert a fresh session for `peer`, replacing any previous one (a
    /// repeated HELLO means the switch restarted its handshake).
    pub fn insert(&mut self, session: Session) -> Option<Session> {
        self.sessions.insert(session.peer, session)
    }

    pub fn remove(&mut self, peer: &SocketAddr) -> Option<Session> {
        self.sessions.remove(peer)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    /// Drop every session the predicate rejects, returning the evicted peers.
    pub fn evict_where<F>(&mut self, mut dead: F) -> Vec<SocketAddr>
    where
        F: FnMut(&Session) -> bool,
    {
        let peers: Vec<SocketAddr> = self
            .sessions
            .values()
            .filter(|s| dead(s))
            .map(|s| s.peer)
            .collect();
        for peer in &peers {
            self.sessions.remove(peer);
        }
        peers
    }
}

/// Shared transaction-id source. xids correlate requests with replies; they
/// carry no transport-level ordering meaning.
#[derive(Debug)]
pub struct XidGen(AtomicU32);

impl XidGen {
    pub fn new() -> XidGen {
        XidGen(AtomicU32::new(1))
    }

    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for XidGen {
    fn default() -> XidGen {
        XidGen::new()
    }
}
