//! The controller core: dispatch, handshake sequencing, and keepalive.
//!
//! One `OfpController` owns the Session Table and routes every decoded
//! message by `(stage, type)`. The receive loop and the keepalive timer run
//! on separate threads, so the table sits behind a single mutex; neither
//! path ever blocks waiting for a switch reply.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::Result;
use crate::learning_switch::LearningSwitch;
use crate::ofp_header::OFP_VERSION;
use crate::ofp_message::OfpMessage;
use crate::openflow0x04::message::{parse_datagram, table_miss_flow, Message};
use crate::openflow0x04::{
    ErrorMsg, SwitchConfig, SwitchFeatures, OFPCML_NO_BUFFER, OFPC_FRAG_NORMAL, OFPET_HELLO_FAILED,
};
use crate::session::{Session, SessionStage, SessionTable, XidGen};
use crate::transport::Transport;

/// Controller-side OpenFlow 1.3 protocol engine over a datagram transport.
pub struct OfpController<T: Transport> {
    transport: Arc<T>,
    sessions: Mutex<SessionTable>,
    xids: XidGen,
    learning: LearningSwitch,
    config: Config,
}

impl<T: Transport> OfpController<T> {
    pub fn new(transport: Arc<T>, config: Config) -> OfpController<T> {
        OfpController {
            transport,
            sessions: Mutex::new(SessionTable::new()),
            xids: XidGen::new(),
            learning: LearningSwitch::new(&config),
            config,
        }
    }

    /// Decode and dispatch one inbound datagram.
    ///
    /// Malformed input is logged and dropped; it can never take down the
    /// receive loop or disturb other sessions. Only transport failures
    /// propagate, and those are fatal by design.
    pub fn handle_datagram(&self, buf: &[u8], peer: SocketAddr) -> Result<()> {
        let (header, msg) = match parse_datagram(buf) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("dropping {}-byte datagram from {}: {}", buf.len(), peer, e);
                return Ok(());
            }
        };
        self.dispatch(header.xid(), header.version(), msg, peer)
    }

    /// Route a decoded message to the handshake machine, keepalive handling,
    /// or the learning engine.
    fn dispatch(&self, xid: u32, version: u8, msg: Message, peer: SocketAddr) -> Result<()> {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(&peer) {
            session.touch();
        }
        match msg {
            // Keepalive first: a switch's ECHO_REQUEST is answered from any
            // stage, even mid-handshake.
            Message::EchoRequest(body) => {
                if sessions.get(&peer).is_none() {
                    debug!("ECHO_REQUEST from unknown peer {}", peer);
                }
                let bytes = Message::marshal(xid, Message::EchoReply(body))?;
                self.transport.send(&bytes, peer)?;
                Ok(())
            }
            Message::EchoReply(_) => {
                match sessions.get_mut(&peer) {
                    Some(session) => {
                        if !session.pending_xids.remove(&xid) {
                            // Duplicate or late reply after timeout; harmless.
                            debug!("session {}: unmatched ECHO_REPLY xid {}", peer, xid);
                        }
                    }
                    None => debug!("ECHO_REPLY from unknown peer {}", peer),
                }
                Ok(())
            }
            Message::Hello => self.handle_hello(&mut sessions, peer, version),
            Message::FeaturesReply(sf) => self.handle_features_reply(&mut sessions, peer, sf),
            Message::Error(err) => {
                self.handle_error(&mut sessions, peer, err);
                Ok(())
            }
            Message::PacketIn(pkt) => match sessions.get_mut(&peer) {
                Some(session) if session.stage() == SessionStage::Ready => {
                    self.learning
                        .packet_in(self.transport.as_ref(), &self.xids, session, pkt)
                }
                Some(session) => {
                    warn!(
                        "session {}: PACKET_IN during {:?}, dropping",
                        peer,
                        session.stage()
                    );
                    Ok(())
                }
                None => {
                    warn!("PACKET_IN from unknown peer {}, dropping", peer);
                    Ok(())
                }
            },
            // Valid but unhandled traffic; dropping must never error out.
            other => {
                debug!(
                    "session {}: ignoring {:?}",
                    peer,
                    Message::msg_code_of_message(&other)
                );
                Ok(())
            }
        }
    }

    /// HELLO: create (or restart) the session, answer with our HELLO at the
    /// negotiated version, and ask for features.
    fn handle_hello(
        &self,
        sessions: &mut SessionTable,
        peer: SocketAddr,
        peer_version: u8,
    ) -> Result<()> {
        let version = peer_version.min(OFP_VERSION);
        info!(
            "HELLO from {} (version 0x{:02x}, negotiated 0x{:02x})",
            peer, peer_version, version
        );
        if sessions.insert(Session::new(peer, version)).is_some() {
            // A switch restart looks like a fresh HELLO from the same
            // address; the old session state is stale either way.
            info!("session {}: handshake restarted", peer);
        }

        let bytes = Message::marshal_version(self.xids.next(), version, Message::Hello)?;
        self.transport.send(&bytes, peer)?;
        let bytes = Message::marshal(self.xids.next(), Message::FeaturesReq)?;
        self.transport.send(&bytes, peer)?;
        if let Some(session) = sessions.get_mut(&peer) {
            session.set_stage(SessionStage::AwaitingFeatures);
        }
        Ok(())
    }

    /// FEATURES_REPLY: bind the datapath id, push switch configuration, and
    /// install the table-miss flow; the session is then fully operational.
    fn handle_features_reply(
        &self,
        sessions: &mut SessionTable,
        peer: SocketAddr,
        features: SwitchFeatures,
    ) -> Result<()> {
        let session = match sessions.get_mut(&peer) {
            Some(session) => session,
            None => {
                warn!("FEATURES_REPLY from unknown peer {}, dropping", peer);
                return Ok(());
            }
        };
        if session.stage() != SessionStage::AwaitingFeatures {
            warn!(
                "session {}: FEATURES_REPLY during {:?}, dropping",
                peer,
                session.stage()
            );
            return Ok(());
        }

        session.datapath_id = Some(features.datapath_id);
        info!(
            "switch connected: DPID 0x{:016x} at {}",
            features.datapath_id, peer
        );

        let config = SwitchConfig {
            flags: OFPC_FRAG_NORMAL,
            miss_send_len: OFPCML_NO_BUFFER,
        };
        let bytes = Message::marshal(self.xids.next(), Message::SetConfig(config))?;
        self.transport.send(&bytes, peer)?;
        session.set_stage(SessionStage::Configuring);

        // SET_CONFIG has no reply; the session is operational as soon as the
        // table-miss flow is on its way.
        let bytes = Message::marshal(self.xids.next(), Message::FlowMod(table_miss_flow()))?;
        self.transport.send(&bytes, peer)?;
        session.set_stage(SessionStage::Ready);
        info!(
            "session {}: table-miss flow installed (priority 0, output CONTROLLER)",
            peer
        );
        Ok(())
    }

    /// ERROR: fatal only for version negotiation failures.
    fn handle_error(&self, sessions: &mut SessionTable, peer: SocketAddr, err: ErrorMsg) {
        warn!(
            "session {}: ERROR {} code {} ({} bytes of data)",
            peer,
            err.type_name(),
            err.code,
            err.data.len()
        );
        if err.err_type == OFPET_HELLO_FAILED {
            if let Some(mut session) = sessions.remove(&peer) {
                session.set_stage(SessionStage::Dead);
                info!("session {}: evicted after HELLO_FAILED", peer);
            }
        }
    }

    /// One keepalive pass: evict silent sessions, then ping the live ones.
    ///
    /// Runs on its own timer thread, concurrently with dispatch; the session
    /// lock serializes the two.
    pub fn keepalive_tick(&self) -> Result<()> {
        let mut sessions = self.sessions.lock();

        let timeout = self.config.liveness_timeout;
        // Mid-handshake sessions get a longer grace so the switch can retry
        // a lost FEATURES_REPLY, but they do not stay forever either.
        let handshake_timeout = timeout * 4;
        let evicted = sessions.evict_where(|s| {
            let idle = s.last_seen.elapsed();
            if s.stage() == SessionStage::Ready {
                idle > timeout
            } else {
                idle > handshake_timeout
            }
        });
        for peer in evicted {
            info!("session {}: no traffic, evicting", peer);
        }

        for session in sessions.iter_mut() {
            if session.stage() != SessionStage::Ready {
                continue;
            }
            // At most one outstanding ping per session; liveness rides on
            // last_seen, so an unanswered previous xid is superseded.
            session.pending_xids.clear();
            let xid = self.xids.next();
            session.pending_xids.insert(xid);
            let bytes = Message::marshal(xid, Message::EchoRequest(vec![]))?;
            self.transport.send(&bytes, session.peer)?;
        }
        Ok(())
    }

    /// Number of live sessions, for observability.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openflow0x04::message::add_flow;
    use crate::openflow0x04::{
        Action, Capabilities, FlowModCmd, Pattern, PseudoPort, Timeout,
    };
    use crate::error::TransportError;
    use crate::transport::testing::RecordingTransport;
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    const PEER: &str = "10.0.0.1:48000";

    fn peer() -> SocketAddr {
        PEER.parse().unwrap()
    }

    fn controller() -> OfpController<RecordingTransport> {
        OfpController::new(Arc::new(RecordingTransport::new()), Config::default())
    }

    fn switch_msg(xid: u32, msg: Message) -> Vec<u8> {
        Message::marshal(xid, msg).unwrap()
    }

    fn features_reply(dpid: u64) -> Message {
        Message::FeaturesReply(SwitchFeatures {
            datapath_id: dpid,
            num_buffers: 256,
            num_tables: 254,
            auxiliary_id: 0,
            supported_capabilities: Capabilities::default(),
        })
    }

    fn sent_messages(c: &OfpController<RecordingTransport>) -> Vec<Message> {
        c.transport
            .sent()
            .iter()
            .map(|(_, bytes)| parse_datagram(bytes).unwrap().1)
            .collect()
    }

    fn stage_of(c: &OfpController<RecordingTransport>, peer: SocketAddr) -> Option<SessionStage> {
        c.sessions.lock().get(&peer).map(|s| s.stage())
    }

    #[test]
    fn handshake_reaches_ready_with_table_miss() {
        let c = controller();

        c.handle_datagram(&switch_msg(1, Message::Hello), peer()).unwrap();
        assert_eq!(stage_of(&c, peer()), Some(SessionStage::AwaitingFeatures));
        let msgs = sent_messages(&c);
        assert_eq!(msgs, vec![Message::Hello, Message::FeaturesReq]);
        c.transport.clear();

        c.handle_datagram(&switch_msg(2, features_reply(0x1)), peer()).unwrap();
        assert_eq!(stage_of(&c, peer()), Some(SessionStage::Ready));
        assert_eq!(
            c.sessions.lock().get(&peer()).unwrap().datapath_id,
            Some(0x1)
        );

        let msgs = sent_messages(&c);
        assert_eq!(msgs.len(), 2);
        match &msgs[0] {
            Message::SetConfig(sc) => {
                assert_eq!(sc.flags, OFPC_FRAG_NORMAL);
                assert_eq!(sc.miss_send_len, OFPCML_NO_BUFFER);
            }
            other => panic!("expected SetConfig, got {:?}", other),
        }
        match &msgs[1] {
            Message::FlowMod(fm) => {
                assert_eq!(fm.command, FlowModCmd::AddFlow);
                assert_eq!(fm.priority, 0);
                assert_eq!(fm.pattern, Pattern::match_all());
                assert_eq!(
                    fm.instructions,
                    vec![crate::openflow0x04::Instruction::ApplyActions(vec![
                        Action::Output(PseudoPort::Controller, OFPCML_NO_BUFFER)
                    ])]
                );
            }
            other => panic!("expected FlowMod, got {:?}", other),
        }
    }

    #[test]
    fn hello_negotiates_lower_version() {
        let c = controller();
        let hello = Message::marshal_version(1, 0x01, Message::Hello).unwrap();
        c.handle_datagram(&hello, peer()).unwrap();
        let sent = c.transport.sent();
        // Our HELLO reply carries the lower version.
        assert_eq!(sent[0].1[0], 0x01);
        assert_eq!(c.sessions.lock().get(&peer()).unwrap().version, 0x01);
    }

    #[test]
    fn echo_request_answered_in_any_stage() {
        let c = controller();
        c.handle_datagram(&switch_msg(1, Message::Hello), peer()).unwrap();
        c.transport.clear();

        // Mid-handshake echo gets an immediate reply with the same xid+body.
        let body = vec![0xde, 0xad];
        c.handle_datagram(&switch_msg(99, Message::EchoRequest(body.clone())), peer())
            .unwrap();
        let sent = c.transport.sent();
        assert_eq!(sent.len(), 1);
        let (hdr, msg) = parse_datagram(&sent[0].1).unwrap();
        assert_eq!(hdr.xid(), 99);
        assert_eq!(msg, Message::EchoReply(body));
        // Handshake stage untouched.
        assert_eq!(stage_of(&c, peer()), Some(SessionStage::AwaitingFeatures));
    }

    #[test]
    fn echo_request_from_unknown_peer_still_answered() {
        let c = controller();
        c.handle_datagram(&switch_msg(7, Message::EchoRequest(vec![])), peer())
            .unwrap();
        assert_eq!(c.transport.sent().len(), 1);
        assert_eq!(c.session_count(), 0);
    }

    #[test]
    fn keepalive_pings_and_tracks_pending_xids() {
        let c = controller();
        c.handle_datagram(&switch_msg(1, Message::Hello), peer()).unwrap();
        c.handle_datagram(&switch_msg(2, features_reply(0x1)), peer()).unwrap();
        c.transport.clear();

        c.keepalive_tick().unwrap();
        let sent = c.transport.sent();
        assert_eq!(sent.len(), 1);
        let (hdr, msg) = parse_datagram(&sent[0].1).unwrap();
        assert_eq!(msg, Message::EchoRequest(vec![]));
        {
            let sessions = c.sessions.lock();
            assert!(sessions.get(&peer()).unwrap().pending_xids.contains(&hdr.xid()));
        }

        // The reply clears the pending xid and refreshes liveness.
        c.handle_datagram(&switch_msg(hdr.xid(), Message::EchoReply(vec![])), peer())
            .unwrap();
        let sessions = c.sessions.lock();
        assert!(sessions.get(&peer()).unwrap().pending_xids.is_empty());
    }

    #[test]
    fn unmatched_echo_reply_is_ignored() {
        let c = controller();
        c.handle_datagram(&switch_msg(1, Message::Hello), peer()).unwrap();
        c.handle_datagram(&switch_msg(2, features_reply(0x1)), peer()).unwrap();
        c.handle_datagram(&switch_msg(0xbeef, Message::EchoReply(vec![])), peer())
            .unwrap();
        assert_eq!(stage_of(&c, peer()), Some(SessionStage::Ready));
    }

    /// Records like `RecordingTransport`, but sends fail once `fail` is set.
    struct FlakySendTransport {
        inner: RecordingTransport,
        fail: AtomicBool,
    }

    impl FlakySendTransport {
        fn new() -> FlakySendTransport {
            FlakySendTransport {
                inner: RecordingTransport::new(),
                fail: AtomicBool::new(false),
            }
        }
    }

    impl Transport for FlakySendTransport {
        fn send(&self, buf: &[u8], peer: SocketAddr) -> std::result::Result<(), TransportError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(TransportError::Send(io::Error::new(
                    io::ErrorKind::Other,
                    "socket gone",
                )));
            }
            self.inner.send(buf, peer)
        }
    }

    #[test]
    fn keepalive_send_failure_surfaces() {
        let transport = Arc::new(FlakySendTransport::new());
        let c = OfpController::new(transport.clone(), Config::default());
        c.handle_datagram(&switch_msg(1, Message::Hello), peer()).unwrap();
        c.handle_datagram(&switch_msg(2, features_reply(0x1)), peer()).unwrap();

        // A dead socket under the ping path must propagate, not vanish.
        transport.fail.store(true, Ordering::SeqCst);
        assert!(c.keepalive_tick().is_err());
    }

    #[test]
    fn one_outstanding_ping_per_session() {
        let c = controller();
        c.handle_datagram(&switch_msg(1, Message::Hello), peer()).unwrap();
        c.handle_datagram(&switch_msg(2, features_reply(0x1)), peer()).unwrap();

        // Every echo reply lost, but the session stays live via other
        // traffic; the pending set must not grow tick over tick.
        for _ in 0..10 {
            c.keepalive_tick().unwrap();
        }
        let sessions = c.sessions.lock();
        assert_eq!(sessions.get(&peer()).unwrap().pending_xids.len(), 1);
    }

    #[test]
    fn stalled_handshake_is_eventually_evicted() {
        let c = controller();
        c.handle_datagram(&switch_msg(1, Message::Hello), peer()).unwrap();
        assert_eq!(stage_of(&c, peer()), Some(SessionStage::AwaitingFeatures));

        // Inside the grace window the session is held for the switch's
        // FEATURES_REPLY retry.
        {
            let mut sessions = c.sessions.lock();
            sessions.get_mut(&peer()).unwrap().last_seen =
                Instant::now() - c.config.liveness_timeout - Duration::from_secs(1);
        }
        c.keepalive_tick().unwrap();
        assert_eq!(c.session_count(), 1);

        // Past it, the stalled peer is dropped.
        {
            let mut sessions = c.sessions.lock();
            sessions.get_mut(&peer()).unwrap().last_seen =
                Instant::now() - c.config.liveness_timeout * 4 - Duration::from_secs(1);
        }
        c.keepalive_tick().unwrap();
        assert_eq!(c.session_count(), 0);
    }

    #[test]
    fn silent_ready_session_is_evicted() {
        let c = controller();
        c.handle_datagram(&switch_msg(1, Message::Hello), peer()).unwrap();
        c.handle_datagram(&switch_msg(2, features_reply(0x1)), peer()).unwrap();

        {
            let mut sessions = c.sessions.lock();
            sessions.get_mut(&peer()).unwrap().last_seen =
                Instant::now() - c.config.liveness_timeout - Duration::from_secs(1);
        }
        c.keepalive_tick().unwrap();
        assert_eq!(c.session_count(), 0);
    }

    #[test]
    fn responsive_session_survives_ticks() {
        let c = controller();
        c.handle_datagram(&switch_msg(1, Message::Hello), peer()).unwrap();
        c.handle_datagram(&switch_msg(2, features_reply(0x1)), peer()).unwrap();

        for _ in 0..5 {
            c.keepalive_tick().unwrap();
            // Any inbound message refreshes last_seen; answer the echo.
            c.handle_datagram(&switch_msg(1000, Message::EchoReply(vec![])), peer())
                .unwrap();
        }
        assert_eq!(stage_of(&c, peer()), Some(SessionStage::Ready));
    }

    #[test]
    fn hello_failed_error_kills_session() {
        let c = controller();
        c.handle_datagram(&switch_msg(1, Message::Hello), peer()).unwrap();
        let err = Message::Error(ErrorMsg {
            err_type: OFPET_HELLO_FAILED,
            code: 0,
            data: vec![],
        });
        c.handle_datagram(&switch_msg(2, err), peer()).unwrap();
        assert_eq!(c.session_count(), 0);
    }

    #[test]
    fn non_fatal_error_leaves_session_in_place() {
        let c = controller();
        c.handle_datagram(&switch_msg(1, Message::Hello), peer()).unwrap();
        c.handle_datagram(&switch_msg(2, features_reply(0x1)), peer()).unwrap();
        let err = Message::Error(ErrorMsg {
            err_type: 5, // OFPET_FLOW_MOD_FAILED
            code: 2,
            data: vec![],
        });
        c.handle_datagram(&switch_msg(3, err), peer()).unwrap();
        assert_eq!(stage_of(&c, peer()), Some(SessionStage::Ready));
    }

    #[test]
    fn messages_from_unknown_peers_are_dropped() {
        let c = controller();
        // No HELLO yet: FEATURES_REPLY and PACKET_IN must not create state.
        c.handle_datagram(&switch_msg(1, features_reply(0x2)), peer()).unwrap();
        assert_eq!(c.session_count(), 0);
        assert!(c.transport.sent().is_empty());
    }

    #[test]
    fn malformed_datagrams_never_error() {
        let c = controller();
        c.handle_datagram(&[], peer()).unwrap();
        c.handle_datagram(&[0x04, 0x00], peer()).unwrap();
        c.handle_datagram(&[0xff; 64], peer()).unwrap();
        // Valid header claiming the wrong length.
        let mut bytes = switch_msg(1, Message::Hello);
        bytes.push(0);
        c.handle_datagram(&bytes, peer()).unwrap();
        assert_eq!(c.session_count(), 0);
    }

    #[test]
    fn duplicate_features_reply_is_dropped() {
        let c = controller();
        c.handle_datagram(&switch_msg(1, Message::Hello), peer()).unwrap();
        c.handle_datagram(&switch_msg(2, features_reply(0x1)), peer()).unwrap();
        c.transport.clear();
        // A reordered duplicate must not reconfigure the switch.
        c.handle_datagram(&switch_msg(2, features_reply(0x1)), peer()).unwrap();
        assert!(c.transport.sent().is_empty());
        assert_eq!(stage_of(&c, peer()), Some(SessionStage::Ready));
    }

    #[test]
    fn repeated_hello_restarts_handshake() {
        let c = controller();
        c.handle_datagram(&switch_msg(1, Message::Hello), peer()).unwrap();
        c.handle_datagram(&switch_msg(2, features_reply(0x1)), peer()).unwrap();
        assert_eq!(stage_of(&c, peer()), Some(SessionStage::Ready));

        c.handle_datagram(&switch_msg(3, Message::Hello), peer()).unwrap();
        assert_eq!(stage_of(&c, peer()), Some(SessionStage::AwaitingFeatures));
        assert_eq!(c.session_count(), 1);
    }

    #[test]
    fn identical_flow_mod_reinstall_is_idempotent() {
        let c = controller();
        c.handle_datagram(&switch_msg(1, Message::Hello), peer()).unwrap();
        c.handle_datagram(&switch_msg(2, features_reply(0x1)), peer()).unwrap();
        c.transport.clear();

        // Re-sending the identical install must neither error nor disturb
        // controller state; FLOW_MOD ADD is an upsert on the switch.
        let fm = add_flow(
            1,
            Pattern::match_all(),
            vec![Action::Output(PseudoPort::PhysicalPort(1), 0)],
            Timeout::ExpiresAfter(30),
            Timeout::ExpiresAfter(300),
        );
        for _ in 0..2 {
            let bytes = Message::marshal(c.xids.next(), Message::FlowMod(fm.clone())).unwrap();
            c.transport.send(&bytes, peer()).unwrap();
        }
        assert_eq!(c.transport.sent().len(), 2);
        assert_eq!(stage_of(&c, peer()), Some(SessionStage::Ready));
    }
}
