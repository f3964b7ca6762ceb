//! The learning engine: MAC learning and forwarding decisions on PACKET_IN.
//!
//! This is the only place the controller affects the data plane. Everything
//! else (handshake, keepalive) exists so that this code gets a steady stream
//! of PACKET_INs to act on.

use log::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::ofp_message::OfpMessage;
use crate::openflow0x04::message::{add_flow, Message};
use crate::openflow0x04::{Action, PacketIn, Pattern, PseudoPort, Timeout};
use crate::packet::{mac_to_string, EthernetFrame};
use crate::session::{Session, XidGen};
use crate::transport::Transport;

pub struct LearningSwitch {
    flow_idle_timeout: u16,
    flow_hard_timeout: u16,
}

impl LearningSwitch {
    pub fn new(config: &Config) -> LearningSwitch {
        LearningSwitch {
            flow_idle_timeout: config.flow_idle_timeout,
            flow_hard_timeout: config.flow_hard_timeout,
        }
    }

    /// Handle one PACKET_IN for a ready session.
    ///
    /// Learns the source MAC, then either installs a directed flow and
    /// replays the packet to the learned port, or floods. A PACKET_IN whose
    /// embedded match lacks the IN_PORT OXM is flooded with in_port ANY
    /// rather than treated as fatal.
    pub fn packet_in<T: Transport>(
        &self,
        transport: &T,
        xids: &XidGen,
        session: &mut Session,
        pkt: PacketIn,
    ) -> Result<()> {
        let in_port = pkt.in_port();
        if in_port.is_none() {
            warn!(
                "session {}: PACKET_IN without IN_PORT match field, flooding",
                session.peer
            );
        }

        let frame = match EthernetFrame::parse(pkt.input_payload.bytes()) {
            Some(frame) => frame,
            None => {
                warn!(
                    "session {}: PACKET_IN frame too short for an Ethernet header, dropping",
                    session.peer
                );
                return Ok(());
            }
        };

        if let Some(port) = in_port {
            let previous = session.learn(frame.dl_src, port);
            if previous != Some(port) {
                info!(
                    "session {}: learned {} on port {}",
                    session.peer,
                    mac_to_string(&frame.dl_src),
                    port
                );
            }
        }

        let out_port = if frame.is_group_dst() {
            None
        } else {
            session.lookup(&frame.dl_dst)
        };
        match out_port {
            Some(port) => self.forward(transport, xids, session, pkt, &frame, port),
            None => {
                debug!(
                    "session {}: destination {} unknown, flooding",
                    session.peer,
                    mac_to_string(&frame.dl_dst)
                );
                self.flood(transport, xids, session, pkt)
            }
        }
    }

    /// Install the directed flow and replay the triggering packet.
    fn forward<T: Transport>(
        &self,
        transport: &T,
        xids: &XidGen,
        session: &mut Session,
        pkt: PacketIn,
        frame: &EthernetFrame,
        out_port: u32,
    ) -> Result<()> {
        let mut pattern = Pattern::match_all();
        pattern.eth_dst = Some(frame.dl_dst);
        let flow = add_flow(
            1,
            pattern,
            vec![Action::Output(PseudoPort::PhysicalPort(out_port), 0)],
            Timeout::ExpiresAfter(self.flow_idle_timeout),
            Timeout::ExpiresAfter(self.flow_hard_timeout),
        );
        info!(
            "session {}: installing flow {} -> port {} (idle={}s, hard={}s)",
            session.peer,
            mac_to_string(&frame.dl_dst),
            out_port,
            self.flow_idle_timeout,
            self.flow_hard_timeout
        );
        let bytes = Message::marshal(xids.next(), Message::FlowMod(flow))?;
        transport.send(&bytes, session.peer)?;

        let pkt_out = crate::openflow0x04::PacketOut {
            output_payload: pkt.input_payload,
            port_id: pkt.pattern.in_port,
            apply_actions: vec![Action::Output(PseudoPort::PhysicalPort(out_port), 0)],
        };
        let bytes = Message::marshal(xids.next(), Message::PacketOut(pkt_out))?;
        transport.send(&bytes, session.peer)?;
        Ok(())
    }

    /// Replay the packet out of every port except the ingress.
    fn flood<T: Transport>(
        &self,
        transport: &T,
        xids: &XidGen,
        session: &mut Session,
        pkt: PacketIn,
    ) -> Result<()> {
        let pkt_out = crate::openflow0x04::PacketOut {
            output_payload: pkt.input_payload,
            // The ingress port, so FLOOD excludes it; ANY when the match
            // carried no IN_PORT.
            port_id: pkt.pattern.in_port,
            apply_actions: vec![Action::Output(PseudoPort::Flood, 0)],
        };
        let bytes = Message::marshal(xids.next(), Message::PacketOut(pkt_out))?;
        transport.send(&bytes, session.peer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openflow0x04::message::parse_datagram;
    use crate::openflow0x04::{PacketInReason, Payload};
    use crate::session::SessionStage;
    use crate::transport::testing::RecordingTransport;
    use std::net::SocketAddr;

    fn peer() -> SocketAddr {
        "10.0.0.1:45000".parse().unwrap()
    }

    fn ready_session() -> Session {
        let mut s = Session::new(peer(), 0x04);
        s.set_stage(SessionStage::AwaitingFeatures);
        s.set_stage(SessionStage::Configuring);
        s.set_stage(SessionStage::Ready);
        s
    }

    fn frame(src: [u8; 6], dst: [u8; 6]) -> Vec<u8> {
        let mut f = vec![];
        f.extend_from_slice(&dst);
        f.extend_from_slice(&src);
        f.extend_from_slice(&[0x08, 0x00]);
        f.extend_from_slice(&[0; 46]);
        f
    }

    fn packet_in(in_port: Option<u32>, src: [u8; 6], dst: [u8; 6]) -> PacketIn {
        let mut pattern = Pattern::match_all();
        pattern.in_port = in_port;
        let payload = frame(src, dst);
        PacketIn {
            total_len: payload.len() as u16,
            input_payload: Payload::NotBuffered(payload),
            reason: PacketInReason::NoMatch,
            table_id: 0,
            cookie: 0,
            pattern,
        }
    }

    fn decoded(sent: &[(SocketAddr, Vec<u8>)]) -> Vec<Message> {
        sent.iter()
            .map(|(_, bytes)| parse_datagram(bytes).unwrap().1)
            .collect()
    }

    const MAC_A: [u8; 6] = [0xaa; 6];
    const MAC_B: [u8; 6] = [0xbb; 6];

    #[test]
    fn unknown_destination_floods() {
        let transport = RecordingTransport::new();
        let xids = XidGen::new();
        let sw = LearningSwitch::new(&Config::default());
        let mut session = ready_session();

        sw.packet_in(&transport, &xids, &mut session, packet_in(Some(1), MAC_A, MAC_B))
            .unwrap();

        assert_eq!(session.lookup(&MAC_A), Some(1));
        let msgs = decoded(&transport.sent());
        assert_eq!(msgs.len(), 1);
        match &msgs[0] {
            Message::PacketOut(po) => {
                assert_eq!(po.port_id, Some(1));
                assert_eq!(po.apply_actions, vec![Action::Output(PseudoPort::Flood, 0)]);
            }
            other => panic!("expected PacketOut, got {:?}", other),
        }
    }

    #[test]
    fn known_destination_installs_flow_and_forwards() {
        let transport = RecordingTransport::new();
        let xids = XidGen::new();
        let sw = LearningSwitch::new(&Config::default());
        let mut session = ready_session();

        // A -> B: B unknown, flood and learn A@1.
        sw.packet_in(&transport, &xids, &mut session, packet_in(Some(1), MAC_A, MAC_B))
            .unwrap();
        transport.clear();

        // B -> A: A known at port 1, expect FLOW_MOD then directed PACKET_OUT.
        sw.packet_in(&transport, &xids, &mut session, packet_in(Some(2), MAC_B, MAC_A))
            .unwrap();

        assert_eq!(session.lookup(&MAC_B), Some(2));
        let msgs = decoded(&transport.sent());
        assert_eq!(msgs.len(), 2);
        match &msgs[0] {
            Message::FlowMod(fm) => {
                assert_eq!(fm.priority, 1);
                assert_eq!(fm.pattern.eth_dst, Some(MAC_A));
                assert_eq!(fm.idle_timeout, Timeout::ExpiresAfter(30));
                assert_eq!(fm.hard_timeout, Timeout::ExpiresAfter(300));
                assert_eq!(
                    fm.instructions,
                    vec![crate::openflow0x04::Instruction::ApplyActions(vec![
                        Action::Output(PseudoPort::PhysicalPort(1), 0)
                    ])]
                );
            }
            other => panic!("expected FlowMod, got {:?}", other),
        }
        match &msgs[1] {
            Message::PacketOut(po) => {
                assert_eq!(
                    po.apply_actions,
                    vec![Action::Output(PseudoPort::PhysicalPort(1), 0)]
                );
            }
            other => panic!("expected PacketOut, got {:?}", other),
        }
    }

    #[test]
    fn missing_in_port_floods_with_any() {
        let transport = RecordingTransport::new();
        let xids = XidGen::new();
        let sw = LearningSwitch::new(&Config::default());
        let mut session = ready_session();

        sw.packet_in(&transport, &xids, &mut session, packet_in(None, MAC_A, MAC_B))
            .unwrap();

        // Nothing learned without an ingress port, but the packet still goes
        // out as a flood with in_port ANY.
        assert_eq!(session.lookup(&MAC_A), None);
        let msgs = decoded(&transport.sent());
        assert_eq!(msgs.len(), 1);
        match &msgs[0] {
            Message::PacketOut(po) => {
                assert_eq!(po.port_id, None);
                assert_eq!(po.apply_actions, vec![Action::Output(PseudoPort::Flood, 0)]);
            }
            other => panic!("expected PacketOut, got {:?}", other),
        }
    }

    #[test]
    fn broadcast_destination_always_floods() {
        let transport = RecordingTransport::new();
        let xids = XidGen::new();
        let sw = LearningSwitch::new(&Config::default());
        let mut session = ready_session();

        // Prime the table with a unicast MAC, then send a broadcast.
        session.learn([0xff; 6], 3);
        sw.packet_in(
            &transport,
            &xids,
            &mut session,
            packet_in(Some(1), MAC_A, [0xff; 6]),
        )
        .unwrap();

        let msgs = decoded(&transport.sent());
        assert_eq!(msgs.len(), 1);
        assert!(matches!(&msgs[0], Message::PacketOut(_)));
    }

    #[test]
    fn truncated_frame_is_dropped() {
        let transport = RecordingTransport::new();
        let xids = XidGen::new();
        let sw = LearningSwitch::new(&Config::default());
        let mut session = ready_session();

        let mut pattern = Pattern::match_all();
        pattern.in_port = Some(1);
        let pkt = PacketIn {
            input_payload: Payload::NotBuffered(vec![0xaa; 6]),
            total_len: 6,
            reason: PacketInReason::NoMatch,
            table_id: 0,
            cookie: 0,
            pattern,
        };
        sw.packet_in(&transport, &xids, &mut session, pkt).unwrap();
        assert!(transport.sent().is_empty());
        assert_eq!(session.mac_table_len(), 0);
    }

    #[test]
    fn relearning_moves_a_host() {
        let transport = RecordingTransport::new();
        let xids = XidGen::new();
        let sw = LearningSwitch::new(&Config::default());
        let mut session = ready_session();

        sw.packet_in(&transport, &xids, &mut session, packet_in(Some(1), MAC_A, MAC_B))
            .unwrap();
        sw.packet_in(&transport, &xids, &mut session, packet_in(Some(4), MAC_A, MAC_B))
            .unwrap();
        assert_eq!(session.lookup(&MAC_A), Some(4));
    }
}
