use std::io::{BufRead, Cursor};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::bits::{bit, test_bit};
use crate::error::DecodeError;

/// OpenFlow 1.3 message type codes, used by headers to identify meaning of the
/// rest of a message.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MsgCode {
    Hello = 0,
    Error = 1,
    EchoReq = 2,
    EchoResp = 3,
    Experimenter = 4,
    FeaturesReq = 5,
    FeaturesResp = 6,
    GetConfigReq = 7,
    GetConfigResp = 8,
    SetConfig = 9,
    PacketIn = 10,
    FlowRemoved = 11,
    PortStatus = 12,
    PacketOut = 13,
    FlowMod = 14,
    GroupMod = 15,
    PortMod = 16,
    TableMod = 17,
    MultipartReq = 18,
    MultipartResp = 19,
    BarrierReq = 20,
    BarrierResp = 21,
    RoleReq = 24,
    RoleResp = 25,
}

impl MsgCode {
    /// Map a wire type byte to a `MsgCode`, or `None` for codes this engine
    /// does not speak.
    pub fn from_u8(typ: u8) -> Option<MsgCode> {
        let code = match typ {
            0 => MsgCode::Hello,
            1 => MsgCode::Error,
            2 => MsgCode::EchoReq,
            3 => MsgCode::EchoResp,
            4 => MsgCode::Experimenter,
            5 => MsgCode::FeaturesReq,
            6 => MsgCode::FeaturesResp,
            7 => MsgCode::GetConfigReq,
            8 => MsgCode::GetConfigResp,
            9 => MsgCode::SetConfig,
            10 => MsgCode::PacketIn,
            11 => MsgCode::FlowRemoved,
            12 => MsgCode::PortStatus,
            13 => MsgCode::PacketOut,
            14 => MsgCode::FlowMod,
            15 => MsgCode::GroupMod,
            16 => MsgCode::PortMod,
            17 => MsgCode::TableMod,
            18 => MsgCode::MultipartReq,
            19 => MsgCode::MultipartResp,
            20 => MsgCode::BarrierReq,
            21 => MsgCode::BarrierResp,
            24 => MsgCode::RoleReq,
            25 => MsgCode::RoleResp,
            _ => return None,
        };
        Some(code)
    }
}

/// Common API for message bodies keyed by OpenFlow message codes (see
/// `MsgCode` enum).
pub trait MessageType: Sized {
    /// Return the byte-size of a message body.
    fn size_of(msg: &Self) -> usize;
    /// Parse a body buffer into a message.
    fn parse(buf: &[u8]) -> Result<Self, DecodeError>;
    /// Marshal a message into a `u8` buffer.
    fn marshal(msg: Self, bytes: &mut Vec<u8>);
}

/// Round `len` up to the next 8-byte boundary.
///
/// This is the single authoritative boundary computation for padded match
/// structures; FLOW_MOD and PACKET_IN parsing both depend on it.
pub fn pad_to_8(len: usize) -> usize {
    (len + 7) / 8 * 8
}

fn write_padding(bytes: &mut Vec<u8>, count: usize) {
    for _ in 0..count {
        bytes.write_u8(0).unwrap();
    }
}

fn check_len(buf: &[u8], need: usize) -> Result<(), DecodeError> {
    if buf.len() < need {
        Err(DecodeError::TooShort {
            need,
            have: buf.len(),
        })
    } else {
        Ok(())
    }
}

/// Port behavior. OpenFlow 1.3 port numbers are 32 bits wide; values above
/// `OFPP_MAX` are reserved logical ports.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PseudoPort {
    PhysicalPort(u32),
    InPort,
    Table,
    Normal,
    Flood,
    AllPorts,
    Controller,
    Local,
    Any,
}

#[repr(u32)]
enum OfpPort {
    OFPPMax = 0xffffff00,
    OFPPInPort = 0xfffffff8,
    OFPPTable = 0xfffffff9,
    OFPPNormal = 0xfffffffa,
    OFPPFlood = 0xfffffffb,
    OFPPAll = 0xfffffffc,
    OFPPController = 0xfffffffd,
    OFPPLocal = 0xfffffffe,
    OFPPAny = 0xffffffff,
}

impl PseudoPort {
    /// Decode a wire port number. `OFPP_ANY` plays the "no port" role in
    /// OpenFlow 1.3, so it maps to `None`.
    pub fn of_int(p: u32) -> Option<PseudoPort> {
        if (OfpPort::OFPPAny as u32) == p {
            None
        } else {
            Some(PseudoPort::make(p))
        }
    }

    fn make(p: u32) -> PseudoPort {
        match p {
            p if p == (OfpPort::OFPPInPort as u32) => PseudoPort::InPort,
            p if p == (OfpPort::OFPPTable as u32) => PseudoPort::Table,
            p if p == (OfpPort::OFPPNormal as u32) => PseudoPort::Normal,
            p if p == (OfpPort::OFPPFlood as u32) => PseudoPort::Flood,
            p if p == (OfpPort::OFPPAll as u32) => PseudoPort::AllPorts,
            p if p == (OfpPort::OFPPController as u32) => PseudoPort::Controller,
            p if p == (OfpPort::OFPPLocal as u32) => PseudoPort::Local,
            p if p == (OfpPort::OFPPAny as u32) => PseudoPort::Any,
            // Unrecognized values in the reserved range still round-trip.
            _ => PseudoPort::PhysicalPort(p),
        }
    }

    /// Encode as a wire port number.
    pub fn to_int(self) -> u32 {
        match self {
            PseudoPort::PhysicalPort(p) => p,
            PseudoPort::InPort => OfpPort::OFPPInPort as u32,
            PseudoPort::Table => OfpPort::OFPPTable as u32,
            PseudoPort::Normal => OfpPort::OFPPNormal as u32,
            PseudoPort::Flood => OfpPort::OFPPFlood as u32,
            PseudoPort::AllPorts => OfpPort::OFPPAll as u32,
            PseudoPort::Controller => OfpPort::OFPPController as u32,
            PseudoPort::Local => OfpPort::OFPPLocal as u32,
            PseudoPort::Any => OfpPort::OFPPAny as u32,
        }
    }

    /// Whether `p` names a single physical port (as opposed to a reserved
    /// logical port).
    pub fn is_physical(p: u32) -> bool {
        p <= (OfpPort::OFPPMax as u32)
    }
}

const OXM_CLASS_OPENFLOW_BASIC: u16 = 0x8000;
const OXM_OF_IN_PORT: u8 = 0;
const OXM_OF_ETH_DST: u8 = 3;
const OXM_OF_ETH_SRC: u8 = 4;

/// Fields to match against flows, carried as OXM TLVs on the wire.
///
/// An empty pattern is match-all; that is exactly what the table-miss flow
/// installs. Only the fields this controller emits or reads are represented;
/// unknown OXM entries are skipped (with their lengths validated) on parse.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pattern {
    pub in_port: Option<u32>,
    pub eth_dst: Option<[u8; 6]>,
    pub eth_src: Option<[u8; 6]>,
}

const OFPMT_OXM: u16 = 1;

impl Pattern {
    pub fn match_all() -> Pattern {
        Pattern::default()
    }

    /// Byte length of the match structure before padding, as carried in its
    /// `length` field.
    fn length(&self) -> usize {
        let mut oxm = 0;
        if self.in_port.is_some() {
            oxm += 4 + 4;
        }
        if self.eth_dst.is_some() {
            oxm += 4 + 6;
        }
        if self.eth_src.is_some() {
            oxm += 4 + 6;
        }
        4 + oxm
    }

    /// Byte length of the match structure including trailing zero padding.
    pub fn size_of(&self) -> usize {
        pad_to_8(self.length())
    }

    fn marshal_oxm_header(bytes: &mut Vec<u8>, field: u8, len: u8) {
        bytes.write_u16::<BigEndian>(OXM_CLASS_OPENFLOW_BASIC).unwrap();
        bytes.write_u8(field << 1).unwrap();
        bytes.write_u8(len).unwrap();
    }

    pub fn marshal(p: Pattern, bytes: &mut Vec<u8>) {
        let length = p.length();
        bytes.write_u16::<BigEndian>(OFPMT_OXM).unwrap();
        bytes.write_u16::<BigEndian>(length as u16).unwrap();
        if let Some(port) = p.in_port {
            Self::marshal_oxm_header(bytes, OXM_OF_IN_PORT, 4);
            bytes.write_u32::<BigEndian>(port).unwrap();
        }
        if let Some(mac) = p.eth_dst {
            Self::marshal_oxm_header(bytes, OXM_OF_ETH_DST, 6);
            bytes.extend_from_slice(&mac);
        }
        if let Some(mac) = p.eth_src {
            Self::marshal_oxm_header(bytes, OXM_OF_ETH_SRC, 6);
            bytes.extend_from_slice(&mac);
        }
        write_padding(bytes, pad_to_8(length) - length);
    }

    /// Parse a match structure from the front of `buf`.
    ///
    /// Returns the pattern and the padded byte count consumed, so callers can
    /// locate whatever follows the match (instructions in FLOW_MOD, the frame
    /// in PACKET_IN) without reimplementing the boundary arithmetic.
    pub fn parse(buf: &[u8]) -> Result<(Pattern, usize), DecodeError> {
        check_len(buf, 4)?;
        let mut bytes = Cursor::new(buf);
        let typ = bytes.read_u16::<BigEndian>()?;
        if typ != OFPMT_OXM {
            return Err(DecodeError::MalformedTlv("match type is not OXM"));
        }
        let length = bytes.read_u16::<BigEndian>()? as usize;
        if length < 4 {
            return Err(DecodeError::MalformedTlv("match length below fixed header"));
        }
        let padded = pad_to_8(length);
        check_len(buf, padded)?;

        let mut pattern = Pattern::match_all();
        let mut offset = 4;
        while offset < length {
            if offset + 4 > length {
                return Err(DecodeError::MalformedTlv("truncated OXM TLV header"));
            }
            let class = bytes.read_u16::<BigEndian>()?;
            let field_and_mask = bytes.read_u8()?;
            let field = field_and_mask >> 1;
            let has_mask = field_and_mask & 1 == 1;
            let value_len = bytes.read_u8()? as usize;
            if offset + 4 + value_len > length {
                return Err(DecodeError::MalformedTlv("OXM value overruns match length"));
            }
            match (class, field, has_mask, value_len) {
                (OXM_CLASS_OPENFLOW_BASIC, OXM_OF_IN_PORT, false, 4) => {
                    pattern.in_port = Some(bytes.read_u32::<BigEndian>()?);
                }
                (OXM_CLASS_OPENFLOW_BASIC, OXM_OF_ETH_DST, false, 6) => {
                    let mut mac = [0; 6];
                    for b in mac.iter_mut() {
                        *b = bytes.read_u8()?;
                    }
                    pattern.eth_dst = Some(mac);
                }
                (OXM_CLASS_OPENFLOW_BASIC, OXM_OF_ETH_SRC, false, 6) => {
                    let mut mac = [0; 6];
                    for b in mac.iter_mut() {
                        *b = bytes.read_u8()?;
                    }
                    pattern.eth_src = Some(mac);
                }
                // Fields we do not interpret; length is already validated.
                _ => bytes.consume(value_len),
            }
            offset += 4 + value_len;
        }
        Ok((pattern, padded))
    }
}

/// Maximum bytes of a packet to ship to the controller in an OUTPUT action.
pub const OFPCML_NO_BUFFER: u16 = 0xffff;

/// Actions associated with flows and packets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Forward out a port, sending at most `max_len` bytes when the port is
    /// the controller.
    Output(PseudoPort, u16),
}

const OFPAT_OUTPUT: u16 = 0;
const ACTION_OUTPUT_LEN: usize = 16;

impl Action {
    fn size_of(a: &Action) -> usize {
        match *a {
            Action::Output(..) => ACTION_OUTPUT_LEN,
        }
    }

    fn size_of_sequence(actions: &[Action]) -> usize {
        actions.iter().map(Action::size_of).sum()
    }

    fn marshal(act: Action, bytes: &mut Vec<u8>) {
        match act {
            Action::Output(pp, max_len) => {
                bytes.write_u16::<BigEndian>(OFPAT_OUTPUT).unwrap();
                bytes.write_u16::<BigEndian>(ACTION_OUTPUT_LEN as u16).unwrap();
                bytes.write_u32::<BigEndian>(pp.to_int()).unwrap();
                bytes.write_u16::<BigEndian>(max_len).unwrap();
                write_padding(bytes, 6);
            }
        }
    }

    /// Parse a sequence of actions occupying exactly `buf`.
    fn parse_sequence(buf: &[u8]) -> Result<Vec<Action>, DecodeError> {
        let mut actions = vec![];
        let mut offset = 0;
        while offset < buf.len() {
            if offset + 4 > buf.len() {
                return Err(DecodeError::MalformedTlv("truncated action header"));
            }
            let mut bytes = Cursor::new(&buf[offset..]);
            let typ = bytes.read_u16::<BigEndian>()?;
            let len = bytes.read_u16::<BigEndian>()? as usize;
            if len < 8 || offset + len > buf.len() {
                return Err(DecodeError::MalformedTlv("action length out of bounds"));
            }
            if typ == OFPAT_OUTPUT {
                if len != ACTION_OUTPUT_LEN {
                    return Err(DecodeError::MalformedTlv("OUTPUT action bad length"));
                }
                let port = bytes.read_u32::<BigEndian>()?;
                let max_len = bytes.read_u16::<BigEndian>()?;
                actions.push(Action::Output(PseudoPort::make(port), max_len));
            }
            offset += len;
        }
        Ok(actions)
    }
}

/// Instructions attached to a flow entry. Only APPLY_ACTIONS is required by
/// this controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    ApplyActions(Vec<Action>),
}

const OFPIT_APPLY_ACTIONS: u16 = 4;

impl Instruction {
    fn size_of(inst: &Instruction) -> usize {
        match *inst {
            Instruction::ApplyActions(ref actions) => 8 + Action::size_of_sequence(actions),
        }
    }

    fn size_of_sequence(insts: &[Instruction]) -> usize {
        insts.iter().map(Instruction::size_of).sum()
    }

    fn marshal(inst: Instruction, bytes: &mut Vec<u8>) {
        match inst {
            Instruction::ApplyActions(actions) => {
                bytes.write_u16::<BigEndian>(OFPIT_APPLY_ACTIONS).unwrap();
                bytes
                    .write_u16::<BigEndian>((8 + Action::size_of_sequence(&actions)) as u16)
                    .unwrap();
                bytes.write_u32::<BigEndian>(0).unwrap();
                for act in actions {
                    Action::marshal(act, bytes);
                }
            }
        }
    }

    /// Parse the instruction sequence occupying exactly `buf`.
    fn parse_sequence(buf: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
        let mut insts = vec![];
        let mut offset = 0;
        while offset < buf.len() {
            if offset + 4 > buf.len() {
                return Err(DecodeError::MalformedTlv("truncated instruction header"));
            }
            let mut bytes = Cursor::new(&buf[offset..]);
            let typ = bytes.read_u16::<BigEndian>()?;
            let len = bytes.read_u16::<BigEndian>()? as usize;
            if len < 8 || offset + len > buf.len() {
                return Err(DecodeError::MalformedTlv("instruction length out of bounds"));
            }
            if typ == OFPIT_APPLY_ACTIONS {
                let actions = Action::parse_sequence(&buf[offset + 8..offset + len])?;
                insts.push(Instruction::ApplyActions(actions));
            }
            offset += len;
        }
        Ok(insts)
    }
}

/// How long before a flow entry expires.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Timeout {
    Permanent,
    ExpiresAfter(u16),
}

impl Timeout {
    pub fn of_int(tm: u16) -> Timeout {
        match tm {
            0 => Timeout::Permanent,
            d => Timeout::ExpiresAfter(d),
        }
    }

    pub fn to_int(tm: Timeout) -> u16 {
        match tm {
            Timeout::Permanent => 0,
            Timeout::ExpiresAfter(d) => d,
        }
    }
}

/// Capabilities advertised by the datapath in FEATURES_REPLY.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub flow_stats: bool,
    pub table_stats: bool,
    pub port_stats: bool,
    pub group_stats: bool,
    pub ip_reasm: bool,
    pub queue_stats: bool,
    pub port_blocked: bool,
}

impl Capabilities {
    fn of_int(d: u32) -> Capabilities {
        Capabilities {
            flow_stats: test_bit(0, d as u64),
            table_stats: test_bit(1, d as u64),
            port_stats: test_bit(2, d as u64),
            group_stats: test_bit(3, d as u64),
            ip_reasm: test_bit(5, d as u64),
            queue_stats: test_bit(6, d as u64),
            port_blocked: test_bit(8, d as u64),
        }
    }

    fn to_int(&self) -> u32 {
        let mut d: u64 = 0;
        d = bit(0, d, self.flow_stats);
        d = bit(1, d, self.table_stats);
        d = bit(2, d, self.port_stats);
        d = bit(3, d, self.group_stats);
        d = bit(5, d, self.ip_reasm);
        d = bit(6, d, self.queue_stats);
        d = bit(8, d, self.port_blocked);
        d as u32
    }
}

/// Switch features, the body of FEATURES_REPLY. The datapath id is the
/// switch's identity for the whole life of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub num_buffers: u32,
    pub num_tables: u8,
    pub auxiliary_id: u8,
    pub supported_capabilities: Capabilities,
}

const SWITCH_FEATURES_LEN: usize = 24;

impl MessageType for SwitchFeatures {
    fn size_of(_: &SwitchFeatures) -> usize {
        SWITCH_FEATURES_LEN
    }

    fn parse(buf: &[u8]) -> Result<SwitchFeatures, DecodeError> {
        check_len(buf, SWITCH_FEATURES_LEN)?;
        let mut bytes = Cursor::new(buf);
        let datapath_id = bytes.read_u64::<BigEndian>()?;
        let num_buffers = bytes.read_u32::<BigEndian>()?;
        let num_tables = bytes.read_u8()?;
        let auxiliary_id = bytes.read_u8()?;
        bytes.consume(2);
        let supported_capabilities = Capabilities::of_int(bytes.read_u32::<BigEndian>()?);
        Ok(SwitchFeatures {
            datapath_id,
            num_buffers,
            num_tables,
            auxiliary_id,
            supported_capabilities,
        })
    }

    fn marshal(sf: SwitchFeatures, bytes: &mut Vec<u8>) {
        bytes.write_u64::<BigEndian>(sf.datapath_id).unwrap();
        bytes.write_u32::<BigEndian>(sf.num_buffers).unwrap();
        bytes.write_u8(sf.num_tables).unwrap();
        bytes.write_u8(sf.auxiliary_id).unwrap();
        write_padding(bytes, 2);
        bytes
            .write_u32::<BigEndian>(sf.supported_capabilities.to_int())
            .unwrap();
        bytes.write_u32::<BigEndian>(0).unwrap(); // reserved
    }
}

/// Fragmentation handling flag for SET_CONFIG: no special handling.
pub const OFPC_FRAG_NORMAL: u16 = 0;

/// Switch configuration, the body of SET_CONFIG and GET_CONFIG_REPLY.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SwitchConfig {
    pub flags: u16,
    pub miss_send_len: u16,
}

impl MessageType for SwitchConfig {
    fn size_of(_: &SwitchConfig) -> usize {
        4
    }

    fn parse(buf: &[u8]) -> Result<SwitchConfig, DecodeError> {
        check_len(buf, 4)?;
        let mut bytes = Cursor::new(buf);
        Ok(SwitchConfig {
            flags: bytes.read_u16::<BigEndian>()?,
            miss_send_len: bytes.read_u16::<BigEndian>()?,
        })
    }

    fn marshal(sc: SwitchConfig, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(sc.flags).unwrap();
        bytes.write_u16::<BigEndian>(sc.miss_send_len).unwrap();
    }
}

/// Type of modification to perform on a flow table.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlowModCmd {
    AddFlow = 0,
    ModFlow = 1,
    ModStrictFlow = 2,
    DeleteFlow = 3,
    DeleteStrictFlow = 4,
}

impl FlowModCmd {
    fn from_u8(cmd: u8) -> Result<FlowModCmd, DecodeError> {
        match cmd {
            0 => Ok(FlowModCmd::AddFlow),
            1 => Ok(FlowModCmd::ModFlow),
            2 => Ok(FlowModCmd::ModStrictFlow),
            3 => Ok(FlowModCmd::DeleteFlow),
            4 => Ok(FlowModCmd::DeleteStrictFlow),
            _ => Err(DecodeError::MalformedTlv("unknown flow mod command")),
        }
    }
}

/// Represents modifications to a flow table from the controller.
///
/// FLOW_MOD with `AddFlow` is an idempotent upsert keyed by priority+match,
/// which is what lets this controller re-send installs without bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowMod {
    pub command: FlowModCmd,
    pub table_id: u8,
    pub pattern: Pattern,
    pub priority: u16,
    pub instructions: Vec<Instruction>,
    pub cookie: u64,
    pub cookie_mask: u64,
    pub idle_timeout: Timeout,
    pub hard_timeout: Timeout,
    pub notify_when_removed: bool,
    pub apply_to_packet: Option<u32>,
    pub out_port: Option<PseudoPort>,
    pub out_group: Option<u32>,
    pub check_overlap: bool,
}

const FLOW_MOD_FIXED_LEN: usize = 40;
const OFP_NO_BUFFER: u32 = 0xffffffff;
const OFPG_ANY: u32 = 0xffffffff;

impl FlowMod {
    fn flags_to_int(check_overlap: bool, notify_when_removed: bool) -> u16 {
        (if check_overlap { 1 << 1 } else { 0 }) | (if notify_when_removed { 1 << 0 } else { 0 })
    }

    fn check_overlap_of_flags(flags: u16) -> bool {
        2 & flags != 0
    }

    fn notify_when_removed_of_flags(flags: u16) -> bool {
        1 & flags != 0
    }
}

impl MessageType for FlowMod {
    fn size_of(msg: &FlowMod) -> usize {
        FLOW_MOD_FIXED_LEN + msg.pattern.size_of() + Instruction::size_of_sequence(&msg.instructions)
    }

    fn parse(buf: &[u8]) -> Result<FlowMod, DecodeError> {
        check_len(buf, FLOW_MOD_FIXED_LEN)?;
        let mut bytes = Cursor::new(buf);
        let cookie = bytes.read_u64::<BigEndian>()?;
        let cookie_mask = bytes.read_u64::<BigEndian>()?;
        let table_id = bytes.read_u8()?;
        let command = FlowModCmd::from_u8(bytes.read_u8()?)?;
        let idle = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        let hard = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        let prio = bytes.read_u16::<BigEndian>()?;
        let buffer_id = bytes.read_u32::<BigEndian>()?;
        let out_port = PseudoPort::of_int(bytes.read_u32::<BigEndian>()?);
        let out_group = {
            let g = bytes.read_u32::<BigEndian>()?;
            if g == OFPG_ANY {
                None
            } else {
                Some(g)
            }
        };
        let flags = bytes.read_u16::<BigEndian>()?;
        bytes.consume(2);
        let (pattern, match_len) = Pattern::parse(&buf[FLOW_MOD_FIXED_LEN..])?;
        let instructions = Instruction::parse_sequence(&buf[FLOW_MOD_FIXED_LEN + match_len..])?;
        Ok(FlowMod {
            command,
            table_id,
            pattern,
            priority: prio,
            instructions,
            cookie,
            cookie_mask,
            idle_timeout: idle,
            hard_timeout: hard,
            notify_when_removed: FlowMod::notify_when_removed_of_flags(flags),
            apply_to_packet: match buffer_id {
                OFP_NO_BUFFER => None,
                n => Some(n),
            },
            out_port,
            out_group,
            check_overlap: FlowMod::check_overlap_of_flags(flags),
        })
    }

    fn marshal(fm: FlowMod, bytes: &mut Vec<u8>) {
        bytes.write_u64::<BigEndian>(fm.cookie).unwrap();
        bytes.write_u64::<BigEndian>(fm.cookie_mask).unwrap();
        bytes.write_u8(fm.table_id).unwrap();
        bytes.write_u8(fm.command as u8).unwrap();
        bytes.write_u16::<BigEndian>(Timeout::to_int(fm.idle_timeout)).unwrap();
        bytes.write_u16::<BigEndian>(Timeout::to_int(fm.hard_timeout)).unwrap();
        bytes.write_u16::<BigEndian>(fm.priority).unwrap();
        bytes
            .write_u32::<BigEndian>(fm.apply_to_packet.unwrap_or(OFP_NO_BUFFER))
            .unwrap();
        bytes
            .write_u32::<BigEndian>(match fm.out_port {
                None => OfpPort::OFPPAny as u32,
                Some(p) => p.to_int(),
            })
            .unwrap();
        bytes.write_u32::<BigEndian>(fm.out_group.unwrap_or(OFPG_ANY)).unwrap();
        bytes
            .write_u16::<BigEndian>(FlowMod::flags_to_int(fm.check_overlap, fm.notify_when_removed))
            .unwrap();
        write_padding(bytes, 2);
        Pattern::marshal(fm.pattern, bytes);
        for inst in fm.instructions {
            Instruction::marshal(inst, bytes);
        }
    }
}

/// The data associated with a packet received by the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Buffered(u32, Vec<u8>),
    NotBuffered(Vec<u8>),
}

impl Payload {
    pub fn size_of(payload: &Payload) -> usize {
        match *payload {
            Payload::Buffered(_, ref buf) | Payload::NotBuffered(ref buf) => buf.len(),
        }
    }

    /// The raw frame bytes, however they were delivered.
    pub fn bytes(&self) -> &[u8] {
        match *self {
            Payload::Buffered(_, ref buf) | Payload::NotBuffered(ref buf) => buf,
        }
    }
}

/// The reason a packet arrives at the controller.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketInReason {
    NoMatch = 0,
    ExplicitSend = 1,
    InvalidTtl = 2,
}

impl PacketInReason {
    fn from_u8(reason: u8) -> Result<PacketInReason, DecodeError> {
        match reason {
            0 => Ok(PacketInReason::NoMatch),
            1 => Ok(PacketInReason::ExplicitSend),
            2 => Ok(PacketInReason::InvalidTtl),
            _ => Err(DecodeError::MalformedTlv("unknown packet-in reason")),
        }
    }
}

/// Represents packets received by the datapath and sent to the controller.
///
/// The ingress port arrives as an IN_PORT OXM entry inside the embedded
/// match, not as a fixed field; `in_port()` may therefore legitimately return
/// `None` on a malformed message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketIn {
    pub input_payload: Payload,
    pub total_len: u16,
    pub reason: PacketInReason,
    pub table_id: u8,
    pub cookie: u64,
    pub pattern: Pattern,
}

const PACKET_IN_FIXED_LEN: usize = 16;

impl PacketIn {
    /// The ingress port carried in the embedded match, if present.
    pub fn in_port(&self) -> Option<u32> {
        self.pattern.in_port
    }
}

impl MessageType for PacketIn {
    fn size_of(pi: &PacketIn) -> usize {
        PACKET_IN_FIXED_LEN + pi.pattern.size_of() + 2 + Payload::size_of(&pi.input_payload)
    }

    fn parse(buf: &[u8]) -> Result<PacketIn, DecodeError> {
        check_len(buf, PACKET_IN_FIXED_LEN)?;
        let mut bytes = Cursor::new(buf);
        let buffer_id = bytes.read_u32::<BigEndian>()?;
        let total_len = bytes.read_u16::<BigEndian>()?;
        let reason = PacketInReason::from_u8(bytes.read_u8()?)?;
        let table_id = bytes.read_u8()?;
        let cookie = bytes.read_u64::<BigEndian>()?;
        let (pattern, match_len) = Pattern::parse(&buf[PACKET_IN_FIXED_LEN..])?;
        // Two alignment pad bytes sit between the match and the frame.
        let frame_offset = PACKET_IN_FIXED_LEN + match_len + 2;
        check_len(buf, frame_offset)?;
        let frame = buf[frame_offset..].to_vec();
        let payload = match buffer_id {
            OFP_NO_BUFFER => Payload::NotBuffered(frame),
            n => Payload::Buffered(n, frame),
        };
        Ok(PacketIn {
            input_payload: payload,
            total_len,
            reason,
            table_id,
            cookie,
            pattern,
        })
    }

    fn marshal(pi: PacketIn, bytes: &mut Vec<u8>) {
        let buffer_id = match pi.input_payload {
            Payload::Buffered(n, _) => n,
            Payload::NotBuffered(_) => OFP_NO_BUFFER,
        };
        bytes.write_u32::<BigEndian>(buffer_id).unwrap();
        bytes.write_u16::<BigEndian>(pi.total_len).unwrap();
        bytes.write_u8(pi.reason as u8).unwrap();
        bytes.write_u8(pi.table_id).unwrap();
        bytes.write_u64::<BigEndian>(pi.cookie).unwrap();
        Pattern::marshal(pi.pattern, bytes);
        write_padding(bytes, 2);
        bytes.extend_from_slice(pi.input_payload.bytes());
    }
}

/// Represents packets sent from the controller into the datapath.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketOut {
    pub output_payload: Payload,
    pub port_id: Option<u32>,
    pub apply_actions: Vec<Action>,
}

const PACKET_OUT_FIXED_LEN: usize = 16;

impl MessageType for PacketOut {
    fn size_of(po: &PacketOut) -> usize {
        let data = match po.output_payload {
            Payload::Buffered(..) => 0,
            Payload::NotBuffered(ref buf) => buf.len(),
        };
        PACKET_OUT_FIXED_LEN + Action::size_of_sequence(&po.apply_actions) + data
    }

    fn parse(buf: &[u8]) -> Result<PacketOut, DecodeError> {
        check_len(buf, PACKET_OUT_FIXED_LEN)?;
        let mut bytes = Cursor::new(buf);
        let buffer_id = bytes.read_u32::<BigEndian>()?;
        let in_port = bytes.read_u32::<BigEndian>()?;
        let actions_len = bytes.read_u16::<BigEndian>()? as usize;
        bytes.consume(6);
        if PACKET_OUT_FIXED_LEN + actions_len > buf.len() {
            return Err(DecodeError::MalformedTlv("actions overrun packet-out body"));
        }
        let actions =
            Action::parse_sequence(&buf[PACKET_OUT_FIXED_LEN..PACKET_OUT_FIXED_LEN + actions_len])?;
        let data = buf[PACKET_OUT_FIXED_LEN + actions_len..].to_vec();
        let payload = match buffer_id {
            OFP_NO_BUFFER => Payload::NotBuffered(data),
            n => Payload::Buffered(n, data),
        };
        Ok(PacketOut {
            output_payload: payload,
            port_id: match in_port {
                p if p == OfpPort::OFPPAny as u32 => None,
                p => Some(p),
            },
            apply_actions: actions,
        })
    }

    fn marshal(po: PacketOut, bytes: &mut Vec<u8>) {
        let buffer_id = match po.output_payload {
            Payload::Buffered(n, _) => n,
            Payload::NotBuffered(_) => OFP_NO_BUFFER,
        };
        bytes.write_u32::<BigEndian>(buffer_id).unwrap();
        bytes
            .write_u32::<BigEndian>(po.port_id.unwrap_or(OfpPort::OFPPAny as u32))
            .unwrap();
        bytes
            .write_u16::<BigEndian>(Action::size_of_sequence(&po.apply_actions) as u16)
            .unwrap();
        write_padding(bytes, 6);
        for act in po.apply_actions {
            Action::marshal(act, bytes);
        }
        // A buffered packet is replayed from the switch buffer; only an
        // unbuffered one carries the frame again.
        if let Payload::NotBuffered(data) = po.output_payload {
            bytes.extend_from_slice(&data);
        }
    }
}

/// The body of ERROR: a type/code pair plus at least 64 bytes of the
/// offending request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorMsg {
    pub err_type: u16,
    pub code: u16,
    pub data: Vec<u8>,
}

/// Fatal version negotiation failure; any other error type leaves the session
/// where it stands.
pub const OFPET_HELLO_FAILED: u16 = 0;

impl ErrorMsg {
    /// Human-readable name of the error type, for log lines.
    pub fn type_name(&self) -> &'static str {
        match self.err_type {
            0 => "OFPET_HELLO_FAILED",
            1 => "OFPET_BAD_REQUEST",
            2 => "OFPET_BAD_ACTION",
            3 => "OFPET_BAD_INSTRUCTION",
            4 => "OFPET_BAD_MATCH",
            5 => "OFPET_FLOW_MOD_FAILED",
            10 => "OFPET_SWITCH_CONFIG_FAILED",
            _ => "OFPET_UNKNOWN",
        }
    }
}

impl MessageType for ErrorMsg {
    fn size_of(err: &ErrorMsg) -> usize {
        4 + err.data.len()
    }

    fn parse(buf: &[u8]) -> Result<ErrorMsg, DecodeError> {
        check_len(buf, 4)?;
        let mut bytes = Cursor::new(buf);
        let err_type = bytes.read_u16::<BigEndian>()?;
        let code = bytes.read_u16::<BigEndian>()?;
        Ok(ErrorMsg {
            err_type,
            code,
            data: buf[4..].to_vec(),
        })
    }

    fn marshal(err: ErrorMsg, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(err.err_type).unwrap();
        bytes.write_u16::<BigEndian>(err.code).unwrap();
        bytes.extend_from_slice(&err.data);
    }
}

/// A multipart (statistics) request or reply. The stat-specific body is kept
/// as raw bytes; this controller does not interpret statistics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Multipart {
    pub mp_type: u16,
    pub flags: u16,
    pub body: Vec<u8>,
}

impl MessageType for Multipart {
    fn size_of(mp: &Multipart) -> usize {
        8 + mp.body.len()
    }

    fn parse(buf: &[u8]) -> Result<Multipart, DecodeError> {
        check_len(buf, 8)?;
        let mut bytes = Cursor::new(buf);
        let mp_type = bytes.read_u16::<BigEndian>()?;
        let flags = bytes.read_u16::<BigEndian>()?;
        Ok(Multipart {
            mp_type,
            flags,
            body: buf[8..].to_vec(),
        })
    }

    fn marshal(mp: Multipart, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(mp.mp_type).unwrap();
        bytes.write_u16::<BigEndian>(mp.flags).unwrap();
        write_padding(bytes, 4);
        bytes.extend_from_slice(&mp.body);
    }
}

/// The body of ROLE_REQUEST and ROLE_REPLY.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Role {
    pub role: u32,
    pub generation_id: u64,
}

impl MessageType for Role {
    fn size_of(_: &Role) -> usize {
        16
    }

    fn parse(buf: &[u8]) -> Result<Role, DecodeError> {
        check_len(buf, 16)?;
        let mut bytes = Cursor::new(buf);
        let role = bytes.read_u32::<BigEndian>()?;
        bytes.consume(4);
        let generation_id = bytes.read_u64::<BigEndian>()?;
        Ok(Role {
            role,
            generation_id,
        })
    }

    fn marshal(role: Role, bytes: &mut Vec<u8>) {
        bytes.write_u32::<BigEndian>(role.role).unwrap();
        write_padding(bytes, 4);
        bytes.write_u64::<BigEndian>(role.generation_id).unwrap();
    }
}

/// Flags to indicate behavior of the physical port.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PortConfig {
    pub port_down: bool,
    pub no_recv: bool,
    pub no_fwd: bool,
    pub no_packet_in: bool,
}

impl PortConfig {
    fn of_int(d: u32) -> PortConfig {
        PortConfig {
            port_down: test_bit(0, d as u64),
            no_recv: test_bit(2, d as u64),
            no_fwd: test_bit(5, d as u64),
            no_packet_in: test_bit(6, d as u64),
        }
    }

    fn to_int(&self) -> u32 {
        let mut d: u64 = 0;
        d = bit(0, d, self.port_down);
        d = bit(2, d, self.no_recv);
        d = bit(5, d, self.no_fwd);
        d = bit(6, d, self.no_packet_in);
        d as u32
    }
}

/// Current state of a physical port. Not configurable by the controller.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PortState {
    pub link_down: bool,
    pub blocked: bool,
    pub live: bool,
}

impl PortState {
    fn of_int(d: u32) -> PortState {
        PortState {
            link_down: test_bit(0, d as u64),
            blocked: test_bit(1, d as u64),
            live: test_bit(2, d as u64),
        }
    }

    fn to_int(&self) -> u32 {
        let mut d: u64 = 0;
        d = bit(0, d, self.link_down);
        d = bit(1, d, self.blocked);
        d = bit(2, d, self.live);
        d as u32
    }
}

/// Description of a physical port. Port feature bitmaps are kept raw; this
/// controller never inspects link speeds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortDesc {
    pub port_no: u32,
    pub hw_addr: [u8; 6],
    pub name: String,
    pub config: PortConfig,
    pub state: PortState,
    pub curr: u32,
    pub advertised: u32,
    pub supported: u32,
    pub peer: u32,
    pub curr_speed: u32,
    pub max_speed: u32,
}

const PORT_DESC_LEN: usize = 64;

impl PortDesc {
    fn parse(buf: &[u8]) -> Result<PortDesc, DecodeError> {
        check_len(buf, PORT_DESC_LEN)?;
        let mut bytes = Cursor::new(buf);
        let port_no = bytes.read_u32::<BigEndian>()?;
        bytes.consume(4);
        let mut hw_addr = [0; 6];
        for b in hw_addr.iter_mut() {
            *b = bytes.read_u8()?;
        }
        bytes.consume(2);
        let name = {
            let mut raw = [0; 16];
            for b in raw.iter_mut() {
                *b = bytes.read_u8()?;
            }
            let end = raw.iter().position(|&b| b == 0).unwrap_or(16);
            String::from_utf8_lossy(&raw[..end]).into_owned()
        };
        let config = PortConfig::of_int(bytes.read_u32::<BigEndian>()?);
        let state = PortState::of_int(bytes.read_u32::<BigEndian>()?);
        Ok(PortDesc {
            port_no,
            hw_addr,
            name,
            config,
            state,
            curr: bytes.read_u32::<BigEndian>()?,
            advertised: bytes.read_u32::<BigEndian>()?,
            supported: bytes.read_u32::<BigEndian>()?,
            peer: bytes.read_u32::<BigEndian>()?,
            curr_speed: bytes.read_u32::<BigEndian>()?,
            max_speed: bytes.read_u32::<BigEndian>()?,
        })
    }

    fn marshal(pd: PortDesc, bytes: &mut Vec<u8>) {
        bytes.write_u32::<BigEndian>(pd.port_no).unwrap();
        write_padding(bytes, 4);
        bytes.extend_from_slice(&pd.hw_addr);
        write_padding(bytes, 2);
        let mut name = [0u8; 16];
        for (dst, src) in name.iter_mut().zip(pd.name.as_bytes()) {
            *dst = *src;
        }
        bytes.extend_from_slice(&name);
        bytes.write_u32::<BigEndian>(pd.config.to_int()).unwrap();
        bytes.write_u32::<BigEndian>(pd.state.to_int()).unwrap();
        bytes.write_u32::<BigEndian>(pd.curr).unwrap();
        bytes.write_u32::<BigEndian>(pd.advertised).unwrap();
        bytes.write_u32::<BigEndian>(pd.supported).unwrap();
        bytes.write_u32::<BigEndian>(pd.peer).unwrap();
        bytes.write_u32::<BigEndian>(pd.curr_speed).unwrap();
        bytes.write_u32::<BigEndian>(pd.max_speed).unwrap();
    }
}

/// What changed about a physical port.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PortReason {
    PortAdd = 0,
    PortDelete = 1,
    PortModify = 2,
}

impl PortReason {
    fn from_u8(reason: u8) -> Result<PortReason, DecodeError> {
        match reason {
            0 => Ok(PortReason::PortAdd),
            1 => Ok(PortReason::PortDelete),
            2 => Ok(PortReason::PortModify),
            _ => Err(DecodeError::MalformedTlv("unknown port status reason")),
        }
    }
}

/// A physical port has changed in the datapath.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortStatus {
    pub reason: PortReason,
    pub desc: PortDesc,
}

impl MessageType for PortStatus {
    fn size_of(_: &PortStatus) -> usize {
        8 + PORT_DESC_LEN
    }

    fn parse(buf: &[u8]) -> Result<PortStatus, DecodeError> {
        check_len(buf, 8 + PORT_DESC_LEN)?;
        let reason = PortReason::from_u8(buf[0])?;
        let desc = PortDesc::parse(&buf[8..])?;
        Ok(PortStatus { reason, desc })
    }

    fn marshal(ps: PortStatus, bytes: &mut Vec<u8>) {
        bytes.write_u8(ps.reason as u8).unwrap();
        write_padding(bytes, 7);
        PortDesc::marshal(ps.desc, bytes);
    }
}

/// Encapsulates handling of messages implementing the `MessageType` trait.
pub mod message {
    use super::*;
    use crate::error::EncodeError;
    use crate::ofp_header::{OfpHeader, OFP_VERSION};
    use crate::ofp_message::OfpMessage;

    /// Largest payload a single UDP datagram can carry; also the ceiling the
    /// 16-bit header length field imposes.
    pub const MAX_DATAGRAM_LEN: usize = 65535;

    /// Abstractions of OpenFlow 1.3 messages mapping to message codes.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Message {
        Hello,
        Error(ErrorMsg),
        EchoRequest(Vec<u8>),
        EchoReply(Vec<u8>),
        FeaturesReq,
        FeaturesReply(SwitchFeatures),
        GetConfigReq,
        GetConfigReply(SwitchConfig),
        SetConfig(SwitchConfig),
        PacketIn(PacketIn),
        PacketOut(PacketOut),
        FlowMod(FlowMod),
        MultipartReq(Multipart),
        MultipartReply(Multipart),
        PortStatus(PortStatus),
        RoleReq(Role),
        RoleReply(Role),
        BarrierReq,
        BarrierReply,
    }

    impl Message {
        /// Map `Message` to associated OpenFlow message type code `MsgCode`.
        pub fn msg_code_of_message(msg: &Message) -> MsgCode {
            match *msg {
                Message::Hello => MsgCode::Hello,
                Message::Error(_) => MsgCode::Error,
                Message::EchoRequest(_) => MsgCode::EchoReq,
                Message::EchoReply(_) => MsgCode::EchoResp,
                Message::FeaturesReq => MsgCode::FeaturesReq,
                Message::FeaturesReply(_) => MsgCode::FeaturesResp,
                Message::GetConfigReq => MsgCode::GetConfigReq,
                Message::GetConfigReply(_) => MsgCode::GetConfigResp,
                Message::SetConfig(_) => MsgCode::SetConfig,
                Message::PacketIn(_) => MsgCode::PacketIn,
                Message::PacketOut(_) => MsgCode::PacketOut,
                Message::FlowMod(_) => MsgCode::FlowMod,
                Message::MultipartReq(_) => MsgCode::MultipartReq,
                Message::MultipartReply(_) => MsgCode::MultipartResp,
                Message::PortStatus(_) => MsgCode::PortStatus,
                Message::RoleReq(_) => MsgCode::RoleReq,
                Message::RoleReply(_) => MsgCode::RoleResp,
                Message::BarrierReq => MsgCode::BarrierReq,
                Message::BarrierReply => MsgCode::BarrierResp,
            }
        }

        /// Marshal the body of the OpenFlow message `msg`.
        fn marshal_body(msg: Message, bytes: &mut Vec<u8>) {
            match msg {
                Message::Hello => (),
                Message::Error(err) => ErrorMsg::marshal(err, bytes),
                Message::EchoRequest(buf) | Message::EchoReply(buf) => {
                    bytes.extend_from_slice(&buf)
                }
                Message::FeaturesReq => (),
                Message::FeaturesReply(sf) => SwitchFeatures::marshal(sf, bytes),
                Message::GetConfigReq => (),
                Message::GetConfigReply(sc) | Message::SetConfig(sc) => {
                    SwitchConfig::marshal(sc, bytes)
                }
                Message::PacketIn(pi) => PacketIn::marshal(pi, bytes),
                Message::PacketOut(po) => PacketOut::marshal(po, bytes),
                Message::FlowMod(fm) => FlowMod::marshal(fm, bytes),
                Message::MultipartReq(mp) | Message::MultipartReply(mp) => {
                    Multipart::marshal(mp, bytes)
                }
                Message::PortStatus(ps) => PortStatus::marshal(ps, bytes),
                Message::RoleReq(role) | Message::RoleReply(role) => Role::marshal(role, bytes),
                Message::BarrierReq | Message::BarrierReply => (),
            }
        }

        /// Marshal with an explicit version byte. Only HELLO negotiation ever
        /// needs a version other than `OFP_VERSION`.
        pub fn marshal_version(
            xid: u32,
            version: u8,
            msg: Message,
        ) -> Result<Vec<u8>, EncodeError> {
            let size = OfpHeader::size() + Message::size_of(&msg);
            if size > MAX_DATAGRAM_LEN {
                return Err(EncodeError::TooLong(size));
            }
            let hdr = OfpHeader::new(
                version,
                Self::msg_code_of_message(&msg) as u8,
                size as u16,
                xid,
            );
            let mut bytes = Vec::with_capacity(size);
            OfpHeader::marshal(&mut bytes, hdr);
            Message::marshal_body(msg, &mut bytes);
            debug_assert_eq!(bytes.len(), size);
            Ok(bytes)
        }
    }

    impl OfpMessage for Message {
        /// Return the byte-size of the body of a `Message`.
        fn size_of(msg: &Message) -> usize {
            match *msg {
                Message::Hello => 0,
                Message::Error(ref err) => ErrorMsg::size_of(err),
                Message::EchoRequest(ref buf) | Message::EchoReply(ref buf) => buf.len(),
                Message::FeaturesReq => 0,
                Message::FeaturesReply(ref sf) => SwitchFeatures::size_of(sf),
                Message::GetConfigReq => 0,
                Message::GetConfigReply(ref sc) | Message::SetConfig(ref sc) => {
                    SwitchConfig::size_of(sc)
                }
                Message::PacketIn(ref pi) => PacketIn::size_of(pi),
                Message::PacketOut(ref po) => PacketOut::size_of(po),
                Message::FlowMod(ref fm) => FlowMod::size_of(fm),
                Message::MultipartReq(ref mp) | Message::MultipartReply(ref mp) => {
                    Multipart::size_of(mp)
                }
                Message::PortStatus(ref ps) => PortStatus::size_of(ps),
                Message::RoleReq(ref role) | Message::RoleReply(ref role) => Role::size_of(role),
                Message::BarrierReq | Message::BarrierReply => 0,
            }
        }

        /// Create an `OfpHeader` for the given `xid` and `msg`.
        fn header_of(xid: u32, msg: &Message) -> OfpHeader {
            let size = OfpHeader::size() + Self::size_of(msg);
            OfpHeader::new(
                OFP_VERSION,
                Self::msg_code_of_message(msg) as u8,
                size as u16,
                xid,
            )
        }

        /// Returns a `u8` buffer containing a marshaled OpenFlow header and
        /// the message `msg`.
        fn marshal(xid: u32, msg: Message) -> Result<Vec<u8>, EncodeError> {
            Message::marshal_version(xid, OFP_VERSION, msg)
        }

        /// Returns a pair `(u32, Message)` of the transaction id and OpenFlow
        /// message parsed from the given OpenFlow header `header` and body
        /// buffer `buf`.
        fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(u32, Message), DecodeError> {
            let typ = header
                .type_code()
                .ok_or(DecodeError::MalformedTlv("unknown message type code"))?;
            // HELLO may legitimately carry a foreign version byte during
            // negotiation; everything else must be OpenFlow 1.3.
            if header.version() != OFP_VERSION && typ != MsgCode::Hello {
                return Err(DecodeError::UnsupportedVersion(header.version()));
            }
            let msg = match typ {
                // Version-bitmap hello elements are tolerated and ignored.
                MsgCode::Hello => Message::Hello,
                MsgCode::Error => Message::Error(ErrorMsg::parse(buf)?),
                MsgCode::EchoReq => Message::EchoRequest(buf.to_vec()),
                MsgCode::EchoResp => Message::EchoReply(buf.to_vec()),
                MsgCode::FeaturesReq => Message::FeaturesReq,
                MsgCode::FeaturesResp => Message::FeaturesReply(SwitchFeatures::parse(buf)?),
                MsgCode::GetConfigReq => Message::GetConfigReq,
                MsgCode::GetConfigResp => Message::GetConfigReply(SwitchConfig::parse(buf)?),
                MsgCode::SetConfig => Message::SetConfig(SwitchConfig::parse(buf)?),
                MsgCode::PacketIn => Message::PacketIn(PacketIn::parse(buf)?),
                MsgCode::PacketOut => Message::PacketOut(PacketOut::parse(buf)?),
                MsgCode::FlowMod => Message::FlowMod(FlowMod::parse(buf)?),
                MsgCode::MultipartReq => Message::MultipartReq(Multipart::parse(buf)?),
                MsgCode::MultipartResp => Message::MultipartReply(Multipart::parse(buf)?),
                MsgCode::PortStatus => Message::PortStatus(PortStatus::parse(buf)?),
                MsgCode::RoleReq => Message::RoleReq(Role::parse(buf)?),
                MsgCode::RoleResp => Message::RoleReply(Role::parse(buf)?),
                MsgCode::BarrierReq => Message::BarrierReq,
                MsgCode::BarrierResp => Message::BarrierReply,
                MsgCode::Experimenter
                | MsgCode::FlowRemoved
                | MsgCode::GroupMod
                | MsgCode::PortMod
                | MsgCode::TableMod => {
                    return Err(DecodeError::MalformedTlv("unhandled message type"));
                }
            };
            Ok((header.xid(), msg))
        }
    }

    /// Parse a whole inbound datagram: header, length invariant, body.
    ///
    /// The header `length` field must equal the datagram length exactly; UDP
    /// preserves message boundaries, so any disagreement means corruption.
    pub fn parse_datagram(buf: &[u8]) -> Result<(OfpHeader, Message), DecodeError> {
        let header = OfpHeader::parse(buf)?;
        if header.length() != buf.len() {
            return Err(DecodeError::LengthMismatch {
                header: header.length(),
                actual: buf.len(),
            });
        }
        let (_, msg) = Message::parse(&header, &buf[OfpHeader::size()..])?;
        Ok((header, msg))
    }

    /// Return a `FlowMod` adding a flow parameterized by the given
    /// `priority`, `pattern`, and `actions`.
    pub fn add_flow(
        prio: u16,
        pattern: Pattern,
        actions: Vec<Action>,
        idle_timeout: Timeout,
        hard_timeout: Timeout,
    ) -> FlowMod {
        FlowMod {
            command: FlowModCmd::AddFlow,
            table_id: 0,
            pattern,
            priority: prio,
            instructions: vec![Instruction::ApplyActions(actions)],
            cookie: 0,
            cookie_mask: 0,
            idle_timeout,
            hard_timeout,
            notify_when_removed: false,
            apply_to_packet: None,
            out_port: None,
            out_group: None,
            check_overlap: false,
        }
    }

    /// The lowest-priority match-all entry that punts unmatched packets to
    /// the controller, untruncated.
    pub fn table_miss_flow() -> FlowMod {
        add_flow(
            0,
            Pattern::match_all(),
            vec![Action::Output(PseudoPort::Controller, OFPCML_NO_BUFFER)],
            Timeout::Permanent,
            Timeout::Permanent,
        )
    }
}
