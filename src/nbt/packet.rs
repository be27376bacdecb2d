//! NetBIOS name service packet codec: the 12-byte big-endian header,
//! question section, and resource records, together with the request
//! constructors used by the query layer.

use std::net::SocketAddrV4;

use crate::nbt::name::NbtName;
use crate::nbt::MAX_DGRAM_SIZE;

/// Name query question type.
pub const QTYPE_NB: u16 = 0x0020;
/// Node status question type.
pub const QTYPE_NBSTAT: u16 = 0x0021;
/// Internet class.
pub const QCLASS_IN: u16 = 0x0001;

/// Folded header flag bits reported alongside query results.
pub const NM_FLAGS_B: u8 = 0x01;
pub const NM_FLAGS_RA: u8 = 0x08;
pub const NM_FLAGS_RD: u8 = 0x10;
pub const NM_FLAGS_TC: u8 = 0x20;
pub const NM_FLAGS_AA: u8 = 0x40;
pub const NM_FLAGS_RS: u8 = 0x80;

/// Kind of packet a relay subscription is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    NameService,
    Datagram,
}

/// Header `NM_FLAGS` bits plus the broadcast bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NmFlags {
    pub bcast: bool,
    pub recursion_available: bool,
    pub recursion_desired: bool,
    pub trunc: bool,
    pub authoritative: bool,
}

impl NmFlags {
    fn to_bits(self) -> u16 {
        let mut bits = 0;
        if self.authoritative {
            bits |= 0x40;
        }
        if self.trunc {
            bits |= 0x20;
        }
        if self.recursion_desired {
            bits |= 0x10;
        }
        if self.recursion_available {
            bits |= 0x08;
        }
        if self.bcast {
            bits |= 0x01;
        }
        bits
    }

    fn from_bits(bits: u16) -> Self {
        Self {
            authoritative: bits & 0x40 != 0,
            trunc: bits & 0x20 != 0,
            recursion_desired: bits & 0x10 != 0,
            recursion_available: bits & 0x08 != 0,
            bcast: bits & 0x01 != 0,
        }
    }
}

/// 12-byte packet header.
#[derive(Debug, Clone, Default)]
pub struct NbtHeader {
    pub trn_id: u16,
    pub response: bool,
    pub opcode: u8,
    pub nm_flags: NmFlags,
    pub rcode: u8,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

#[derive(Debug, Clone)]
pub struct NbtQuestion {
    pub name: NbtName,
    pub question_type: u16,
    pub question_class: u16,
}

#[derive(Debug, Clone)]
pub struct NbtAnswer {
    pub name: NbtName,
    pub rr_type: u16,
    pub rr_class: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

/// A parsed or to-be-sent name service packet. `src` is the peer the
/// packet arrived from; for outgoing packets it is unused.
#[derive(Debug, Clone)]
pub struct NbtPacket {
    pub header: NbtHeader,
    pub questions: Vec<NbtQuestion>,
    pub answers: Vec<NbtAnswer>,
    pub src: Option<SocketAddrV4>,
}

/// Random 15-bit transaction id.
pub fn generate_trn_id() -> u16 {
    rand::random::<u16>() % 0x7fff
}

/// Human-readable meaning of a negative response code.
pub fn rcode_text(rcode: u8) -> &'static str {
    match rcode {
        0x01 => "request was invalidly formatted",
        0x02 => "problem with NBNS, cannot process name",
        0x03 => "the name requested does not exist",
        0x04 => "unsupported request error",
        0x05 => "query refused error",
        _ => "unrecognized error code",
    }
}

impl NbtPacket {
    /// Name query request (question type 0x20).
    pub fn name_query_request(trn_id: u16, name: &NbtName, bcast: bool, recurse: bool) -> Self {
        Self {
            header: NbtHeader {
                trn_id,
                response: false,
                opcode: 0,
                nm_flags: NmFlags {
                    bcast,
                    recursion_desired: recurse,
                    ..NmFlags::default()
                },
                rcode: 0,
                qdcount: 1,
                ancount: 0,
                nscount: 0,
                arcount: 0,
            },
            questions: vec![NbtQuestion {
                name: name.clone(),
                question_type: QTYPE_NB,
                question_class: QCLASS_IN,
            }],
            answers: Vec::new(),
            src: None,
        }
    }

    /// Node status request (question type 0x21).
    pub fn node_status_request(trn_id: u16, name: &NbtName) -> Self {
        Self {
            header: NbtHeader {
                trn_id,
                response: false,
                opcode: 0,
                nm_flags: NmFlags::default(),
                rcode: 0,
                qdcount: 1,
                ancount: 0,
                nscount: 0,
                arcount: 0,
            },
            questions: vec![NbtQuestion {
                name: name.clone(),
                question_type: QTYPE_NBSTAT,
                question_class: QCLASS_IN,
            }],
            answers: Vec::new(),
            src: None,
        }
    }

    /// Serialize into wire format. Returns `None` when the result would
    /// not fit into the fixed send buffer.
    pub fn build(&self) -> Option<Vec<u8>> {
        let h = &self.header;
        let mut flags: u16 = (h.nm_flags.to_bits()) << 4 | u16::from(h.rcode & 0x0f);
        flags |= u16::from(h.opcode & 0x0f) << 11;
        if h.response {
            flags |= 0x8000;
        }

        let mut buf = Vec::with_capacity(MAX_DGRAM_SIZE);
        buf.extend_from_slice(&h.trn_id.to_be_bytes());
        buf.extend_from_slice(&flags.to_be_bytes());
        buf.extend_from_slice(&(self.questions.len() as u16).to_be_bytes());
        buf.extend_from_slice(&(self.answers.len() as u16).to_be_bytes());
        buf.extend_from_slice(&h.nscount.to_be_bytes());
        buf.extend_from_slice(&h.arcount.to_be_bytes());

        for q in &self.questions {
            q.name.encode(&mut buf);
            buf.extend_from_slice(&q.question_type.to_be_bytes());
            buf.extend_from_slice(&q.question_class.to_be_bytes());
        }
        for a in &self.answers {
            a.name.encode(&mut buf);
            buf.extend_from_slice(&a.rr_type.to_be_bytes());
            buf.extend_from_slice(&a.rr_class.to_be_bytes());
            buf.extend_from_slice(&a.ttl.to_be_bytes());
            buf.extend_from_slice(&(a.rdata.len() as u16).to_be_bytes());
            buf.extend_from_slice(&a.rdata);
        }

        if buf.len() > MAX_DGRAM_SIZE {
            log::trace!("packet of {} bytes exceeds send buffer", buf.len());
            return None;
        }
        Some(buf)
    }

    /// Parse a received datagram. Anything malformed yields `None`; the
    /// transport simply keeps listening.
    pub fn parse(buf: &[u8], src: SocketAddrV4) -> Option<Self> {
        if buf.len() < 12 {
            return None;
        }
        let trn_id = u16::from_be_bytes([buf[0], buf[1]]);
        let flags = u16::from_be_bytes([buf[2], buf[3]]);
        let qdcount = u16::from_be_bytes([buf[4], buf[5]]);
        let ancount = u16::from_be_bytes([buf[6], buf[7]]);
        let nscount = u16::from_be_bytes([buf[8], buf[9]]);
        let arcount = u16::from_be_bytes([buf[10], buf[11]]);

        let header = NbtHeader {
            trn_id,
            response: flags & 0x8000 != 0,
            opcode: ((flags >> 11) & 0x0f) as u8,
            nm_flags: NmFlags::from_bits((flags >> 4) & 0x7f),
            rcode: (flags & 0x0f) as u8,
            qdcount,
            ancount,
            nscount,
            arcount,
        };

        let mut offset = 12;
        let mut questions = Vec::new();
        for _ in 0..qdcount {
            let (name, next) = NbtName::decode(buf, offset)?;
            let question_type = u16::from_be_bytes([*buf.get(next)?, *buf.get(next + 1)?]);
            let question_class = u16::from_be_bytes([*buf.get(next + 2)?, *buf.get(next + 3)?]);
            questions.push(NbtQuestion {
                name,
                question_type,
                question_class,
            });
            offset = next + 4;
        }

        let mut answers = Vec::new();
        for _ in 0..ancount {
            let (name, next) = NbtName::decode(buf, offset)?;
            let rr_type = u16::from_be_bytes([*buf.get(next)?, *buf.get(next + 1)?]);
            let rr_class = u16::from_be_bytes([*buf.get(next + 2)?, *buf.get(next + 3)?]);
            let ttl = u32::from_be_bytes([
                *buf.get(next + 4)?,
                *buf.get(next + 5)?,
                *buf.get(next + 6)?,
                *buf.get(next + 7)?,
            ]);
            let rdlength = u16::from_be_bytes([*buf.get(next + 8)?, *buf.get(next + 9)?]) as usize;
            let rdata = buf.get(next + 10..next + 10 + rdlength)?.to_vec();
            answers.push(NbtAnswer {
                name,
                rr_type,
                rr_class,
                ttl,
                rdata,
            });
            offset = next + 10 + rdlength;
        }

        Some(Self {
            header,
            questions,
            answers,
            src: Some(src),
        })
    }
}
