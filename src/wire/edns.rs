//! EDNS(0) OPT pseudo-RR (RFC 6891), grounded on the teacher's
//! `dns::edns` module (`EdnsOptsBuilder`, option TLV encode/decode)
//! generalized to the option set this resolver actually needs: the
//! payload-size/extended-rcode/version/flags header plus a COOKIE option
//! (`OptionCode::Cookie`), with unknown options preserved as opaque TLVs
//! rather than dropped.

use smallvec::SmallVec;

use crate::wire::enums::RecordType;

pub const OPT_VERSION: u8 = 0;
pub const FLAG_DO: u16 = 1 << 15;

pub const OPTCODE_COOKIE: u16 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdnsOption {
    pub code: u16,
    pub data: Vec<u8>,
}

/// Most OPT records carry zero or one option (COOKIE); inlining the
/// common case avoids a heap allocation per query.
pub type EdnsOptions = SmallVec<[EdnsOption; 2]>;

/// The OPT pseudo-RR, in parsed form. `udp_payload_size` and the
/// extended RCODE bits live in the RR's CLASS/TTL fields on the wire;
/// here they're already split out so callers never touch raw OPT bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edns {
    pub udp_payload_size: u16,
    pub extended_rcode: u8,
    pub version: u8,
    pub flags: u16,
    pub options: EdnsOptions,
}

impl Edns {
    pub fn new(udp_payload_size: u16) -> Self {
        Self {
            udp_payload_size,
            extended_rcode: 0,
            version: OPT_VERSION,
            flags: 0,
            options: SmallVec::new(),
        }
    }

    pub fn cookie_option(&self) -> Option<&[u8]> {
        self.options
            .iter()
            .find(|o| o.code == OPTCODE_COOKIE)
            .map(|o| o.data.as_slice())
    }

    pub fn set_cookie_option(&mut self, data: Vec<u8>) {
        self.options.retain(|o| o.code != OPTCODE_COOKIE);
        self.options.push(EdnsOption {
            code: OPTCODE_COOKIE,
            data,
        });
    }

    /// Combined RCODE: low 4 bits from the message header, high 8 bits
    /// from this OPT record (RFC 6891 §6.1.3).
    pub fn combined_rcode(&self, header_rcode_low: u8) -> u16 {
        ((self.extended_rcode as u16) << 4) | (header_rcode_low as u16 & 0x0F)
    }

    /// Encode as an additional-section RR: root name, TYPE=OPT, then the
    /// CLASS/TTL/RDATA fields packed per RFC 6891 §6.1.2.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(0); // root name
        buf.extend_from_slice(&u16::from(RecordType::OPT).to_be_bytes());
        buf.extend_from_slice(&self.udp_payload_size.to_be_bytes()); // CLASS
        buf.push(self.extended_rcode);
        buf.push(self.version);
        buf.extend_from_slice(&self.flags.to_be_bytes());

        let mut rdata = Vec::new();
        for opt in &self.options {
            rdata.extend_from_slice(&opt.code.to_be_bytes());
            rdata.extend_from_slice(&(opt.data.len() as u16).to_be_bytes());
            rdata.extend_from_slice(&opt.data);
        }
        buf.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        buf.extend_from_slice(&rdata);
    }

    /// Decode the CLASS/TTL/RDATA fields of an OPT RR (name and TYPE
    /// already consumed by the caller).
    pub fn decode(class: u16, ttl: u32, rdata: &[u8]) -> Self {
        let extended_rcode = ((ttl >> 24) & 0xFF) as u8;
        let version = ((ttl >> 16) & 0xFF) as u8;
        let flags = (ttl & 0xFFFF) as u16;

        let mut options = SmallVec::new();
        let mut i = 0usize;
        while i + 4 <= rdata.len() {
            let code = u16::from_be_bytes([rdata[i], rdata[i + 1]]);
            let len = u16::from_be_bytes([rdata[i + 2], rdata[i + 3]]) as usize;
            let start = i + 4;
            let end = (start + len).min(rdata.len());
            options.push(EdnsOption {
                code,
                data: rdata[start..end].to_vec(),
            });
            i = end;
        }

        Self {
            udp_payload_size: class,
            extended_rcode,
            version,
            flags,
            options,
        }
    }
}
