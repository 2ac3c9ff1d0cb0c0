//! Full message encode/decode: header, question, resource records, and
//! the EDNS OPT pseudo-RR, tying together `name`, `edns`, and `rdata`.
//!
//! Grounded on the teacher's `dns::header::DNSHeader` (bit-packed flags
//! via `bitstream-io`) and `dns::packet::DNSPacket` (section assembly),
//! generalized to round-trip through a borrowed host buffer instead of
//! owning a `BytesMut`, since this resolver never owns its own sockets.

use std::collections::HashMap;

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};
use rand::{RngCore, SeedableRng};

use crate::error::{ResolverError, Result};
use crate::wire::edns::Edns;
use crate::wire::enums::{RecordClass, RecordType, ResponseCode};
use crate::wire::name::{decode_name, encode_name, randomize_case, validate};
use crate::wire::rdata::{self, RData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub qr: bool,
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub ad: bool,
    pub cd: bool,
    pub rcode: u8,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    pub fn query(id: u16) -> Self {
        Self {
            id,
            qr: false,
            opcode: 0,
            aa: false,
            tc: false,
            rd: true,
            ra: false,
            ad: false,
            cd: false,
            rcode: 0,
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&self.id.to_be_bytes());

        let mut bits: Vec<u8> = Vec::with_capacity(2);
        {
            let mut writer = BitWriter::endian(&mut bits, BigEndian);
            writer.write_bit(self.qr).map_err(io_err)?;
            writer.write::<u32>(4, self.opcode as u32).map_err(io_err)?;
            writer.write_bit(self.aa).map_err(io_err)?;
            writer.write_bit(self.tc).map_err(io_err)?;
            writer.write_bit(self.rd).map_err(io_err)?;
            writer.write_bit(self.ra).map_err(io_err)?;
            writer.write_bit(false).map_err(io_err)?; // Z, reserved
            writer.write_bit(self.ad).map_err(io_err)?;
            writer.write_bit(self.cd).map_err(io_err)?;
            writer.write::<u32>(4, (self.rcode & 0x0F) as u32).map_err(io_err)?;
        }
        buf.extend_from_slice(&bits);

        buf.extend_from_slice(&self.qdcount.to_be_bytes());
        buf.extend_from_slice(&self.ancount.to_be_bytes());
        buf.extend_from_slice(&self.nscount.to_be_bytes());
        buf.extend_from_slice(&self.arcount.to_be_bytes());
        Ok(())
    }

    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self> {
        if buf.len() < *pos + 12 {
            return Err(ResolverError::BadResponse("truncated header".into()));
        }
        let id = u16::from_be_bytes([buf[*pos], buf[*pos + 1]]);
        let flag_bytes = [buf[*pos + 2], buf[*pos + 3]];
        let mut reader = BitReader::endian(&flag_bytes[..], BigEndian);
        let qr: bool = reader.read_bit().map_err(io_err)?;
        let opcode: u32 = reader.read(4).map_err(io_err)?;
        let aa: bool = reader.read_bit().map_err(io_err)?;
        let tc: bool = reader.read_bit().map_err(io_err)?;
        let rd: bool = reader.read_bit().map_err(io_err)?;
        let ra: bool = reader.read_bit().map_err(io_err)?;
        let _z: bool = reader.read_bit().map_err(io_err)?;
        let ad: bool = reader.read_bit().map_err(io_err)?;
        let cd: bool = reader.read_bit().map_err(io_err)?;
        let rcode: u32 = reader.read(4).map_err(io_err)?;

        let qdcount = u16::from_be_bytes([buf[*pos + 4], buf[*pos + 5]]);
        let ancount = u16::from_be_bytes([buf[*pos + 6], buf[*pos + 7]]);
        let nscount = u16::from_be_bytes([buf[*pos + 8], buf[*pos + 9]]);
        let arcount = u16::from_be_bytes([buf[*pos + 10], buf[*pos + 11]]);
        *pos += 12;

        Ok(Self {
            id,
            qr,
            opcode: opcode as u8,
            aa,
            tc,
            rd,
            ra,
            ad,
            cd,
            rcode: rcode as u8,
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

fn io_err(_: std::io::Error) -> ResolverError {
    ResolverError::BadResponse("header bitstream error".into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Labels as transmitted (case-randomized if DNS-0x20 is active).
    pub name: Vec<String>,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: Vec<String>,
    pub rtype: RecordType,
    pub rclass: RecordClass,
    pub ttl: u32,
    pub rdata: RData,
}

#[derive(Debug, Clone, Default)]
pub struct Message {
    pub header: Option<Header>,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
    pub edns: Option<Edns>,
}

/// Inputs for building an outgoing query (spec.md §4.1).
pub struct QueryParams<'a> {
    pub id: u16,
    pub qname: &'a str,
    pub qtype: RecordType,
    pub qclass: RecordClass,
    pub dns0x20: bool,
    pub edns: Option<Edns>,
}

/// Build and encode an outgoing query, returning the wire bytes and the
/// exact qname labels transmitted (post case-randomization, if any) so
/// the caller can verify the echoed qname on response.
pub fn encode_query(params: QueryParams, rng: &mut dyn RngCore) -> Result<(Vec<u8>, Vec<String>)> {
    let labels = validate(params.qname)?;
    let transmitted = if params.dns0x20 {
        randomize_case(&labels, rng)
    } else {
        labels
    };

    let mut header = Header::query(params.id);
    header.qdcount = 1;
    if params.edns.is_some() {
        header.arcount = 1;
    }

    let mut buf = Vec::with_capacity(64);
    header.encode(&mut buf)?;

    let mut compression = HashMap::new();
    encode_name(&mut buf, &transmitted, &mut compression);
    buf.extend_from_slice(&u16::from(params.qtype).to_be_bytes());
    buf.extend_from_slice(&u16::from(params.qclass).to_be_bytes());

    if let Some(edns) = &params.edns {
        edns.encode(&mut buf);
    }

    Ok((buf, transmitted))
}

/// Decode a complete wire message.
pub fn decode_message(buf: &[u8]) -> Result<Message> {
    let mut pos = 0usize;
    let header = Header::decode(buf, &mut pos)?;

    let mut questions = Vec::with_capacity(header.qdcount as usize);
    for _ in 0..header.qdcount {
        let name = decode_name(buf, &mut pos)?;
        let qtype = u16::from_be_bytes(read2(buf, &mut pos)?).into();
        let qclass = u16::from_be_bytes(read2(buf, &mut pos)?).into();
        questions.push(Question { name, qtype, qclass });
    }

    let mut answers = Vec::with_capacity(header.ancount as usize);
    for _ in 0..header.ancount {
        answers.push(decode_rr(buf, &mut pos)?);
    }

    let mut authorities = Vec::with_capacity(header.nscount as usize);
    for _ in 0..header.nscount {
        authorities.push(decode_rr(buf, &mut pos)?);
    }

    let mut additionals = Vec::new();
    let mut edns = None;
    for _ in 0..header.arcount {
        let name_start = pos;
        let name = decode_name(buf, &mut pos)?;
        let rtype: RecordType = u16::from_be_bytes(read2(buf, &mut pos)?).into();
        let rclass = u16::from_be_bytes(read2(buf, &mut pos)?);
        let ttl = u32::from_be_bytes(read4(buf, &mut pos)?);
        let rdlen = u16::from_be_bytes(read2(buf, &mut pos)?) as usize;
        let rdata_start = pos;
        let rdata_end = rdata_start
            .checked_add(rdlen)
            .filter(|&e| e <= buf.len())
            .ok_or_else(|| ResolverError::BadResponse("truncated rdata length".into()))?;

        if matches!(rtype, RecordType::OPT) {
            if !name.is_empty() {
                return Err(ResolverError::BadResponse("OPT record with non-root name".into()));
            }
            edns = Some(Edns::decode(rclass, ttl, &buf[rdata_start..rdata_end]));
        } else {
            let parsed = rdata::parse(rtype, buf, rdata_start, rdlen)?;
            additionals.push(ResourceRecord {
                name,
                rtype,
                rclass: rclass.into(),
                ttl,
                rdata: parsed,
            });
        }
        pos = rdata_end;
        let _ = name_start;
    }

    Ok(Message {
        header: Some(header),
        questions,
        answers,
        authorities,
        additionals,
        edns,
    })
}

fn decode_rr(buf: &[u8], pos: &mut usize) -> Result<ResourceRecord> {
    let name = decode_name(buf, pos)?;
    let rtype: RecordType = u16::from_be_bytes(read2(buf, pos)?).into();
    let rclass: RecordClass = u16::from_be_bytes(read2(buf, pos)?).into();
    let ttl = u32::from_be_bytes(read4(buf, pos)?);
    let rdlen = u16::from_be_bytes(read2(buf, pos)?) as usize;
    let rdata_start = *pos;
    let rdata_end = rdata_start
        .checked_add(rdlen)
        .filter(|&e| e <= buf.len())
        .ok_or_else(|| ResolverError::BadResponse("truncated rdata length".into()))?;
    let parsed = rdata::parse(rtype, buf, rdata_start, rdlen)?;
    *pos = rdata_end;
    Ok(ResourceRecord {
        name,
        rtype,
        rclass,
        ttl,
        rdata: parsed,
    })
}

fn read2(buf: &[u8], pos: &mut usize) -> Result<[u8; 2]> {
    let bytes = buf
        .get(*pos..*pos + 2)
        .ok_or_else(|| ResolverError::BadResponse("truncated field".into()))?;
    let out = [bytes[0], bytes[1]];
    *pos += 2;
    Ok(out)
}

fn read4(buf: &[u8], pos: &mut usize) -> Result<[u8; 4]> {
    let bytes = buf
        .get(*pos..*pos + 4)
        .ok_or_else(|| ResolverError::BadResponse("truncated field".into()))?;
    let out = [bytes[0], bytes[1], bytes[2], bytes[3]];
    *pos += 4;
    Ok(out)
}

impl Message {
    pub fn rcode(&self) -> ResponseCode {
        let low = self.header.map(|h| h.rcode).unwrap_or(0);
        let combined = self
            .edns
            .as_ref()
            .map(|e| e.combined_rcode(low))
            .unwrap_or(low as u16);
        (combined as u8).into()
    }

    pub fn is_truncated(&self) -> bool {
        self.header.map(|h| h.tc).unwrap_or(false)
    }
}
