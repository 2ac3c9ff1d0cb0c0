//! Parsed RDATA variants, grounded on the teacher's `dns::types` RDATA
//! enum (one variant per record type, opaque fallback for the rest) but
//! scoped to the types the query engine and cache actually inspect
//! (spec.md §4.1/§4.4: A/AAAA/CNAME answers, NS/glue for referrals,
//! SOA for negative-cache TTLs).

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::{ResolverError, Result};
use crate::wire::name::decode_name;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Cname(Vec<String>),
    Ns(Vec<String>),
    Ptr(Vec<String>),
    Mx { preference: u16, exchange: Vec<String> },
    Txt(Vec<Vec<u8>>),
    Soa {
        mname: Vec<String>,
        rname: Vec<String>,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: Vec<String>,
    },
    Opaque(Vec<u8>),
}

/// Parse RDATA given its already-decoded type, the raw message (for
/// names that may contain compression pointers into earlier RRs), and
/// the RDATA's own byte range.
pub fn parse(
    rtype: crate::wire::enums::RecordType,
    message: &[u8],
    rdata_start: usize,
    rdata_len: usize,
) -> Result<RData> {
    use crate::wire::enums::RecordType as T;

    let rdata = message
        .get(rdata_start..rdata_start + rdata_len)
        .ok_or_else(|| ResolverError::BadResponse("truncated rdata".into()))?;

    match rtype {
        T::A => {
            if rdata.len() != 4 {
                return Err(ResolverError::BadResponse("bad A rdata length".into()));
            }
            Ok(RData::A(Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3])))
        }
        T::AAAA => {
            if rdata.len() != 16 {
                return Err(ResolverError::BadResponse("bad AAAA rdata length".into()));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(rdata);
            Ok(RData::Aaaa(Ipv6Addr::from(octets)))
        }
        T::CNAME => {
            let mut pos = rdata_start;
            Ok(RData::Cname(decode_name(message, &mut pos)?))
        }
        T::NS => {
            let mut pos = rdata_start;
            Ok(RData::Ns(decode_name(message, &mut pos)?))
        }
        T::PTR => {
            let mut pos = rdata_start;
            Ok(RData::Ptr(decode_name(message, &mut pos)?))
        }
        T::MX => {
            if rdata.len() < 3 {
                return Err(ResolverError::BadResponse("bad MX rdata length".into()));
            }
            let preference = u16::from_be_bytes([rdata[0], rdata[1]]);
            let mut pos = rdata_start + 2;
            let exchange = decode_name(message, &mut pos)?;
            Ok(RData::Mx { preference, exchange })
        }
        T::TXT => {
            let mut strings = Vec::new();
            let mut i = 0usize;
            while i < rdata.len() {
                let len = rdata[i] as usize;
                let start = i + 1;
                let end = start + len;
                let chunk = rdata
                    .get(start..end)
                    .ok_or_else(|| ResolverError::BadResponse("truncated TXT chunk".into()))?;
                strings.push(chunk.to_vec());
                i = end;
            }
            Ok(RData::Txt(strings))
        }
        T::SOA => {
            let mut pos = rdata_start;
            let mname = decode_name(message, &mut pos)?;
            let rname = decode_name(message, &mut pos)?;
            let tail = message
                .get(pos..pos + 20)
                .ok_or_else(|| ResolverError::BadResponse("truncated SOA tail".into()))?;
            Ok(RData::Soa {
                mname,
                rname,
                serial: u32::from_be_bytes(tail[0..4].try_into().unwrap()),
                refresh: u32::from_be_bytes(tail[4..8].try_into().unwrap()),
                retry: u32::from_be_bytes(tail[8..12].try_into().unwrap()),
                expire: u32::from_be_bytes(tail[12..16].try_into().unwrap()),
                minimum: u32::from_be_bytes(tail[16..20].try_into().unwrap()),
            })
        }
        T::SRV => {
            if rdata.len() < 6 {
                return Err(ResolverError::BadResponse("bad SRV rdata length".into()));
            }
            let priority = u16::from_be_bytes([rdata[0], rdata[1]]);
            let weight = u16::from_be_bytes([rdata[2], rdata[3]]);
            let port = u16::from_be_bytes([rdata[4], rdata[5]]);
            let mut pos = rdata_start + 6;
            let target = decode_name(message, &mut pos)?;
            Ok(RData::Srv { priority, weight, port, target })
        }
        _ => Ok(RData::Opaque(rdata.to_vec())),
    }
}

impl RData {
    /// SOA MINIMUM, used for capping negative-cache TTLs (spec.md §4.4).
    pub fn soa_minimum(&self) -> Option<u32> {
        match self {
            RData::Soa { minimum, .. } => Some(*minimum),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::enums::RecordType;
    use std::collections::HashMap;

    #[test]
    fn parses_a_record() {
        let rdata = vec![93, 184, 216, 34];
        let parsed = parse(RecordType::A, &rdata, 0, 4).unwrap();
        assert_eq!(parsed, RData::A(Ipv4Addr::new(93, 184, 216, 34)));
    }

    #[test]
    fn parses_cname_with_compression() {
        let mut msg = Vec::new();
        let mut comp = HashMap::new();
        crate::wire::name::encode_name(&mut msg, &["example".into(), "com".into()], &mut comp);
        let target_offset = msg.len();
        msg.push(0xC0);
        msg.push(0x00);

        let parsed = parse(RecordType::CNAME, &msg, target_offset, 2).unwrap();
        assert_eq!(parsed, RData::Cname(vec!["example".into(), "com".into()]));
    }

    #[test]
    fn parses_soa_minimum() {
        let mut msg = Vec::new();
        let mut comp = HashMap::new();
        crate::wire::name::encode_name(&mut msg, &["ns1".into(), "example".into(), "com".into()], &mut comp);
        crate::wire::name::encode_name(&mut msg, &["hostmaster".into(), "example".into(), "com".into()], &mut comp);
        let tail_start = msg.len();
        msg.extend_from_slice(&1u32.to_be_bytes()); // serial
        msg.extend_from_slice(&7200u32.to_be_bytes()); // refresh
        msg.extend_from_slice(&3600u32.to_be_bytes()); // retry
        msg.extend_from_slice(&1209600u32.to_be_bytes()); // expire
        msg.extend_from_slice(&300u32.to_be_bytes()); // minimum

        let rdata_len = msg.len();
        let parsed = parse(RecordType::SOA, &msg, 0, rdata_len).unwrap();
        assert_eq!(parsed.soa_minimum(), Some(300));
        let _ = tail_start;
    }
}
