//! Domain name encode/decode: label splitting, name compression, and
//! DNS-0x20 case randomization (spec.md §4.1).
//!
//! Grounded on the teacher's `dns::util::{encode_domain_name,
//! decode_domain_name}` (manual length-prefixed label pushes) generalized
//! to support compression pointers and case-preserving decode, which the
//! teacher's helper did not need for its own callers.

use rand::{RngCore, SeedableRng};
use std::collections::HashMap;

use crate::error::{ResolverError, Result};

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;
const MAX_POINTER_HOPS: usize = 32;

/// Split a presentation-format name (`"www.example.com"`, `""` for root)
/// into labels, stripping one trailing dot.
pub fn split_labels(name: &str) -> Vec<&str> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('.').collect()
    }
}

pub fn join_labels(labels: &[String]) -> String {
    labels.join(".")
}

/// Validate a presentation-format name per spec.md §4.5 step 1: labels
/// must be non-empty ASCII, <=63 bytes, overall <=255 wire bytes.
pub fn validate(name: &str) -> Result<Vec<String>> {
    let labels = split_labels(name);
    let mut wire_len = 1usize; // terminating root label
    let mut out = Vec::with_capacity(labels.len());
    for label in &labels {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(ResolverError::BadName(name.to_string()));
        }
        if !label.is_ascii() {
            return Err(ResolverError::BadName(name.to_string()));
        }
        wire_len += label.len() + 1;
        out.push((*label).to_string());
    }
    if wire_len > MAX_NAME_LEN {
        return Err(ResolverError::BadName(name.to_string()));
    }
    Ok(out)
}

/// Apply DNS-0x20: independently randomize the case of every ASCII
/// letter. Skipped entirely for all-dotless-ASCII-only names is not a
/// real restriction; the spec's "not all-ASCII-dotless" caveat refers to
/// names that are already empty/root, which have no letters to flip.
pub fn randomize_case(labels: &[String], rng: &mut dyn RngCore) -> Vec<String> {
    labels
        .iter()
        .map(|label| {
            label
                .chars()
                .map(|c| {
                    if c.is_ascii_alphabetic() && rng.next_u32() & 1 == 1 {
                        if c.is_ascii_lowercase() {
                            c.to_ascii_uppercase()
                        } else {
                            c.to_ascii_lowercase()
                        }
                    } else {
                        c
                    }
                })
                .collect()
        })
        .collect()
}

/// Encode labels into wire format at `buf`'s current end, writing a
/// compression pointer when a suffix of `labels` was already written
/// earlier in the same message (tracked via `compression`, keyed by the
/// lowercased dotted suffix).
pub fn encode_name(
    buf: &mut Vec<u8>,
    labels: &[String],
    compression: &mut HashMap<String, u16>,
) {
    for i in 0..labels.len() {
        let suffix = labels[i..].join(".").to_lowercase();
        if let Some(&ptr) = compression.get(&suffix) {
            buf.push(0xC0 | ((ptr >> 8) as u8));
            buf.push((ptr & 0xFF) as u8);
            return;
        }
        if buf.len() <= 0x3FFF {
            compression.insert(suffix, buf.len() as u16);
        }
        let label = &labels[i];
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);
}

/// Decode a name starting at `pos`, following compression pointers.
/// Returns the labels exactly as received (case preserved, for DNS-0x20
/// verification) and advances `pos` past the name *in the non-pointer
/// case* (callers that need the post-name offset when a pointer was
/// followed should capture `pos` before calling, since a pointer jump
/// only ever appears as the last element of a name).
pub fn decode_name(buf: &[u8], pos: &mut usize) -> Result<Vec<String>> {
    let mut labels = Vec::new();
    let mut cursor = *pos;
    let mut hops = 0usize;
    let mut end_of_name: Option<usize> = None;

    loop {
        let len = *buf
            .get(cursor)
            .ok_or_else(|| ResolverError::BadResponse("truncated name".into()))?;

        if len == 0 {
            cursor += 1;
            if end_of_name.is_none() {
                end_of_name = Some(cursor);
            }
            break;
        }

        if len & 0xC0 == 0xC0 {
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return Err(ResolverError::BadResponse("compression loop".into()));
            }
            let lo = *buf
                .get(cursor + 1)
                .ok_or_else(|| ResolverError::BadResponse("truncated pointer".into()))?;
            let ptr = (((len & 0x3F) as usize) << 8) | (lo as usize);
            if end_of_name.is_none() {
                end_of_name = Some(cursor + 2);
            }
            if ptr >= cursor {
                return Err(ResolverError::BadResponse("forward compression pointer".into()));
            }
            cursor = ptr;
            continue;
        }

        if len & 0xC0 != 0 {
            return Err(ResolverError::BadResponse("reserved label length bits".into()));
        }

        let len = len as usize;
        let start = cursor + 1;
        let end = start + len;
        let bytes = buf
            .get(start..end)
            .ok_or_else(|| ResolverError::BadResponse("truncated label".into()))?;
        let label = String::from_utf8(bytes.to_vec())
            .map_err(|_| ResolverError::BadResponse("non-UTF8 label".into()))?;
        labels.push(label);
        cursor = end;

        if labels.len() > MAX_NAME_LEN {
            return Err(ResolverError::BadResponse("name too long".into()));
        }
    }

    *pos = end_of_name.unwrap_or(cursor);
    Ok(labels)
}
