//! RFC 7873 DNS Cookies: an 8-byte client cookie plus an 8-32 byte
//! server cookie, carried in the EDNS COOKIE option (code 10).
//!
//! Not present in the teacher (heimdall has no cookie support); grounded
//! on `examples/other_examples` RFC-option-handling conventions and
//! `wire::edns`'s own option TLV shape, following the same "small struct
//! plus explicit encode/decode, reject malformed input" style as the
//! rest of `wire/`.

use rand::{RngCore, SeedableRng};

use crate::error::{ResolverError, Result};

pub const CLIENT_COOKIE_LEN: usize = 8;
pub const MIN_SERVER_COOKIE_LEN: usize = 8;
pub const MAX_SERVER_COOKIE_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientCookie(pub [u8; CLIENT_COOKIE_LEN]);

impl ClientCookie {
    pub fn generate(rng: &mut dyn RngCore) -> Self {
        let mut bytes = [0u8; CLIENT_COOKIE_LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

/// Per-server cookie state: our own client cookie plus whatever server
/// cookie that server last handed back. Kept in the server pool entry,
/// one per upstream (spec.md §4.1: cookies are scoped per server, not
/// per query).
#[derive(Debug, Clone, Default)]
pub struct ServerCookieState {
    pub client: Option<ClientCookie>,
    pub server_cookie: Option<Vec<u8>>,
}

impl ServerCookieState {
    /// The option bytes to send on the next query: our client cookie,
    /// generating one on first use, plus any server cookie we were
    /// previously handed.
    pub fn outgoing_option(&mut self, rng: &mut dyn RngCore) -> Vec<u8> {
        let client = *self
            .client
            .get_or_insert_with(|| ClientCookie::generate(rng));
        let mut out = client.0.to_vec();
        if let Some(server) = &self.server_cookie {
            out.extend_from_slice(server);
        }
        out
    }

    /// Record a server's response cookie option. Returns an error if the
    /// echoed client cookie doesn't match ours, which the caller treats
    /// as a spoofing indicator (spec.md §4.1 cookie anti-spoof).
    pub fn observe_response(&mut self, option: &[u8]) -> Result<()> {
        let (client, server) = parse(option)?;
        let Some(expected) = self.client else {
            return Err(ResolverError::BadResponse(
                "cookie response with no outstanding request".into(),
            ));
        };
        if client != expected {
            return Err(ResolverError::BadResponse("cookie client mismatch".into()));
        }
        if let Some(server) = server {
            self.server_cookie = Some(server.to_vec());
        }
        Ok(())
    }
}

/// Parse a raw COOKIE option into (client, optional server) cookie.
/// Valid lengths are exactly 8 (client only) or 16..=40 (client +
/// 8..=32 byte server cookie); anything else is malformed per RFC 7873
/// §4.
pub fn parse(option: &[u8]) -> Result<(ClientCookie, Option<&[u8]>)> {
    if option.len() == CLIENT_COOKIE_LEN {
        let mut client = [0u8; CLIENT_COOKIE_LEN];
        client.copy_from_slice(option);
        return Ok((ClientCookie(client), None));
    }
    if option.len() < CLIENT_COOKIE_LEN + MIN_SERVER_COOKIE_LEN
        || option.len() > CLIENT_COOKIE_LEN + MAX_SERVER_COOKIE_LEN
    {
        return Err(ResolverError::BadResponse("malformed cookie option".into()));
    }
    let mut client = [0u8; CLIENT_COOKIE_LEN];
    client.copy_from_slice(&option[..CLIENT_COOKIE_LEN]);
    Ok((ClientCookie(client), Some(&option[CLIENT_COOKIE_LEN..])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_only_cookie_round_trips() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let mut state = ServerCookieState::default();
        let sent = state.outgoing_option(&mut rng);
        assert_eq!(sent.len(), CLIENT_COOKIE_LEN);

        // server echoes our client cookie with its own server cookie appended
        let mut reply = sent.clone();
        reply.extend_from_slice(&[9u8; 16]);
        state.observe_response(&reply).unwrap();
        assert_eq!(state.server_cookie.as_deref(), Some([9u8; 16].as_slice()));
    }

    #[test]
    fn mismatched_client_cookie_is_rejected() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let mut state = ServerCookieState::default();
        let _ = state.outgoing_option(&mut rng);

        let mut forged = [0xFFu8; CLIENT_COOKIE_LEN].to_vec();
        forged.extend_from_slice(&[9u8; 8]);
        assert!(state.observe_response(&forged).is_err());
    }

    #[test]
    fn rejects_bad_lengths() {
        assert!(parse(&[0u8; 4]).is_err());
        assert!(parse(&[0u8; 41]).is_err());
        assert!(parse(&[0u8; 8]).is_ok());
        assert!(parse(&[0u8; 16]).is_ok());
    }
}
