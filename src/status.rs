//! Stable, FFI-shaped outcome codes for the public query callback.
//!
//! These mirror the ABI-stable integer codes a host embedding this core
//! would switch on; `ResolverError` (see `error.rs`) is the rich internal
//! error type and maps onto this set through `Status::from`.

/// Outcome of a submitted query, passed to the caller's callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Success = 0,
    ENoData,
    EFormErr,
    EServFail,
    ENotFound,
    ENotImp,
    ERefused,
    EBadQuery,
    EBadName,
    EBadFamily,
    EBadResp,
    EConnRefused,
    ETimeout,
    EOf,
    EFile,
    ENoMem,
    EDestruction,
    EBadStr,
    EBadFlags,
    ENoName,
    EBadHints,
    ENotInitialized,
    /// Windows-only: `LoadLibrary("iphlpapi.dll")` failed. Never
    /// produced by this crate (no Windows network-params collaborator
    /// lives here), kept for ABI parity with the full error-code table
    /// (spec.md §6).
    ELoadIpHlpApi,
    /// Windows-only: `GetNetworkParams` failed. Same status as above.
    EAddrGetNetworkParams,
    ECancelled,
    EService,
}

impl Status {
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success | Status::ENoData | Status::ENotFound)
    }

    /// Whether this status represents a definitive DNS outcome (as opposed
    /// to a transient/local failure) that a search-list walk should stop on
    /// if it isn't NXDOMAIN/NODATA.
    pub fn is_definitive(self) -> bool {
        matches!(
            self,
            Status::Success | Status::ENoData | Status::ENotFound | Status::EFormErr
        )
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Success => "SUCCESS",
            Status::ENoData => "ENODATA",
            Status::EFormErr => "EFORMERR",
            Status::EServFail => "ESERVFAIL",
            Status::ENotFound => "ENOTFOUND",
            Status::ENotImp => "ENOTIMP",
            Status::ERefused => "EREFUSED",
            Status::EBadQuery => "EBADQUERY",
            Status::EBadName => "EBADNAME",
            Status::EBadFamily => "EBADFAMILY",
            Status::EBadResp => "EBADRESP",
            Status::EConnRefused => "ECONNREFUSED",
            Status::ETimeout => "ETIMEOUT",
            Status::EOf => "EOF",
            Status::EFile => "EFILE",
            Status::ENoMem => "ENOMEM",
            Status::EDestruction => "EDESTRUCTION",
            Status::EBadStr => "EBADSTR",
            Status::EBadFlags => "EBADFLAGS",
            Status::ENoName => "ENONAME",
            Status::EBadHints => "EBADHINTS",
            Status::ENotInitialized => "ENOTINITIALIZED",
            Status::ELoadIpHlpApi => "ELOADIPHLPAPI",
            Status::EAddrGetNetworkParams => "EADDRGETNETWORKPARAMS",
            Status::ECancelled => "ECANCELLED",
            Status::EService => "ESERVICE",
        };
        f.write_str(s)
    }
}
