use thiserror::Error;

use crate::status::Status;

pub type Result<T> = std::result::Result<T, ResolverError>;

/// Internal, rich error type for the resolver core.
///
/// Every variant maps to one of the stable [`Status`] codes via
/// [`ResolverError::status`]; the status is what ultimately reaches the
/// caller's callback, while this type carries enough context for logging.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("malformed query name: {0}")]
    BadName(String),

    #[error("invalid option flags")]
    BadFlags,

    #[error("no servers configured")]
    NoServers,

    #[error("malformed response from server: {0}")]
    BadResponse(String),

    #[error("server refused the query")]
    Refused,

    #[error("server does not implement the query")]
    NotImplemented,

    #[error("server failure (SERVFAIL)")]
    ServFail,

    #[error("format error from server")]
    FormErr,

    #[error("query timed out after exhausting retry budget")]
    Timeout,

    #[error("channel was destroyed")]
    Destruction,

    #[error("query was cancelled")]
    Cancelled,

    #[error("connection refused by {0}")]
    ConnRefused(std::net::SocketAddr),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("allocation failure")]
    NoMem,
}

impl ResolverError {
    pub fn status(&self) -> Status {
        match self {
            ResolverError::BadName(_) => Status::EBadName,
            ResolverError::BadFlags => Status::EBadFlags,
            ResolverError::NoServers => Status::ERefused,
            ResolverError::BadResponse(_) => Status::EBadResp,
            ResolverError::Refused => Status::ERefused,
            ResolverError::NotImplemented => Status::ENotImp,
            ResolverError::ServFail => Status::EServFail,
            ResolverError::FormErr => Status::EFormErr,
            ResolverError::Timeout => Status::ETimeout,
            ResolverError::Destruction => Status::EDestruction,
            ResolverError::Cancelled => Status::ECancelled,
            ResolverError::ConnRefused(_) => Status::EConnRefused,
            ResolverError::Io(_) => Status::EConnRefused,
            ResolverError::NoMem => Status::ENoMem,
        }
    }
}
