//! Error taxonomy (§7). Two synthetic rcodes (`ResolverErr`, `Timeout`)
//! extend the IANA set the wire format already gives us; everything else
//! maps onto a real rcode.

use crate::dns::ResponseCode;

pub type Result<T> = std::result::Result<T, DnsError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum DnsError {
    /// No reply within the configured query timeout. Retriable.
    #[error("query timed out")]
    Timeout,

    /// Local I/O failure: write failed, dial failed, message malformed.
    /// Retriable.
    #[error("resolver error: {0}")]
    ResolverErr(String),

    /// Upstream rcode in `{Refused, ServFail, NotImp}`. Retriable, and
    /// causes the offending resolver to be stopped (§4.6).
    #[error("server error: {0:?}")]
    ServerError(ResponseCode),

    /// NXDOMAIN. Terminal for this (name, type); never retried.
    #[error("name error (NXDOMAIN)")]
    NameError,

    /// Caller's deadline fired. Terminal to that caller.
    #[error("query cancelled")]
    Cancelled,

    /// Resolver is stopped. Retriable at the pool level against another
    /// resolver.
    #[error("resolver unavailable")]
    ResolverUnavailable,

    /// Wildcard test could not complete; promoted to `dynamic`
    /// classification rather than propagated as a hard failure (§4.7).
    #[error("wildcard test failed: {0}")]
    TestFailure(String),

    /// Malformed wire data.
    #[error("codec error: {0}")]
    Codec(#[from] crate::dns::ParseError),

    #[error("io error: {0}")]
    Io(String),

    #[error("no live resolver in the pool")]
    PoolExhausted,
}

impl DnsError {
    /// The rcode an error carries, per §3/§7.
    pub fn rcode(&self) -> ResponseCode {
        match self {
            DnsError::Timeout => ResponseCode::Timeout,
            DnsError::ResolverErr(_) | DnsError::Io(_) | DnsError::Codec(_) => {
                ResponseCode::ResolverErr
            }
            DnsError::ServerError(rcode) => *rcode,
            DnsError::NameError => ResponseCode::NameError,
            DnsError::Cancelled => ResponseCode::ResolverErr,
            DnsError::ResolverUnavailable => ResponseCode::ResolverErr,
            DnsError::TestFailure(_) => ResponseCode::ResolverErr,
            DnsError::PoolExhausted => ResponseCode::ResolverErr,
        }
    }

    /// Whether the pool-level retry policy should try another attempt
    /// for this error, per the §4.6/§9 retry set
    /// `{Timeout, ResolverErr, Refused, ServFail, NotImp}`.
    pub fn is_retriable(&self) -> bool {
        match self {
            DnsError::NameError | DnsError::Cancelled => false,
            DnsError::ServerError(rcode) => rcode.is_retriable(),
            _ => true,
        }
    }
}

impl From<std::io::Error> for DnsError {
    fn from(err: std::io::Error) -> Self {
        DnsError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_error_is_terminal() {
        assert!(!DnsError::NameError.is_retriable());
        assert!(!DnsError::Cancelled.is_retriable());
    }

    #[test]
    fn timeout_and_resolver_err_are_retriable() {
        assert!(DnsError::Timeout.is_retriable());
        assert!(DnsError::ResolverErr("write failed".into()).is_retriable());
        assert!(DnsError::ServerError(ResponseCode::ServerFailure).is_retriable());
        assert!(DnsError::ServerError(ResponseCode::Refused).is_retriable());
        assert!(!DnsError::ServerError(ResponseCode::FormatError).is_retriable());
    }
}
