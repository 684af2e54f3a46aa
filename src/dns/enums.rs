//! Wire-format enumerations: resource record types/classes and response codes.
//!
//! Kept deliberately narrow — only the record types the codec actually
//! builds, parses, or walks (§4.1, §4.8) are represented. Anything else
//! observed on the wire round-trips through `Unknown(u16)`.

/// Resource record types this crate understands.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DNSResourceType {
    #[default]
    Unknown(u16),
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    SPF,
    NSEC,
    OPT,
    AXFR,
    ANY,
}

impl From<u16> for DNSResourceType {
    fn from(value: u16) -> Self {
        match value {
            1 => DNSResourceType::A,
            2 => DNSResourceType::NS,
            5 => DNSResourceType::CNAME,
            6 => DNSResourceType::SOA,
            12 => DNSResourceType::PTR,
            15 => DNSResourceType::MX,
            16 => DNSResourceType::TXT,
            28 => DNSResourceType::AAAA,
            33 => DNSResourceType::SRV,
            41 => DNSResourceType::OPT,
            47 => DNSResourceType::NSEC,
            99 => DNSResourceType::SPF,
            252 => DNSResourceType::AXFR,
            255 => DNSResourceType::ANY,
            other => DNSResourceType::Unknown(other),
        }
    }
}

impl From<DNSResourceType> for u16 {
    fn from(value: DNSResourceType) -> Self {
        match value {
            DNSResourceType::A => 1,
            DNSResourceType::NS => 2,
            DNSResourceType::CNAME => 5,
            DNSResourceType::SOA => 6,
            DNSResourceType::PTR => 12,
            DNSResourceType::MX => 15,
            DNSResourceType::TXT => 16,
            DNSResourceType::AAAA => 28,
            DNSResourceType::SRV => 33,
            DNSResourceType::OPT => 41,
            DNSResourceType::NSEC => 47,
            DNSResourceType::SPF => 99,
            DNSResourceType::AXFR => 252,
            DNSResourceType::ANY => 255,
            DNSResourceType::Unknown(other) => other,
        }
    }
}

/// Resource record classes. Only IN ever appears on the wire in practice;
/// the OPT pseudo-record repurposes this field for the UDP payload size,
/// which the codec handles separately (see [`super::edns`]).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DNSResourceClass {
    #[default]
    IN,
    CH,
    HS,
    ANY,
    Unknown(u16),
}

impl From<u16> for DNSResourceClass {
    fn from(value: u16) -> Self {
        match value {
            1 => DNSResourceClass::IN,
            3 => DNSResourceClass::CH,
            4 => DNSResourceClass::HS,
            255 => DNSResourceClass::ANY,
            other => DNSResourceClass::Unknown(other),
        }
    }
}

impl From<DNSResourceClass> for u16 {
    fn from(value: DNSResourceClass) -> Self {
        match value {
            DNSResourceClass::IN => 1,
            DNSResourceClass::CH => 3,
            DNSResourceClass::HS => 4,
            DNSResourceClass::ANY => 255,
            DNSResourceClass::Unknown(other) => other,
        }
    }
}

/// DNS RCODEs, extended with the two synthetic local rcodes §7 requires:
/// `ResolverErr` (local I/O failure) and `Timeout` (no reply within budget).
/// Neither is assigned by IANA; they live above the 4-bit wire range so
/// they can never collide with a real on-wire rcode.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ResponseCode {
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
    Other(u8),
    ResolverErr,
    Timeout,
}

impl ResponseCode {
    /// True for rcodes the spec's default retry policy treats as retriable:
    /// `{Timeout, ResolverErr, Refused, ServFail, NotImp}` (§4.6, §9 open question).
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ResponseCode::Timeout
                | ResponseCode::ResolverErr
                | ResponseCode::Refused
                | ResponseCode::ServerFailure
                | ResponseCode::NotImplemented
        )
    }

    /// True for rcodes that §4.6 says should stop the offending resolver
    /// immediately, between retry attempts.
    pub fn stops_resolver(&self) -> bool {
        matches!(self, ResponseCode::Refused | ResponseCode::ServerFailure)
    }
}

impl From<u8> for ResponseCode {
    fn from(value: u8) -> Self {
        match value & 0x0F {
            0 => ResponseCode::NoError,
            1 => ResponseCode::FormatError,
            2 => ResponseCode::ServerFailure,
            3 => ResponseCode::NameError,
            4 => ResponseCode::NotImplemented,
            5 => ResponseCode::Refused,
            other => ResponseCode::Other(other),
        }
    }
}

impl From<ResponseCode> for u8 {
    fn from(value: ResponseCode) -> Self {
        match value {
            ResponseCode::NoError => 0,
            ResponseCode::FormatError => 1,
            ResponseCode::ServerFailure => 2,
            ResponseCode::NameError => 3,
            ResponseCode::NotImplemented => 4,
            ResponseCode::Refused => 5,
            ResponseCode::Other(v) => v,
            // Synthetic codes never hit the wire; encode defensively as SERVFAIL.
            ResponseCode::ResolverErr | ResponseCode::Timeout => 2,
        }
    }
}
