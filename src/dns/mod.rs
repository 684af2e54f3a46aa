//! DNS message codec (§4.1): build forward/reverse/walk queries, parse
//! replies, and extract typed answers.

pub mod common;
pub mod edns;
pub mod enums;
pub mod header;
pub mod names;
pub mod packet;
pub mod question;
pub mod resource;

pub use enums::{DNSResourceClass, DNSResourceType, ResponseCode};
pub use header::DNSHeader;
pub use names::{build_reverse_name, labels_of, normalize_name};
pub use packet::{DNSPacket, ExtractedRecord};
pub use question::DNSQuestion;
pub use resource::DNSResource;

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("truncated DNS message")]
    Truncated,
    #[error("invalid label in domain name")]
    InvalidLabel,
    #[error("invalid DNS header")]
    InvalidHeader,
    #[error("invalid rdata for record type")]
    InvalidRdata,
}

impl From<std::io::Error> for ParseError {
    fn from(_: std::io::Error) -> Self {
        ParseError::Truncated
    }
}
