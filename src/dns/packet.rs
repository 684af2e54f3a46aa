use std::net::IpAddr;

use bitstream_io::{BigEndian, BitReader, BitWriter};

use super::ParseError;
use super::common::PacketComponent;
use super::edns::EdnsOpt;
use super::enums::{DNSResourceClass, DNSResourceType};
use super::header::DNSHeader;
use super::names::{build_reverse_name, labels_of, normalize_name};
use super::question::DNSQuestion;
use super::resource::DNSResource;

/// Default UDP payload a forward query advertises via EDNS0.
const DEFAULT_UDP_PAYLOAD: u16 = 1232;
/// Larger payload NSEC-walk queries advertise, since walked zones often
/// return multi-record NSEC chains that would otherwise truncate (§4.1).
const WALK_UDP_PAYLOAD: u16 = 4096;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSPacket {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub additional: Vec<DNSResource>,
}

/// A single typed answer, normalised per §4.1: owner name lower-cased
/// with no trailing dot, data rendered per record type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedRecord {
    pub owner: String,
    pub rrtype: DNSResourceType,
    pub data: String,
}

impl DNSPacket {
    fn base_query(id: u16, question: DNSQuestion) -> Self {
        Self {
            header: DNSHeader::new_query(id),
            questions: vec![question],
            answers: Vec::new(),
            authorities: Vec::new(),
            additional: Vec::new(),
        }
    }

    fn with_suppressing_ecs(mut self) -> Self {
        let mut opt = EdnsOpt::new(DEFAULT_UDP_PAYLOAD);
        opt.add_suppressing_client_subnet();
        self.additional.push(opt.to_resource());
        self
    }

    /// `buildForward(name, type)` (§4.1).
    pub fn build_forward(id: u16, name: &str, qtype: DNSResourceType) -> Self {
        let question = DNSQuestion::new(labels_of(name), qtype);
        Self::base_query(id, question).with_suppressing_ecs()
    }

    /// `buildReverse(ip)` (§4.1, §8): constructs the in-addr.arpa/ip6.arpa
    /// PTR query name for `ip`.
    pub fn build_reverse(id: u16, ip: IpAddr) -> Self {
        let name = build_reverse_name(ip);
        let question = DNSQuestion::new(labels_of(&name), DNSResourceType::PTR);
        Self::base_query(id, question).with_suppressing_ecs()
    }

    /// `buildWalk(name, type)` (§4.1, §4.8): sets the DO bit and a larger
    /// UDP payload size for NSEC chain traversal.
    pub fn build_walk(id: u16, name: &str, qtype: DNSResourceType) -> Self {
        let question = DNSQuestion::new(labels_of(name), qtype);
        let mut packet = Self::base_query(id, question);
        let mut opt = EdnsOpt::new(WALK_UDP_PAYLOAD);
        opt.set_do_flag(true);
        packet.additional.push(opt.to_resource());
        packet
    }

    /// Build a reply/error skeleton mirroring `query`'s id and question,
    /// with `qr` set and the given rcode.
    pub fn error_response(query: &DNSPacket, rcode: u8) -> Self {
        let mut header = query.header;
        header.qr = true;
        header.rcode = rcode;
        header.ancount = 0;
        header.nscount = 0;
        header.arcount = 0;
        Self {
            header,
            questions: query.questions.clone(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additional: Vec::new(),
        }
    }

    pub fn edns(&self) -> Option<EdnsOpt> {
        self.additional
            .iter()
            .find(|r| r.rtype == DNSResourceType::OPT)
            .and_then(|r| EdnsOpt::from_resource(r).ok())
    }

    /// `extract(reply)` (§4.1): normalised {owner, rrtype, data} for every
    /// answer-section record whose type this codec renders to a string.
    pub fn extract(&self) -> Vec<ExtractedRecord> {
        self.answers
            .iter()
            .filter_map(|r| {
                r.data_string().map(|data| ExtractedRecord {
                    owner: r.owner_name(),
                    rrtype: r.rtype,
                    data,
                })
            })
            .collect()
    }

    pub fn question_name(&self) -> String {
        self.questions
            .first()
            .map(|q| q.name())
            .unwrap_or_default()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = BitWriter::endian(&mut buf, BigEndian);

        let mut header = self.header;
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authorities.len() as u16;
        header.arcount = self.additional.len() as u16;

        header.write(&mut writer).expect("header write is infallible");
        for q in &self.questions {
            q.write(&mut writer).expect("question write is infallible");
        }
        for r in self.answers.iter().chain(&self.authorities).chain(&self.additional) {
            r.write(&mut writer).expect("resource write is infallible");
        }
        buf
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut reader = BitReader::endian(bytes, BigEndian);
        let mut header = DNSHeader::default();
        header.read(&mut reader)?;

        let mut questions = Vec::with_capacity(header.qdcount as usize);
        for _ in 0..header.qdcount {
            let mut q = DNSQuestion::default();
            q.read_with_buffer(&mut reader, bytes)?;
            questions.push(q);
        }

        let mut read_records = |count: u16,
                                 reader: &mut BitReader<&[u8], BigEndian>|
         -> Result<Vec<DNSResource>, ParseError> {
            let mut out = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let mut r = DNSResource::default();
                r.read_with_buffer(reader, bytes)?;
                out.push(r);
            }
            Ok(out)
        };

        let answers = read_records(header.ancount, &mut reader)?;
        let authorities = read_records(header.nscount, &mut reader)?;
        let additional = read_records(header.arcount, &mut reader)?;

        Ok(Self {
            header,
            questions,
            answers,
            authorities,
            additional,
        })
    }
}

pub fn strip_domain_suffix(name: &str, domain: &str) -> String {
    let name = normalize_name(name);
    let domain = normalize_name(domain);
    name.strip_suffix(&domain)
        .map(|s| s.trim_end_matches('.').to_string())
        .unwrap_or(name)
}
