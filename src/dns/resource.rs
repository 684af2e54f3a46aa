use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::ParseError;
use super::common::PacketComponent;
use super::enums::{DNSResourceClass, DNSResourceType};

/// A single resource record as it appears in the answer, authority, or
/// additional section of a reply. `rdata` is kept as raw bytes; typed
/// access goes through [`DNSResource::data_string`] (§4.1) or, for OPT
/// records, through [`super::edns::EdnsOpt::parse_from_resource`].
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DNSResource {
    pub labels: Vec<String>,
    pub rtype: DNSResourceType,
    /// Raw class value. For OPT records this is the advertised UDP payload
    /// size rather than a real class (RFC 6891) — callers must check
    /// `rtype == OPT` before interpreting it as a `DNSResourceClass`.
    pub raw_class: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

impl DNSResource {
    pub fn rclass(&self) -> DNSResourceClass {
        self.raw_class.into()
    }

    pub fn owner_name(&self) -> String {
        super::names::normalize_name(&self.labels.join("."))
    }

    /// Normalise this record's rdata to the string form §4.1 specifies for
    /// A/AAAA/CNAME/PTR/NS/MX/TXT/SOA/SPF/SRV. Returns `None` for record
    /// types [`super::packet::DNSPacket::extract`] does not surface.
    pub fn data_string(&self) -> Option<String> {
        match self.rtype {
            DNSResourceType::A => {
                if self.rdata.len() != 4 {
                    return None;
                }
                Some(format!(
                    "{}.{}.{}.{}",
                    self.rdata[0], self.rdata[1], self.rdata[2], self.rdata[3]
                ))
            }
            DNSResourceType::AAAA => {
                let bytes: [u8; 16] = self.rdata.clone().try_into().ok()?;
                Some(std::net::Ipv6Addr::from(bytes).to_string())
            }
            DNSResourceType::CNAME | DNSResourceType::NS | DNSResourceType::PTR => {
                super::common::read_name_at(&self.rdata, 0)
                    .ok()
                    .map(|labels| super::names::normalize_name(&labels.join(".")))
            }
            DNSResourceType::MX => {
                if self.rdata.len() < 3 {
                    return None;
                }
                let labels = super::common::read_name_at(&self.rdata, 2).ok()?;
                Some(super::names::normalize_name(&labels.join(".")))
            }
            DNSResourceType::TXT | DNSResourceType::SPF => {
                let mut parts = Vec::new();
                let mut pos = 0;
                while pos < self.rdata.len() {
                    let len = self.rdata[pos] as usize;
                    pos += 1;
                    if pos + len > self.rdata.len() {
                        break;
                    }
                    parts.push(String::from_utf8_lossy(&self.rdata[pos..pos + len]).to_string());
                    pos += len;
                }
                Some(parts.join(" "))
            }
            DNSResourceType::SOA => {
                let mname = super::common::read_name_at(&self.rdata, 0).ok()?;
                let mname_len = wire_name_len(&self.rdata, 0)?;
                let rname = super::common::read_name_at(&self.rdata, mname_len).ok()?;
                Some(format!(
                    "{},{}",
                    super::names::normalize_name(&mname.join(".")),
                    super::names::normalize_name(&rname.join("."))
                ))
            }
            DNSResourceType::SRV => {
                if self.rdata.len() < 7 {
                    return None;
                }
                let priority = u16::from_be_bytes([self.rdata[0], self.rdata[1]]);
                let weight = u16::from_be_bytes([self.rdata[2], self.rdata[3]]);
                let port = u16::from_be_bytes([self.rdata[4], self.rdata[5]]);
                let target = super::common::read_name_at(&self.rdata, 6).ok()?;
                Some(format!(
                    "{} {} {} {}",
                    priority,
                    weight,
                    port,
                    super::names::normalize_name(&target.join("."))
                ))
            }
            _ => None,
        }
    }

    /// `next domain` field of an NSEC record, normalised. Used by the
    /// walker (§4.8) to advance the chain.
    pub fn nsec_next_domain(&self) -> Option<String> {
        if self.rtype != DNSResourceType::NSEC {
            return None;
        }
        let labels = super::common::read_name_at(&self.rdata, 0).ok()?;
        Some(super::names::normalize_name(&labels.join(".")))
    }
}

/// Length in bytes of a (possibly compressed) name starting at `offset`
/// within `buf`, needed to find where a second name begins in rdata (SOA).
fn wire_name_len(buf: &[u8], offset: usize) -> Option<usize> {
    let mut pos = offset;
    loop {
        let first = *buf.get(pos)?;
        if first == 0 {
            return Some(pos - offset + 1);
        }
        if (first & 0xC0) == 0xC0 {
            return Some(pos - offset + 2);
        }
        pos += 1 + first as usize;
    }
}

impl PacketComponent for DNSResource {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        self.write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.rtype.into())?;
        writer.write_var::<u16>(16, self.raw_class)?;
        writer.write_var::<u32>(32, self.ttl)?;
        writer.write_var::<u16>(16, self.rdata.len() as u16)?;
        writer.write_bytes(&self.rdata)?;
        Ok(())
    }

    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<(), ParseError> {
        self.read_with_buffer(reader, &[])
    }

    fn read_with_buffer<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: &[u8],
    ) -> Result<(), ParseError> {
        let buf = if packet_buf.is_empty() {
            None
        } else {
            Some(packet_buf)
        };
        let labels = self.read_labels_with_buffer(reader, buf)?;
        let rtype = reader.read_var::<u16>(16)?.into();
        let raw_class = reader.read_var::<u16>(16)?;
        let ttl = reader.read_var::<u32>(32)?;
        let rdlength = reader.read_var::<u16>(16)?;
        let mut rdata = vec![0u8; rdlength as usize];
        reader.read_bytes(&mut rdata)?;

        *self = DNSResource {
            labels,
            rtype,
            raw_class,
            ttl,
            rdata,
        };
        Ok(())
    }
}
