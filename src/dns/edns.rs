//! EDNS0 OPT pseudo-record (RFC 6891), including the client-subnet option
//! (RFC 7871) this crate uses defensively: every forward query carries a
//! suppressing ECS option (family=IPv4, netmask=0, address=0.0.0.0) so
//! upstream resolvers cannot key answers to our egress IP (§4.1).

use super::ParseError;
use super::resource::DNSResource;

pub const OPTION_CLIENT_SUBNET: u16 = 8;
const DO_FLAG: u16 = 0x8000;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdnsOption {
    pub code: u16,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdnsOpt {
    pub udp_payload_size: u16,
    pub extended_rcode: u8,
    pub version: u8,
    pub flags: u16,
    pub options: Vec<EdnsOption>,
}

impl EdnsOpt {
    pub fn new(udp_payload_size: u16) -> Self {
        Self {
            udp_payload_size,
            ..Default::default()
        }
    }

    pub fn do_flag(&self) -> bool {
        self.flags & DO_FLAG != 0
    }

    pub fn set_do_flag(&mut self, value: bool) {
        if value {
            self.flags |= DO_FLAG;
        } else {
            self.flags &= !DO_FLAG;
        }
    }

    /// Suppressing ECS option per §4.1: family=1 (IPv4), source/scope
    /// netmask=0, zero-length address.
    pub fn add_suppressing_client_subnet(&mut self) {
        let mut data = Vec::with_capacity(4);
        data.extend_from_slice(&1u16.to_be_bytes()); // FAMILY = IPv4
        data.push(0); // SOURCE PREFIX-LENGTH
        data.push(0); // SCOPE PREFIX-LENGTH
        self.options.push(EdnsOption {
            code: OPTION_CLIENT_SUBNET,
            data,
        });
    }

    pub fn find_option(&self, code: u16) -> Option<&EdnsOption> {
        self.options.iter().find(|o| o.code == code)
    }

    /// True if the resolver echoed back a non-empty ECS address, meaning
    /// it forwarded our (suppressed-to-zero) subnet upstream rather than
    /// ignoring the option — a client-subnet leak (§4.9, §7 glossary).
    pub fn leaks_client_subnet(&self) -> bool {
        self.find_option(OPTION_CLIENT_SUBNET)
            .map(|opt| opt.data.len() > 4)
            .unwrap_or(false)
    }

    pub fn to_resource(&self) -> DNSResource {
        let mut rdata = Vec::new();
        for opt in &self.options {
            rdata.extend_from_slice(&opt.code.to_be_bytes());
            rdata.extend_from_slice(&(opt.data.len() as u16).to_be_bytes());
            rdata.extend_from_slice(&opt.data);
        }
        let ttl = ((self.extended_rcode as u32) << 24)
            | ((self.version as u32) << 16)
            | self.flags as u32;

        DNSResource {
            labels: Vec::new(),
            rtype: super::enums::DNSResourceType::OPT,
            raw_class: self.udp_payload_size,
            ttl,
            rdata,
        }
    }

    pub fn from_resource(resource: &DNSResource) -> Result<Self, ParseError> {
        let udp_payload_size = resource.raw_class;
        let extended_rcode = ((resource.ttl >> 24) & 0xFF) as u8;
        let version = ((resource.ttl >> 16) & 0xFF) as u8;
        let flags = (resource.ttl & 0xFFFF) as u16;

        let mut options = Vec::new();
        let mut pos = 0;
        while pos + 4 <= resource.rdata.len() {
            let code = u16::from_be_bytes([resource.rdata[pos], resource.rdata[pos + 1]]);
            let len = u16::from_be_bytes([resource.rdata[pos + 2], resource.rdata[pos + 3]]) as usize;
            pos += 4;
            if pos + len > resource.rdata.len() {
                return Err(ParseError::InvalidRdata);
            }
            options.push(EdnsOption {
                code,
                data: resource.rdata[pos..pos + len].to_vec(),
            });
            pos += len;
        }

        Ok(EdnsOpt {
            udp_payload_size,
            extended_rcode,
            version,
            flags,
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppressing_ecs_round_trips_through_resource() {
        let mut opt = EdnsOpt::new(1232);
        opt.add_suppressing_client_subnet();
        let resource = opt.to_resource();
        let parsed = EdnsOpt::from_resource(&resource).unwrap();
        assert_eq!(parsed.udp_payload_size, 1232);
        assert!(!parsed.leaks_client_subnet());
    }

    #[test]
    fn echoed_nonempty_address_is_a_leak() {
        let mut opt = EdnsOpt::new(512);
        opt.options.push(EdnsOption {
            code: OPTION_CLIENT_SUBNET,
            data: vec![0, 1, 24, 0, 203, 0, 113],
        });
        let resource = opt.to_resource();
        let parsed = EdnsOpt::from_resource(&resource).unwrap();
        assert!(parsed.leaks_client_subnet());
    }

    #[test]
    fn do_flag_round_trips() {
        let mut opt = EdnsOpt::new(4096);
        opt.set_do_flag(true);
        let resource = opt.to_resource();
        let parsed = EdnsOpt::from_resource(&resource).unwrap();
        assert!(parsed.do_flag());
    }
}
