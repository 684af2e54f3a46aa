//! Shared wire encode/decode plumbing for every packet component.

use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::ParseError;

/// Something that knows how to read/write its own section of a DNS message.
///
/// `read` is used when the caller has no access to the rest of the packet
/// (and therefore cannot follow a compression pointer); `read_with_buffer`
/// is used everywhere a full packet buffer is available, which is every
/// real parse path in this crate.
pub trait PacketComponent {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError>;

    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<(), ParseError>;

    fn read_with_buffer<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        _packet_buf: &[u8],
    ) -> Result<(), ParseError> {
        self.read(reader)
    }

    /// Read a domain name, following compression pointers via `packet_buf`
    /// when present. Labels are returned verbatim (no case folding, no
    /// trailing-dot handling — callers normalise per §4.1 as needed).
    fn read_labels_with_buffer<E: Endianness>(
        &self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: Option<&[u8]>,
    ) -> Result<Vec<String>, ParseError> {
        let mut labels = Vec::new();
        let mut jumps = 0;

        loop {
            let first = reader.read_var::<u8>(8)?;
            if first == 0 {
                break;
            }
            if (first & 0xC0) == 0xC0 {
                let second = reader.read_var::<u8>(8)?;
                let pointer = (((first as u16) & 0x3F) << 8) | second as u16;
                let buf = packet_buf.ok_or(ParseError::InvalidLabel)?;
                labels.extend(read_name_at(buf, pointer as usize)?);
                break;
            }
            if first > 63 {
                return Err(ParseError::InvalidLabel);
            }
            let mut buf = vec![0u8; first as usize];
            reader.read_bytes(&mut buf)?;
            labels.push(String::from_utf8(buf).map_err(|_| ParseError::InvalidLabel)?);

            jumps += 1;
            if jumps > 128 {
                return Err(ParseError::InvalidLabel);
            }
        }

        Ok(labels)
    }

    fn write_labels<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
        labels: &[String],
    ) -> Result<(), ParseError> {
        for label in labels {
            if label.is_empty() {
                continue;
            }
            if label.len() > 63 {
                return Err(ParseError::InvalidLabel);
            }
            writer.write_var::<u8>(8, label.len() as u8)?;
            writer.write_bytes(label.as_bytes())?;
        }
        writer.write_var::<u8>(8, 0)?;
        Ok(())
    }
}

/// Parse an uncompressed or compressed name starting at `offset` in a full
/// packet buffer, without a `BitReader` — used to follow compression
/// pointers found mid-stream.
pub fn read_name_at(buf: &[u8], mut offset: usize) -> Result<Vec<String>, ParseError> {
    let mut labels = Vec::new();
    let mut jumps = 0;

    loop {
        let first = *buf.get(offset).ok_or(ParseError::InvalidLabel)?;
        if first == 0 {
            break;
        }
        if (first & 0xC0) == 0xC0 {
            let second = *buf.get(offset + 1).ok_or(ParseError::InvalidLabel)?;
            let pointer = (((first as u16) & 0x3F) << 8) | second as u16;
            offset = pointer as usize;
            jumps += 1;
            if jumps > 128 {
                return Err(ParseError::InvalidLabel);
            }
            continue;
        }
        if first > 63 {
            return Err(ParseError::InvalidLabel);
        }
        let start = offset + 1;
        let end = start + first as usize;
        let label = buf.get(start..end).ok_or(ParseError::InvalidLabel)?;
        labels.push(String::from_utf8(label.to_vec()).map_err(|_| ParseError::InvalidLabel)?);
        offset = end;

        jumps += 1;
        if jumps > 128 {
            return Err(ParseError::InvalidLabel);
        }
    }

    Ok(labels)
}
