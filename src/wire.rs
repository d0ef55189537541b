//! Hand-rolled DNS message reading: header, question, and answer/authority/
//! additional record iteration with name-decompression.
//!
//! Per spec §6, this parsing work belongs to the core, not to an I/O
//! collaborator — the same division the original draws between
//! `libknot/updates/xfr-in.c`'s own packet walking and the rest of the
//! library. This module therefore does not depend on `domain`'s own message
//! parser; it reads the wire format directly.

use bytes::Bytes;
use domain::base::iana::{Class, Rtype};
use domain::base::Ttl;

use crate::error::Error;
use crate::name::Name;
use crate::record::{Rdata, RdataKind, Record, RrsigData, Serial, SoaData};

/// A parsed DNS message header.
#[derive(Clone, Copy, Debug)]
pub struct Header {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    pub const WIRE_LEN: usize = 12;

    pub fn rcode(&self) -> u8 {
        (self.flags & 0x000F) as u8
    }
}

/// A cursor over one DNS message, tracking the read offset so the caller can
/// enforce "reject messages whose parsed offset advances past size" (spec
/// §6) at every step rather than only at the end.
pub struct MessageReader {
    buf: Bytes,
    pos: usize,
}

impl MessageReader {
    pub fn new(buf: Bytes) -> Self {
        MessageReader { buf, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<Bytes, Error> {
        if self.pos + n > self.buf.len() {
            return Err(Error::MalformedStream("record truncated"));
        }
        let slice = self.buf.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, Error> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, Error> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_header(&mut self) -> Result<Header, Error> {
        if self.buf.len() < Header::WIRE_LEN {
            return Err(Error::MalformedStream("message shorter than a header"));
        }
        Ok(Header {
            id: self.u16()?,
            flags: self.u16()?,
            qdcount: self.u16()?,
            ancount: self.u16()?,
            nscount: self.u16()?,
            arcount: self.u16()?,
        })
    }

    /// Read and discard a question section entry, returning its QNAME.
    pub fn read_question(&mut self) -> Result<(Name, Rtype, Class), Error> {
        let name = self.read_name()?;
        let rtype = Rtype::from_int(self.u16()?);
        let class = Class::from_int(self.u16()?);
        Ok((name, rtype, class))
    }

    /// Read one resource record, resolving RDATA into its recognized form
    /// for SOA/RRSIG and leaving everything else opaque (spec §6).
    pub fn read_record(&mut self) -> Result<Record, Error> {
        let owner = self.read_name()?;
        let rtype = Rtype::from_int(self.u16()?);
        let class = Class::from_int(self.u16()?);
        let ttl = Ttl::from_secs(self.u32()?);
        let rdlen = self.u16()? as usize;
        let rdata_start = self.pos;
        let wire = self.take(rdlen)?;

        let kind = if rtype == crate::record::rtype::SOA {
            RdataKind::Soa(self.parse_soa_rdata(rdata_start, rdlen)?)
        } else if rtype == crate::record::rtype::RRSIG {
            RdataKind::Rrsig(self.parse_rrsig_rdata(&wire)?)
        } else {
            RdataKind::Other
        };

        Ok(Record {
            owner: std::sync::Arc::new(owner),
            rtype,
            class,
            ttl,
            rdata: Rdata { kind, wire },
        })
    }

    fn parse_soa_rdata(&mut self, start: usize, len: usize) -> Result<SoaData, Error> {
        let end = start + len;
        let mut sub = MessageReader {
            buf: self.buf.clone(),
            pos: start,
        };
        let mname = sub.read_name()?;
        let rname = sub.read_name()?;
        if sub.pos > end {
            return Err(Error::MalformedStream("SOA RDATA names overran RDLENGTH"));
        }
        let serial = sub.u32()?;
        let refresh = sub.u32()?;
        let retry = sub.u32()?;
        let expire = sub.u32()?;
        let minimum = sub.u32()?;
        if sub.pos != end {
            return Err(Error::MalformedStream("SOA RDATA length mismatch"));
        }
        Ok(SoaData {
            mname: std::sync::Arc::new(mname),
            rname: std::sync::Arc::new(rname),
            serial: Serial(serial),
            refresh,
            retry,
            expire,
            minimum,
        })
    }

    fn parse_rrsig_rdata(&self, wire: &Bytes) -> Result<RrsigData, Error> {
        if wire.len() < 2 {
            return Err(Error::MalformedStream("RRSIG RDATA too short"));
        }
        let type_covered = Rtype::from_int(u16::from_be_bytes([wire[0], wire[1]]));
        Ok(RrsigData { type_covered })
    }

    /// Read a (possibly compressed) domain name starting at the current
    /// position, advancing past it (compression pointers are followed for
    /// decoding but do not themselves count toward the advance past the
    /// pointer's two bytes).
    pub fn read_name(&mut self) -> Result<Name, Error> {
        let mut out = Vec::with_capacity(16);
        let mut cursor = self.pos;
        let mut jumped = false;
        let mut jumps = 0usize;
        loop {
            let Some(&len) = self.buf.get(cursor) else {
                return Err(Error::MalformedStream("name truncated"));
            };
            if len & 0xC0 == 0xC0 {
                let Some(&lo) = self.buf.get(cursor + 1) else {
                    return Err(Error::MalformedStream("truncated compression pointer"));
                };
                let target = (((len as usize) & 0x3F) << 8) | lo as usize;
                if target >= cursor {
                    return Err(Error::MalformedStream(
                        "compression pointer does not point strictly backward",
                    ));
                }
                jumps += 1;
                if jumps > 128 {
                    return Err(Error::MalformedStream("too many compression pointers"));
                }
                if !jumped {
                    self.pos = cursor + 2;
                    jumped = true;
                }
                cursor = target;
                continue;
            }
            if len & 0xC0 != 0 {
                return Err(Error::MalformedStream("reserved label length bits set"));
            }
            let len = len as usize;
            out.push(len as u8);
            if len == 0 {
                cursor += 1;
                if !jumped {
                    self.pos = cursor;
                }
                break;
            }
            if len > 63 {
                return Err(Error::MalformedStream("label exceeds 63 octets"));
            }
            let label_start = cursor + 1;
            let label_end = label_start + len;
            let Some(label) = self.buf.get(label_start..label_end) else {
                return Err(Error::MalformedStream("name truncated"));
            };
            out.extend_from_slice(label);
            cursor = label_end;
            if out.len() > 255 {
                return Err(Error::MalformedStream("name exceeds 255 octets"));
            }
        }
        Name::from_wire(Bytes::from(out))
            .map_err(|_| Error::MalformedStream("invalid decompressed name"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(s: &str) -> Vec<u8> {
        let mut v = vec![s.len() as u8];
        v.extend_from_slice(s.as_bytes());
        v
    }

    #[test]
    fn reads_uncompressed_name() {
        let mut buf = label("example");
        buf.extend(label("com"));
        buf.push(0);
        let mut r = MessageReader::new(Bytes::from(buf));
        let name = r.read_name().unwrap();
        assert_eq!(name.to_string(), "example.com.");
        assert_eq!(r.pos, r.buf.len());
    }

    #[test]
    fn follows_compression_pointer() {
        let mut buf = label("com");
        buf.push(0);
        let base = buf.len();
        buf.extend(label("example"));
        buf.push(0xC0);
        buf.push(0); // pointer to offset 0 ("com.")
        let mut r = MessageReader::new(Bytes::from(buf));
        r.pos = base;
        let name = r.read_name().unwrap();
        assert_eq!(name.to_string(), "example.com.");
    }

    #[test]
    fn rejects_forward_pointer() {
        let mut buf = vec![0xC0, 0x05, 0, 0, 0, 0];
        buf[1] = 5;
        let mut r = MessageReader::new(Bytes::from(buf));
        assert!(r.read_name().is_err());
    }
}
