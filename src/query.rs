//! Transfer query construction (spec §4.3).
//!
//! Queries are built by hand, the same way `wire.rs` reads messages by
//! hand: a SOA/AXFR query is a bare question, an IXFR query additionally
//! carries the requester's current SOA in the authority section, and the
//! whole message must fit the 512-octet classic-UDP ceiling the original
//! imposes (`src/loader/server.rs` builds its queries the same way, with
//! `domain`'s message builder; this crate writes the bytes directly instead
//! per the dependency-boundary note in `DESIGN.md`).

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};
use domain::base::iana::{Class, Rtype};

use crate::contents::ZoneContents;
use crate::error::Error;
use crate::name::Name;
use crate::record::{Record, Serial};

/// The wire-size ceiling a query must fit under (spec §4.3).
pub const MAX_QUERY_SIZE: usize = 512;

const FLAG_RD: u16 = 0x0100;

fn fresh_query_id() -> u16 {
    static COUNTER: AtomicU16 = AtomicU16::new(0);
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos as u16) ^ counter
}

fn write_header(buf: &mut BytesMut, id: u16, qdcount: u16, nscount: u16) {
    buf.put_u16(id);
    buf.put_u16(FLAG_RD);
    buf.put_u16(qdcount);
    buf.put_u16(0); // ancount
    buf.put_u16(nscount);
    buf.put_u16(0); // arcount
}

fn write_question(buf: &mut BytesMut, name: &Name, rtype: Rtype, class: Class) {
    buf.put_slice(name.as_wire());
    buf.put_u16(rtype.to_int());
    buf.put_u16(class.to_int());
}

fn write_record(buf: &mut BytesMut, record: &Record) {
    buf.put_slice(record.owner.as_wire());
    buf.put_u16(record.rtype.to_int());
    buf.put_u16(record.class.to_int());
    buf.put_u32(record.ttl.as_secs());
    buf.put_u16(record.rdata.wire.len() as u16);
    buf.put_slice(&record.rdata.wire);
}

fn finish(buf: BytesMut) -> Result<Bytes, Error> {
    if buf.len() > MAX_QUERY_SIZE {
        return Err(Error::Oversize);
    }
    Ok(buf.freeze())
}

/// Build a standalone SOA query for `zone`'s apex name.
pub fn build_soa_query(zone: &ZoneContents) -> Result<Bytes, Error> {
    let mut buf = BytesMut::with_capacity(32);
    write_header(&mut buf, fresh_query_id(), 1, 0);
    write_question(&mut buf, &zone.apex, crate::record::rtype::SOA, Class::IN);
    finish(buf)
}

/// Build an AXFR query for `zone`'s apex name.
pub fn build_axfr_query(zone: &ZoneContents) -> Result<Bytes, Error> {
    let mut buf = BytesMut::with_capacity(32);
    write_header(&mut buf, fresh_query_id(), 1, 0);
    write_question(&mut buf, &zone.apex, Rtype::AXFR, Class::IN);
    finish(buf)
}

/// Build an IXFR query for `zone`'s apex name, carrying `zone`'s current
/// apex SOA in the authority section so the peer knows which serial to
/// diff from.
pub fn build_ixfr_query(zone: &ZoneContents) -> Result<Bytes, Error> {
    let soa_rrset = zone
        .apex()
        .soa()
        .ok_or(Error::BadArgument("zone has no apex SOA to request an IXFR from"))?;
    let soa_rdata = soa_rrset
        .records
        .first()
        .ok_or(Error::BadArgument("zone's apex SOA RRSet is empty"))?;
    let soa_record = Record {
        owner: zone.apex.clone(),
        rtype: crate::record::rtype::SOA,
        class: soa_rrset.class,
        ttl: soa_rrset.ttl,
        rdata: (**soa_rdata).clone(),
    };
    let mut buf = BytesMut::with_capacity(64);
    write_header(&mut buf, fresh_query_id(), 1, 1);
    write_question(&mut buf, &zone.apex, Rtype::IXFR, Class::IN);
    write_record(&mut buf, &soa_record);
    finish(buf)
}

/// `(remote - local) mod 2^32`, the RFC 1982 signed serial difference.
pub fn serial_difference(local: Serial, remote: Serial) -> u32 {
    remote.0.wrapping_sub(local.0)
}

/// The outcome of comparing a zone's current serial against a peer's.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferNeeded {
    UpToDate,
    Transfer,
}

/// Decide whether `local_zone` needs a transfer to catch up to
/// `soa_response`, per the RFC 1982 half-range rule (spec §4.3).
pub fn transfer_needed(local_zone: &ZoneContents, soa_response: &Record) -> Result<TransferNeeded, Error> {
    let local = local_serial(local_zone)?;
    let remote = soa_response
        .soa_serial()
        .ok_or(Error::BadArgument("response record is not an SOA"))?;
    let diff = serial_difference(local, remote);
    if diff == 0 || diff >= 1u32 << 31 {
        Ok(TransferNeeded::UpToDate)
    } else {
        Ok(TransferNeeded::Transfer)
    }
}

pub(crate) fn local_serial(zone: &ZoneContents) -> Result<Serial, Error> {
    zone.apex()
        .soa()
        .and_then(|rrset| rrset.records.first())
        .and_then(|rdata| rdata.as_soa())
        .map(|soa| soa.serial)
        .ok_or(Error::BadArgument("zone has no apex SOA"))
}
