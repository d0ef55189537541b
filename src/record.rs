//! Records and RRSets.
//!
//! RDATA is mostly treated as an opaque, wire-encoded blob — the parser and
//! applicator only ever need to look inside two record types: SOA (for its
//! serial) and RRSIG (for its covered type), per spec §6's "recognize types
//! SOA, RRSIG, NSEC3, and treat others generically".

use std::{fmt, sync::Arc};

use bytes::Bytes;
use domain::base::iana::{Class, Rtype};
use domain::base::Ttl;

use crate::name::Name;

//----------- Serial ---------------------------------------------------------------

/// A 32-bit zone serial number.
///
/// Serials are compared with RFC 1982 signed serial arithmetic, not plain
/// integer order; see [`crate::query::serial_difference`] for the
/// comparison this type exists to support. The wrapping subtraction itself
/// lives there, rather than as a `PartialOrd` impl here, since "less than"
/// is genuinely partial under RFC 1982 and the crate's one caller
/// (`transfer_needed`) wants the signed difference, not a boolean.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Serial(pub u32);

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Serial {
    fn from(value: u32) -> Self {
        Serial(value)
    }
}

//----------- Rdata ------------------------------------------------------------

/// The parsed, type-specific portion of a record's RDATA.
#[derive(Clone, Debug)]
pub enum RdataKind {
    Soa(SoaData),
    Rrsig(RrsigData),
    /// Any other type. The wire bytes are authoritative; nothing further is
    /// interpreted.
    Other,
}

/// A record's RDATA: its parsed form (when recognized) plus the exact wire
/// bytes it was decoded from.
///
/// The wire bytes are what every identity comparison in the applicator
/// (`§4.5.2`'s "set difference by RDATA identity") is keyed on, since two
/// RDATA values are the same record for transfer purposes iff their wire
/// encodings are equal octet-for-octet.
#[derive(Clone, Debug)]
pub struct Rdata {
    pub kind: RdataKind,
    pub wire: Bytes,
}

impl Rdata {
    pub fn other(wire: Bytes) -> Self {
        Rdata {
            kind: RdataKind::Other,
            wire,
        }
    }

    pub fn soa(data: SoaData, wire: Bytes) -> Self {
        Rdata {
            kind: RdataKind::Soa(data),
            wire,
        }
    }

    pub fn rrsig(data: RrsigData, wire: Bytes) -> Self {
        Rdata {
            kind: RdataKind::Rrsig(data),
            wire,
        }
    }

    pub fn as_soa(&self) -> Option<&SoaData> {
        match &self.kind {
            RdataKind::Soa(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_rrsig(&self) -> Option<&RrsigData> {
        match &self.kind {
            RdataKind::Rrsig(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Rdata {
    fn eq(&self, other: &Self) -> bool {
        self.wire == other.wire
    }
}
impl Eq for Rdata {}

/// The parsed fields of an SOA record's RDATA.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoaData {
    pub mname: Arc<Name>,
    pub rname: Arc<Name>,
    pub serial: Serial,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

/// The fields of an RRSIG record's RDATA this crate needs: only the type it
/// covers. Everything else (algorithm, labels, signature bytes, ...) stays
/// in `Rdata::wire`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RrsigData {
    pub type_covered: Rtype,
}

//----------- Record -----------------------------------------------------------

/// A single resource record as produced by the wire parser and consumed by
/// the changeset model and applicator.
#[derive(Clone, Debug)]
pub struct Record {
    pub owner: Arc<Name>,
    pub rtype: Rtype,
    pub class: Class,
    pub ttl: Ttl,
    pub rdata: Rdata,
}

impl Record {
    /// The tuple that defines whether two records are "the same record" for
    /// removal/overlap purposes: owner, type, class, and RDATA bytes. TTL is
    /// deliberately excluded, matching the merge/dedup policy in §4.4.1
    /// ("merge records into the existing RRSet... discard the incoming
    /// RRSet shell") and the removal policy in §4.5.2 ("set difference by
    /// RDATA identity").
    pub fn identity(&self) -> (&Name, Rtype, Class, &[u8]) {
        (&self.owner, self.rtype, self.class, &self.rdata.wire)
    }

    pub fn soa_serial(&self) -> Option<Serial> {
        self.rdata.as_soa().map(|s| s.serial)
    }
}

//----------- RRSet -----------------------------------------------------------

/// The set of records sharing (owner, type, class) at a given node.
///
/// Per the data model, an RRSet carries a single TTL (the minimum of all
/// merged-in TTLs) and owns its record list. Records are stored behind an
/// `Arc` so that cloning an RRSet (as happens whenever a node is
/// shallow-cloned, since the owning `BTreeMap` clones its `Arc` values) does
/// not duplicate RDATA; a genuine split only happens when a specific record
/// is removed from one of the two RRSet copies.
#[derive(Clone, Debug)]
pub struct RRSet {
    pub class: Class,
    pub ttl: Ttl,
    pub records: Vec<Arc<Rdata>>,
}

impl Default for RRSet {
    fn default() -> Self {
        RRSet {
            class: Class::IN,
            ttl: Ttl::default(),
            records: Vec::new(),
        }
    }
}

impl RRSet {
    pub fn new(class: Class, ttl: Ttl) -> Self {
        RRSet {
            class,
            ttl,
            records: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Merge one incoming record's RDATA into this RRSet: union by RDATA
    /// identity, TTL taken as the minimum of the two. Returns `true` if the
    /// record was newly added (not already present).
    pub fn merge(&mut self, ttl: Ttl, rdata: Arc<Rdata>) -> bool {
        self.ttl = min_ttl(self.ttl, ttl);
        if self.records.iter().any(|r| r.wire == rdata.wire) {
            return false;
        }
        self.records.push(rdata);
        true
    }

    /// Remove a record by RDATA identity, returning the removed entry, if
    /// any was present. Absence is not an error here; the applicator's
    /// REMOVE step treats it leniently (spec §4.5.2 step 3, §9).
    pub fn remove_by_wire(&mut self, wire: &[u8]) -> Option<Arc<Rdata>> {
        let pos = self.records.iter().position(|r| r.wire.as_ref() == wire)?;
        Some(self.records.remove(pos))
    }
}

fn min_ttl(a: Ttl, b: Ttl) -> Ttl {
    if a.as_secs() <= b.as_secs() {
        a
    } else {
        b
    }
}

//----------- well-known constants --------------------------------------------

/// The record types this crate interprets specially. Everything else is
/// "other" and carried opaquely.
pub mod rtype {
    use domain::base::iana::Rtype;

    pub const SOA: Rtype = Rtype::SOA;
    pub const RRSIG: Rtype = Rtype::RRSIG;
    pub const NSEC3: Rtype = Rtype::NSEC3;
    pub const ANY: Rtype = Rtype::ANY;
}
