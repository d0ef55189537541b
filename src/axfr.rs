//! The AXFR assembly state machine (spec §4.4.1).
//!
//! Fed one response packet at a time, growing a [`ZoneContents`] until it
//! sees the terminating SOA that brackets a full zone transfer.

use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

use crate::contents::ZoneContents;
use crate::error::Error;
use crate::name::Name;
use crate::node::Node;
use crate::record::{rtype, Record, RRSet};
use crate::wire::MessageReader;

/// The result of feeding one packet to [`AxfrAssembler::ingest_packet`].
pub enum AxfrOutcome {
    /// More packets are expected; keep calling `ingest_packet`.
    Continue,
    /// The terminating SOA was seen; the assembled zone is returned.
    TransferComplete(ZoneContents),
}

/// Accumulates an inbound AXFR stream into a [`ZoneContents`].
///
/// `current` is a staging copy of the node currently being accumulated,
/// not yet written back into the zone tree unless `in_zone` is set. A node
/// is written back (finalized) whenever a record for a different owner
/// arrives, or when the closing SOA completes the transfer — matching the
/// data model's "current node" / "in-zone flag" pair exactly.
pub struct AxfrAssembler {
    zone: Option<ZoneContents>,
    qname: Arc<Name>,
    current: Option<CurrentNode>,
}

struct CurrentNode {
    node: Node,
    in_zone: bool,
}

impl AxfrAssembler {
    /// Begin assembling an AXFR whose question asked for `qname`.
    pub fn new(qname: Arc<Name>) -> Self {
        AxfrAssembler {
            zone: None,
            qname,
            current: None,
        }
    }

    /// Ingest one response packet's answer records.
    pub fn ingest_packet(&mut self, packet: Bytes) -> Result<AxfrOutcome, Error> {
        let mut reader = MessageReader::new(packet);
        let header = reader.read_header()?;
        for _ in 0..header.qdcount {
            reader.read_question()?;
        }
        for _ in 0..header.ancount {
            let record = reader.read_record()?;
            if let Some(zone) = self.handle_record(record)? {
                return Ok(AxfrOutcome::TransferComplete(zone));
            }
        }
        Ok(AxfrOutcome::Continue)
    }

    fn handle_record(&mut self, record: Record) -> Result<Option<ZoneContents>, Error> {
        if self.zone.is_none() {
            return self.open_zone(record).map(|()| None);
        }

        if record.rtype == rtype::SOA {
            trace!("AXFR: closing SOA seen, transfer complete");
            self.finalize_current();
            return Ok(Some(self.zone.take().expect("zone set above")));
        }

        self.merge_record(record);
        Ok(None)
    }

    fn open_zone(&mut self, record: Record) -> Result<(), Error> {
        if record.rtype != rtype::SOA || record.owner.as_ref() != self.qname.as_ref() {
            return Err(Error::MalformedStream(
                "first AXFR record must be an SOA owned by the query name",
            ));
        }
        trace!(owner = %record.owner, "AXFR: opening SOA, starting zone");
        let zone = ZoneContents::new(record.owner.clone());
        let mut apex = Node::new(zone.apex.clone());
        let mut soa_rrset = RRSet::new(record.class, record.ttl);
        soa_rrset.merge(record.ttl, Arc::new(record.rdata));
        apex.rrsets.insert(rtype::SOA, Arc::new(soa_rrset));
        self.current = Some(CurrentNode {
            node: apex,
            in_zone: true,
        });
        self.zone = Some(zone);
        Ok(())
    }

    fn merge_record(&mut self, record: Record) {
        let same_owner = self
            .current
            .as_ref()
            .is_some_and(|c| c.node.owner.as_ref() == record.owner.as_ref());
        if !same_owner {
            self.finalize_current();
            self.open_current(record.owner.clone());
        }
        let current = self.current.as_mut().expect("just opened above");
        merge_into_node(&mut current.node, record);
    }

    /// Switch `current` to `owner`: reuse the zone's existing node if one is
    /// already present (so a later merge overwrites it in place), or start
    /// a fresh staging node otherwise.
    fn open_current(&mut self, owner: Arc<Name>) {
        let zone = self.zone.as_ref().expect("zone started");
        match zone.get_node(&owner) {
            Some(existing) => {
                self.current = Some(CurrentNode {
                    node: (**existing).clone(),
                    in_zone: true,
                });
            }
            None => {
                self.current = Some(CurrentNode {
                    node: Node::new(owner),
                    in_zone: false,
                });
            }
        }
    }

    /// Write the staging node back into the zone, if there is one.
    fn finalize_current(&mut self) {
        let Some(current) = self.current.take() else {
            return;
        };
        let zone = self.zone.as_mut().expect("zone started");
        let nsec3 = ZoneContents::routes_to_nsec3_node(&current.node);
        if current.in_zone {
            let owner = current.node.owner.clone();
            let arc = Arc::new(current.node);
            if nsec3 {
                zone.nsec3_tree.insert(owner, arc);
            } else {
                zone.tree.insert(owner.clone());
                zone.hash.insert(owner, arc);
            }
        } else if nsec3 {
            zone.add_nsec3_node(current.node, true);
        } else {
            zone.add_node(current.node, true, true);
        }
    }
}

/// Merge `record` into `node`, per the dedup/merge policy of spec §4.4.1:
/// RRSIGs attach to the covered RRSet; everything else merges into the
/// RRSet of its type (union of records, TTL := min). Shared with the IXFR
/// applicator's ADD step (`crate::apply`), which needs the exact same
/// merge/dedup policy for records arriving one at a time instead of packed
/// into an AXFR stream.
pub(crate) fn merge_into_node(node: &mut Node, record: Record) {
    let ttl = record.ttl;
    let class = record.class;
    if record.rtype == rtype::RRSIG {
        let covered = record
            .rdata
            .as_rrsig()
            .map(|r| r.type_covered)
            .unwrap_or(record.rtype);
        let rrsig = node
            .rrsigs
            .entry(covered)
            .or_insert_with(|| Arc::new(RRSet::new(class, ttl)));
        Arc::make_mut(rrsig).merge(ttl, Arc::new(record.rdata));
        return;
    }
    let rrset = node
        .rrsets
        .entry(record.rtype)
        .or_insert_with(|| Arc::new(RRSet::new(class, ttl)));
    Arc::make_mut(rrset).merge(ttl, Arc::new(record.rdata));
}

impl ZoneContents {
    /// Whether `node` carries any NSEC3 records and therefore belongs in
    /// the NSEC3 tree rather than the main tree. AXFR streams identify an
    /// NSEC3 node by the type of the records it carries, since (unlike
    /// IXFR) there is no per-record routing decision made before the node
    /// is fully assembled.
    fn routes_to_nsec3_node(node: &Node) -> bool {
        node.rrsets.contains_key(&rtype::NSEC3)
    }
}
