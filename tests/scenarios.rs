//! Integration tests against the public API: the universal properties and
//! concrete scenarios from spec §8, exercised end to end (query decision →
//! transfer parsing → apply) rather than unit-by-unit.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use domain::base::iana::{Class, Rtype};
use domain::base::Ttl;

use zonexfr_core::apply::apply;
use zonexfr_core::axfr::{AxfrAssembler, AxfrOutcome};
use zonexfr_core::changeset::{Changeset, ChangesetList, Side};
use zonexfr_core::contents::ZoneContents;
use zonexfr_core::error::Error;
use zonexfr_core::ixfr::{IxfrOutcome, IxfrSplitter};
use zonexfr_core::name::Name;
use zonexfr_core::query::{serial_difference, transfer_needed, TransferNeeded};
use zonexfr_core::record::{rtype, Rdata, Record, Serial, SoaData};
use zonexfr_core::zone::Zone;

fn wire_name(labels: &[&str]) -> Bytes {
    let mut buf = BytesMut::new();
    for l in labels {
        buf.put_u8(l.len() as u8);
        buf.put_slice(l.as_bytes());
    }
    buf.put_u8(0);
    buf.freeze()
}

fn name(labels: &[&str]) -> Arc<Name> {
    Arc::new(Name::from_wire(wire_name(labels)).unwrap())
}

fn soa_record(owner: Arc<Name>, serial: u32) -> Record {
    let soa = SoaData {
        mname: owner.clone(),
        rname: owner.clone(),
        serial: Serial(serial),
        refresh: 3600,
        retry: 600,
        expire: 86400,
        minimum: 60,
    };
    Record {
        owner,
        rtype: rtype::SOA,
        class: Class::IN,
        ttl: Ttl::from_secs(3600),
        rdata: Rdata::soa(soa, Bytes::new()),
    }
}

fn a_record(owner: Arc<Name>, octets: [u8; 4]) -> Record {
    Record {
        owner,
        rtype: Rtype::A,
        class: Class::IN,
        ttl: Ttl::from_secs(3600),
        rdata: Rdata::other(Bytes::copy_from_slice(&octets)),
    }
}

fn changeset(apex: &Arc<Name>, from: u32, to: u32, add: Vec<Record>, remove: Vec<Record>) -> Changeset {
    let mut cs = Changeset::new();
    cs.add_soa(soa_record(apex.clone(), from), Side::Remove).unwrap();
    for r in remove {
        cs.add_record(r, Side::Remove);
    }
    for r in add {
        cs.add_record(r, Side::Add);
    }
    cs.add_soa(soa_record(apex.clone(), to), Side::Add).unwrap();
    cs
}

fn zone_at_serial(apex: Arc<Name>, serial: u32) -> Zone {
    let mut contents = ZoneContents::new(apex.clone());
    let node = Arc::make_mut(contents.hash.get_mut(&apex).unwrap());
    let mut rrset = zonexfr_core::record::RRSet::new(Class::IN, Ttl::from_secs(3600));
    let record = soa_record(apex, serial);
    rrset.merge(record.ttl, Arc::new(record.rdata));
    node.rrsets.insert(rtype::SOA, Arc::new(rrset));
    Zone::new(contents)
}

fn apex_serial(zone: &Zone) -> u32 {
    zone.load()
        .apex()
        .soa()
        .unwrap()
        .records
        .first()
        .unwrap()
        .as_soa()
        .unwrap()
        .serial
        .0
}

//----------- Universal property 1: serial-arithmetic law -----------------------

#[test]
fn property_serial_arithmetic_law() {
    assert_eq!(serial_difference(Serial(100), Serial(101)), 1);
    assert_eq!(serial_difference(Serial(0xFFFF_FFFE), Serial(2)), 4);

    let apex = name(&["example"]);
    let zone = zone_at_serial(apex.clone(), 100);

    let decide = |remote: u32| transfer_needed(&zone.load(), &soa_record(apex.clone(), remote)).unwrap();
    assert_eq!(decide(101), TransferNeeded::Transfer);
    assert_eq!(decide(100), TransferNeeded::UpToDate);
    assert_eq!(decide(0xFFFF_FFFE), TransferNeeded::UpToDate);
}

//----------- S1 --------------------------------------------------------------

#[test]
fn scenario_s1_transfer_needed() {
    let apex = name(&["example"]);
    let zone = zone_at_serial(apex.clone(), 0xFFFF_FFFE);
    let outcome = transfer_needed(&zone.load(), &soa_record(apex, 2)).unwrap();
    assert_eq!(outcome, TransferNeeded::Transfer);
}

//----------- S2 + property 2: AXFR idempotent round-trip ------------------------

fn build_axfr_packet(apex: &str, ns: &str, serial: u32) -> Bytes {
    let soa = {
        let mut buf = BytesMut::new();
        buf.put_slice(&wire_name(&["ns1", apex]));
        buf.put_slice(&wire_name(&["hostmaster", apex]));
        buf.put_u32(serial);
        buf.put_u32(3600);
        buf.put_u32(600);
        buf.put_u32(86400);
        buf.put_u32(60);
        buf.freeze()
    };
    let mut buf = BytesMut::new();
    buf.put_u16(1);
    buf.put_u16(0);
    buf.put_u16(1); // qdcount
    buf.put_u16(3); // ancount
    buf.put_u16(0);
    buf.put_u16(0);
    buf.put_slice(&wire_name(&[apex]));
    buf.put_u16(252); // AXFR
    buf.put_u16(1);

    let mut push = |owner: &[&str], rtype: u16, rdata: &[u8]| {
        buf.put_slice(&wire_name(owner));
        buf.put_u16(rtype);
        buf.put_u16(1);
        buf.put_u32(3600);
        buf.put_u16(rdata.len() as u16);
        buf.put_slice(rdata);
    };
    push(&[apex], 6, &soa);
    push(&[ns, apex], 2, &wire_name(&[ns, apex]));
    push(&[apex], 6, &soa);
    buf.freeze()
}

#[test]
fn scenario_s2_and_property_2_axfr_round_trip() {
    let qname = name(&["example"]);
    let packet = build_axfr_packet("example", "ns1", 5);

    let mut assembler = AxfrAssembler::new(qname);
    let outcome = assembler.ingest_packet(packet).unwrap();
    let zone = match outcome {
        AxfrOutcome::TransferComplete(zone) => zone,
        AxfrOutcome::Continue => panic!("expected a complete AXFR"),
    };

    assert_eq!(zone.apex.to_string(), "example.");
    assert!(zone.apex().soa().is_some());
    let ns_owner = name(&["ns1", "example"]);
    assert!(zone.get_node(&ns_owner).unwrap().rrsets.contains_key(&Rtype::NS));

    // Round-trip: re-parsing the same stream a second time must reproduce
    // the same canonical record set (idempotence of AXFR assembly).
    let qname2 = name(&["example"]);
    let packet2 = build_axfr_packet("example", "ns1", 5);
    let mut assembler2 = AxfrAssembler::new(qname2);
    let outcome2 = assembler2.ingest_packet(packet2).unwrap();
    let zone2 = match outcome2 {
        AxfrOutcome::TransferComplete(z) => z,
        AxfrOutcome::Continue => panic!("expected a complete AXFR"),
    };
    assert_eq!(
        zone.get_node(&ns_owner).unwrap().rrsets.get(&Rtype::NS).unwrap().records,
        zone2.get_node(&ns_owner).unwrap().rrsets.get(&Rtype::NS).unwrap().records,
    );
}

//----------- S3 ----------------------------------------------------------------

#[test]
fn scenario_s3_empty_ixfr() {
    let apex = name(&["example"]);
    let mut list = ChangesetList::new();
    let first = soa_record(apex.clone(), 5);
    let closing = soa_record(apex, 5);
    assert!(matches!(
        IxfrSplitter::ingest_packet(&mut list, wire_wrap(first)).unwrap(),
        IxfrOutcome::Continue
    ));
    assert!(matches!(
        IxfrSplitter::ingest_packet(&mut list, wire_wrap(closing)).unwrap(),
        IxfrOutcome::TransferComplete
    ));
    assert!(list.first_soa.is_some());
    assert_eq!(list.len(), 0);
}

fn wire_wrap(record: Record) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u16(1);
    buf.put_u16(0);
    buf.put_u16(0); // qdcount
    buf.put_u16(1); // ancount
    buf.put_u16(0);
    buf.put_u16(0);
    buf.put_slice(record.owner.as_wire());
    buf.put_u16(record.rtype.to_int());
    buf.put_u16(record.class.to_int());
    buf.put_u32(record.ttl.as_secs());
    buf.put_u16(record.rdata.wire.len() as u16);
    buf.put_slice(&record.rdata.wire);
    buf.freeze()
}

//----------- S5 — SerialMismatch ------------------------------------------------

#[tokio::test]
async fn scenario_s5_serial_mismatch_leaves_zone_untouched() {
    let apex = name(&["example"]);
    let zone = zone_at_serial(apex.clone(), 7);

    let mut list = ChangesetList::new();
    list.changesets.push(changeset(&apex, 5, 8, vec![], vec![]));

    let err = apply(&zone, &list).await.unwrap_err();
    assert!(matches!(err, Error::SerialMismatch { expected: 5, found: 7 }));
    assert_eq!(apex_serial(&zone), 7);

    let contents = zone.load();
    for (_, node) in contents.hash.iter() {
        assert!(!node.is_new, "no node should have been touched by a failed apply");
    }
}

//----------- S6-equivalent — rollback after partial progress -------------------

#[tokio::test]
async fn scenario_s6_rollback_after_partial_progress_releases_generation_slot() {
    let apex = name(&["example"]);
    let zone = zone_at_serial(apex.clone(), 5);
    let www = name(&["www", "example"]);

    let mut list = ChangesetList::new();
    list.changesets
        .push(changeset(&apex, 5, 6, vec![a_record(www.clone(), [192, 0, 2, 1])], vec![]));
    // Overlapping add+remove makes this changeset fail validation after the
    // first changeset's forking already happened.
    let rec = a_record(www.clone(), [192, 0, 2, 2]);
    list.changesets.push(changeset(&apex, 6, 7, vec![rec.clone()], vec![rec]));

    let err = apply(&zone, &list).await.unwrap_err();
    assert!(matches!(err, Error::MalformedStream(_)));

    assert_eq!(apex_serial(&zone), 5, "no changeset in the failed apply may have landed");
    assert!(zone.load().get_node(&www).is_none());
    assert!(zone.load().generation_is_old());

    // The generation slot must really be free: a follow-up apply succeeds.
    let mut good = ChangesetList::new();
    good.changesets
        .push(changeset(&apex, 5, 6, vec![a_record(www.clone(), [192, 0, 2, 1])], vec![]));
    apply(&zone, &good).await.unwrap();
    assert_eq!(apex_serial(&zone), 6);
}

//----------- Property 3: IXFR compose -------------------------------------------

#[tokio::test]
async fn property_ixfr_compose_matches_sequential_application() {
    let apex = name(&["example"]);
    let www = name(&["www", "example"]);
    let mail = name(&["mail", "example"]);

    // Z0 -> Z1 -> Z2 applied one changeset at a time.
    let sequential = zone_at_serial(apex.clone(), 5);
    let cs1 = changeset(&apex, 5, 6, vec![a_record(www.clone(), [10, 0, 0, 1])], vec![]);
    let cs2 = changeset(&apex, 6, 7, vec![a_record(mail.clone(), [10, 0, 0, 2])], vec![]);
    let mut list1 = ChangesetList::new();
    list1.changesets.push(cs1.clone());
    apply(&sequential, &list1).await.unwrap();
    let mut list2 = ChangesetList::new();
    list2.changesets.push(cs2.clone());
    apply(&sequential, &list2).await.unwrap();

    // Z0 -> Z2 applied as one composed changeset list.
    let composed = zone_at_serial(apex, 5);
    let mut combined = ChangesetList::new();
    combined.changesets.push(cs1);
    combined.changesets.push(cs2);
    apply(&composed, &combined).await.unwrap();

    assert_eq!(apex_serial(&sequential), apex_serial(&composed));
    let seq_contents = sequential.load();
    let comp_contents = composed.load();
    for owner in [&www, &mail] {
        let seq_records = &seq_contents.get_node(owner).unwrap().rrsets.get(&Rtype::A).unwrap().records;
        let comp_records = &comp_contents.get_node(owner).unwrap().rrsets.get(&Rtype::A).unwrap().records;
        assert_eq!(seq_records, comp_records);
    }
}

//----------- Property 4: apply atomicity ----------------------------------------

#[tokio::test]
async fn property_apply_atomicity_on_failure() {
    let apex = name(&["example"]);
    let zone = zone_at_serial(apex.clone(), 5);

    let before_serial = apex_serial(&zone);
    let before_has_www = zone.load().get_node(&name(&["www", "example"])).is_some();

    let mut list = ChangesetList::new();
    list.changesets.push(changeset(&apex, 999, 1000, vec![], vec![]));
    assert!(apply(&zone, &list).await.is_err());

    assert_eq!(apex_serial(&zone), before_serial);
    assert_eq!(zone.load().get_node(&name(&["www", "example"])).is_some(), before_has_www);
}

//----------- Property 6: empty-node invariant -----------------------------------

#[tokio::test]
async fn property_empty_node_invariant_holds_after_apply() {
    let apex = name(&["example"]);
    let zone = zone_at_serial(apex.clone(), 5);
    let leaf = name(&["leaf", "sub", "example"]);

    let mut add_list = ChangesetList::new();
    add_list
        .changesets
        .push(changeset(&apex, 5, 6, vec![a_record(leaf.clone(), [10, 0, 0, 9])], vec![]));
    apply(&zone, &add_list).await.unwrap();
    assert!(zone.load().get_node(&leaf).is_some());
    let sub = name(&["sub", "example"]);
    assert!(zone.load().get_node(&sub).is_some(), "empty-nonterminal ancestor created");

    let mut remove_list = ChangesetList::new();
    remove_list
        .changesets
        .push(changeset(&apex, 6, 7, vec![], vec![a_record(leaf.clone(), [10, 0, 0, 9])]));
    apply(&zone, &remove_list).await.unwrap();

    let contents = zone.load();
    assert!(contents.get_node(&leaf).is_none());
    assert!(contents.get_node(&sub).is_none(), "empty-nonterminal ancestor must be pruned too");
    for (name, node) in contents.hash.iter() {
        if name.as_ref() != contents.apex.as_ref() {
            assert!(
                !node.rrsets.is_empty() || node.children > 0,
                "node {name} left with no RRSets and no children"
            );
        }
    }
}

//----------- Property 7: SOA chain ----------------------------------------------

#[tokio::test]
async fn property_soa_chain_after_multi_changeset_apply() {
    let apex = name(&["example"]);
    let zone = zone_at_serial(apex.clone(), 1);

    let mut list = ChangesetList::new();
    list.changesets.push(changeset(&apex, 1, 2, vec![], vec![]));
    list.changesets.push(changeset(&apex, 2, 3, vec![], vec![]));
    list.changesets.push(changeset(&apex, 3, 4, vec![], vec![]));
    apply(&zone, &list).await.unwrap();

    assert_eq!(apex_serial(&zone), 4);
}

//----------- Property 5: generation monotonicity --------------------------------

#[tokio::test]
async fn property_generation_settles_back_to_old() {
    use zonexfr_core::generation::GenerationTag;

    let apex = name(&["example"]);
    let zone = zone_at_serial(apex.clone(), 5);
    assert_eq!(zone.load().generation(), GenerationTag::Old);

    let mut list = ChangesetList::new();
    list.changesets.push(changeset(&apex, 5, 6, vec![], vec![]));
    apply(&zone, &list).await.unwrap();

    // A reader that loads only after the apply has returned must observe
    // the settled `Old` tag of the new generation, never a transient one.
    assert_eq!(zone.load().generation(), GenerationTag::Old);
}
