//! The changeset applicator (spec §4.5).
//!
//! Applies an ordered [`ChangesetList`] to a [`Zone`] atomically: a shallow
//! copy is built and mutated changeset by changeset, and only if every
//! changeset validates and applies cleanly is the copy swapped in for
//! readers. Any failure along the way is a no-op from the zone's point of
//! view — the copy, and everything forked while building it, is simply
//! dropped, and the zone's generation tag is handed back so a later apply
//! can proceed (spec §4.5.2's rollback procedure, simplified: there is no
//! pointer-unwinding to do, because nothing in the original generation was
//! ever touched).

use std::sync::Arc;

use domain::base::iana::Class;
use tracing::{debug, warn};

use crate::changeset::{Changeset, ChangesetList};
use crate::contents::ZoneContents;
use crate::error::Error;
use crate::generation::GenerationTag;
use crate::name::Name;
use crate::node::Node;
use crate::query::local_serial;
use crate::record::{rtype, Record, RRSet};
use crate::zone::Zone;

//----------- GrowableList -----------------------------------------------------

/// A scratch list that starts at zero capacity and grows by doubling (spec
/// §4.5.3): the applicator's bookkeeping lists for nodes and RRSets
/// displaced or introduced by one apply.
///
/// This is a thin wrapper around `Vec`, which already grows by doubling on
/// its own; the wrapper exists because the doubling-from-zero contract is
/// part of what the applicator is specified to do, not an incidental detail
/// of whichever collection happens to implement it.
#[derive(Debug)]
pub struct GrowableList<T> {
    items: Vec<T>,
}

impl<T> Default for GrowableList<T> {
    fn default() -> Self {
        GrowableList { items: Vec::new() }
    }
}

impl<T> GrowableList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `item`, growing capacity by doubling once the list is full
    /// (reserving exactly one slot's worth the first time, since doubling a
    /// zero capacity never grows it).
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.items.capacity() {
            let delta = self.items.capacity().max(1);
            self.items.reserve(delta);
        }
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

/// The five scratch lists named in spec §4.5.3, tracking what one apply
/// displaces and introduces. `old_hash_items` from the spec's list isn't a
/// separate field here: this crate's node tree (`ZoneContents::hash`) is the
/// sole owner of node payloads (see `DESIGN.md`), so there is no second,
/// independently-displaced hash-table entry to track alongside `old_nodes`.
#[derive(Debug, Default)]
struct ApplyScratch {
    new_nodes: GrowableList<Arc<Node>>,
    old_nodes: GrowableList<Arc<Node>>,
    new_rrsets: GrowableList<Arc<RRSet>>,
    old_rrsets: GrowableList<Arc<RRSet>>,
}

//----------- apply --------------------------------------------------------------

/// Apply `changesets` to `zone`, bringing it from its current serial to the
/// last changeset's `serial_to`.
///
/// Fails with [`Error::ConcurrentUpdateInProgress`] if another apply is
/// already under way (spec §5's single-writer guarantee, enforced by
/// [`crate::generation::AtomicGeneration::try_begin_apply`]'s
/// compare-and-swap). Any other failure leaves `zone` completely unchanged
/// and clears the in-progress marker so a later apply can proceed.
pub async fn apply(zone: &Zone, changesets: &ChangesetList) -> Result<(), Error> {
    let current = zone.load();
    if !current.generation.try_begin_apply() {
        return Err(Error::ConcurrentUpdateInProgress);
    }

    match build_next_generation(&current, changesets) {
        Ok((copy, scratch)) => {
            copy.set_generation(GenerationTag::NewInProgress);
            let new_arc = Arc::new(copy);
            let old_contents = zone.switch_contents(new_arc.clone());
            new_arc.set_generation(GenerationTag::NewFinished);
            zone.flip_and_wait().await;
            new_arc.set_generation(GenerationTag::Old);
            debug!(
                changesets = changesets.len(),
                nodes_replaced = scratch.old_nodes.len(),
                nodes_introduced = scratch.new_nodes.len(),
                rrsets_replaced = scratch.old_rrsets.len(),
                rrsets_introduced = scratch.new_rrsets.len(),
                "apply: generation flipped, old generation released"
            );
            drop(old_contents);
            drop(scratch);
            Ok(())
        }
        Err(e) => {
            // Nothing in `current` was ever touched; hand the slot back.
            current.set_generation(GenerationTag::Old);
            Err(e)
        }
    }
}

/// Build, validate, and mutate a shallow copy of `current` through every
/// changeset in order (spec §4.5.2 steps 1-6). Returns the fully-updated,
/// pruned copy on success. On any error, the partially-mutated copy (and
/// the scratch lists collected so far) are simply dropped by the caller —
/// `current` itself is never touched by this function.
fn build_next_generation(
    current: &ZoneContents,
    changesets: &ChangesetList,
) -> Result<(ZoneContents, ApplyScratch), Error> {
    let mut copy = current.shallow_copy();
    let mut scratch = ApplyScratch::default();

    for cs in &changesets.changesets {
        validate_changeset(&copy, cs)?;
        for record in &cs.remove {
            apply_remove(&mut copy, record, &mut scratch)?;
        }
        for record in &cs.add {
            apply_add(&mut copy, record.clone());
        }
        replace_apex_soa(&mut copy, cs.soa_to.as_ref().expect("validated complete"), &mut scratch);
    }

    prune(&mut copy, &mut scratch);
    diff_nodes(current, &copy, &mut scratch);

    Ok((copy, scratch))
}

/// Step 2: a changeset may only be applied if it is structurally complete,
/// its remove and add sets don't overlap by identity, every record it
/// touches is inside the zone, and its `serial_from` matches the zone's
/// live apex serial as left by the previous changeset.
fn validate_changeset(contents: &ZoneContents, cs: &Changeset) -> Result<(), Error> {
    if !cs.is_complete() {
        return Err(Error::MalformedStream("changeset is missing soa_from or soa_to"));
    }
    if cs.removes_and_adds_overlap() {
        return Err(Error::MalformedStream(
            "changeset's remove and add sets overlap by identity",
        ));
    }
    for record in cs.remove.iter().chain(cs.add.iter()) {
        if !record.owner.ends_with(&contents.apex) {
            return Err(Error::MalformedStream("changeset record owner is outside the zone"));
        }
    }
    let expected = cs.serial_from.expect("is_complete() implies serial_from is set");
    let found = local_serial(contents)?;
    if found.0 != expected.0 {
        return Err(Error::SerialMismatch {
            expected: expected.0,
            found: found.0,
        });
    }
    Ok(())
}

/// Step 3: remove one record from the copy. Absence of the target node,
/// RRSet, or exact RDATA is not an error (spec §9's open question on a
/// remove targeting something already gone is resolved leniently, matching
/// AXFR's already-established tolerance for a re-sent record): the stream
/// is logged and applying continues, since an IXFR stream computed against
/// a state this zone has already converged toward is not malformed, just
/// redundant.
fn apply_remove(contents: &mut ZoneContents, record: &Record, scratch: &mut ApplyScratch) -> Result<(), Error> {
    let nsec3 = ZoneContents::routes_to_nsec3(record.rtype);
    let node = if nsec3 {
        contents.nsec3_tree.get_mut(&record.owner).map(Arc::make_mut)
    } else {
        contents.hash.get_mut(&record.owner).map(Arc::make_mut)
    };
    let Some(node) = node else {
        warn!(owner = %record.owner, rtype = ?record.rtype, "IXFR remove: node not present, skipping");
        return Ok(());
    };
    node.is_new = true;

    if record.class == Class::ANY {
        remove_any(node, record, scratch);
        return Ok(());
    }

    if record.rtype == rtype::RRSIG {
        remove_rrsig(node, record, scratch)?;
        return Ok(());
    }

    remove_plain(node, record, scratch);
    Ok(())
}

/// Class-ANY delete: wipe a whole type, or everything, at this node.
fn remove_any(node: &mut Node, record: &Record, scratch: &mut ApplyScratch) {
    if record.rtype == rtype::ANY {
        for (_, rrset) in std::mem::take(&mut node.rrsets) {
            scratch.old_rrsets.push(rrset);
        }
        for (_, rrset) in std::mem::take(&mut node.rrsigs) {
            scratch.old_rrsets.push(rrset);
        }
    } else if record.rtype == rtype::RRSIG {
        // An empty-RDATA class-ANY RRSIG delete carries no covered type, so
        // it wipes every signature at this node.
        for (_, rrset) in std::mem::take(&mut node.rrsigs) {
            scratch.old_rrsets.push(rrset);
        }
    } else if let Some(old) = node.rrsets.remove(&record.rtype) {
        scratch.old_rrsets.push(old);
    }
}

fn remove_rrsig(node: &mut Node, record: &Record, scratch: &mut ApplyScratch) -> Result<(), Error> {
    let covered = record
        .rdata
        .as_rrsig()
        .map(|r| r.type_covered)
        .ok_or(Error::MalformedStream("RRSIG remove record missing type-covered"))?;

    let mut now_empty = false;
    match node.rrsigs.get_mut(&covered) {
        Some(sigset) => {
            if Arc::make_mut(sigset).remove_by_wire(&record.rdata.wire).is_none() {
                warn!(owner = %record.owner, "IXFR remove: RRSIG RDATA not present, skipping");
            }
            now_empty = sigset.is_empty();
        }
        None => warn!(owner = %record.owner, "IXFR remove: no RRSIG set for covered type, skipping"),
    }
    if now_empty {
        if let Some(old) = node.rrsigs.remove(&covered) {
            scratch.old_rrsets.push(old);
        }
    }

    // A covered RRSet that's now empty and has lost its last signature is
    // itself prunable.
    let rrset_empty = node.rrsets.get(&covered).is_some_and(|r| r.is_empty());
    if rrset_empty && !node.rrsigs.contains_key(&covered) {
        if let Some(old) = node.rrsets.remove(&covered) {
            scratch.old_rrsets.push(old);
        }
    }
    Ok(())
}

fn remove_plain(node: &mut Node, record: &Record, scratch: &mut ApplyScratch) {
    match node.rrsets.get_mut(&record.rtype) {
        Some(rrset) => {
            if Arc::make_mut(rrset).remove_by_wire(&record.rdata.wire).is_none() {
                warn!(owner = %record.owner, rtype = ?record.rtype, "IXFR remove: RDATA not present in RRSet, skipping");
            }
        }
        None => warn!(owner = %record.owner, rtype = ?record.rtype, "IXFR remove: RRSet not present, skipping"),
    }
    let now_empty = node.rrsets.get(&record.rtype).is_some_and(|r| r.is_empty());
    if now_empty && !node.rrsigs.contains_key(&record.rtype) {
        if let Some(old) = node.rrsets.remove(&record.rtype) {
            scratch.old_rrsets.push(old);
        }
    }
}

/// Step 4: add one record to the copy, materializing the node (and any
/// empty-nonterminal ancestors) if it doesn't already exist. Shares the
/// merge/dedup policy with AXFR assembly — an IXFR add and an AXFR answer
/// record land in a node the same way.
fn apply_add(contents: &mut ZoneContents, record: Record) {
    let nsec3 = ZoneContents::routes_to_nsec3(record.rtype);
    let node = ensure_node(contents, &record.owner, nsec3);
    node.is_new = true;
    crate::axfr::merge_into_node(node, record);
}

fn ensure_node<'a>(contents: &'a mut ZoneContents, owner: &Arc<Name>, nsec3: bool) -> &'a mut Node {
    if nsec3 {
        if !contents.nsec3_tree.contains_key(owner.as_ref()) {
            contents.add_nsec3_node(Node::new(owner.clone()), true);
        }
        Arc::make_mut(contents.nsec3_tree.get_mut(owner.as_ref()).expect("just ensured"))
    } else {
        if !contents.hash.contains_key(owner.as_ref()) {
            contents.add_node(Node::new(owner.clone()), true, true);
        }
        Arc::make_mut(contents.hash.get_mut(owner.as_ref()).expect("just ensured"))
    }
}

/// Step 5: replace the apex SOA RRSet with the changeset's `soa_to`.
fn replace_apex_soa(contents: &mut ZoneContents, soa_to: &Record, scratch: &mut ApplyScratch) {
    let apex = contents.apex.clone();
    let node = Arc::make_mut(contents.hash.get_mut(&apex).expect("apex always present"));
    node.is_new = true;
    if let Some(old) = node.rrsets.remove(&rtype::SOA) {
        scratch.old_rrsets.push(old);
    }
    let mut rrset = RRSet::new(soa_to.class, soa_to.ttl);
    rrset.merge(soa_to.ttl, Arc::new(soa_to.rdata.clone()));
    let new_rrset = Arc::new(rrset);
    scratch.new_rrsets.push(new_rrset.clone());
    node.rrsets.insert(rtype::SOA, new_rrset);
}

/// Step 6: a single post-order pass removing every node left with no
/// RRSets, no RRSIGs, and no children. Iterating the tree's canonical order
/// in reverse visits descendants before their ancestors, so a parent that
/// becomes prunable only because this pass just removed its last child is
/// still caught in the same pass.
fn prune(contents: &mut ZoneContents, scratch: &mut ApplyScratch) {
    let names: Vec<Arc<Name>> = contents.tree.iter().cloned().collect();
    for name in names.into_iter().rev() {
        if name.as_ref() == contents.apex.as_ref() {
            continue;
        }
        let prunable = contents.hash.get(name.as_ref()).is_some_and(|n| n.is_prunable());
        if !prunable {
            continue;
        }
        if let Some(node) = contents.remove_node(&name) {
            if let Some(parent) = node.parent.clone() {
                if let Some(parent_node) = contents.hash.get_mut(&parent) {
                    let parent_mut = Arc::make_mut(parent_node);
                    parent_mut.children = parent_mut.children.saturating_sub(1);
                }
            }
            scratch.old_nodes.push(node);
        }
    }

    let nsec3_names: Vec<Arc<Name>> = contents.nsec3_tree.keys().cloned().collect();
    for name in nsec3_names.into_iter().rev() {
        let prunable = contents.nsec3_tree.get(name.as_ref()).is_some_and(|n| n.is_prunable());
        if prunable {
            if let Some(node) = contents.nsec3_tree.remove(name.as_ref()) {
                scratch.old_nodes.push(node);
            }
        }
    }
}

/// Compare `copy` against `current` to fill in the bookkeeping lists this
/// apply didn't already populate incrementally: a node present in both but
/// at a different allocation was forked (copy-on-write touched it); a node
/// present only in `current` was pruned away; a node present only in
/// `copy` is brand new.
fn diff_nodes(current: &ZoneContents, copy: &ZoneContents, scratch: &mut ApplyScratch) {
    for (name, new_arc) in copy.hash.iter() {
        match current.hash.get(name) {
            Some(old_arc) if !Arc::ptr_eq(old_arc, new_arc) => {
                scratch.old_nodes.push(old_arc.clone());
                scratch.new_nodes.push(new_arc.clone());
            }
            None => scratch.new_nodes.push(new_arc.clone()),
            _ => {}
        }
    }
    for (name, old_arc) in current.hash.iter() {
        if !copy.hash.contains_key(name) {
            scratch.old_nodes.push(old_arc.clone());
        }
    }
}
