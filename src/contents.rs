//! Zone contents: the node tree, NSEC3 tree, hash table, and interned-name
//! table that together make up one generation of a zone (spec §3, §4.1).

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use bytes::Bytes;

use crate::error::Error;
use crate::generation::{AtomicGeneration, GenerationTag};
use crate::name::{Name, NameTable};
use crate::node::Node;
use crate::record::rtype;

/// Parameters describing the zone's NSEC3 chain, if any.
///
/// Purely informational metadata derived from the apex's NSEC3PARAM RRSet
/// when present; record routing to `nsec3_tree` is driven by record type
/// (NSEC3), not by this struct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nsec3Params {
    pub algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Bytes,
}

/// One generation of a zone's contents.
///
/// Nodes are addressed by their owner name rather than a synthetic arena
/// index (see `node.rs` and `DESIGN.md`). `hash` is the sole owner of every
/// main-tree node's payload; `tree` holds only the set of owner names, in
/// canonical order, so the applicator's post-order prune walk and
/// `add_node`'s parent materialization can traverse names without a second
/// copy of every `Arc<Node>` aliasing the one in `hash` — the aliasing that
/// would otherwise defeat `Arc::make_mut`'s copy-on-write check (see
/// `DESIGN.md`). The NSEC3 tree has no such second index, so it keeps its
/// `Arc<Node>` payloads directly.
pub struct ZoneContents {
    pub tree: BTreeSet<Arc<Name>>,
    pub nsec3_tree: BTreeMap<Arc<Name>, Arc<Node>>,
    pub hash: HashMap<Arc<Name>, Arc<Node>>,
    pub names: NameTable,
    pub apex: Arc<Name>,
    pub nsec3_params: Option<Nsec3Params>,
    pub generation: AtomicGeneration,
}

impl ZoneContents {
    /// Create a fresh, single-node zone whose apex is `apex`, in generation
    /// `Old` (the only state a freshly built zone can start in; it has
    /// never been mid-apply).
    pub fn new(apex: Arc<Name>) -> Self {
        let mut contents = ZoneContents {
            tree: BTreeSet::new(),
            nsec3_tree: BTreeMap::new(),
            hash: HashMap::new(),
            names: NameTable::new(),
            apex: apex.clone(),
            nsec3_params: None,
            generation: AtomicGeneration::new(GenerationTag::Old),
        };
        contents.insert_node_raw(Node::new(apex), false);
        contents
    }

    pub fn get_node(&self, name: &Name) -> Option<&Arc<Node>> {
        self.hash.get(name)
    }

    pub fn get_nsec3_node(&self, name: &Name) -> Option<&Arc<Node>> {
        self.nsec3_tree.get(name)
    }

    pub fn apex(&self) -> &Arc<Node> {
        self.hash
            .get(&self.apex)
            .expect("zone contents invariant: apex node always present")
    }

    /// Insert `node`, optionally materializing empty-nonterminal ancestors
    /// up to (but not including) the apex, and optionally marking the new
    /// node (and any materialized ancestors) as belonging to the
    /// in-progress generation.
    ///
    /// Invariant after return: every label-prefix of `node.owner`, down to
    /// the apex, is present as a node (spec §4.1).
    pub fn add_node(&mut self, node: Node, create_parents: bool, new_flag: bool) {
        self.add_node_in(node, create_parents, new_flag, false);
    }

    /// As [`Self::add_node`], but routes into the NSEC3 tree instead of the
    /// main tree (spec §4.4.1's "NSEC3 record: route to the NSEC3-node
    /// tree").
    pub fn add_nsec3_node(&mut self, node: Node, new_flag: bool) {
        self.add_node_in(node, false, new_flag, true);
    }

    fn add_node_in(&mut self, mut node: Node, create_parents: bool, new_flag: bool, nsec3: bool) {
        node.is_new = new_flag;
        if create_parents && !nsec3 {
            let mut current = node.owner.clone();
            let mut chain = Vec::new();
            while current.as_ref() != self.apex.as_ref() {
                let Some(parent_name) = current.parent() else {
                    break;
                };
                let parent_key = self.names.intern(parent_name);
                if self.hash.contains_key(&parent_key) {
                    break;
                }
                chain.push(parent_key.clone());
                current = parent_key;
            }
            // `chain` was built leaf-to-root; materialize root-to-leaf so
            // each parent's own parent link is already present.
            for name in chain.into_iter().rev() {
                let mut parent_node = Node::new(name);
                parent_node.is_empty_nonterminal = true;
                parent_node.is_new = new_flag;
                self.insert_node_raw(parent_node, false);
            }
        }
        self.insert_node_raw(node, nsec3);
    }

    /// Insert a single node, wiring its `parent` link and bumping that
    /// parent's child count. Does not create ancestors. NSEC3 nodes are
    /// routed to `nsec3_tree` and never appear in `hash` or the main
    /// `tree`, keeping the two trees disjoint per the zone contents
    /// invariant.
    fn insert_node_raw(&mut self, mut node: Node, nsec3: bool) {
        let owner = node.owner.clone();
        if !nsec3 && node.parent.is_none() && owner.as_ref() != self.apex.as_ref() {
            if let Some(parent_name) = owner.parent() {
                node.parent = self.nearest_existing_ancestor(&parent_name);
            }
        }
        if !nsec3 {
            if let Some(parent) = node.parent.clone() {
                if let Some(parent_node) = self.hash.get_mut(&parent) {
                    Arc::make_mut(parent_node).children += 1;
                }
            }
        }
        let arc = Arc::new(node);
        if nsec3 {
            self.nsec3_tree.insert(owner, arc);
        } else {
            self.tree.insert(owner.clone());
            self.hash.insert(owner, arc);
        }
    }

    fn nearest_existing_ancestor(&self, start: &Name) -> Option<Arc<Name>> {
        let mut current = start.clone();
        loop {
            if let Some((key, _)) = self.hash.get_key_value(&current) {
                return Some(key.clone());
            }
            current = current.parent()?;
        }
    }

    /// Detach and return the node at `name`, without freeing anything — the
    /// applicator schedules it for deferred free after reader grace (spec
    /// §4.1). `tree` and `hash` always agree on which names are present, so
    /// there is only one entry to return (see the struct-level doc comment
    /// on why a second, aliasing `Arc<Node>` copy in `tree` was dropped).
    pub fn remove_node(&mut self, name: &Name) -> Option<Arc<Node>> {
        self.tree.remove(name);
        self.hash.remove(name)
    }

    pub fn generation(&self) -> GenerationTag {
        self.generation.get()
    }

    pub fn set_generation(&self, tag: GenerationTag) {
        self.generation.set(tag);
    }

    pub fn generation_is_old(&self) -> bool {
        self.generation.is_old()
    }

    /// Duplicate the tree topology, hash table, and interned-name table,
    /// without duplicating any node payload: every `Arc<Node>` and
    /// `Arc<Name>` in the copy still points at the exact same allocation as
    /// in `self`. Subsequent node modifications in the copy clone only the
    /// nodes they actually touch (`Arc::make_mut`).
    pub fn shallow_copy(&self) -> ZoneContents {
        ZoneContents {
            tree: self.tree.clone(),
            nsec3_tree: self.nsec3_tree.clone(),
            hash: self.hash.clone(),
            names: self.names.clone(),
            apex: self.apex.clone(),
            nsec3_params: self.nsec3_params.clone(),
            generation: AtomicGeneration::new(GenerationTag::NewInProgress),
        }
    }

    /// Whether `rtype` is routed to the NSEC3 tree rather than the main
    /// tree.
    pub fn routes_to_nsec3(rt: domain::base::iana::Rtype) -> bool {
        rt == rtype::NSEC3
    }

    /// Validate the zone-contents invariants from spec §3. Used by tests
    /// and by the applicator's rollback path to confirm a zone was left
    /// untouched.
    pub fn check_invariants(&self) -> Result<(), Error> {
        if self.apex().soa().is_none() {
            return Err(Error::BadArgument("apex node carries no SOA RRSet"));
        }
        for name in self.tree.iter() {
            if self.nsec3_tree.contains_key(name) {
                return Err(Error::BadArgument(
                    "name present in both the main tree and the NSEC3 tree",
                ));
            }
        }
        Ok(())
    }
}
