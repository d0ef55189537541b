//! Zone tree nodes.
//!
//! A [`Node`] is addressed by its owner name rather than through a separate
//! synthetic arena index (see `DESIGN.md` for why): owner names are already
//! unique, reference-counted, and ordered, so a `BTreeMap<Arc<Name>, Arc<Node>>`
//! gives the "stable index" the design notes ask for without inventing a
//! second identity space. Cloning a node for copy-on-write is
//! `Arc::make_mut`, which clones the `Node` struct shallowly: its RRSet maps
//! clone only their `Arc<RRSet>` pointers, so a node clone does not by
//! itself duplicate any RRSet's record list.

use std::{collections::BTreeMap, sync::Arc};

use domain::base::iana::Rtype;

use crate::name::Name;
use crate::record::RRSet;

/// A zone tree node.
#[derive(Clone, Debug)]
pub struct Node {
    pub owner: Arc<Name>,
    /// RRSets at this node, keyed by type. RRSIGs are never stored here;
    /// they live in `rrsigs`, attached to the RRSet they cover.
    pub rrsets: BTreeMap<Rtype, Arc<RRSet>>,
    /// RRSIG RRSets at this node, keyed by the type they cover.
    pub rrsigs: BTreeMap<Rtype, Arc<RRSet>>,
    /// The nearest existing ancestor at the time this node was created.
    /// `None` only for the apex.
    pub parent: Option<Arc<Name>>,
    /// Number of immediate children currently present in the same tree.
    pub children: u32,
    /// Set on every node touched during the apply currently in flight;
    /// cleared once that apply's reference-fixing step (§4.5.2 step 9) is
    /// no longer needed to distinguish it. Informational for this crate's
    /// safe design (see `DESIGN.md`), kept for fidelity with the data
    /// model's flag bits and for the testable "no stale new_node" property.
    pub is_new: bool,
    /// Set when this node belongs to a generation being displaced.
    pub is_old: bool,
    /// Set when this node exists only to materialize a label-prefix of some
    /// other owner name (`add_node(create_parents=true)`), not because it
    /// was ever named directly by a transferred record.
    pub is_empty_nonterminal: bool,
}

impl Node {
    pub fn new(owner: Arc<Name>) -> Self {
        Node {
            owner,
            rrsets: BTreeMap::new(),
            rrsigs: BTreeMap::new(),
            parent: None,
            children: 0,
            is_new: false,
            is_old: false,
            is_empty_nonterminal: false,
        }
    }

    /// A node is prunable once it has neither RRSets nor RRSIGs nor
    /// children left (spec §4.5.2 step 6: "zero RRSets AND zero children").
    /// An RRSIG with no remaining covered RRSet cannot happen by
    /// construction (the REMOVE step detaches an RRSIG set's covered RRSet
    /// together with it), but the check is included for robustness against
    /// a stream that adds a bare RRSIG without its covered type.
    pub fn is_prunable(&self) -> bool {
        self.rrsets.is_empty() && self.rrsigs.is_empty() && self.children == 0
    }

    pub fn soa(&self) -> Option<&Arc<RRSet>> {
        self.rrsets.get(&Rtype::SOA)
    }
}
