//! Core zone-transfer engine for secondary DNS servers.
//!
//! This crate implements the inbound half of zone-transfer-based secondary
//! DNS: querying a primary for a zone's current serial, pulling a full
//! (AXFR) or incremental (IXFR) transfer, and applying the result to an
//! in-memory [`Zone`] with atomic, rollback-capable semantics so that
//! concurrent readers (a query engine, a signer, anything else consulting
//! the zone) never observe a torn update.
//!
//! - [`name`], [`record`], [`node`] — the name, record, and node types the
//!   rest of the crate builds on.
//! - [`contents`] — one generation of a zone's tree, NSEC3 tree, and name
//!   table.
//! - [`zone`] — the concurrently-readable holder for the zone's current
//!   generation.
//! - [`generation`] — the generation tag and reader-grace machinery
//!   [`zone`] and [`apply`] are built on.
//! - [`query`] — building SOA/AXFR/IXFR queries and deciding whether a
//!   transfer is needed.
//! - [`wire`] — the hand-rolled DNS message reader the transfer assemblers
//!   are built on.
//! - [`axfr`] — assembling a full zone transfer into a [`contents::ZoneContents`].
//! - [`changeset`] — the differential update model IXFR parses into.
//! - [`ixfr`] — splitting an incremental transfer stream into a
//!   [`changeset::ChangesetList`].
//! - [`apply`] — applying a [`changeset::ChangesetList`] to a [`Zone`].

pub mod apply;
pub mod axfr;
pub mod changeset;
pub mod contents;
pub mod error;
pub mod generation;
pub mod ixfr;
pub mod name;
pub mod node;
pub mod query;
pub mod record;
pub mod wire;
pub mod zone;

pub use contents::ZoneContents;
pub use error::Error;
pub use zone::Zone;
