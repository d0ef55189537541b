//! The shared error type.
//!
//! Every fallible subsystem in this crate (query construction, AXFR and IXFR
//! parsing, changeset application) returns this same enum rather than each
//! defining its own and converting through `From`, or reaching for a generic
//! boxed-error or a derive-macro crate — there are few enough error kinds
//! that one flat enum stays readable, and callers only ever need to match on
//! one type.

use std::fmt;

/// The error kinds a caller of this crate's public API can observe.
///
/// `EndOfStream`/`TransferComplete` are not error conditions and are never
/// represented here; they are positive sentinels carried in each parser's
/// own outcome type (see [`crate::axfr::AxfrOutcome`],
/// [`crate::ixfr::IxfrOutcome`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The caller passed a null or empty structure where one was required.
    BadArgument(&'static str),
    /// An allocation failed. The caller may retry later.
    OutOfMemory,
    /// A query would exceed the 512-octet wire limit.
    Oversize,
    /// A wire message violated a protocol invariant: a bad header, a
    /// truncated record, an unexpected leading record, or an illegal state
    /// transition.
    MalformedStream(&'static str),
    /// A changeset's `serial_from` did not match the zone's live apex SOA
    /// serial at the point it was applied.
    SerialMismatch {
        expected: u32,
        found: u32,
    },
    /// The zone's generation tag was not `Old` when an apply was attempted.
    ConcurrentUpdateInProgress,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadArgument(what) => write!(f, "bad argument: {what}"),
            Error::OutOfMemory => f.write_str("allocation failed"),
            Error::Oversize => f.write_str("query would exceed the 512-octet wire limit"),
            Error::MalformedStream(what) => write!(f, "malformed stream: {what}"),
            Error::SerialMismatch { expected, found } => write!(
                f,
                "changeset serial_from {expected} does not match live apex serial {found}"
            ),
            Error::ConcurrentUpdateInProgress => {
                f.write_str("an apply is already in progress for this zone")
            }
        }
    }
}

impl std::error::Error for Error {}
