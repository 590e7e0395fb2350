// In crates/engine/src/reconciler.rs

use core_types::Position;
use execution::VenuePosition;

/// How the local position compares with what the venue reports.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Both sides agree on side and size.
    InSync,
    /// Neither side holds a position.
    Flat,
    /// We hold a position the venue no longer reports (closed by a venue-side
    /// stop or by hand).
    ClosedOnVenue,
    /// The venue reports a position we know nothing about.
    Orphaned(VenuePosition),
    /// Both hold a position but side or size differ.
    Mismatch { local: String, venue: String },
}

/// Compares local and venue state for one symbol.
pub fn reconcile(local: Option<&Position>, venue: Option<&VenuePosition>) -> Reconciliation {
    match (local, venue) {
        (None, None) => Reconciliation::Flat,
        (Some(_), None) => Reconciliation::ClosedOnVenue,
        (None, Some(v)) => Reconciliation::Orphaned(v.clone()),
        (Some(l), Some(v)) if l.side == v.side && l.quantity == v.quantity => Reconciliation::InSync,
        (Some(l), Some(v)) => Reconciliation::Mismatch {
            local: format!("{} {}", l.side, l.quantity),
            venue: format!("{} {}", v.side, v.quantity),
        },
    }
}
