use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Read models are disposable: they can be dropped and rebuilt by replaying
/// the ledger stream, because events are the source of truth.
///
/// `apply` must be idempotent under redelivery. [`ProjectionRunner`] enforces
/// monotonic sequencing per stream so most projections only need to fold the
/// payload.
///
/// [`ProjectionRunner`]: crate::ProjectionRunner
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    ///
    /// Events that are irrelevant to this projection should be ignored.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
