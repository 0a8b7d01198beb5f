//! Projection runner utilities (read model builders).
//!
//! Deterministic replay and cursor tracking without storage assumptions.

use thiserror::Error;

use tally_core::LedgerId;

use crate::{EventEnvelope, Projection};

/// Tracks projection progress for a single ledger stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProjectionCursor {
    ledger_id: LedgerId,
    last_sequence_number: u64,
}

impl ProjectionCursor {
    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("stream mismatch (expected {expected}, found {found})")]
    StreamMismatch { expected: LedgerId, found: LedgerId },

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Runs envelopes through a projection and tracks progress.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    cursor: Option<ProjectionCursor>,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            cursor: None,
        }
    }

    /// Create a runner pinned to a specific ledger stream.
    pub fn new_for_ledger(ledger_id: LedgerId, projection: P) -> Self {
        Self {
            projection,
            cursor: Some(ProjectionCursor {
                ledger_id,
                last_sequence_number: 0,
            }),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    pub fn cursor(&self) -> Option<ProjectionCursor> {
        self.cursor
    }

    /// Apply a single envelope, enforcing stream consistency and monotonic sequencing.
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<(), ProjectionError> {
        let found_ledger = envelope.ledger_id();
        let found_seq = envelope.sequence_number();

        let mut cursor = match self.cursor {
            None => ProjectionCursor {
                ledger_id: found_ledger,
                last_sequence_number: 0,
            },
            Some(c) => c,
        };

        if cursor.ledger_id != found_ledger {
            return Err(ProjectionError::StreamMismatch {
                expected: cursor.ledger_id,
                found: found_ledger,
            });
        }
        if found_seq <= cursor.last_sequence_number {
            return Err(ProjectionError::NonMonotonicSequence {
                last: cursor.last_sequence_number,
                found: found_seq,
            });
        }

        self.projection.apply(envelope);
        cursor.last_sequence_number = found_seq;
        self.cursor = Some(cursor);
        Ok(())
    }

    /// Apply many envelopes in order.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(), ProjectionError>
    where
        P::Ev: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }

    /// Rebuild a projection from scratch by replaying the full event history.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(P, Option<ProjectionCursor>), ProjectionError>
    where
        P::Ev: 'a,
    {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes)?;
        Ok((runner.projection, runner.cursor))
    }
}
