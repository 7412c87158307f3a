//! Layer scheduler: whether a change becomes a durable layer or the latest patch.
//!
//! Layers turn into cached image layers, so cutting one per commit would
//! defeat caching. Layers are therefore batched by wall-clock time, and
//! the latest patch keeps the shipped tree current in between.

use std::time::{Duration, SystemTime};

use gitlayer_core::{PathFilter, SourceRepo};

use crate::differ::{Delta, DiffError, Differ, Payload};
use crate::store::ArtifactState;

/// What one invocation has to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No usable snapshot: ship the whole tree and start over.
    Snapshot { commit: String, payload: Payload },
    /// The base is old enough to cut layer `number`.
    LayerPatch {
        number: u32,
        commit: String,
        payload: Payload,
    },
    /// Create or replace the latest patch.
    LatestPatch { commit: String, payload: Payload },
    /// Nothing new to ship. `drop_latest` retires a latest patch whose
    /// changes are already covered by the base.
    NoOp { drop_latest: bool },
}

pub struct Scheduler<'a, S: ?Sized> {
    differ: Differ<'a, S>,
    interlayer_period: Duration,
}

impl<'a, S: SourceRepo + ?Sized> Scheduler<'a, S> {
    pub fn new(source: &'a S, filter: &'a PathFilter, interlayer_period: Duration) -> Self {
        Self {
            differ: Differ::new(source, filter),
            interlayer_period,
        }
    }

    pub fn decide(
        &self,
        state: &ArtifactState,
        head: &str,
        now: SystemTime,
    ) -> Result<Decision, DiffError> {
        let (Some(_), Some(base)) = (&state.snapshot, state.base()) else {
            tracing::debug!(head, "no snapshot checkpoint");
            return Ok(Decision::Snapshot {
                commit: head.to_owned(),
                payload: self.differ.snapshot(head)?,
            });
        };

        if state.latest.as_ref().is_some_and(|latest| latest.commit == head) {
            return Ok(Decision::NoOp { drop_latest: false });
        }

        let payload = match self.differ.diff(Some(&base.commit), head)? {
            Delta::Empty => {
                return Ok(Decision::NoOp {
                    drop_latest: state.latest.is_some(),
                });
            }
            Delta::NonEmpty(payload) => payload,
        };

        // a clock behind the base counts as no time passed
        let elapsed = now
            .duration_since(base.recorded_at)
            .unwrap_or(Duration::ZERO);
        tracing::debug!(
            base = %base.commit,
            head,
            elapsed_secs = elapsed.as_secs(),
            period_secs = self.interlayer_period.as_secs(),
            "non-empty delta"
        );

        if elapsed >= self.interlayer_period {
            Ok(Decision::LayerPatch {
                number: state.next_layer(),
                commit: head.to_owned(),
                payload,
            })
        } else {
            Ok(Decision::LatestPatch {
                commit: head.to_owned(),
                payload,
            })
        }
    }
}
