//! Pending and validated batches per tick.
//!
//! Callers append submissions to the pending bucket at any time. Once per
//! pass the tick thread swaps the bucket out, merges it into the validated
//! batch of the current tick and later consumes that batch, which advances
//! the tick counter.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{AsyncError, AsyncErrorKind};
use crate::request::RequestId;
use crate::serialized::SerializedOptions;

#[derive(Debug)]
struct PendingSubmission {
    request_id: RequestId,
    options: SerializedOptions,
}

/// The merged, conflict-free batch of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedOptions {
    /// The merged batch.
    pub options: SerializedOptions,
    /// Requests merged into the batch, in arrival order.
    pub request_ids: Vec<RequestId>,
}

/// Tracks the tick counter and the work scheduled for it.
#[derive(Debug, Default)]
pub struct TickManager {
    tick: AtomicU64,
    pending: Mutex<Vec<PendingSubmission>>,
    validated: Mutex<BTreeMap<u64, ValidatedOptions>>,
}

impl TickManager {
    /// Create a manager at tick 0 with no work.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the tick the next validation targets.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Append a submission to the pending bucket.
    pub fn add_pending(&self, request_id: RequestId, options: SerializedOptions) {
        self.pending.lock().push(PendingSubmission {
            request_id,
            options,
        });
    }

    /// Number of submissions waiting for validation.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Merge everything pending into the validated batch of the current tick.
    ///
    /// Submissions merged before a conflicting one stay in the validated
    /// batch. An empty bucket still leaves an (empty) validated batch behind
    /// so the tick can advance.
    ///
    /// # Errors
    ///
    /// Returns an [`AsyncErrorKind::ExecutionMergeFailure`] naming the
    /// self-conflicting submission, the later of two submissions that add,
    /// update or remove the same slot,
    /// or every request involved when the merged bucket conflicts with the
    /// batch already validated for this tick.
    pub fn validate_pending(&self) -> Result<(), AsyncError> {
        let submissions = std::mem::take(&mut *self.pending.lock());
        let tick = self.current_tick();

        for submission in &submissions {
            if let Some(conflict) = submission.options.self_conflict() {
                warn!(
                    tick,
                    request = %submission.request_id,
                    kind = ?conflict.kind,
                    entity = %conflict.key.entity,
                    component = %conflict.key.type_id,
                    "submission conflicts with itself"
                );
                return Err(AsyncError::single(
                    AsyncErrorKind::ExecutionMergeFailure,
                    submission.request_id,
                ));
            }
        }

        let mut merged = ValidatedOptions::default();
        let mut failure = None;
        for submission in submissions {
            if let Some(conflict) = merged.options.conflicts_with(&submission.options) {
                warn!(
                    tick,
                    request = %submission.request_id,
                    entity = %conflict.key.entity,
                    component = %conflict.key.type_id,
                    "submission conflicts with an earlier one"
                );
                failure = Some(AsyncError::single(
                    AsyncErrorKind::ExecutionMergeFailure,
                    submission.request_id,
                ));
                break;
            }
            merged.options.merge(submission.options);
            merged.request_ids.push(submission.request_id);
        }

        let upserted = self.upsert(tick, merged);
        match failure {
            Some(error) => Err(error),
            None => upserted,
        }
    }

    fn upsert(&self, tick: u64, batch: ValidatedOptions) -> Result<(), AsyncError> {
        let mut validated = self.validated.lock();
        match validated.entry(tick) {
            Entry::Vacant(slot) => {
                debug!(
                    tick,
                    requests = batch.request_ids.len(),
                    slots = batch.options.touched_keys().count(),
                    "validated batch"
                );
                slot.insert(batch);
                Ok(())
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if let Some(conflict) = existing.options.conflicts_with(&batch.options) {
                    warn!(
                        tick,
                        entity = %conflict.key.entity,
                        component = %conflict.key.type_id,
                        "batch conflicts with the one already validated"
                    );
                    return Err(AsyncError::new(
                        AsyncErrorKind::ExecutionMergeFailure,
                        existing
                            .request_ids
                            .iter()
                            .chain(&batch.request_ids)
                            .copied(),
                    ));
                }
                existing.options.merge(batch.options);
                existing.request_ids.extend(batch.request_ids);
                debug!(tick, requests = existing.request_ids.len(), "extended validated batch");
                Ok(())
            }
        }
    }

    /// Take the validated batch of the current tick and advance the tick.
    ///
    /// Returns `None`, leaving the tick unchanged, if nothing was validated.
    pub fn consume_validated(&self) -> Option<ValidatedOptions> {
        let mut validated = self.validated.lock();
        let tick = self.tick.load(Ordering::Acquire);
        let batch = validated.remove(&tick)?;
        self.tick.store(tick + 1, Ordering::Release);
        Some(batch)
    }

    /// A copy of the validated batch for `tick`, if any.
    #[must_use]
    pub fn validated(&self, tick: u64) -> Option<ValidatedOptions> {
        self.validated.lock().get(&tick).cloned()
    }

    /// Drop all pending and validated work. The tick counter is kept.
    pub fn clear(&self) {
        self.pending.lock().clear();
        self.validated.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use engine_component::{Codec, Component, Entity};
    use engine_system::{ComponentKey, NativeOptions};
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Position {
        x: f32,
    }

    impl Component for Position {
        fn type_name() -> &'static str {
            "Position"
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Velocity {
        dx: f32,
    }

    impl Component for Velocity {
        fn type_name() -> &'static str {
            "Velocity"
        }
    }

    fn snapshot(build: impl FnOnce(&mut NativeOptions)) -> SerializedOptions {
        let codec = Codec::new()
            .with_component::<Position>()
            .with_component::<Velocity>();
        let mut batch = NativeOptions::new();
        build(&mut batch);
        SerializedOptions::from_options(&batch.as_options(), &codec).unwrap()
    }

    fn add_position(entity: u64) -> SerializedOptions {
        snapshot(|batch| {
            batch.add_component(Entity(entity), Position { x: 1.0 });
        })
    }

    #[test]
    fn test_empty_validation_still_advances_tick() {
        let ticks = TickManager::new();
        assert_eq!(ticks.current_tick(), 0);
        assert!(ticks.consume_validated().is_none());
        assert_eq!(ticks.current_tick(), 0);

        ticks.validate_pending().unwrap();
        let batch = ticks.consume_validated().unwrap();
        assert!(batch.options.is_empty());
        assert!(batch.request_ids.is_empty());
        assert_eq!(ticks.current_tick(), 1);
    }

    #[test]
    fn test_tick_advances_by_one_per_consumed_batch() {
        let ticks = TickManager::new();
        for expected in 0..5 {
            assert_eq!(ticks.current_tick(), expected);
            ticks.validate_pending().unwrap();
            ticks.consume_validated().unwrap();
        }
        assert_eq!(ticks.current_tick(), 5);
    }

    #[test]
    fn test_disjoint_submissions_merge_into_union() {
        let ticks = TickManager::new();
        let first = add_position(1);
        let second = snapshot(|batch| {
            batch
                .add_component(Entity(2), Position { x: 2.0 })
                .update_component(Entity(1), Velocity { dx: 1.0 });
        });
        ticks.add_pending(RequestId(1), first.clone());
        ticks.add_pending(RequestId(2), second.clone());
        assert_eq!(ticks.pending_len(), 2);

        ticks.validate_pending().unwrap();
        assert_eq!(ticks.pending_len(), 0);

        let mut expected = first;
        expected.merge(second);
        assert_eq!(
            ticks.validated(0),
            Some(ValidatedOptions {
                options: expected,
                request_ids: vec![RequestId(1), RequestId(2)],
            })
        );
    }

    fn assert_merges_into_union(first: SerializedOptions, second: SerializedOptions) {
        let ticks = TickManager::new();
        ticks.add_pending(RequestId(1), first.clone());
        ticks.add_pending(RequestId(2), second.clone());
        ticks.validate_pending().unwrap();

        let mut expected = first;
        expected.merge(second);
        assert_eq!(
            ticks.consume_validated(),
            Some(ValidatedOptions {
                options: expected,
                request_ids: vec![RequestId(1), RequestId(2)],
            })
        );
    }

    fn update_position(entity: u64, x: f32) -> SerializedOptions {
        snapshot(|batch| {
            batch.update_component(Entity(entity), Position { x });
        })
    }

    fn remove_position(entity: u64) -> SerializedOptions {
        snapshot(|batch| {
            batch.remove_component::<Position>(Entity(entity));
        })
    }

    #[test]
    fn test_add_then_update_of_one_slot_merge() {
        assert_merges_into_union(add_position(1), update_position(1, 6.0));
    }

    #[test]
    fn test_update_then_remove_of_one_slot_merge() {
        let update = update_position(1, 6.0);
        let remove = remove_position(1);
        assert_merges_into_union(update.clone(), remove.clone());

        let ticks = TickManager::new();
        ticks.add_pending(RequestId(1), update);
        ticks.add_pending(RequestId(2), remove);
        ticks.validate_pending().unwrap();
        let batch = ticks.consume_validated().unwrap().options;
        assert_eq!(batch.update_components[0].key, ComponentKey::of::<Position>(Entity(1)));
        assert_eq!(batch.remove_components, vec![ComponentKey::of::<Position>(Entity(1))]);
    }

    #[test]
    fn test_add_then_remove_of_one_slot_merge() {
        assert_merges_into_union(add_position(1), remove_position(1));
    }

    #[test]
    fn test_second_pass_merges_other_categories_of_a_validated_slot() {
        let ticks = TickManager::new();
        ticks.add_pending(RequestId(1), update_position(1, 6.0));
        ticks.validate_pending().unwrap();
        ticks.add_pending(RequestId(2), remove_position(1));
        ticks.validate_pending().unwrap();

        let validated = ticks.validated(0).unwrap();
        assert_eq!(validated.request_ids, vec![RequestId(1), RequestId(2)]);
        assert_eq!(validated.options.update_components.len(), 1);
        assert_eq!(validated.options.remove_components.len(), 1);
    }

    #[test]
    fn test_conflicting_updates_and_removes_blame_the_later_submission() {
        for (first, second) in [
            (update_position(1, 1.0), update_position(1, 2.0)),
            (remove_position(1), remove_position(1)),
        ] {
            let ticks = TickManager::new();
            ticks.add_pending(RequestId(1), first);
            ticks.add_pending(RequestId(2), second);
            assert_eq!(
                ticks.validate_pending(),
                Err(AsyncError::single(AsyncErrorKind::ExecutionMergeFailure, RequestId(2)))
            );
        }
    }

    #[test]
    fn test_conflicting_adds_blame_the_later_submission() {
        let ticks = TickManager::new();
        ticks.add_pending(RequestId(1), add_position(1));
        ticks.add_pending(RequestId(2), add_position(1));

        let err = ticks.validate_pending().unwrap_err();
        assert_eq!(
            err,
            AsyncError::single(AsyncErrorKind::ExecutionMergeFailure, RequestId(2))
        );
    }

    #[test]
    fn test_partial_merge_is_kept_after_conflict() {
        let ticks = TickManager::new();
        let first = add_position(1);
        let second = add_position(2);
        ticks.add_pending(RequestId(1), first.clone());
        ticks.add_pending(RequestId(2), second.clone());
        ticks.add_pending(RequestId(3), add_position(1));
        ticks.add_pending(RequestId(4), add_position(3));

        let err = ticks.validate_pending().unwrap_err();
        assert_eq!(err.request_ids, vec![RequestId(3)]);

        // Everything before the conflict stays validated; everything after
        // it is dropped.
        let mut expected = first;
        expected.merge(second);
        let validated = ticks.validated(0).unwrap();
        assert_eq!(validated.options, expected);
        assert_eq!(validated.request_ids, vec![RequestId(1), RequestId(2)]);
        assert!(
            validated
                .options
                .touched_keys()
                .all(|key| key != ComponentKey::of::<Position>(Entity(3)))
        );
    }

    #[test]
    fn test_self_conflict_applies_nothing() {
        let ticks = TickManager::new();
        ticks.add_pending(RequestId(1), add_position(5));
        ticks.add_pending(
            RequestId(2),
            snapshot(|batch| {
                batch
                    .remove_component::<Position>(Entity(1))
                    .remove_component::<Position>(Entity(1));
            }),
        );

        let err = ticks.validate_pending().unwrap_err();
        assert_eq!(err.kind, AsyncErrorKind::ExecutionMergeFailure);
        assert_eq!(err.request_ids, vec![RequestId(2)]);
        assert_eq!(ticks.validated(0), None);
        assert!(ticks.consume_validated().is_none());
        assert_eq!(ticks.current_tick(), 0);
    }

    #[test]
    fn test_second_pass_merges_into_existing_batch() {
        let ticks = TickManager::new();
        ticks.add_pending(RequestId(1), add_position(1));
        ticks.validate_pending().unwrap();
        ticks.add_pending(RequestId(2), add_position(2));
        ticks.validate_pending().unwrap();

        let validated = ticks.validated(0).unwrap();
        assert_eq!(validated.request_ids, vec![RequestId(1), RequestId(2)]);
        assert_eq!(validated.options.add_components.len(), 2);
    }

    #[test]
    fn test_conflict_with_existing_batch_names_every_request() {
        let ticks = TickManager::new();
        ticks.add_pending(RequestId(1), add_position(1));
        ticks.validate_pending().unwrap();
        ticks.add_pending(RequestId(2), add_position(1));

        let err = ticks.validate_pending().unwrap_err();
        assert_eq!(
            err,
            AsyncError::new(
                AsyncErrorKind::ExecutionMergeFailure,
                [RequestId(1), RequestId(2)]
            )
        );
    }

    #[test]
    fn test_destroys_dedup_and_actions_concatenate_across_submissions() {
        let ticks = TickManager::new();
        let destroy = snapshot(|batch| {
            batch.destroy_entity(Entity(9));
        });
        ticks.add_pending(RequestId(1), destroy.clone());
        ticks.add_pending(RequestId(2), destroy);
        ticks.validate_pending().unwrap();

        let batch = ticks.consume_validated().unwrap();
        assert_eq!(batch.options.destroy_entities, vec![Entity(9)]);
    }

    #[test]
    fn test_clear_drops_work_but_keeps_tick() {
        let ticks = TickManager::new();
        ticks.validate_pending().unwrap();
        ticks.consume_validated().unwrap();
        ticks.add_pending(RequestId(1), add_position(1));
        ticks.validate_pending().unwrap();
        ticks.add_pending(RequestId(2), add_position(2));

        ticks.clear();
        assert_eq!(ticks.pending_len(), 0);
        assert_eq!(ticks.validated(1), None);
        assert_eq!(ticks.current_tick(), 1);
    }

    #[test]
    fn test_submissions_race_with_validation() {
        use std::sync::Arc;

        let ticks = Arc::new(TickManager::new());
        let writers: Vec<_> = (0..4u64)
            .map(|thread| {
                let ticks = Arc::clone(&ticks);
                std::thread::spawn(move || {
                    for i in 0..50u64 {
                        let id = thread * 100 + i + 1;
                        ticks.add_pending(RequestId(id), add_position(id));
                    }
                })
            })
            .collect();

        let mut seen = 0;
        for _ in 0..20 {
            ticks.validate_pending().unwrap();
            seen += ticks.consume_validated().unwrap().request_ids.len();
        }
        for writer in writers {
            writer.join().unwrap();
        }
        ticks.validate_pending().unwrap();
        seen += ticks.consume_validated().unwrap().request_ids.len();

        assert_eq!(seen, 200);
        assert_eq!(ticks.current_tick(), 21);
    }
}
