//! Buffered execution notifications.
//!
//! While a tick executes, an [`ExecutionRecorder`] collects the engine's raw
//! notifications on the tick thread. After the pass it is committed into
//! [`ExecutionCallbacks`], which deduplicates per component slot and replays
//! the result to the caller's collector on flush.

use std::mem;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use engine_component::{AnyValue, Codec, ComponentTypeId, Entity};
use engine_system::{ComponentKey, ExecutionCollector, ExecutionEngine, RegistryId};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Notification {
    Init(ComponentKey),
    Update(ComponentKey),
    Remove(ComponentKey, Vec<u8>),
    Created(Entity),
    Destroyed(Entity),
}

/// Collects the notifications of one tick in the order they happen.
///
/// Removed values are snapshotted immediately, since the engine no longer
/// holds them once the tick is over.
#[derive(Debug)]
pub struct ExecutionRecorder<'a> {
    codec: &'a Codec,
    notifications: Vec<Notification>,
}

impl<'a> ExecutionRecorder<'a> {
    /// Create a recorder that snapshots removed values with `codec`.
    #[must_use]
    pub fn new(codec: &'a Codec) -> Self {
        Self {
            codec,
            notifications: Vec::new(),
        }
    }

    /// Number of notifications recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }
}

impl ExecutionCollector for ExecutionRecorder<'_> {
    fn on_component_init(&mut self, entity: Entity, type_id: ComponentTypeId, _value: &dyn AnyValue) {
        self.notifications
            .push(Notification::Init(ComponentKey::new(entity, type_id)));
    }

    fn on_component_update(&mut self, entity: Entity, type_id: ComponentTypeId, _value: &dyn AnyValue) {
        self.notifications
            .push(Notification::Update(ComponentKey::new(entity, type_id)));
    }

    fn on_component_remove(&mut self, entity: Entity, type_id: ComponentTypeId, value: &dyn AnyValue) {
        match self.codec.serialize_component(type_id, value) {
            Ok(bytes) => self
                .notifications
                .push(Notification::Remove(ComponentKey::new(entity, type_id), bytes)),
            Err(err) => warn!(%entity, component = %type_id, error = %err, "cannot snapshot removed component"),
        }
    }

    fn on_entity_created(&mut self, entity: Entity) {
        self.notifications.push(Notification::Created(entity));
    }

    fn on_entity_destroyed(&mut self, entity: Entity) {
        self.notifications.push(Notification::Destroyed(entity));
    }
}

#[derive(Debug, Default)]
struct Buffered {
    inits: IndexSet<ComponentKey>,
    updates: IndexSet<ComponentKey>,
    removes: IndexMap<ComponentKey, Vec<u8>>,
    created: Vec<Entity>,
    destroyed: Vec<Entity>,
}

impl Buffered {
    fn len(&self) -> usize {
        self.inits.len()
            + self.updates.len()
            + self.removes.len()
            + self.created.len()
            + self.destroyed.len()
    }

    fn apply(&mut self, notification: Notification) {
        match notification {
            Notification::Init(key) => {
                // A later init supersedes whatever happened to the slot before.
                self.updates.shift_remove(&key);
                self.removes.shift_remove(&key);
                self.inits.insert(key);
            }
            Notification::Update(key) => {
                self.updates.insert(key);
            }
            Notification::Remove(key, bytes) => {
                self.removes.insert(key, bytes);
            }
            Notification::Created(entity) => self.created.push(entity),
            Notification::Destroyed(entity) => self.destroyed.push(entity),
        }
    }
}

/// Deduplicated execution notifications awaiting a flush.
#[derive(Debug, Default)]
pub struct ExecutionCallbacks {
    buffered: Mutex<Buffered>,
}

impl ExecutionCallbacks {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one pass's notifications into the buffer.
    pub fn commit(&self, recorder: ExecutionRecorder<'_>) {
        if recorder.is_empty() {
            return;
        }
        let mut buffered = self.buffered.lock();
        for notification in recorder.notifications {
            buffered.apply(notification);
        }
        trace!(buffered = buffered.len(), "committed execution notifications");
    }

    /// Number of buffered notifications after deduplication.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffered.lock().len()
    }

    /// Returns `true` if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything buffered.
    pub fn clear(&self) {
        *self.buffered.lock() = Buffered::default();
    }

    /// Replay everything buffered to `collector`, or discard it if there is
    /// none. Returns the number of notifications delivered.
    ///
    /// Order is init, update, remove, entity created, entity destroyed.
    /// Init and update values are read back from `engine`; if the slot was
    /// emptied since, the value removed in the same pass is used, and
    /// otherwise the notification is skipped.
    pub fn invoke(
        &self,
        collector: Option<&mut dyn ExecutionCollector>,
        engine: &dyn ExecutionEngine,
        registry: RegistryId,
        codec: &Codec,
    ) -> usize {
        let buffered = mem::take(&mut *self.buffered.lock());
        let Some(collector) = collector else {
            trace!(discarded = buffered.len(), "no execution collector, dropping notifications");
            return 0;
        };

        let removed_value = |key: &ComponentKey| -> Option<Box<dyn AnyValue>> {
            let bytes = buffered.removes.get(key)?;
            match codec.deserialize_component(key.type_id, bytes) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(entity = %key.entity, component = %key.type_id, error = %err, "cannot restore removed component");
                    None
                }
            }
        };
        let current_value = |key: &ComponentKey| {
            engine
                .get_component(registry, key.entity, key.type_id)
                .or_else(|| removed_value(key))
        };

        let mut delivered = 0;
        for key in &buffered.inits {
            let Some(value) = current_value(key) else {
                debug!(entity = %key.entity, component = %key.type_id, "initialised component is gone");
                continue;
            };
            collector.on_component_init(key.entity, key.type_id, &*value);
            delivered += 1;
        }
        for key in &buffered.updates {
            let Some(value) = current_value(key) else {
                debug!(entity = %key.entity, component = %key.type_id, "updated component is gone");
                continue;
            };
            collector.on_component_update(key.entity, key.type_id, &*value);
            delivered += 1;
        }
        for key in buffered.removes.keys() {
            let Some(value) = removed_value(key) else {
                continue;
            };
            collector.on_component_remove(key.entity, key.type_id, &*value);
            delivered += 1;
        }
        for &entity in &buffered.created {
            collector.on_entity_created(entity);
            delivered += 1;
        }
        for &entity in &buffered.destroyed {
            collector.on_entity_destroyed(entity);
            delivered += 1;
        }
        delivered
    }
}
