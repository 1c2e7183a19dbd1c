//! Owned snapshots of submitted batches.
//!
//! A caller's [`ExecutionOptions`] borrows its payloads, so it cannot outlive
//! the call that submits it. [`SerializedOptions`] copies every entity ID and
//! type ID and replaces each payload with its MessagePack snapshot; the tick
//! thread later restores the values with [`SerializedOptions::to_native`].
//!
//! This module also owns the conflict rules used when batches of one tick are
//! merged.

use std::collections::HashSet;

use tracing::trace;

use engine_component::{ActionTypeId, AnyValue, Codec, CodecError, ComponentTypeId, Entity};
use engine_system::{ComponentKey, ComponentRef, ExecutionOptions, NativeOptions, NativeSpawn};

/// A component payload snapshot addressed to an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedComponent {
    /// Target slot.
    pub key: ComponentKey,
    /// MessagePack snapshot of the value.
    pub bytes: Vec<u8>,
}

/// An action payload snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedAction {
    /// Action type.
    pub type_id: ActionTypeId,
    /// MessagePack snapshot of the value.
    pub bytes: Vec<u8>,
}

/// An entity to create with snapshots of its initial components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedSpawn {
    /// Caller-chosen identifier for the request.
    pub placeholder: Entity,
    /// Initial components.
    pub components: Vec<(ComponentTypeId, Vec<u8>)>,
}

/// Which rule a batch broke. The duplicate kinds apply both within one batch
/// and between two batches of the same tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The same slot is added twice in one batch.
    DuplicateAdd,
    /// The same slot is updated twice in one batch.
    DuplicateUpdate,
    /// The same slot is removed twice in one batch.
    DuplicateRemove,
    /// A created entity lists the same component twice.
    DuplicateSpawnComponent,
}

/// The first conflict found between or within batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeConflict {
    /// Rule broken.
    pub kind: ConflictKind,
    /// Slot involved; for spawns the entity is the placeholder.
    pub key: ComponentKey,
}

/// A batch whose payloads are owned MessagePack snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializedOptions {
    /// Entities to create.
    pub create_entities: Vec<SerializedSpawn>,
    /// Entities to destroy, without duplicates.
    pub destroy_entities: Vec<Entity>,
    /// Components to attach.
    pub add_components: Vec<SerializedComponent>,
    /// Components whose value is replaced.
    pub update_components: Vec<SerializedComponent>,
    /// Components to detach.
    pub remove_components: Vec<ComponentKey>,
    /// Actions, in submission order.
    pub actions: Vec<SerializedAction>,
}

fn snapshot_component(
    codec: &Codec,
    type_id: ComponentTypeId,
    value: &dyn AnyValue,
) -> Result<Vec<u8>, CodecError> {
    let meta = codec.component_meta(type_id)?;
    let bytes = codec.serialize_component(type_id, value)?;
    if meta.is_tag() {
        trace!(%type_id, encoded = bytes.len(), "snapshotted tag component");
    } else {
        trace!(%type_id, size = meta.size, encoded = bytes.len(), "snapshotted component");
    }
    Ok(bytes)
}

fn snapshot_components(
    codec: &Codec,
    components: &[ComponentRef<'_>],
) -> Result<Vec<SerializedComponent>, CodecError> {
    components
        .iter()
        .map(|component| {
            Ok(SerializedComponent {
                key: component.key(),
                bytes: snapshot_component(codec, component.type_id, component.value)?,
            })
        })
        .collect()
}

impl SerializedOptions {
    /// Snapshot a borrowed batch. Empty categories are fine.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if a type is not registered with `codec` or a
    /// value fails to encode.
    pub fn from_options(options: &ExecutionOptions<'_>, codec: &Codec) -> Result<Self, CodecError> {
        let create_entities = options
            .create_entities
            .iter()
            .map(|spawn| -> Result<SerializedSpawn, CodecError> {
                let components = spawn
                    .components
                    .iter()
                    .map(|initial| {
                        snapshot_component(codec, initial.type_id, initial.value)
                            .map(|bytes| (initial.type_id, bytes))
                    })
                    .collect::<Result<_, _>>()?;
                Ok(SerializedSpawn {
                    placeholder: spawn.placeholder,
                    components,
                })
            })
            .collect::<Result<_, CodecError>>()?;

        let actions = options
            .actions
            .iter()
            .map(|action| -> Result<SerializedAction, CodecError> {
                let size = codec.size_of_action(action.type_id)?;
                let bytes = codec.serialize_action(action.type_id, action.value)?;
                trace!(type_id = %action.type_id, size, encoded = bytes.len(), "snapshotted action");
                Ok(SerializedAction {
                    type_id: action.type_id,
                    bytes,
                })
            })
            .collect::<Result<_, CodecError>>()?;

        let mut destroy_entities = Vec::with_capacity(options.destroy_entities.len());
        for &entity in &options.destroy_entities {
            if !destroy_entities.contains(&entity) {
                destroy_entities.push(entity);
            }
        }

        Ok(Self {
            create_entities,
            destroy_entities,
            add_components: snapshot_components(codec, &options.add_components)?,
            update_components: snapshot_components(codec, &options.update_components)?,
            remove_components: options.remove_components.clone(),
            actions,
        })
    }

    /// Restore every payload into an owned value the engine can borrow from.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if a snapshot cannot be decoded.
    pub fn to_native(&self, codec: &Codec) -> Result<NativeOptions, CodecError> {
        let restore = |components: &[SerializedComponent]| {
            components
                .iter()
                .map(|component| {
                    codec
                        .deserialize_component(component.key.type_id, &component.bytes)
                        .map(|value| (component.key, value))
                })
                .collect::<Result<Vec<_>, _>>()
        };

        let create_entities = self
            .create_entities
            .iter()
            .map(|spawn| -> Result<NativeSpawn, CodecError> {
                let components = spawn
                    .components
                    .iter()
                    .map(|(type_id, bytes)| {
                        codec
                            .deserialize_component(*type_id, bytes)
                            .map(|value| (*type_id, value))
                    })
                    .collect::<Result<_, _>>()?;
                Ok(NativeSpawn {
                    placeholder: spawn.placeholder,
                    components,
                })
            })
            .collect::<Result<_, CodecError>>()?;

        let actions = self
            .actions
            .iter()
            .map(|action| {
                codec
                    .deserialize_action(action.type_id, &action.bytes)
                    .map(|value| (action.type_id, value))
            })
            .collect::<Result<_, _>>()?;

        Ok(NativeOptions {
            create_entities,
            destroy_entities: self.destroy_entities.clone(),
            add_components: restore(&self.add_components)?,
            update_components: restore(&self.update_components)?,
            remove_components: self.remove_components.clone(),
            actions,
        })
    }

    /// Returns `true` if the batch does nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create_entities.is_empty()
            && self.destroy_entities.is_empty()
            && self.add_components.is_empty()
            && self.update_components.is_empty()
            && self.remove_components.is_empty()
            && self.actions.is_empty()
    }

    /// Every slot added, updated or removed by this batch.
    pub fn touched_keys(&self) -> impl Iterator<Item = ComponentKey> + '_ {
        self.add_components
            .iter()
            .map(|component| component.key)
            .chain(self.update_components.iter().map(|component| component.key))
            .chain(self.remove_components.iter().copied())
    }

    fn category_keys(&self) -> [(ConflictKind, Vec<ComponentKey>); 3] {
        [
            (
                ConflictKind::DuplicateAdd,
                self.add_components.iter().map(|c| c.key).collect(),
            ),
            (
                ConflictKind::DuplicateUpdate,
                self.update_components.iter().map(|c| c.key).collect(),
            ),
            (ConflictKind::DuplicateRemove, self.remove_components.clone()),
        ]
    }

    /// Finds a slot that appears twice within one category, or a created
    /// entity that lists a component twice.
    #[must_use]
    pub fn self_conflict(&self) -> Option<MergeConflict> {
        for (kind, keys) in self.category_keys() {
            let mut seen = HashSet::with_capacity(keys.len());
            if let Some(key) = keys.into_iter().find(|key| !seen.insert(*key)) {
                return Some(MergeConflict { kind, key });
            }
        }

        for spawn in &self.create_entities {
            let mut seen = HashSet::with_capacity(spawn.components.len());
            if let Some((type_id, _)) = spawn
                .components
                .iter()
                .find(|(type_id, _)| !seen.insert(*type_id))
            {
                return Some(MergeConflict {
                    kind: ConflictKind::DuplicateSpawnComponent,
                    key: ComponentKey::new(spawn.placeholder, *type_id),
                });
            }
        }

        None
    }

    /// Finds a slot that both batches add, both update or both remove.
    ///
    /// A slot in different categories of the two batches is not a conflict:
    /// the engine applies adds, then updates, then removes.
    #[must_use]
    pub fn conflicts_with(&self, other: &SerializedOptions) -> Option<MergeConflict> {
        self.category_keys()
            .into_iter()
            .zip(other.category_keys())
            .find_map(|((kind, mine), (_, theirs))| {
                let mine: HashSet<ComponentKey> = mine.into_iter().collect();
                theirs
                    .into_iter()
                    .find(|key| mine.contains(key))
                    .map(|key| MergeConflict { kind, key })
            })
    }

    /// Append `other` after this batch. Destroys already present are not
    /// repeated.
    pub fn merge(&mut self, other: SerializedOptions) {
        self.create_entities.extend(other.create_entities);
        for entity in other.destroy_entities {
            if !self.destroy_entities.contains(&entity) {
                self.destroy_entities.push(entity);
            }
        }
        self.add_components.extend(other.add_components);
        self.update_components.extend(other.update_components);
        self.remove_components.extend(other.remove_components);
        self.actions.extend(other.actions);
    }
}
