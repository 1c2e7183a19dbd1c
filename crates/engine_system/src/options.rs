//! One tick's worth of mutations.
//!
//! [`ExecutionOptions`] is the transient form the engine consumes: every
//! payload is a borrowed `&dyn AnyValue`, valid only as long as whatever owns
//! the values. [`NativeOptions`] is such an owner, with typed builder methods
//! for assembling a batch by hand.

use engine_component::{Action, ActionTypeId, AnyValue, Component, ComponentTypeId, Entity};

/// Addresses one component slot: an entity and a component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey {
    /// The entity owning the slot.
    pub entity: Entity,
    /// The component type of the slot.
    pub type_id: ComponentTypeId,
}

impl ComponentKey {
    /// Create a key.
    #[must_use]
    pub const fn new(entity: Entity, type_id: ComponentTypeId) -> Self {
        Self { entity, type_id }
    }

    /// Key for component type `T` on `entity`.
    #[must_use]
    pub fn of<T: Component>(entity: Entity) -> Self {
        Self::new(entity, T::component_type_id())
    }
}

/// A borrowed component value addressed to an entity.
#[derive(Debug, Clone, Copy)]
pub struct ComponentRef<'a> {
    /// Target entity.
    pub entity: Entity,
    /// Component type of `value`.
    pub type_id: ComponentTypeId,
    /// The value to write.
    pub value: &'a dyn AnyValue,
}

impl ComponentRef<'_> {
    /// The slot this value is written to.
    #[must_use]
    pub fn key(&self) -> ComponentKey {
        ComponentKey::new(self.entity, self.type_id)
    }
}

/// A borrowed component value attached to an entity at creation.
#[derive(Debug, Clone, Copy)]
pub struct InitialComponent<'a> {
    /// Component type of `value`.
    pub type_id: ComponentTypeId,
    /// The initial value.
    pub value: &'a dyn AnyValue,
}

/// An entity to create, with its initial components.
#[derive(Debug, Clone, Default)]
pub struct EntitySpawn<'a> {
    /// Caller-chosen identifier for the request; the engine allocates the
    /// real entity.
    pub placeholder: Entity,
    /// Components attached when the entity is created.
    pub components: Vec<InitialComponent<'a>>,
}

/// A borrowed action value.
#[derive(Debug, Clone, Copy)]
pub struct ActionRef<'a> {
    /// Action type of `value`.
    pub type_id: ActionTypeId,
    /// The action payload.
    pub value: &'a dyn AnyValue,
}

/// A batch of mutations and actions for one tick, borrowing its payloads.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions<'a> {
    /// Entities to create.
    pub create_entities: Vec<EntitySpawn<'a>>,
    /// Entities to destroy.
    pub destroy_entities: Vec<Entity>,
    /// Components to attach.
    pub add_components: Vec<ComponentRef<'a>>,
    /// Components whose value is replaced.
    pub update_components: Vec<ComponentRef<'a>>,
    /// Components to detach.
    pub remove_components: Vec<ComponentKey>,
    /// Actions pushed to the systems of this tick.
    pub actions: Vec<ActionRef<'a>>,
}

impl ExecutionOptions<'_> {
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
}

/// An entity to create, owning its initial component values.
#[derive(Debug, Default)]
pub struct NativeSpawn {
    /// Caller-chosen identifier for the request.
    pub placeholder: Entity,
    /// Initial components.
    pub components: Vec<(ComponentTypeId, Box<dyn AnyValue>)>,
}

impl NativeSpawn {
    /// Attach an initial component.
    pub fn with<T: Component>(&mut self, value: T) -> &mut Self {
        self.components
            .push((T::component_type_id(), Box::new(value)));
        self
    }
}

/// A batch of mutations and actions that owns its payloads.
#[derive(Debug, Default)]
pub struct NativeOptions {
    /// Entities to create.
    pub create_entities: Vec<NativeSpawn>,
    /// Entities to destroy.
    pub destroy_entities: Vec<Entity>,
    /// Components to attach.
    pub add_components: Vec<(ComponentKey, Box<dyn AnyValue>)>,
    /// Components whose value is replaced.
    pub update_components: Vec<(ComponentKey, Box<dyn AnyValue>)>,
    /// Components to detach.
    pub remove_components: Vec<ComponentKey>,
    /// Actions pushed to the systems of the tick.
    pub actions: Vec<(ActionTypeId, Box<dyn AnyValue>)>,
}

impl NativeOptions {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue creation of an entity; chain [`NativeSpawn::with`] on the result
    /// to give it initial components.
    pub fn create_entity(&mut self, placeholder: Entity) -> &mut NativeSpawn {
        self.create_entities.push(NativeSpawn {
            placeholder,
            components: Vec::new(),
        });
        let last = self.create_entities.len() - 1;
        &mut self.create_entities[last]
    }

    /// Queue destruction of an entity.
    pub fn destroy_entity(&mut self, entity: Entity) -> &mut Self {
        self.destroy_entities.push(entity);
        self
    }

    /// Queue attaching `value` to `entity`.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> &mut Self {
        self.add_components
            .push((ComponentKey::of::<T>(entity), Box::new(value)));
        self
    }

    /// Queue replacing the value of `entity`'s `T`.
    pub fn update_component<T: Component>(&mut self, entity: Entity, value: T) -> &mut Self {
        self.update_components
            .push((ComponentKey::of::<T>(entity), Box::new(value)));
        self
    }

    /// Queue detaching `entity`'s `T`.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> &mut Self {
        self.remove_components.push(ComponentKey::of::<T>(entity));
        self
    }

    /// Queue an action for the systems of the tick.
    pub fn push_action<A: Action>(&mut self, action: A) -> &mut Self {
        self.actions.push((A::action_type_id(), Box::new(action)));
        self
    }

    /// Lend the batch out in the form the engine consumes.
    #[must_use]
    pub fn as_options(&self) -> ExecutionOptions<'_> {
        ExecutionOptions {
            create_entities: self
                .create_entities
                .iter()
                .map(|spawn| EntitySpawn {
                    placeholder: spawn.placeholder,
                    components: spawn
                        .components
                        .iter()
                        .map(|(type_id, value)| InitialComponent {
                            type_id: *type_id,
                            value: &**value,
                        })
                        .collect(),
                })
                .collect(),
            destroy_entities: self.destroy_entities.clone(),
            add_components: self.add_components.iter().map(component_ref).collect(),
            update_components: self.update_components.iter().map(component_ref).collect(),
            remove_components: self.remove_components.clone(),
            actions: self
                .actions
                .iter()
                .map(|(type_id, value)| ActionRef {
                    type_id: *type_id,
                    value: &**value,
                })
                .collect(),
        }
    }
}

fn component_ref((key, value): &(ComponentKey, Box<dyn AnyValue>)) -> ComponentRef<'_> {
    ComponentRef {
        entity: key.entity,
        type_id: key.type_id,
        value: &**value,
    }
}
