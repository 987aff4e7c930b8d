//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Implemented by the child rows aggregates own (order items, PO lines,
/// contract items) so they can be located by id inside their parent.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Find an owned child entity by id.
pub fn find_by_id<'a, E: Entity>(entities: &'a [E], id: &E::Id) -> Option<&'a E> {
    entities.iter().find(|e| e.id() == id)
}

/// Mutable variant of [`find_by_id`].
pub fn find_by_id_mut<'a, E: Entity>(entities: &'a mut [E], id: &E::Id) -> Option<&'a mut E> {
    entities.iter_mut().find(|e| e.id() == id)
}
