/// An opaque, copyable reference to a live subscription.
///
/// A `Handle` is a slot index paired with the slot's generation at insertion
/// time. The packed 64-bit form travels through the kernel queue as the
/// event token; when it comes back, a generation mismatch means the
/// subscription was released in the meantime and the event is dropped
/// instead of dereferencing reused storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// Packs the handle into the kernel token.
    pub(crate) fn token(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Rebuilds a handle from a kernel token.
    pub(crate) fn from_token(token: u64) -> Handle {
        Handle {
            index: token as u32,
            generation: (token >> 32) as u32,
        }
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Generation-checked slot arena for subscription records.
///
/// Slots are reused after removal, but each reuse bumps the slot's
/// generation, so handles minted for the previous occupant stop resolving.
pub(crate) struct Registry<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
}

impl<T> Registry<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Stores a value and returns the handle naming it.
    pub(crate) fn insert(&mut self, value: T) -> Handle {
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index].value = Some(value);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                self.slots.len() - 1
            }
        };

        Handle {
            index: index as u32,
            generation: self.slots[index].generation,
        }
    }

    /// Resolves a handle, or `None` if the slot was released or reused.
    pub(crate) fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Releases a slot, returning its value and retiring the handle.
    pub(crate) fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }

        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index as usize);

        Some(value)
    }

    /// Iterates over the live values.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| slot.value.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_resolve() {
        let mut registry = Registry::new();
        let handle = registry.insert(7);

        assert_eq!(registry.get_mut(handle), Some(&mut 7));
    }

    #[test]
    fn removed_handle_is_stale() {
        let mut registry = Registry::new();
        let handle = registry.insert(7);

        assert_eq!(registry.remove(handle), Some(7));
        assert_eq!(registry.get_mut(handle), None);
        assert_eq!(registry.remove(handle), None);
    }

    #[test]
    fn reused_slot_gets_new_generation() {
        let mut registry = Registry::new();
        let first = registry.insert("a");
        registry.remove(first);

        let second = registry.insert("b");
        assert_eq!(first.index, second.index);
        assert_ne!(first.generation, second.generation);
        assert_eq!(registry.get_mut(first), None);
        assert_eq!(registry.get_mut(second), Some(&mut "b"));
    }

    #[test]
    fn token_round_trip() {
        let mut registry = Registry::new();
        registry.insert(());
        let handle = registry.insert(());

        assert_eq!(Handle::from_token(handle.token()), handle);
    }
}
