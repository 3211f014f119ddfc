use std::fmt;

/// A generation-checked handle to a stat inside a [`Scope`](crate::stats::Scope).
///
/// Slots are recycled when stats are removed; the generation makes an old
/// handle to a recycled slot fail lookups instead of aliasing the new stat.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl StatId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for StatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for StatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage for the values a scope owns, addressed by [`StatId`].
pub(crate) struct StatArena<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    len: usize,
}

impl<T> StatArena<T> {
    pub fn new() -> Self {
        Self { slots: Vec::new(), free_list: Vec::new(), len: 0 }
    }

    /// Stores a value built from its own handle, reusing a freed slot if there is one.
    pub fn insert_with(&mut self, build: impl FnOnce(StatId) -> T) -> StatId {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            let id = StatId { index, generation: slot.generation };
            slot.value = Some(build(id));
            return id;
        }
        let index = self.slots.len() as u32;
        let id = StatId { index, generation: 0 };
        self.slots.push(Slot { generation: 0, value: Some(build(id)) });
        id
    }

    pub fn remove(&mut self, id: StatId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, id: StatId) -> Option<&T> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, id: StatId) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, id: StatId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (StatId { index: index as u32, generation: slot.generation }, value))
        })
    }

    pub fn ids(&self) -> Vec<StatId> {
        self.iter().map(|(id, _)| id).collect()
    }
}

impl<T> Default for StatArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
