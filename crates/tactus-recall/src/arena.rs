//! Generational arena backing every graph object.
//!
//! Handles carry the slot generation, so a handle to a removed object never
//! resolves to whatever reuses its slot.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Index {
    slot: u32,
    generation: u32,
}

enum Entry<T> {
    Occupied { generation: u32, value: T },
    Free { generation: u32, next_free: Option<u32> },
}

pub(crate) struct Arena<T> {
    entries: Vec<Entry<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            free_head: None,
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    pub(crate) fn insert(&mut self, value: T) -> Index {
        self.len += 1;
        match self.free_head {
            Some(slot) => {
                let entry = &mut self.entries[slot as usize];
                let (generation, next_free) = match entry {
                    Entry::Free {
                        generation,
                        next_free,
                    } => (generation.wrapping_add(1), *next_free),
                    Entry::Occupied { .. } => unreachable!("free list points at occupied slot"),
                };
                *entry = Entry::Occupied { generation, value };
                self.free_head = next_free;
                Index { slot, generation }
            }
            None => {
                let slot = self.entries.len() as u32;
                self.entries.push(Entry::Occupied {
                    generation: 0,
                    value,
                });
                Index {
                    slot,
                    generation: 0,
                }
            }
        }
    }

    /// Insert a value that needs to know its own index.
    pub(crate) fn insert_with(&mut self, f: impl FnOnce(Index) -> T) -> Index {
        let next = match self.free_head {
            Some(slot) => match &self.entries[slot as usize] {
                Entry::Free { generation, .. } => Index {
                    slot,
                    generation: generation.wrapping_add(1),
                },
                Entry::Occupied { .. } => unreachable!("free list points at occupied slot"),
            },
            None => Index {
                slot: self.entries.len() as u32,
                generation: 0,
            },
        };
        let index = self.insert(f(next));
        debug_assert_eq!(index, next);
        index
    }

    pub(crate) fn get(&self, index: Index) -> Option<&T> {
        match self.entries.get(index.slot as usize)? {
            Entry::Occupied { generation, value } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn remove(&mut self, index: Index) -> Option<T> {
        let entry = self.entries.get_mut(index.slot as usize)?;
        if !matches!(entry, Entry::Occupied { generation, .. } if *generation == index.generation)
        {
            return None;
        }
        let freed = Entry::Free {
            generation: index.generation,
            next_free: self.free_head,
        };
        match std::mem::replace(entry, freed) {
            Entry::Occupied { value, .. } => {
                self.free_head = Some(index.slot);
                self.len -= 1;
                Some(value)
            }
            Entry::Free { .. } => None,
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| match entry {
                Entry::Occupied { generation, value } => Some((
                    Index {
                        slot: slot as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Entry::Free { .. } => None,
            })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
