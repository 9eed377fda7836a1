//! Fixed-capacity tables mapping caller-assigned IDs to engine handles.

use std::fmt::{Display, Formatter};

use crate::engine::{EventHandle, GroupHandle};
use crate::error::{AmadeusError, Result};

/// Which of the two independent ID namespaces a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPool {
    Channel,
    Event,
}

impl Display for SlotPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Channel => write!(f, "channel"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// Contents of an occupied event slot.
///
/// Each variant is one non-empty state of the event lifecycle; an empty
/// slot is the `Empty` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSlot {
    /// Instantiated, never started.
    Loaded { instance: EventHandle },
    /// Started, but the channel group was never captured.
    Starting { instance: EventHandle },
    /// Audible through `group`.
    Playing {
        instance: EventHandle,
        group: GroupHandle,
    },
}

impl EventSlot {
    pub fn instance(&self) -> EventHandle {
        match *self {
            Self::Loaded { instance }
            | Self::Starting { instance }
            | Self::Playing { instance, .. } => instance,
        }
    }

    /// Bound channel group, only present once playing.
    pub fn group(&self) -> Option<GroupHandle> {
        match *self {
            Self::Playing { group, .. } => Some(group),
            _ => None,
        }
    }

    pub fn phase(&self) -> EventPhase {
        match self {
            Self::Loaded { .. } => EventPhase::Loaded,
            Self::Starting { .. } => EventPhase::Starting,
            Self::Playing { .. } => EventPhase::Playing,
        }
    }
}

/// Lifecycle state of an event slot as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    Empty,
    Loaded,
    Starting,
    Playing,
}

/// Arena of optional slot records indexed by small integer IDs.
#[derive(Debug, Clone)]
pub struct SlotTable<T> {
    pool: SlotPool,
    slots: Vec<Option<T>>,
}

impl<T: Copy> SlotTable<T> {
    /// Create an all-empty table. Capacity never changes afterwards.
    pub fn new(pool: SlotPool, capacity: usize) -> Self {
        Self {
            pool,
            slots: vec![None; capacity],
        }
    }

    pub fn pool(&self) -> SlotPool {
        self.pool
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Fail with `InvalidSlotId` unless `id` addresses a slot.
    pub fn check(&self, id: usize) -> Result<()> {
        if id < self.slots.len() {
            Ok(())
        } else {
            Err(AmadeusError::InvalidSlotId {
                pool: self.pool,
                id,
                capacity: self.slots.len(),
            })
        }
    }

    pub fn get(&self, id: usize) -> Result<Option<T>> {
        self.check(id)?;
        Ok(self.slots[id])
    }

    pub fn set(&mut self, id: usize, value: T) -> Result<()> {
        self.check(id)?;
        self.slots[id] = Some(value);
        Ok(())
    }

    /// Empty the slot, returning what it held.
    pub fn clear(&mut self, id: usize) -> Result<Option<T>> {
        self.check(id)?;
        Ok(self.slots[id].take())
    }

    /// IDs of every occupied slot, in ascending order.
    pub fn occupied(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|_| id))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}
