//! Frame acceptance filters
//!
//! Filter elements live in their planned message RAM regions and are matched
//! by the hardware against every incoming frame. An element is written at
//! `region offset + index × element size`; the hardware evaluates elements
//! in index order and applies the first match.

use core::marker::PhantomData;
use embedded_can::{ExtendedId, StandardId};
use vcell::VolatileCell;

/// Acceptance filters for 11-bit IDs
pub type FiltersStandard<'a, Id> = Filters<'a, Id, Filter>;
/// Acceptance filters for 29-bit IDs
pub type FiltersExtended<'a, Id> = Filters<'a, Id, ExtFilter>;

/// The filter index exceeds the planned element count
///
/// Nothing is written to the filter table when this is returned.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IndexOutOfRange;

/// Filter variants that can be stored in a message RAM filter table
pub trait FilterElement: Copy {
    /// Words one element occupies in message RAM
    const WORDS: usize;
    /// Element encoding; the first [`Self::WORDS`] entries are used
    fn encode(self) -> [u32; 2];
}

/// Acceptance filters for incoming frames
pub struct Filters<'a, Id, F> {
    memory: &'a mut [VolatileCell<u32>],
    len: usize,
    _markers: PhantomData<(Id, F)>,
}

impl<'a, Id, F: FilterElement> Filters<'a, Id, F> {
    /// # Safety
    /// All filters are assumed to be disabled initially. This is the case if
    /// the memory is zeroed.
    ///
    /// Notably, `Filters` does not assume ownership over the filter-related
    /// registers, as we need to know we are in initialization mode for their
    /// access to be safe.
    pub(crate) unsafe fn new(memory: &'a mut [VolatileCell<u32>]) -> Self {
        Self {
            memory,
            len: 0,
            _markers: PhantomData,
        }
    }

    /// Number of filter elements the planned region can hold
    pub fn capacity(&self) -> usize {
        self.memory.len() / F::WORDS
    }

    /// Number of filters added through [`Self::push`]
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if no filter was pushed yet
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Overwrites the filter at `index`.
    ///
    /// An out-of-range index leaves the filter table untouched.
    pub fn set(&mut self, index: usize, filter: F) -> Result<(), IndexOutOfRange> {
        if index >= self.capacity() {
            return Err(IndexOutOfRange);
        }
        let words = filter.encode();
        for (cell, word) in self.memory[index * F::WORDS..]
            .iter()
            .zip(words.iter().take(F::WORDS))
        {
            cell.set(*word);
        }
        Ok(())
    }

    /// Appends a `filter` to the back of the list. Returns the assigned index
    /// if successful. Returns back the `filter` if the list is full.
    pub fn push(&mut self, filter: F) -> Result<usize, F> {
        let index = self.len;
        if self.set(index, filter).is_err() {
            return Err(filter);
        }
        self.len += 1;
        Ok(index)
    }
}

/// Frame filter for 11-bit IDs
#[derive(Copy, Clone)]
pub enum Filter {
    /// The filter is skipped
    Disabled,
    /// Range filter from low to high IDs
    Range {
        /// Action to take on a matched element
        action: Action,
        /// Lower filter limit
        low: StandardId,
        /// Upper filter limit
        high: StandardId,
    },
    /// Filter for two IDs
    Dual {
        /// Action to take on a matched element
        action: Action,
        /// Individual filter 1
        id1: StandardId,
        /// Individual filter 2
        id2: StandardId,
    },
    /// Traditional filter/mask CAN filter
    Classic {
        /// Action to take on a matched element
        action: Action,
        /// ID filter
        filter: StandardId,
        /// ID mask
        mask: StandardId,
    },
    /// Store into the dedicated RX buffer at `offset` (ignores filter type)
    StoreBuffer {
        /// 11-bit filter ID
        id: StandardId,
        /// Index of the dedicated RX buffer to store into
        offset: u8,
    },
}

/// Frame filter for 29-bit IDs
#[derive(Copy, Clone)]
pub enum ExtFilter {
    /// The filter is skipped
    Disabled,
    /// Range filter from low to high IDs with the extended ID AND mask
    /// applied
    MaskedRange {
        /// Action to take on a matched element
        action: Action,
        /// Lower filter limit
        low: ExtendedId,
        /// Upper filter limit
        high: ExtendedId,
    },
    /// Filter for two IDs
    Dual {
        /// Action to take on a matched element
        action: Action,
        /// Individual filter 1
        id1: ExtendedId,
        /// Individual filter 2
        id2: ExtendedId,
    },
    /// Traditional filter/mask CAN filter
    Classic {
        /// Action to take on a matched element
        action: Action,
        /// ID filter
        filter: ExtendedId,
        /// ID mask
        mask: ExtendedId,
    },
    /// Range filter from low to high IDs without the extended ID AND mask
    Range {
        /// Action to take on a matched element
        action: Action,
        /// Lower filter limit
        low: ExtendedId,
        /// Upper filter limit
        high: ExtendedId,
    },
    /// Store into the dedicated RX buffer at `offset` (ignores filter type)
    StoreBuffer {
        /// 29-bit filter ID
        id: ExtendedId,
        /// Index of the dedicated RX buffer to store into
        offset: u8,
    },
}

/// Filter element configurations
#[derive(Copy, Clone)]
pub enum Action {
    /// Store in RX FIFO 0 if filter matches
    StoreFifo0,
    /// Store in RX FIFO 1 if filter matches
    StoreFifo1,
    /// Reject ID if filter matches
    Reject,
    /// Set priority if filter matches
    Priority,
    /// Set priority and store in FIFO 0 if filter matches
    PriorityFifo0,
    /// Set priority and store in FIFO 1 if filter matches
    PriorityFifo1,
}

impl From<Action> for u32 {
    fn from(val: Action) -> Self {
        match val {
            Action::StoreFifo0 => 0x1,
            Action::StoreFifo1 => 0x2,
            Action::Reject => 0x3,
            Action::Priority => 0x4,
            Action::PriorityFifo0 => 0x5,
            Action::PriorityFifo1 => 0x6,
        }
    }
}

impl FilterElement for Filter {
    const WORDS: usize = 1;

    fn encode(self) -> [u32; 2] {
        let v = match self {
            Filter::Disabled => 0,
            Filter::Range { action, high, low } => {
                let action: u32 = action.into();
                (high.as_raw() as u32) | ((low.as_raw() as u32) << 16) | (action << 27)
            }
            Filter::Dual { action, id1, id2 } => {
                let action: u32 = action.into();
                (id2.as_raw() as u32) | ((id1.as_raw() as u32) << 16) | (action << 27) | (1 << 30)
            }
            Filter::Classic {
                action,
                filter,
                mask,
            } => {
                let action: u32 = action.into();
                (mask.as_raw() as u32)
                    | ((filter.as_raw() as u32) << 16)
                    | (action << 27)
                    | (2 << 30)
            }
            Filter::StoreBuffer { id, offset } => {
                ((id.as_raw() as u32) << 16) | offset as u32 | (0x7 << 27)
            }
        };
        [v, 0]
    }
}

impl FilterElement for ExtFilter {
    const WORDS: usize = 2;

    fn encode(self) -> [u32; 2] {
        let (v1, v2) = match self {
            ExtFilter::Disabled => (0, 0),
            ExtFilter::MaskedRange { action, high, low } => {
                let action: u32 = action.into();
                (action << 29 | low.as_raw(), high.as_raw())
            }
            ExtFilter::Dual { action, id1, id2 } => {
                let action: u32 = action.into();
                (action << 29 | id1.as_raw(), 1 << 30 | id2.as_raw())
            }
            ExtFilter::Classic {
                action,
                filter,
                mask,
            } => {
                let action: u32 = action.into();
                (action << 29 | filter.as_raw(), 2 << 30 | mask.as_raw())
            }
            ExtFilter::Range { action, high, low } => {
                let action: u32 = action.into();
                (action << 29 | low.as_raw(), 3 << 30 | high.as_raw())
            }
            ExtFilter::StoreBuffer { id, offset } => (0x7 << 29 | id.as_raw(), offset as u32),
        };
        [v1, v2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    enum NoCan {}
    unsafe impl canfd_core::CanId for NoCan {}

    fn memory<const N: usize>() -> [VolatileCell<u32>; N] {
        core::array::from_fn(|_| VolatileCell::new(0))
    }

    #[test]
    fn classic_standard_filter_encoding() {
        let encoded = Filter::Classic {
            action: Action::StoreFifo1,
            filter: StandardId::new(0x123).unwrap(),
            mask: StandardId::new(0x7ff).unwrap(),
        }
        .encode();
        assert_eq!(encoded[0], 0x7ff | (0x123 << 16) | (0x2 << 27) | (2 << 30));
    }

    #[test]
    fn classic_extended_filter_encoding() {
        let encoded = ExtFilter::Classic {
            action: Action::StoreFifo0,
            filter: ExtendedId::new(0x1234_5678).unwrap(),
            mask: ExtendedId::new(0x1fff_ffff).unwrap(),
        }
        .encode();
        assert_eq!(encoded[0], (0x1 << 29) | 0x1234_5678);
        assert_eq!(encoded[1], (2 << 30) | 0x1fff_ffff);
    }

    #[test]
    fn out_of_range_index_is_an_error_and_writes_nothing() {
        let mut mem = memory::<4>();
        let mut filters: FiltersStandard<NoCan> = unsafe { Filters::new(&mut mem) };
        let filter = Filter::Classic {
            action: Action::StoreFifo0,
            filter: StandardId::ZERO,
            mask: StandardId::MAX,
        };
        assert_eq!(filters.set(4, filter), Err(IndexOutOfRange));
        drop(filters);
        assert!(mem.iter().all(|cell| cell.get() == 0));
    }

    #[test]
    fn push_assigns_sequential_indices_until_full() {
        let mut mem = memory::<4>();
        let mut filters: FiltersExtended<NoCan> = unsafe { Filters::new(&mut mem) };
        let filter = ExtFilter::Classic {
            action: Action::StoreFifo0,
            filter: ExtendedId::ZERO,
            mask: ExtendedId::MAX,
        };
        assert_eq!(filters.push(filter).ok(), Some(0));
        assert_eq!(filters.push(filter).ok(), Some(1));
        assert!(filters.push(filter).is_err());
        assert_eq!(filters.len(), 2);
    }

    #[test]
    fn set_writes_at_the_planned_element_offset() {
        let mut mem = memory::<8>();
        let mut filters: FiltersExtended<NoCan> = unsafe { Filters::new(&mut mem) };
        filters
            .set(
                1,
                ExtFilter::Dual {
                    action: Action::StoreFifo1,
                    id1: ExtendedId::new(0xaa).unwrap(),
                    id2: ExtendedId::new(0xbb).unwrap(),
                },
            )
            .unwrap();
        drop(filters);
        assert_eq!(mem[0].get(), 0);
        assert_eq!(mem[1].get(), 0);
        assert_eq!(mem[2].get(), (0x2 << 29) | 0xaa);
        assert_eq!(mem[3].get(), (1 << 30) | 0xbb);
    }
}
