//! Memory management for the RAM interface between core and controller.
//!
//! The controller owns a fixed 8 KiB message RAM that the driver partitions
//! into typed regions at configuration time. Regions are placed back to back
//! in a fixed order; a region with element count 0 is absent and consumes no
//! space, shifting every region after it down.

use crate::message::DataFieldSize;
use core::mem::MaybeUninit;
use vcell::VolatileCell;

/// Message RAM capacity in bytes
pub const MESSAGE_RAM_SIZE: usize = 8192;

pub(crate) const MESSAGE_RAM_WORDS: usize = MESSAGE_RAM_SIZE / 4;

const STANDARD_FILTER_BYTES: usize = 4;
const EXTENDED_FILTER_BYTES: usize = 8;
const TX_EVENT_BYTES: usize = 8;

/// Largest number of standard ID filter elements
pub const MAX_STANDARD_FILTERS: u8 = 128;
/// Largest number of extended ID filter elements
pub const MAX_EXTENDED_FILTERS: u8 = 64;
/// Largest number of TX buffers
pub const MAX_TX_BUFFERS: u8 = 32;
/// Largest number of dedicated RX buffers
pub const MAX_RX_BUFFERS: u8 = 64;
/// Largest number of elements in one RX FIFO
pub const MAX_RX_FIFO_ELEMENTS: u8 = 64;
/// Largest number of TX event FIFO elements
pub const MAX_TX_EVENT_FIFO_ELEMENTS: u8 = 32;

/// Requested number of elements per message RAM region
///
/// Any count may be 0; the corresponding region is then absent and its
/// abstraction is inert.
#[derive(Copy, Clone, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ElementCounts {
    /// Standard ID filter elements, at most [`MAX_STANDARD_FILTERS`]
    pub standard_filters: u8,
    /// Extended ID filter elements, at most [`MAX_EXTENDED_FILTERS`]
    pub extended_filters: u8,
    /// TX buffers, at most [`MAX_TX_BUFFERS`]
    pub tx_buffers: u8,
    /// Dedicated RX buffers, at most [`MAX_RX_BUFFERS`]
    pub rx_buffers: u8,
    /// RX FIFO 0 elements, at most [`MAX_RX_FIFO_ELEMENTS`]
    pub rx_fifo_0: u8,
    /// RX FIFO 1 elements, at most [`MAX_RX_FIFO_ELEMENTS`]
    pub rx_fifo_1: u8,
    /// TX event FIFO elements, at most [`MAX_TX_EVENT_FIFO_ELEMENTS`]
    pub tx_event_fifo: u8,
}

/// Message RAM region kinds, in placement order
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegionKind {
    /// Standard ID filter list
    StandardFilter,
    /// Extended ID filter list
    ExtendedFilter,
    /// TX buffers
    TxBuffer,
    /// Dedicated RX buffers
    RxBuffer,
    /// RX FIFO 0
    RxFifo0,
    /// RX FIFO 1
    RxFifo1,
    /// TX event FIFO
    TxEventFifo,
}

/// One planned message RAM region
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Region {
    /// Byte offset from the start of the message RAM
    pub offset: usize,
    /// Number of elements
    pub count: usize,
    /// Size of one element in bytes
    pub element_size: usize,
}

impl Region {
    /// Word offset from the start of the message RAM
    pub(crate) fn word_offset(&self) -> usize {
        self.offset / 4
    }

    /// Size of one element in words
    pub(crate) fn element_words(&self) -> usize {
        self.element_size / 4
    }

    /// Total region size in words
    pub(crate) fn words(&self) -> usize {
        self.count * self.element_words()
    }

    fn end(&self) -> usize {
        self.offset + self.count * self.element_size
    }
}

/// Misconfigurations of [`ElementCounts`]
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayoutError {
    /// A region was requested with more elements than the hardware indexes
    TooManyElements {
        /// Offending region
        region: RegionKind,
        /// Requested element count
        count: u8,
        /// Largest supported element count
        max: u8,
    },
    /// The regions together do not fit in the message RAM
    CapacityExceeded {
        /// Bytes the requested layout would need
        required: usize,
        /// Bytes available
        capacity: usize,
    },
}

/// Byte offsets of all message RAM regions
///
/// Regions are contiguous, non-overlapping and laid out in the declaration
/// order of the fields. `None` means the region was requested with count 0
/// and occupies no space.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageRamLayout {
    /// Standard ID filter list
    pub standard_filters: Option<Region>,
    /// Extended ID filter list
    pub extended_filters: Option<Region>,
    /// TX buffers
    pub tx_buffers: Option<Region>,
    /// Dedicated RX buffers
    pub rx_buffers: Option<Region>,
    /// RX FIFO 0
    pub rx_fifo_0: Option<Region>,
    /// RX FIFO 1
    pub rx_fifo_1: Option<Region>,
    /// TX event FIFO
    pub tx_event_fifo: Option<Region>,
    /// Total bytes consumed
    pub total: usize,
}

impl MessageRamLayout {
    /// Assigns offsets to all requested regions
    ///
    /// Frame-carrying elements (buffers and RX FIFOs) are sized for
    /// `data_field_size`; filter and event elements have fixed sizes.
    pub fn plan(
        counts: &ElementCounts,
        data_field_size: DataFieldSize,
    ) -> Result<Self, LayoutError> {
        let frame_bytes = data_field_size.element_bytes();
        let plan = [
            (RegionKind::StandardFilter, counts.standard_filters, MAX_STANDARD_FILTERS, STANDARD_FILTER_BYTES),
            (RegionKind::ExtendedFilter, counts.extended_filters, MAX_EXTENDED_FILTERS, EXTENDED_FILTER_BYTES),
            (RegionKind::TxBuffer, counts.tx_buffers, MAX_TX_BUFFERS, frame_bytes),
            (RegionKind::RxBuffer, counts.rx_buffers, MAX_RX_BUFFERS, frame_bytes),
            (RegionKind::RxFifo0, counts.rx_fifo_0, MAX_RX_FIFO_ELEMENTS, frame_bytes),
            (RegionKind::RxFifo1, counts.rx_fifo_1, MAX_RX_FIFO_ELEMENTS, frame_bytes),
            (RegionKind::TxEventFifo, counts.tx_event_fifo, MAX_TX_EVENT_FIFO_ELEMENTS, TX_EVENT_BYTES),
        ];

        let mut layout = Self::default();
        let mut offset = 0;
        for (kind, count, max, element_size) in plan {
            if count > max {
                return Err(LayoutError::TooManyElements {
                    region: kind,
                    count,
                    max,
                });
            }
            if count == 0 {
                continue;
            }
            let region = Region {
                offset,
                count: count.into(),
                element_size,
            };
            offset = region.end();
            *match kind {
                RegionKind::StandardFilter => &mut layout.standard_filters,
                RegionKind::ExtendedFilter => &mut layout.extended_filters,
                RegionKind::TxBuffer => &mut layout.tx_buffers,
                RegionKind::RxBuffer => &mut layout.rx_buffers,
                RegionKind::RxFifo0 => &mut layout.rx_fifo_0,
                RegionKind::RxFifo1 => &mut layout.rx_fifo_1,
                RegionKind::TxEventFifo => &mut layout.tx_event_fifo,
            } = Some(region);
        }

        layout.total = offset;
        if layout.total > MESSAGE_RAM_SIZE {
            return Err(LayoutError::CapacityExceeded {
                required: layout.total,
                capacity: MESSAGE_RAM_SIZE,
            });
        }
        Ok(layout)
    }
}

/// Memory shared between the controller and the core
///
/// The driver partitions it according to a [`MessageRamLayout`] when the bus
/// is opened. It must be placed at the controller's dedicated message RAM
/// address; construction of the bus abstraction checks this.
pub struct SharedMemory(MaybeUninit<[VolatileCell<u32>; MESSAGE_RAM_WORDS]>);

impl SharedMemory {
    /// All initialization is handled by the type that uses the memory, so
    /// this type can safely be assigned to a link_section that is not
    /// initialized by the system to control its position in memory.
    pub const fn new() -> Self {
        Self(MaybeUninit::uninit())
    }

    pub(crate) fn init(&mut self) -> &mut [VolatileCell<u32>; MESSAGE_RAM_WORDS] {
        self.0 = MaybeUninit::zeroed();
        // Safety: All bits 0 is a valid value for an array of word cells.
        unsafe { self.0.assume_init_mut() }
    }
}

impl Default for SharedMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts() -> ElementCounts {
        ElementCounts {
            standard_filters: 8,
            extended_filters: 4,
            tx_buffers: 4,
            rx_buffers: 8,
            rx_fifo_0: 16,
            rx_fifo_1: 2,
            tx_event_fifo: 4,
        }
    }

    #[test]
    fn regions_are_contiguous_and_ordered() {
        let layout = MessageRamLayout::plan(&counts(), DataFieldSize::B64).unwrap();
        let regions = [
            layout.standard_filters.unwrap(),
            layout.extended_filters.unwrap(),
            layout.tx_buffers.unwrap(),
            layout.rx_buffers.unwrap(),
            layout.rx_fifo_0.unwrap(),
            layout.rx_fifo_1.unwrap(),
            layout.tx_event_fifo.unwrap(),
        ];
        assert_eq!(regions[0].offset, 0);
        for pair in regions.windows(2) {
            assert_eq!(pair[0].end(), pair[1].offset);
        }
        assert_eq!(layout.total, regions[6].end());
        assert!(layout.total <= MESSAGE_RAM_SIZE);
    }

    #[test]
    fn element_sizes_follow_the_region_kind() {
        let layout = MessageRamLayout::plan(&counts(), DataFieldSize::B16).unwrap();
        assert_eq!(layout.standard_filters.unwrap().element_size, 4);
        assert_eq!(layout.extended_filters.unwrap().element_size, 8);
        assert_eq!(layout.tx_buffers.unwrap().element_size, 8 + 16);
        assert_eq!(layout.rx_fifo_0.unwrap().element_size, 8 + 16);
        assert_eq!(layout.tx_event_fifo.unwrap().element_size, 8);
    }

    #[test]
    fn empty_regions_are_absent_and_later_regions_shift_down() {
        let mut c = counts();
        c.extended_filters = 0;
        c.tx_buffers = 0;
        let layout = MessageRamLayout::plan(&c, DataFieldSize::B64).unwrap();
        assert!(layout.extended_filters.is_none());
        assert!(layout.tx_buffers.is_none());
        // RX buffers start right after the standard filters
        assert_eq!(
            layout.rx_buffers.unwrap().offset,
            layout.standard_filters.unwrap().end()
        );
    }

    #[test]
    fn count_above_the_hardware_limit_is_rejected() {
        let mut c = counts();
        c.tx_buffers = MAX_TX_BUFFERS + 1;
        assert_eq!(
            MessageRamLayout::plan(&c, DataFieldSize::B64),
            Err(LayoutError::TooManyElements {
                region: RegionKind::TxBuffer,
                count: MAX_TX_BUFFERS + 1,
                max: MAX_TX_BUFFERS,
            })
        );
    }

    #[test]
    fn oversubscribed_ram_is_rejected_at_planning_time() {
        let c = ElementCounts {
            standard_filters: MAX_STANDARD_FILTERS,
            extended_filters: MAX_EXTENDED_FILTERS,
            tx_buffers: MAX_TX_BUFFERS,
            rx_buffers: MAX_RX_BUFFERS,
            rx_fifo_0: MAX_RX_FIFO_ELEMENTS,
            rx_fifo_1: MAX_RX_FIFO_ELEMENTS,
            tx_event_fifo: MAX_TX_EVENT_FIFO_ELEMENTS,
        };
        match MessageRamLayout::plan(&c, DataFieldSize::B64) {
            Err(LayoutError::CapacityExceeded { required, capacity }) => {
                assert!(required > capacity);
                assert_eq!(capacity, MESSAGE_RAM_SIZE);
            }
            other => panic!("expected capacity error, got {other:?}"),
        }
    }

    #[test]
    fn everything_fits_with_a_small_data_field() {
        let c = ElementCounts {
            standard_filters: MAX_STANDARD_FILTERS,
            extended_filters: MAX_EXTENDED_FILTERS,
            tx_buffers: MAX_TX_BUFFERS,
            rx_buffers: MAX_RX_BUFFERS,
            rx_fifo_0: MAX_RX_FIFO_ELEMENTS,
            rx_fifo_1: MAX_RX_FIFO_ELEMENTS,
            tx_event_fifo: MAX_TX_EVENT_FIFO_ELEMENTS,
        };
        let layout = MessageRamLayout::plan(&c, DataFieldSize::B8).unwrap();
        // 128*4 + 64*8 + (32+64+64+64)*16 + 32*8 = 4864
        assert_eq!(layout.total, 4864);
    }
}
