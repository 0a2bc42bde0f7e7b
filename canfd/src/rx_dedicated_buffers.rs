//! Reception into dedicated buffers
//!
//! Filters with a store-buffer action deposit frames into fixed buffer
//! slots. Arrival is flagged in a 64-bit new-data bitmap split over two
//! registers; reading a frame hands the slot back to the hardware by
//! clearing exactly its bit (write-one-to-clear).

use crate::message::rx;
use crate::message::RawFrame;
use crate::reg::Registers;
use canfd_core::CanId;
use embedded_can::Id as CanIdKind;
use vcell::VolatileCell;

/// Dedicated receive buffers on controller `Id`
pub struct RxDedicatedBuffer<'a, Id> {
    memory: &'a mut [VolatileCell<u32>],
    element_words: usize,
    regs: Registers<Id>,
}

impl<'a, Id: CanId> RxDedicatedBuffer<'a, Id> {
    /// # Safety
    /// The caller must be the owner of the controller referenced by `Id`.
    /// The constructed type assumes ownership of some of the registers from
    /// the controller's register block. Do not use them elsewhere to avoid
    /// aliasing. Do not keep multiple instances for the same controller.
    /// - NDAT1
    /// - NDAT2
    pub(crate) unsafe fn new(
        memory: &'a mut [VolatileCell<u32>],
        element_words: usize,
        regs: Registers<Id>,
    ) -> Self {
        Self {
            memory,
            element_words,
            regs,
        }
    }

    /// Number of buffers backed by message RAM
    pub fn capacity(&self) -> usize {
        self.memory.len() / self.element_words
    }

    fn element(&self, index: usize) -> Option<&[VolatileCell<u32>]> {
        let start = index.checked_mul(self.element_words)?;
        self.memory.get(start..start + self.element_words)
    }

    fn has_new_data(&self, index: usize) -> bool {
        if index < 32 {
            self.regs.ndat1.read() & (1 << index) != 0
        } else if index < 64 {
            self.regs.ndat2.read() & (1 << (index - 32)) != 0
        } else {
            false
        }
    }

    /// Returns the slot to the hardware.
    fn mark_buffer_read(&self, index: usize) {
        // Write-one-to-clear; only the indexed bit is affected.
        if index < 32 {
            self.regs.ndat1.write(1 << index);
        } else if index < 64 {
            self.regs.ndat2.write(1 << (index - 32));
        }
    }

    /// Returns a received frame from the selected buffer if available
    ///
    /// `None` if no new data is flagged for `index` (including indexes
    /// beyond the planned buffer count, which can never be flagged).
    pub fn receive(&mut self, index: usize) -> Option<rx::Frame> {
        if !self.has_new_data(index) {
            return None;
        }
        let frame = rx::Frame(RawFrame::load(self.element(index)?));
        self.mark_buffer_read(index);
        Some(frame)
    }

    /// Returns a received frame from any dedicated buffer if available
    ///
    /// When several buffers are flagged, the frame with the lowest CAN ID
    /// wins, mirroring bus arbitration order.
    pub fn receive_any(&mut self) -> Option<rx::Frame> {
        let element_words = self.element_words;
        let frame = self
            .memory
            .chunks_exact(element_words)
            .enumerate()
            .filter(|(i, _)| self.has_new_data(*i))
            .map(|(i, element)| (i, rx::Frame(RawFrame::load(element))))
            .min_by_key(|(_, frame)| id_order(&frame.0))?;
        self.mark_buffer_read(frame.0);
        Some(frame.1)
    }
}

/// Arbitration order of a frame header: standard IDs beat extended IDs with
/// the same leading bits.
fn id_order(raw: &RawFrame) -> u32 {
    match raw.id() {
        CanIdKind::Standard(id) => (id.as_raw() as u32) << 18,
        CanIdKind::Extended(id) => id.as_raw(),
    }
}
