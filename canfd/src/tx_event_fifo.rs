//! Transmission outcome reporting through the TX event FIFO
//!
//! Buffers submitted with event capture enabled deposit a two-word event
//! element here once the transmission finishes or is cancelled. Events are
//! drained oldest-first through the hardware get index and acknowledged
//! back, mirroring the RX FIFO protocol.

use crate::message::TxEvent;
use crate::message::RawFrame;
use crate::reg::{Registers, Txefa};
use canfd_core::CanId;
use vcell::VolatileCell;

/// TX event FIFO on controller `Id`
pub struct TxEventFifo<'a, Id> {
    memory: &'a mut [VolatileCell<u32>],
    regs: Registers<Id>,
}

/// One TX event element is always two words.
const ELEMENT_WORDS: usize = 2;

impl<'a, Id: CanId> TxEventFifo<'a, Id> {
    /// # Safety
    /// The caller must be the owner of the controller referenced by `Id`.
    /// The constructed type assumes ownership of some of the registers from
    /// the controller's register block. Do not use them elsewhere to avoid
    /// aliasing. Do not keep multiple instances for the same controller.
    /// - TXEFS
    /// - TXEFA
    pub(crate) unsafe fn new(memory: &'a mut [VolatileCell<u32>], regs: Registers<Id>) -> Self {
        Self { memory, regs }
    }

    /// Returns the number of events waiting in the queue
    pub fn len(&self) -> usize {
        self.regs.txefs.read().effl() as usize
    }

    /// Returns `true` if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of events the queue can hold
    pub fn capacity(&self) -> usize {
        self.memory.len() / ELEMENT_WORDS
    }

    /// Takes the oldest event out of the queue
    pub fn pop(&mut self) -> Option<TxEvent> {
        let status = self.regs.txefs.read();
        if status.effl() == 0 {
            return None;
        }
        let get_index = status.efgi() as usize;
        let start = get_index.checked_mul(ELEMENT_WORDS)?;
        let element = self.memory.get(start..start + ELEMENT_WORDS)?;
        let event = TxEvent(RawFrame::load(element));
        // Mark the event as read. The written index is valid since it was
        // retrieved from the hardware and the configuration has not changed.
        let mut ack = Txefa(0);
        ack.set_efai(get_index as u8);
        self.regs.txefa.write(ack);
        Some(event)
    }
}
