//! Reception through the two RX FIFOs
//!
//! The hardware maintains a fill level and a get index per FIFO; the driver
//! reads the element at the get index and acknowledges it back, which
//! advances the hardware get pointer. A full FIFO drops frames and raises
//! the message-lost flag; the drop is reported to the caller together with
//! the (still valid) oldest frame rather than silently.

use crate::interrupt::InterruptSet;
use crate::message::rx;
use crate::message::RawFrame;
use crate::reg::{Registers, RxFifoRegs, Rxfa};
use canfd_core::CanId;
use core::marker::PhantomData;
use vcell::VolatileCell;

/// Value of the type-level FIFO selection enum representing FIFO 0.
pub struct Fifo0;
/// Value of the type-level FIFO selection enum representing FIFO 1.
pub struct Fifo1;

/// Receive FIFO `F` on controller `Id`.
pub struct RxFifo<'a, F, Id> {
    memory: &'a mut [VolatileCell<u32>],
    element_words: usize,
    regs: Registers<Id>,
    _markers: PhantomData<F>,
}

/// Outcome of one FIFO read
#[derive(Debug)]
pub enum FifoRead {
    /// The FIFO holds no frames
    Empty,
    /// The oldest frame, acknowledged back to the hardware
    Received(rx::Frame),
    /// The oldest frame, and at least one later frame was dropped because
    /// the FIFO was full
    ///
    /// The frame itself is valid; the variant exists so the caller can count
    /// dropped frames. The hardware's message-lost flag has already been
    /// cleared.
    ReceivedWithLoss(rx::Frame),
}

/// Provides access to the registers controlling the RX FIFO.
pub trait GetRxFifoRegs {
    /// Configuration, status and acknowledge registers of this FIFO
    ///
    /// # Safety
    /// Direct access can break assumptions made by the abstraction.
    unsafe fn registers(&self) -> &RxFifoRegs;
    /// Clears this FIFO's message-lost flag in the interrupt status register
    fn clear_lost_flag(&self);
}

impl<'a, Id: CanId> GetRxFifoRegs for RxFifo<'a, Fifo0, Id> {
    unsafe fn registers(&self) -> &RxFifoRegs {
        &self.regs.rxf0
    }

    fn clear_lost_flag(&self) {
        // Write-one-to-clear; flags owned by others read as written zeros
        // and stay untouched.
        let mut set = InterruptSet(0);
        set.set_rf0l(true);
        self.regs.ir.write(set);
    }
}

impl<'a, Id: CanId> GetRxFifoRegs for RxFifo<'a, Fifo1, Id> {
    unsafe fn registers(&self) -> &RxFifoRegs {
        &self.regs.rxf1
    }

    fn clear_lost_flag(&self) {
        let mut set = InterruptSet(0);
        set.set_rf1l(true);
        self.regs.ir.write(set);
    }
}

impl<'a, F, Id: CanId> RxFifo<'a, F, Id>
where
    Self: GetRxFifoRegs,
{
    /// # Safety
    /// The caller must be the owner of the controller referenced by `Id`.
    /// The constructed type assumes ownership of some of the registers from
    /// the controller's register block. Do not use them elsewhere to avoid
    /// aliasing. Do not keep multiple instances for the same FIFO and
    /// controller.
    /// - RXFC
    /// - RXFS
    /// - RXFA
    ///
    /// The IR flag for this FIFO's message-lost event is additionally
    /// cleared on overflow.
    pub(crate) unsafe fn new(
        memory: &'a mut [VolatileCell<u32>],
        element_words: usize,
        regs: Registers<Id>,
    ) -> Self {
        Self {
            memory,
            element_words,
            regs,
            _markers: PhantomData,
        }
    }

    fn fifo_regs(&self) -> &RxFifoRegs {
        // Safety: The RxFifo owns the registers.
        unsafe { self.registers() }
    }

    /// Returns the number of frames waiting in the queue
    pub fn len(&self) -> usize {
        self.fifo_regs().s.read().ffl() as usize
    }

    /// Returns `true` if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of frames the queue can hold
    pub fn capacity(&self) -> usize {
        self.memory.len() / self.element_words
    }

    fn element(&self, index: usize) -> Option<&[VolatileCell<u32>]> {
        let start = index.checked_mul(self.element_words)?;
        self.memory.get(start..start + self.element_words)
    }

    /// Takes the oldest frame out of the FIFO
    ///
    /// On overflow the dropped-frames condition is cleared and reported
    /// through [`FifoRead::ReceivedWithLoss`].
    pub fn receive(&mut self) -> FifoRead {
        let status = self.fifo_regs().s.read();
        if status.ffl() == 0 {
            return FifoRead::Empty;
        }
        let get_index = status.fgi() as usize;
        let frame = match self.element(get_index) {
            Some(element) => rx::Frame(RawFrame::load(element)),
            // The hardware never reports a get index outside the configured
            // FIFO, and the configuration is frozen while this exists.
            None => return FifoRead::Empty,
        };
        // Mark the frame as read. The written index is valid since it was
        // retrieved from the hardware and the configuration has not changed.
        let mut ack = Rxfa(0);
        ack.set_fai(get_index as u8);
        self.fifo_regs().a.write(ack);

        if status.rfl() {
            self.clear_lost_flag();
            FifoRead::ReceivedWithLoss(frame)
        } else {
            FifoRead::Received(frame)
        }
    }
}
