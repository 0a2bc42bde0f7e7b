//! Frame transmission
//!
//! Each TX buffer index walks `Idle → Pending → Complete | Cancelled`. The
//! pending bit is maintained by the hardware; the driver only ever sets the
//! add-request or cancellation-request bit for an index and reads the
//! outcome flags. Within one index, the element memory must be fully written
//! and the bus must have left any in-progress communication before the
//! request bit is asserted; violating that order can corrupt an in-flight
//! transmission.

use crate::message::tx;
use crate::reg::Registers;
use crate::spin::Deadline;
use canfd_core::CanId;
use vcell::VolatileCell;

/// Transmit queue and dedicated buffers on controller `Id`
pub struct Tx<'a, Id> {
    memory: &'a mut [VolatileCell<u32>],
    element_words: usize,
    regs: Registers<Id>,
    spin_budget: u32,
}

/// Reasons a transmission request was not carried out
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitError {
    /// The buffer still has a transmission pending; nothing was written
    Busy,
    /// The bus did not leave its in-progress communication within the wait
    /// budget; the element was written but no request was asserted
    BusUnavailable,
    /// The request was asserted but did not complete within the wait budget
    ///
    /// Only returned when completion waiting was asked for; the transmission
    /// may still finish later.
    CompletionTimeout,
    /// The buffer index exceeds the planned buffer count
    OutOfBounds,
}

impl<'a, Id: CanId> Tx<'a, Id> {
    /// # Safety
    /// The caller must be the owner of the controller referenced by `Id`.
    /// The constructed type assumes ownership of some of the registers from
    /// the controller's register block. Do not use them elsewhere to avoid
    /// aliasing. Do not keep multiple instances for the same controller.
    /// - TXFQS
    /// - TXBRP
    /// - TXBAR
    /// - TXBCR
    /// - TXBTO
    /// - TXBCF
    /// - TXBTIE
    /// - TXBCIE
    ///
    /// PSR is additionally read (read-only, shared with the aux
    /// abstraction).
    pub(crate) unsafe fn new(
        memory: &'a mut [VolatileCell<u32>],
        element_words: usize,
        regs: Registers<Id>,
        spin_budget: u32,
    ) -> Self {
        Self {
            memory,
            element_words,
            regs,
            spin_budget,
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

    fn add_request(&self, index: usize) {
        // Add requests for buffers not configured in TXBC are ignored by the
        // hardware.
        self.regs.txbar.write(1 << index);
    }

    fn is_buffer_in_use(&self, index: usize) -> bool {
        // BRP is hopefully updated before BAR is cleared, so that this does
        // not produce a false "not in use".
        let add_requests = self.regs.txbar.read();
        let pending = self.regs.txbrp.read();
        (add_requests | pending) & (1 << index) != 0
    }

    /// Waits for the bus to leave receiver/transmitter activity.
    fn wait_for_bus_idle(&self) -> Result<(), TransmitError> {
        let mut deadline = Deadline::new(self.spin_budget);
        while self.regs.psr.read().act() > 1 {
            if deadline.expired() {
                return Err(TransmitError::BusUnavailable);
            }
        }
        Ok(())
    }

    /// Puts a frame in the specified transmit buffer to be sent on the bus.
    ///
    /// Fails fast with [`TransmitError::Busy`] when the buffer already has a
    /// pending request; no memory is touched in that case. The element is
    /// written first, then the call waits (bounded) for the bus to go idle
    /// before asserting the add-request bit. With `wait_for_completion`, the
    /// call additionally spins until the pending bit clears.
    pub fn transmit(
        &mut self,
        index: usize,
        frame: &tx::Frame,
        wait_for_completion: bool,
    ) -> Result<(), TransmitError> {
        let element = self.element(index).ok_or(TransmitError::OutOfBounds)?;
        if self.is_buffer_in_use(index) {
            return Err(TransmitError::Busy);
        }
        frame.0.store(element);
        self.wait_for_bus_idle()?;
        self.add_request(index);
        if wait_for_completion {
            // A whole frame may be on the wire ahead of us; allow several
            // bus-idle budgets before giving up.
            let mut deadline = Deadline::new(self.spin_budget.saturating_mul(8));
            while self.regs.txbrp.read() & (1 << index) != 0 {
                if deadline.expired() {
                    return Err(TransmitError::CompletionTimeout);
                }
            }
        }
        Ok(())
    }

    /// Puts a frame in the queue part of the buffers to be sent on the bus.
    ///
    /// The hardware picks the buffer index; fails with
    /// [`TransmitError::Busy`] when the queue is full.
    pub fn transmit_queued(&mut self, frame: &tx::Frame) -> Result<(), TransmitError> {
        let status = self.regs.txfqs.read();
        if status.tfqf() {
            return Err(TransmitError::Busy);
        }
        self.transmit(status.tfqpi() as usize, frame, false)
    }

    /// Request cancellation of the transmission in `index`.
    ///
    /// Cancellation is asynchronous and best-effort; a transmission that
    /// already started may still finish successfully. Poll
    /// [`Self::is_cancelled`] and [`Self::transmission_occurred`] for the
    /// outcome.
    pub fn cancel(&mut self, index: usize) {
        self.cancel_multi([index].into_iter().collect());
    }

    /// Request cancellation of all transmissions in `to_be_canceled`. See
    /// [`Self::cancel`].
    pub fn cancel_multi(&mut self, to_be_canceled: TxBufferSet) {
        self.regs.txbcr.write(to_be_canceled.0);
    }

    /// `true` if the hardware reports the transmission in `index` as
    /// cancelled. The flag is only cleared when a new transmission is
    /// requested for the buffer.
    ///
    /// A cancellation flag without the corresponding
    /// [`Self::transmission_occurred`] flag means the transmission was
    /// either not started or was aborted due to an error.
    pub fn is_cancelled(&self, index: usize) -> bool {
        self.get_cancellation_flags().0 & (1 << index) != 0
    }

    /// `true` if the transmission in `index` went out on the bus. The flag
    /// is only cleared when a new transmission is requested for the buffer.
    pub fn transmission_occurred(&self, index: usize) -> bool {
        self.get_transmission_completed_flags().0 & (1 << index) != 0
    }

    /// Returns the set of buffers the hardware indicates have been
    /// cancelled.
    pub fn get_cancellation_flags(&self) -> TxBufferSet {
        TxBufferSet(self.regs.txbcf.read())
    }

    /// Returns the set of buffers the hardware indicates have been
    /// successfully transmitted.
    pub fn get_transmission_completed_flags(&self) -> TxBufferSet {
        TxBufferSet(self.regs.txbto.read())
    }

    /// Allow [`Interrupt::TransmissionCancellationFinished`] to be triggered
    /// by `to_be_enabled`. Interrupts for other buffers remain unchanged.
    ///
    /// Note that the controller-level interrupt also needs to be enabled for
    /// interrupts to reach the system interrupt controller.
    ///
    /// [`Interrupt::TransmissionCancellationFinished`]:
    ///     crate::interrupt::Interrupt::TransmissionCancellationFinished
    pub fn enable_cancellation_interrupt(&mut self, to_be_enabled: TxBufferSet) {
        self.regs.txbcie.modify(|r| r | to_be_enabled.0);
    }

    /// Disallow [`Interrupt::TransmissionCancellationFinished`] to be
    /// triggered by `to_be_disabled`. Interrupts for other buffers remain
    /// unchanged.
    ///
    /// [`Interrupt::TransmissionCancellationFinished`]:
    ///     crate::interrupt::Interrupt::TransmissionCancellationFinished
    pub fn disable_cancellation_interrupt(&mut self, to_be_disabled: TxBufferSet) {
        self.regs.txbcie.modify(|r| r & !to_be_disabled.0);
    }

    /// Allow [`Interrupt::TransmissionCompleted`] to be triggered by
    /// `to_be_enabled`. Interrupts for other buffers remain unchanged.
    ///
    /// Note that the controller-level interrupt also needs to be enabled for
    /// interrupts to reach the system interrupt controller.
    ///
    /// [`Interrupt::TransmissionCompleted`]:
    ///     crate::interrupt::Interrupt::TransmissionCompleted
    pub fn enable_transmission_completed_interrupt(&mut self, to_be_enabled: TxBufferSet) {
        self.regs.txbtie.modify(|r| r | to_be_enabled.0);
    }

    /// Disallow [`Interrupt::TransmissionCompleted`] to be triggered by
    /// `to_be_disabled`. Interrupts for other buffers remain unchanged.
    ///
    /// [`Interrupt::TransmissionCompleted`]:
    ///     crate::interrupt::Interrupt::TransmissionCompleted
    pub fn disable_transmission_completed_interrupt(&mut self, to_be_disabled: TxBufferSet) {
        self.regs.txbtie.modify(|r| r & !to_be_disabled.0);
    }
}

/// A set of transmit buffers, which may be dedicated buffers or part of the
/// queue.
#[derive(Copy, Clone)]
pub struct TxBufferSet(pub u32);

impl FromIterator<usize> for TxBufferSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        let mut set = 0_u32;
        for i in iter.into_iter() {
            set |= 1u32 << i;
        }
        TxBufferSet(set)
    }
}

impl TxBufferSet {
    /// Returns the set of all transmit buffers
    pub fn all() -> Self {
        Self(u32::MAX)
    }

    /// An iterator visiting all elements in arbitrary order.
    pub fn iter(&self) -> Iter {
        Iter {
            flags: *self,
            index: 0,
        }
    }
}

/// An iterator over the buffer indexes of the buffers in a [`TxBufferSet`].
///
/// This `struct` is created by [`TxBufferSet::iter`].
pub struct Iter {
    flags: TxBufferSet,
    index: u8,
}

impl Iterator for Iter {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.index;
        self.index = self.index.saturating_add(1);
        if i > 31 {
            None
        } else if self.flags.0 & (1 << i) != 0 {
            Some(i as usize)
        } else {
            self.next()
        }
    }
}
