//! Interrupt status handling and line routing
//!
//! The controller exposes its event flags through a single status register
//! with write-one-to-clear semantics and routes them to one of two physical
//! interrupt lines. Routing the lines into the system interrupt controller
//! is the integration layer's responsibility; this module only selects which
//! events signal and reads/clears their flags.

use crate::reg::Registers;
use bitfield::bitfield;
use canfd_core::CanId;

/// CAN interrupt lines
///
/// The controller provides two interrupt lines to the system interrupt
/// controller. Which interrupts trigger which interrupt line is configurable
/// via [`InterruptConfiguration`].
#[derive(Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptLine {
    /// Interrupt line 0
    Line0,
    /// Interrupt line 1
    Line1,
}

bitfield! {
    /// A set of CAN interrupts.
    #[derive(Copy, Clone)]
    pub struct InterruptSet(u32);

    /// Access to Reserved Address
    pub ara, set_ara: 29;
    /// Protocol Error in Data phase
    pub ped, set_ped: 28;
    /// Protocol Error in Arbitration phase
    pub pea, set_pea: 27;
    /// Watchdog
    pub wdi, set_wdi: 26;
    /// Bus Off
    pub bo, set_bo: 25;
    /// Warning status changed
    pub ew, set_ew: 24;
    /// Error Passive
    pub ep, set_ep: 23;
    /// Error Logging Overflow
    pub elo, set_elo: 22;
    /// Bit Error Uncorrected
    pub beu, set_beu: 21;
    /// Bit Error Corrected
    pub bec, set_bec: 20;
    /// Message stored to Dedicated Rx Buffer
    pub drx, set_drx: 19;
    /// Timeout Occurred
    pub too, set_too: 18;
    /// Message RAM Access Failure
    pub mraf, set_mraf: 17;
    /// Timestamp Wraparound
    pub tsw, set_tsw: 16;
    /// Tx Event Fifo Element Lost
    pub tefl, set_tefl: 15;
    /// Tx Event Fifo Full
    pub teff, set_teff: 14;
    /// Tx Event Fifo Watermark Reached
    pub tefw, set_tefw: 13;
    /// Tx Event Fifo New Entry
    pub tefn, set_tefn: 12;
    /// Tx Fifo Empty
    pub tfe, set_tfe: 11;
    /// Transmission Cancellation Finished
    ///
    /// Note that there is a sub-interrupt for each transmit buffer element
    /// that is disabled by default. These sub-interrupts are enabled through
    /// [`Tx::enable_cancellation_interrupt`].
    ///
    /// [`Tx::enable_cancellation_interrupt`]:
    ///     crate::tx_buffers::Tx::enable_cancellation_interrupt
    pub tcf, set_tcf: 10;
    /// Transmission Completed
    ///
    /// Note that there is a sub-interrupt for each transmit buffer element
    /// that is disabled by default. These sub-interrupts are enabled through
    /// [`Tx::enable_transmission_completed_interrupt`].
    ///
    /// [`Tx::enable_transmission_completed_interrupt`]:
    ///     crate::tx_buffers::Tx::enable_transmission_completed_interrupt
    pub tc, set_tc: 9;
    /// High Priority Message
    pub hpm, set_hpm: 8;
    /// Rx Fifo1 Message Lost
    pub rf1l, set_rf1l: 7;
    /// Rx Fifo1 Full
    pub rf1f, set_rf1f: 6;
    /// Rx Fifo1 Watermark Reached
    pub rf1w, set_rf1w: 5;
    /// Rx Fifo1 New Message
    pub rf1n, set_rf1n: 4;
    /// Rx Fifo0 Message Lost
    pub rf0l, set_rf0l: 3;
    /// Rx Fifo0 Full
    pub rf0f, set_rf0f: 2;
    /// Rx Fifo0 Watermark Reached
    pub rf0w, set_rf0w: 1;
    /// Rx Fifo0 New Message
    pub rf0n, set_rf0n: 0;
}

impl From<u32> for InterruptSet {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl From<InterruptSet> for u32 {
    fn from(set: InterruptSet) -> u32 {
        set.0
    }
}

impl FromIterator<Interrupt> for InterruptSet {
    fn from_iter<T: IntoIterator<Item = Interrupt>>(iter: T) -> Self {
        let mut set = 0_u32;
        for int in iter.into_iter() {
            set |= u32::from(int);
        }
        InterruptSet(set)
    }
}

impl core::fmt::Debug for InterruptSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "InterruptSet {{ ")?;
        for interrupt in self.iter() {
            write!(f, "{interrupt:?} ")?;
        }
        write!(f, "}}")
    }
}

/// A single interrupt.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Interrupt {
    /// RF0N
    RxFifo0NewMessage = 0,
    /// RF0W
    RxFifo0WatermarkReached = 1,
    /// RF0F
    RxFifo0Full = 2,
    /// RF0L
    RxFifo0MessageLost = 3,
    /// RF1N
    RxFifo1NewMessage = 4,
    /// RF1W
    RxFifo1WatermarkReached = 5,
    /// RF1F
    RxFifo1Full = 6,
    /// RF1L
    RxFifo1MessageLost = 7,
    /// HPM
    HighPriorityMessage = 8,
    /// TC
    TransmissionCompleted = 9,
    /// TCF
    TransmissionCancellationFinished = 10,
    /// TFE
    TxFifoEmpty = 11,
    /// TEFN
    TxEventFifoNewEntry = 12,
    /// TEFW
    TxEventFifoWatermarkReached = 13,
    /// TEFF
    TxEventFifoFull = 14,
    /// TEFL
    TxEventFifoElementLost = 15,
    /// TSW
    TimestampWraparound = 16,
    /// MRAF
    MessageRamAccessFailure = 17,
    /// TOO
    TimeoutOccurred = 18,
    /// DRX
    MessageStoredToDedicatedRxBuffer = 19,
    /// BEC
    BitErrorCorrected = 20,
    /// BEU
    BitErrorUncorrected = 21,
    /// ELO
    ErrorLoggingOverflow = 22,
    /// EP
    ErrorPassive = 23,
    /// EW
    WarningStatusChanged = 24,
    /// BO
    BusOff = 25,
    /// WDI
    Watchdog = 26,
    /// PEA
    ProtocolErrorArbitration = 27,
    /// PED
    ProtocolErrorData = 28,
    /// ARA
    AccessToReservedAddress = 29,
}

/// Coarse classification of an [`Interrupt`]
///
/// Dispatchers that only want to know which engine to poke can branch on
/// this instead of the individual flag.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventClass {
    /// A frame arrived or reception state changed
    Receive,
    /// A transmission finished, was cancelled, or the TX queues drained
    Transmit,
    /// A bus or memory error condition
    Error,
    /// Counter and timeout housekeeping
    Status,
}

impl Interrupt {
    /// The coarse class this interrupt belongs to
    pub fn class(self) -> EventClass {
        use Interrupt::*;
        match self {
            RxFifo0NewMessage | RxFifo0WatermarkReached | RxFifo0Full | RxFifo0MessageLost
            | RxFifo1NewMessage | RxFifo1WatermarkReached | RxFifo1Full | RxFifo1MessageLost
            | HighPriorityMessage | MessageStoredToDedicatedRxBuffer => EventClass::Receive,
            TransmissionCompleted | TransmissionCancellationFinished | TxFifoEmpty
            | TxEventFifoNewEntry | TxEventFifoWatermarkReached | TxEventFifoFull
            | TxEventFifoElementLost => EventClass::Transmit,
            BitErrorCorrected | BitErrorUncorrected | ErrorLoggingOverflow | ErrorPassive
            | WarningStatusChanged | BusOff | Watchdog | ProtocolErrorArbitration
            | ProtocolErrorData | MessageRamAccessFailure | AccessToReservedAddress => {
                EventClass::Error
            }
            TimestampWraparound | TimeoutOccurred => EventClass::Status,
        }
    }
}

impl From<Interrupt> for u32 {
    fn from(x: Interrupt) -> Self {
        1 << x as u32
    }
}

/// Value does not denote an interrupt flag
pub struct InvalidInterruptNumber;

impl TryFrom<u8> for Interrupt {
    type Error = InvalidInterruptNumber;

    fn try_from(value: u8) -> Result<Self, InvalidInterruptNumber> {
        use Interrupt::*;
        let ret = match value {
            0 => RxFifo0NewMessage,
            1 => RxFifo0WatermarkReached,
            2 => RxFifo0Full,
            3 => RxFifo0MessageLost,
            4 => RxFifo1NewMessage,
            5 => RxFifo1WatermarkReached,
            6 => RxFifo1Full,
            7 => RxFifo1MessageLost,
            8 => HighPriorityMessage,
            9 => TransmissionCompleted,
            10 => TransmissionCancellationFinished,
            11 => TxFifoEmpty,
            12 => TxEventFifoNewEntry,
            13 => TxEventFifoWatermarkReached,
            14 => TxEventFifoFull,
            15 => TxEventFifoElementLost,
            16 => TimestampWraparound,
            17 => MessageRamAccessFailure,
            18 => TimeoutOccurred,
            19 => MessageStoredToDedicatedRxBuffer,
            20 => BitErrorCorrected,
            21 => BitErrorUncorrected,
            22 => ErrorLoggingOverflow,
            23 => ErrorPassive,
            24 => WarningStatusChanged,
            25 => BusOff,
            26 => Watchdog,
            27 => ProtocolErrorArbitration,
            28 => ProtocolErrorData,
            29 => AccessToReservedAddress,
            30.. => Err(InvalidInterruptNumber)?,
        };
        Ok(ret)
    }
}

impl InterruptSet {
    /// An iterator visiting all elements in arbitrary order.
    pub fn iter(&self) -> Iter {
        Iter {
            flags: *self,
            index: 0,
        }
    }
}

/// An iterator over the items of an [`InterruptSet`].
///
/// This `struct` is created by [`InterruptSet::iter`].
pub struct Iter {
    flags: InterruptSet,
    index: u8,
}

impl Iterator for Iter {
    type Item = Interrupt;

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.index;
        self.index = self.index.saturating_add(1);
        // Since there are no gaps in the interrupt flags, this will be `Some`
        // until all interrupts have been checked.
        let int = i.try_into().ok()?;
        if self.flags.0 & (1 << i) != 0 {
            Some(int)
        } else {
            self.next()
        }
    }
}

/// Has exclusive access to a set of interrupts for CAN controller `Id`.
/// Permits safe access to the owned interrupt flags.
pub struct OwnedInterruptSet<Id> {
    interrupts: InterruptSet,
    regs: Registers<Id>,
}

/// An input [`InterruptSet`] contained interrupts that were not available.
/// The set wrapped in the error indicates which elements caused the problem.
#[derive(Debug)]
pub struct MaskError(pub InterruptSet);

impl<Id: CanId> OwnedInterruptSet<Id> {
    /// Assumes exclusive ownership of `interrupts`.
    ///
    /// # Safety
    /// Each interrupt of a CAN controller can only be contained in one
    /// `OwnedInterruptSet`, otherwise registers will be mutably aliased.
    ///
    /// The reserved bits must not be included.
    unsafe fn new(interrupts: InterruptSet, regs: Registers<Id>) -> Self {
        Self { interrupts, regs }
    }

    /// Moves ownership of the interrupts described by `subset` from `self` to
    /// the return value. If `self` does not contain `subset`, an error is
    /// returned.
    fn split(&mut self, subset: InterruptSet) -> Result<Self, MaskError> {
        let missing = !self.interrupts.0 & subset.0;
        if missing != 0 {
            Err(MaskError(InterruptSet(missing)))
        } else {
            self.interrupts.0 &= !subset.0;
            // Safety: No aliasing is introduced since `subset` is moved from
            // `self`.
            unsafe { Ok(Self::new(subset, self.regs)) }
        }
    }

    /// Assume ownership of the interrupts in `other`.
    fn join(&mut self, other: Self) {
        // The sets should be disjoint as long as the constructor is used
        // safely.
        debug_assert!(self.interrupts.0 & other.interrupts.0 == 0);
        // No assurance is provided at this level that the sets are assigned
        // to the same interrupt line.
        self.interrupts.0 |= other.interrupts.0;
    }

    /// Clears the flagged interrupts owned by this `OwnedInterruptSet` and
    /// provides an iterator over the flags that were cleared.
    pub fn iter_flagged(&self) -> Iter {
        let interrupts = self.interrupt_flags();
        self.clear_interrupts(interrupts);
        interrupts.iter()
    }

    /// Get the subset of interrupts in this set that are currently flagged.
    pub fn interrupt_flags(&self) -> InterruptSet {
        // The mask ensures that only flags under our control are returned.
        InterruptSet(self.regs.ir.read().0 & self.interrupts.0)
    }

    /// Clear the indicated `interrupts`. Interrupts not owned by this
    /// `OwnedInterruptSet` are silently ignored.
    pub fn clear_interrupts(&self, interrupts: InterruptSet) {
        // Writing a 0 bit leaves the flag unchanged, so masking the write
        // with the owned interrupts ensures no other bits are affected.
        // Reserved bits will not be written because they will never be owned.
        self.regs
            .ir
            .write(InterruptSet(interrupts.0 & self.interrupts.0));
    }
}

/// Controls enabling and line selection of interrupts.
pub struct InterruptConfiguration<Id> {
    disabled: OwnedInterruptSet<Id>,
}

impl<Id: CanId> InterruptConfiguration<Id> {
    /// # Safety
    /// This type takes ownership of some of the registers from the
    /// controller's register block. Do not use them elsewhere to avoid
    /// aliasing. Do not instantiate more than once.
    /// - ILS
    /// - ILE
    /// - IE
    /// - IR
    pub(crate) unsafe fn new(regs: Registers<Id>) -> Self {
        // Safety: this represents owning all of IR, which is ensured by the
        // safety contract of the constructor. The reserved bits are excluded.
        let disabled = OwnedInterruptSet::new(InterruptSet(0x3fff_ffff), regs);
        // Route everything to line 0 by writing the reset value.
        regs.ils.write(InterruptSet(0));
        regs.ie.write(InterruptSet(0));
        Self { disabled }
    }

    /// Request to enable the set of `interrupts` on the chosen interrupt
    /// line. Fails if some of the requested interrupts are already enabled.
    pub fn enable(
        &mut self,
        interrupts: InterruptSet,
        line: InterruptLine,
    ) -> Result<OwnedInterruptSet<Id>, MaskError> {
        let interrupts = self.disabled.split(interrupts)?;
        self.set_line(&interrupts, line);
        self.set_enabled(&interrupts, true);
        Ok(interrupts)
    }

    /// Disable the set of `interrupts` and move ownership back to the
    /// `InterruptConfiguration`.
    pub fn disable(&mut self, interrupts: OwnedInterruptSet<Id>) {
        self.set_enabled(&interrupts, false);
        self.disabled.join(interrupts);
    }

    /// Set the interrupt line that will trigger for a set of controller
    /// interrupts.
    pub fn set_line(&mut self, interrupts: &OwnedInterruptSet<Id>, line: InterruptLine) {
        self.enable_line(line);
        let mask = interrupts.interrupts.0;
        let regs = self.disabled.regs;
        regs.ils.modify(|r| {
            InterruptSet(match line {
                InterruptLine::Line0 => r.0 & !mask,
                InterruptLine::Line1 => r.0 | mask,
            })
        });
    }

    pub(crate) fn disable_all(&mut self) {
        let regs = self.disabled.regs;
        regs.ie.write(InterruptSet(0));
        regs.ile.modify(|mut ile| {
            ile.set_eint0(false);
            ile.set_eint1(false);
            ile
        });
    }

    fn enable_line(&mut self, line: InterruptLine) {
        let regs = self.disabled.regs;
        regs.ile.modify(|mut ile| {
            match line {
                InterruptLine::Line0 => ile.set_eint0(true),
                InterruptLine::Line1 => ile.set_eint1(true),
            }
            ile
        });
    }

    fn set_enabled(&mut self, interrupts: &OwnedInterruptSet<Id>, enabled: bool) {
        let mask = interrupts.interrupts.0;
        let regs = self.disabled.regs;
        regs.ie.modify(|r| {
            InterruptSet(if enabled { r.0 | mask } else { r.0 & !mask })
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn iter_preserves_length() {
        assert_eq!(InterruptSet(0).iter().count(), 0);
        assert_eq!(InterruptSet(1).iter().count(), 1);
        assert_eq!(InterruptSet(0x1555_5555).iter().count(), 15);
        assert_eq!(InterruptSet(0x2aaa_aaaa).iter().count(), 15);
        assert_eq!(InterruptSet(0x3fff_ffff).iter().count(), 30);
        assert_eq!(InterruptSet(0xffff_ffff).iter().count(), 30);
    }

    fn iter_collect(int: u32) -> u32 {
        InterruptSet::from_iter(InterruptSet(int).iter()).0
    }

    #[test]
    fn iter_collect_preserves_interrupts() {
        assert_eq!(iter_collect(0), 0);
        assert_eq!(iter_collect(1), 1);
        assert_eq!(iter_collect(0x1555_5555), 0x1555_5555);
        assert_eq!(iter_collect(0x2aaa_aaaa), 0x2aaa_aaaa);
    }

    #[test]
    fn iter_collect_drops_reserved_bits() {
        assert_eq!(iter_collect(0xffff_ffff), 0x3fff_ffff);
    }

    #[test]
    fn every_flag_has_a_class() {
        assert_eq!(Interrupt::RxFifo0NewMessage.class(), EventClass::Receive);
        assert_eq!(Interrupt::TransmissionCompleted.class(), EventClass::Transmit);
        assert_eq!(Interrupt::BusOff.class(), EventClass::Error);
        assert_eq!(Interrupt::TimestampWraparound.class(), EventClass::Status);
        // The classification is total over the flag range.
        for i in 0..30u8 {
            let _ = Interrupt::try_from(i).ok().map(Interrupt::class);
        }
    }
}
