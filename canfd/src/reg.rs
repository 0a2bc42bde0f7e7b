//! Controller register block
//!
//! Hand-written overlay of the CAN-FD controller's memory mapped registers.
//! Field values follow the hardware convention: segment and prescaler fields
//! hold the real value minus one, start-address fields hold word offsets into
//! the dedicated message RAM.

use crate::interrupt::InterruptSet;
use bitfield::bitfield;
use core::marker::PhantomData;
use core::ops::Deref;
use vcell::VolatileCell;

/// Typed volatile register cell
#[repr(transparent)]
pub struct Reg<T>(VolatileCell<u32>, PhantomData<T>);

impl<T> Reg<T>
where
    T: From<u32> + Into<u32>,
{
    /// Reads the register
    #[inline]
    pub fn read(&self) -> T {
        T::from(self.0.get())
    }

    /// Writes the register
    #[inline]
    pub fn write(&self, value: T) {
        self.0.set(value.into())
    }

    /// Read-modify-write
    #[inline]
    pub fn modify<F: FnOnce(T) -> T>(&self, f: F) {
        self.write(f(self.read()))
    }
}

macro_rules! impl_raw {
    ($($reg:ident),+ $(,)?) => {$(
        impl From<u32> for $reg {
            fn from(bits: u32) -> Self {
                Self(bits)
            }
        }
        impl From<$reg> for u32 {
            fn from(reg: $reg) -> u32 {
                reg.0
            }
        }
    )+};
}

bitfield! {
    /// CC control register
    #[derive(Copy, Clone)]
    pub struct Cccr(u32);
    /// Initialization (halt) mode
    pub init, set_init: 0;
    /// Configuration change enable
    pub cce, set_cce: 1;
    /// Restricted operation mode
    pub asm, set_asm: 2;
    /// Clock stop acknowledge
    pub csa, _: 3;
    /// Clock stop request
    pub csr, set_csr: 4;
    /// Bus monitoring mode
    pub mon, set_mon: 5;
    /// Disable automatic retransmission
    pub dar, set_dar: 6;
    /// Test mode enable
    pub test, set_test: 7;
    /// FD operation enable
    pub fdoe, set_fdoe: 8;
    /// Bit rate switch enable
    pub brse, set_brse: 9;
    /// Protocol exception handling disable
    pub pxhd, set_pxhd: 12;
    /// Edge filtering during bus integration
    pub efbi, set_efbi: 13;
    /// Transmit pause
    pub txp, set_txp: 14;
    /// Non-ISO operation
    pub niso, set_niso: 15;
}

bitfield! {
    /// Nominal bit timing and prescaler register
    #[derive(Copy, Clone)]
    pub struct Nbtp(u32);
    /// Nominal time segment after sample point, real value minus one
    pub u8, ntseg2, set_ntseg2: 6, 0;
    /// Nominal time segment before sample point, real value minus one
    pub u8, ntseg1, set_ntseg1: 15, 8;
    /// Nominal bit rate prescaler, real value minus one
    pub u16, nbrp, set_nbrp: 24, 16;
    /// Nominal (re)synchronization jump width, real value minus one
    pub u8, nsjw, set_nsjw: 31, 25;
}

bitfield! {
    /// Data bit timing and prescaler register
    #[derive(Copy, Clone)]
    pub struct Dbtp(u32);
    /// Data (re)synchronization jump width, real value minus one
    pub u8, dsjw, set_dsjw: 3, 0;
    /// Data time segment after sample point, real value minus one
    pub u8, dtseg2, set_dtseg2: 7, 4;
    /// Data time segment before sample point, real value minus one
    pub u8, dtseg1, set_dtseg1: 12, 8;
    /// Data bit rate prescaler, real value minus one
    pub u8, dbrp, set_dbrp: 20, 16;
    /// Transmitter delay compensation enable
    pub tdc, set_tdc: 23;
}

bitfield! {
    /// Transmitter delay compensation register
    #[derive(Copy, Clone)]
    pub struct Tdcr(u32);
    /// Transmitter delay compensation filter window length
    pub u8, tdcf, set_tdcf: 6, 0;
    /// Transmitter delay compensation SSP offset, in CAN clock periods
    pub u8, tdco, set_tdco: 14, 8;
}

bitfield! {
    /// Test register
    #[derive(Copy, Clone)]
    pub struct Test(u32);
    /// Loopback mode
    pub lbck, set_lbck: 4;
}

bitfield! {
    /// Timestamp counter configuration
    #[derive(Copy, Clone)]
    pub struct Tscc(u32);
    /// Timestamp select
    pub u8, tss, set_tss: 1, 0;
    /// Timestamp counter prescaler, real value minus one
    pub u8, tcp, set_tcp: 19, 16;
}

bitfield! {
    /// Timestamp counter value
    #[derive(Copy, Clone)]
    pub struct Tscv(u32);
    /// Timestamp counter
    pub u16, tsc, _: 15, 0;
}

bitfield! {
    /// Error counter register
    #[derive(Copy, Clone)]
    pub struct Ecr(u32);
    /// Transmit error counter
    pub u8, tec, _: 7, 0;
    /// Receive error counter
    pub u8, rec, _: 14, 8;
    /// Receive error passive
    pub rp, _: 15;
    /// CAN error logging
    pub u8, cel, _: 23, 16;
}

bitfield! {
    /// Protocol status register
    #[derive(Copy, Clone)]
    pub struct Psr(u32);
    /// Last error code
    pub u8, lec, _: 2, 0;
    /// Activity: 0 synchronizing, 1 idle, 2 receiver, 3 transmitter
    pub u8, act, _: 4, 3;
    /// Error passive
    pub ep, _: 5;
    /// Warning status
    pub ew, _: 6;
    /// Bus off
    pub bo, _: 7;
    /// Data phase last error code
    pub u8, dlec, _: 10, 8;
    /// ESI flag of last received FD message
    pub resi, _: 11;
    /// BRS flag of last received FD message
    pub rbrs, _: 12;
    /// Received an FD message
    pub rfdf, _: 13;
    /// Protocol exception event
    pub pxe, _: 14;
    /// Transmitter delay compensation value
    pub u8, tdcv, _: 22, 16;
}

bitfield! {
    /// Interrupt line enable
    #[derive(Copy, Clone)]
    pub struct Ile(u32);
    /// Enable interrupt line 0
    pub eint0, set_eint0: 0;
    /// Enable interrupt line 1
    pub eint1, set_eint1: 1;
}

bitfield! {
    /// Global filter configuration
    #[derive(Copy, Clone)]
    pub struct Gfc(u32);
    /// Reject remote frames with extended ID
    pub rrfe, set_rrfe: 0;
    /// Reject remote frames with standard ID
    pub rrfs, set_rrfs: 1;
    /// Accept non-matching frames with extended ID: 0/1 FIFO, else reject
    pub u8, anfe, set_anfe: 3, 2;
    /// Accept non-matching frames with standard ID: 0/1 FIFO, else reject
    pub u8, anfs, set_anfs: 5, 4;
}

bitfield! {
    /// Standard ID filter configuration
    #[derive(Copy, Clone)]
    pub struct Sidfc(u32);
    /// Filter list start address, word offset into message RAM
    pub u16, flssa, set_flssa: 15, 2;
    /// Number of standard ID filter elements
    pub u8, lss, set_lss: 23, 16;
}

bitfield! {
    /// Extended ID filter configuration
    #[derive(Copy, Clone)]
    pub struct Xidfc(u32);
    /// Filter list start address, word offset into message RAM
    pub u16, flesa, set_flesa: 15, 2;
    /// Number of extended ID filter elements
    pub u8, lse, set_lse: 22, 16;
}

bitfield! {
    /// Rx FIFO configuration
    #[derive(Copy, Clone)]
    pub struct Rxfc(u32);
    /// FIFO start address, word offset into message RAM
    pub u16, fsa, set_fsa: 15, 2;
    /// FIFO size in elements
    pub u8, fs, set_fs: 22, 16;
    /// FIFO watermark, 0 disables the watermark interrupt
    pub u8, fwm, set_fwm: 30, 24;
    /// FIFO operation mode, 1 is overwrite
    pub fom, set_fom: 31;
}

bitfield! {
    /// Rx FIFO status
    #[derive(Copy, Clone)]
    pub struct Rxfs(u32);
    /// Fill level
    pub u8, ffl, _: 6, 0;
    /// Get index
    pub u8, fgi, _: 13, 8;
    /// Put index
    pub u8, fpi, _: 21, 16;
    /// FIFO full
    pub ff, _: 24;
    /// Message lost
    pub rfl, _: 25;
}

bitfield! {
    /// Rx FIFO acknowledge
    #[derive(Copy, Clone)]
    pub struct Rxfa(u32);
    /// Acknowledge index; writing advances the hardware get pointer
    pub u8, fai, set_fai: 5, 0;
}

bitfield! {
    /// Rx buffer configuration
    #[derive(Copy, Clone)]
    pub struct Rxbc(u32);
    /// Dedicated Rx buffer start address, word offset into message RAM
    pub u16, rbsa, set_rbsa: 15, 2;
}

bitfield! {
    /// Rx buffer / FIFO element size configuration
    #[derive(Copy, Clone)]
    pub struct Rxesc(u32);
    /// Rx FIFO 0 data field size code
    pub u8, f0ds, set_f0ds: 2, 0;
    /// Rx FIFO 1 data field size code
    pub u8, f1ds, set_f1ds: 6, 4;
    /// Rx buffer data field size code
    pub u8, rbds, set_rbds: 10, 8;
}

bitfield! {
    /// Tx buffer configuration
    #[derive(Copy, Clone)]
    pub struct Txbc(u32);
    /// Tx buffer start address, word offset into message RAM
    pub u16, tbsa, set_tbsa: 15, 2;
    /// Number of dedicated Tx buffers
    pub u8, ndtb, set_ndtb: 21, 16;
    /// Tx FIFO/queue size in elements
    pub u8, tfqs, set_tfqs: 29, 24;
    /// Tx queue mode, 1 is priority queue
    pub tfqm, set_tfqm: 30;
}

bitfield! {
    /// Tx FIFO/queue status
    #[derive(Copy, Clone)]
    pub struct Txfqs(u32);
    /// Free level
    pub u8, tffl, _: 5, 0;
    /// Put index
    pub u8, tfqpi, _: 20, 16;
    /// FIFO/queue full
    pub tfqf, _: 21;
}

bitfield! {
    /// Tx element size configuration
    #[derive(Copy, Clone)]
    pub struct Txesc(u32);
    /// Tx buffer data field size code
    pub u8, tbds, set_tbds: 2, 0;
}

bitfield! {
    /// Tx event FIFO configuration
    #[derive(Copy, Clone)]
    pub struct Txefc(u32);
    /// Event FIFO start address, word offset into message RAM
    pub u16, efsa, set_efsa: 15, 2;
    /// Event FIFO size in elements
    pub u8, efs, set_efs: 21, 16;
    /// Event FIFO watermark, 0 disables the watermark interrupt
    pub u8, efwm, set_efwm: 29, 24;
}

bitfield! {
    /// Tx event FIFO status
    #[derive(Copy, Clone)]
    pub struct Txefs(u32);
    /// Event FIFO fill level
    pub u8, effl, _: 5, 0;
    /// Event FIFO get index
    pub u8, efgi, _: 12, 8;
    /// Event FIFO put index
    pub u8, efpi, _: 20, 16;
    /// Event FIFO full
    pub eff, _: 24;
    /// Event FIFO element lost
    pub tefl, _: 25;
}

bitfield! {
    /// Tx event FIFO acknowledge
    #[derive(Copy, Clone)]
    pub struct Txefa(u32);
    /// Acknowledge index; writing advances the hardware get pointer
    pub u8, efai, set_efai: 4, 0;
}

impl_raw!(
    Cccr, Nbtp, Dbtp, Tdcr, Test, Tscc, Tscv, Ecr, Psr, Ile, Gfc, Sidfc, Xidfc, Rxfc, Rxfs, Rxfa,
    Rxbc, Rxesc, Txbc, Txfqs, Txesc, Txefc, Txefs, Txefa,
);

/// Registers controlling one Rx FIFO
#[repr(C)]
pub struct RxFifoRegs {
    /// Configuration
    pub c: Reg<Rxfc>,
    /// Status
    pub s: Reg<Rxfs>,
    /// Acknowledge
    pub a: Reg<Rxfa>,
}

/// The controller's register block
#[repr(C)]
pub struct RegisterBlock {
    /// Core release (read-only)
    pub crel: Reg<u32>,
    /// Endianness test value (read-only)
    pub endn: Reg<u32>,
    _reserved0: [u32; 1],
    /// Data bit timing and prescaler
    pub dbtp: Reg<Dbtp>,
    /// Test modes
    pub test: Reg<Test>,
    /// RAM watchdog
    pub rwd: Reg<u32>,
    /// CC control
    pub cccr: Reg<Cccr>,
    /// Nominal bit timing and prescaler
    pub nbtp: Reg<Nbtp>,
    /// Timestamp counter configuration
    pub tscc: Reg<Tscc>,
    /// Timestamp counter value
    pub tscv: Reg<Tscv>,
    /// Timeout counter configuration
    pub tocc: Reg<u32>,
    /// Timeout counter value
    pub tocv: Reg<u32>,
    _reserved1: [u32; 4],
    /// Error counters
    pub ecr: Reg<Ecr>,
    /// Protocol status
    pub psr: Reg<Psr>,
    /// Transmitter delay compensation
    pub tdcr: Reg<Tdcr>,
    _reserved2: [u32; 1],
    /// Interrupt status, write one to clear
    pub ir: Reg<InterruptSet>,
    /// Interrupt enable
    pub ie: Reg<InterruptSet>,
    /// Interrupt line select, 1 routes to line 1
    pub ils: Reg<InterruptSet>,
    /// Interrupt line enable
    pub ile: Reg<Ile>,
    _reserved3: [u32; 8],
    /// Global filter configuration
    pub gfc: Reg<Gfc>,
    /// Standard ID filter configuration
    pub sidfc: Reg<Sidfc>,
    /// Extended ID filter configuration
    pub xidfc: Reg<Xidfc>,
    _reserved4: [u32; 1],
    /// Extended ID AND mask
    pub xidam: Reg<u32>,
    /// High priority message status (read-only)
    pub hpms: Reg<u32>,
    /// New data flags for dedicated Rx buffers 0..=31, write one to clear
    pub ndat1: Reg<u32>,
    /// New data flags for dedicated Rx buffers 32..=63, write one to clear
    pub ndat2: Reg<u32>,
    /// Rx FIFO 0
    pub rxf0: RxFifoRegs,
    /// Rx buffer configuration
    pub rxbc: Reg<Rxbc>,
    /// Rx FIFO 1
    pub rxf1: RxFifoRegs,
    /// Rx element size configuration
    pub rxesc: Reg<Rxesc>,
    /// Tx buffer configuration
    pub txbc: Reg<Txbc>,
    /// Tx FIFO/queue status
    pub txfqs: Reg<Txfqs>,
    /// Tx element size configuration
    pub txesc: Reg<Txesc>,
    /// Tx buffer request pending, one bit per buffer
    pub txbrp: Reg<u32>,
    /// Tx buffer add request, one bit per buffer
    pub txbar: Reg<u32>,
    /// Tx buffer cancellation request, one bit per buffer
    pub txbcr: Reg<u32>,
    /// Tx buffer transmission occurred, one bit per buffer
    pub txbto: Reg<u32>,
    /// Tx buffer cancellation finished, one bit per buffer
    pub txbcf: Reg<u32>,
    /// Tx buffer transmission completed interrupt enable
    pub txbtie: Reg<u32>,
    /// Tx buffer cancellation finished interrupt enable
    pub txbcie: Reg<u32>,
    _reserved5: [u32; 2],
    /// Tx event FIFO configuration
    pub txefc: Reg<Txefc>,
    /// Tx event FIFO status
    pub txefs: Reg<Txefs>,
    /// Tx event FIFO acknowledge
    pub txefa: Reg<Txefa>,
}

/// Handle to the register block of controller `Id`
///
/// Copies of this handle are held by the abstractions that were delegated
/// ownership of disjoint register subsets; the safety comments on their
/// constructors document which registers each one owns.
pub(crate) struct Registers<Id> {
    ptr: *const RegisterBlock,
    _id: PhantomData<Id>,
}

impl<Id> Registers<Id> {
    /// # Safety
    /// `ptr` must point to the register block of the controller identified
    /// by `Id` and stay valid for volatile access for the lifetime of all
    /// copies of the returned handle.
    pub(crate) unsafe fn new(ptr: *const ()) -> Self {
        Self {
            ptr: ptr as *const RegisterBlock,
            _id: PhantomData,
        }
    }
}

impl<Id> Clone for Registers<Id> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Id> Copy for Registers<Id> {}

impl<Id> Deref for Registers<Id> {
    type Target = RegisterBlock;

    fn deref(&self) -> &RegisterBlock {
        // Safety: Validity is guaranteed by the constructor contract.
        unsafe { &*self.ptr }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    #[test]
    fn register_offsets_match_the_memory_map() {
        assert_eq!(offset_of!(RegisterBlock, dbtp), 0x0c);
        assert_eq!(offset_of!(RegisterBlock, cccr), 0x18);
        assert_eq!(offset_of!(RegisterBlock, nbtp), 0x1c);
        assert_eq!(offset_of!(RegisterBlock, ecr), 0x40);
        assert_eq!(offset_of!(RegisterBlock, psr), 0x44);
        assert_eq!(offset_of!(RegisterBlock, tdcr), 0x48);
        assert_eq!(offset_of!(RegisterBlock, ir), 0x50);
        assert_eq!(offset_of!(RegisterBlock, gfc), 0x80);
        assert_eq!(offset_of!(RegisterBlock, ndat1), 0x98);
        assert_eq!(offset_of!(RegisterBlock, rxf0), 0xa0);
        assert_eq!(offset_of!(RegisterBlock, rxbc), 0xac);
        assert_eq!(offset_of!(RegisterBlock, rxf1), 0xb0);
        assert_eq!(offset_of!(RegisterBlock, txbc), 0xc0);
        assert_eq!(offset_of!(RegisterBlock, txbar), 0xd0);
        assert_eq!(offset_of!(RegisterBlock, txefc), 0xf0);
        assert_eq!(offset_of!(RegisterBlock, txefa), 0xf8);
    }

    #[test]
    fn field_packing() {
        let mut nbtp = Nbtp(0);
        nbtp.set_ntseg1(0x7f);
        nbtp.set_ntseg2(0x1f);
        nbtp.set_nbrp(0x9);
        nbtp.set_nsjw(0x1f);
        assert_eq!(nbtp.0, (0x1f << 25) | (0x9 << 16) | (0x7f << 8) | 0x1f);
    }
}
