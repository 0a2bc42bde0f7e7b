//! Controller configuration and bus state management
//!
//! The driver models the controller lifecycle as a type-state pair:
//! [`CanConfigurable`] holds the bus in initialization mode with
//! configuration change enabled, [`Can`] is the operational bus. Opening a
//! bus plans the message RAM, programs the derived layout and bit timing,
//! and hands out the per-concern abstractions; every halt/run handshake with
//! the hardware is a bounded poll that fails soft instead of hanging.

use crate::config::{CanConfig, Mode, Phase};
use crate::filter::{Filters, FiltersExtended, FiltersStandard};
use crate::interrupt::InterruptConfiguration;
use crate::message::DataFieldSize;
use crate::ram::{ElementCounts, LayoutError, MessageRamLayout, Region, SharedMemory};
use crate::reg::{
    Dbtp, Ecr, Gfc, Nbtp, Psr, RegisterBlock, Registers, Rxesc, Sidfc, Tdcr, Tscc, Txesc, Xidfc,
};
use crate::rx_dedicated_buffers::RxDedicatedBuffer;
use crate::rx_fifo::{Fifo0, Fifo1, RxFifo};
use crate::spin::{self, Deadline};
use crate::tx_buffers::Tx;
use crate::tx_event_fifo::TxEventFifo;
use canfd_core::{CanId, Dependencies};
use core::fmt::{self, Debug};
use core::mem;
use fugit::HertzU32;
use vcell::VolatileCell;

/// Printable protocol status snapshot
pub struct ProtocolStatus(pub Psr);

impl From<Psr> for ProtocolStatus {
    fn from(value: Psr) -> Self {
        Self(value)
    }
}

impl Debug for ProtocolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let psr = &self.0;

        f.debug_struct("ProtocolStatus")
            .field("tdcv", &psr.tdcv())
            .field("pxe", &psr.pxe())
            .field("rfdf", &psr.rfdf())
            .field("rbrs", &psr.rbrs())
            .field("resi", &psr.resi())
            .field("dlec", &psr.dlec())
            .field("bo", &psr.bo())
            .field("ew", &psr.ew())
            .field("ep", &psr.ep())
            .field("act", &psr.act())
            .field("lec", &psr.lec())
            .finish()
    }
}

/// Printable error counter snapshot
pub struct ErrorCounters(pub Ecr);

impl From<Ecr> for ErrorCounters {
    fn from(value: Ecr) -> Self {
        Self(value)
    }
}

impl ErrorCounters {
    /// Transmit error counter
    pub fn transmit(&self) -> u8 {
        self.0.tec()
    }

    /// Receive error counter
    pub fn receive(&self) -> u8 {
        self.0.rec()
    }
}

impl Debug for ErrorCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ecr = &self.0;

        f.debug_struct("ErrorCounters")
            .field("cel", &ecr.cel())
            .field("rec", &ecr.rec())
            .field("rp", &ecr.rp())
            .field("tec", &ecr.tec())
            .finish()
    }
}

/// The hardware did not confirm a halt/run transition within the poll budget
///
/// The controller is left in an unspecified state; the request stays
/// asserted and may still take effect later.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransitionTimeout;

/// Errors that may occur while opening or finalizing the bus
#[derive(Debug)]
pub enum ConfigurationError {
    /// The provided memory is not at the controller's message RAM address
    MemoryNotAddressable,
    /// The requested element counts do not form a valid layout
    Layout(LayoutError),
    /// Time stamp prescaler value is not in the range [1, 16]
    InvalidTimeStampPrescaler,
    /// The closest achievable bit rate deviates from the requested one by
    /// more than [`CanConfig::max_bitrate_error`]
    BitRateDeviation {
        /// Phase the deviation occurred in
        phase: Phase,
        /// Requested bit rate
        requested: HertzU32,
        /// Closest rate the clock can express
        achieved: HertzU32,
    },
    /// A halt/run handshake with the hardware timed out
    Transition(TransitionTimeout),
}

impl From<LayoutError> for ConfigurationError {
    fn from(value: LayoutError) -> Self {
        Self::Layout(value)
    }
}

impl From<TransitionTimeout> for ConfigurationError {
    fn from(value: TransitionTimeout) -> Self {
        Self::Transition(value)
    }
}

/// What to do with frames no filter element matched
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NonMatchingAction {
    /// Accept into RX FIFO 0
    StoreFifo0,
    /// Accept into RX FIFO 1
    StoreFifo1,
    /// Reject the frame
    Reject,
}

impl NonMatchingAction {
    fn code(self) -> u8 {
        match self {
            Self::StoreFifo0 => 0,
            Self::StoreFifo1 => 1,
            Self::Reject => 2,
        }
    }
}

/// Default acceptance policy applied before the filter table is consulted
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GlobalFilterPolicy {
    /// Treatment of standard-ID frames no filter matched
    pub non_matching_standard: NonMatchingAction,
    /// Treatment of extended-ID frames no filter matched
    pub non_matching_extended: NonMatchingAction,
    /// Reject all standard-ID remote frames
    pub reject_remote_standard: bool,
    /// Reject all extended-ID remote frames
    pub reject_remote_extended: bool,
}

/// The conservative default: nothing gets in unless a filter says so.
impl Default for GlobalFilterPolicy {
    fn default() -> Self {
        Self {
            non_matching_standard: NonMatchingAction::Reject,
            non_matching_extended: NonMatchingAction::Reject,
            reject_remote_standard: true,
            reject_remote_extended: true,
        }
    }
}

/// Common CAN bus status queries
pub trait CanBus {
    /// Read error counters
    fn error_counters(&self) -> ErrorCounters;
    /// Read additional status information
    fn protocol_status(&self) -> ProtocolStatus;
    /// Get current time
    fn ts_count(&self) -> u16;
}

/// A CAN bus that is not in configuration mode (CCE=0)
///
/// Some errors (including bus off) can asynchronously stop bus operation
/// (INIT=1), which requires user intervention to reactivate the bus to
/// resume sending and receiving messages.
pub struct Can<'a, Id, D> {
    /// Controls enabling and line selection of interrupts.
    pub interrupts: InterruptConfiguration<Id>,
    /// RX FIFO 0
    pub rx_fifo_0: RxFifo<'a, Fifo0, Id>,
    /// RX FIFO 1
    pub rx_fifo_1: RxFifo<'a, Fifo1, Id>,
    /// Dedicated RX buffers
    pub rx_dedicated_buffers: RxDedicatedBuffer<'a, Id>,
    /// TX buffers and queue
    pub tx: Tx<'a, Id>,
    /// TX event FIFO
    pub tx_event_fifo: TxEventFifo<'a, Id>,
    /// Auxiliary bits: configuration, status queries, filters.
    ///
    /// The field is public to allow destructuring.
    pub aux: Aux<'a, Id, D>,
}

/// Auxiliary struct
pub struct Aux<'a, Id, D> {
    regs: Registers<Id>,
    dependencies: D,
    config: CanConfig,
    filter_policy: GlobalFilterPolicy,
    layout: MessageRamLayout,
    data_field_size: DataFieldSize,
    filters_standard: FiltersStandard<'a, Id>,
    filters_extended: FiltersExtended<'a, Id>,
    spin_budget: u32,
}

impl<'a, Id: CanId, D: Dependencies<Id>> Aux<'a, Id, D> {
    /// Switches between initialization mode and normal operation
    ///
    /// In initialization mode, messages are not received or transmitted and
    /// the configuration can be changed. `enable == true` requests normal
    /// operation. The hardware must confirm the transition; the confirmation
    /// poll is bounded and fails soft.
    pub fn run_to_normal(&mut self, enable: bool) -> Result<(), TransitionTimeout> {
        let init = !enable;
        self.regs.cccr.modify(|mut r| {
            r.set_init(init);
            r
        });
        let mut deadline = Deadline::new(self.spin_budget);
        while self.regs.cccr.read().init() != init {
            if deadline.expired() {
                return Err(TransitionTimeout);
            }
        }
        Ok(())
    }

    fn enable_cce(&mut self) -> Result<(), TransitionTimeout> {
        self.regs.cccr.modify(|mut r| {
            r.set_cce(true);
            r
        });
        let mut deadline = Deadline::new(self.spin_budget);
        while !self.regs.cccr.read().cce() {
            if deadline.expired() {
                return Err(TransitionTimeout);
            }
        }
        Ok(())
    }

    /// Applies the default acceptance policy for frames no filter matched
    ///
    /// Callable in any state; the hardware consults the register only while
    /// the bus operates.
    pub fn set_global_filter_policy(&mut self, policy: GlobalFilterPolicy) {
        self.filter_policy = policy;
        let mut gfc = Gfc(0);
        gfc.set_anfs(policy.non_matching_standard.code());
        gfc.set_anfe(policy.non_matching_extended.code());
        gfc.set_rrfs(policy.reject_remote_standard);
        gfc.set_rrfe(policy.reject_remote_extended);
        self.regs.gfc.write(gfc);
    }

    /// Data field size the frame-carrying message RAM elements were planned
    /// for; payloads handed to [`crate::message::tx::FrameBuilder::build`]
    /// must fit it.
    pub fn data_field_size(&self) -> DataFieldSize {
        self.data_field_size
    }

    /// Allows reconfiguring the acceptance filters for standard IDs.
    pub fn filters_standard(&mut self) -> &mut FiltersStandard<'a, Id> {
        &mut self.filters_standard
    }

    /// Allows reconfiguring the acceptance filters for extended IDs.
    pub fn filters_extended(&mut self) -> &mut FiltersExtended<'a, Id> {
        &mut self.filters_extended
    }
}

impl<Id: CanId, D: Dependencies<Id>> CanBus for Aux<'_, Id, D> {
    fn error_counters(&self) -> ErrorCounters {
        self.regs.ecr.read().into()
    }

    fn protocol_status(&self) -> ProtocolStatus {
        self.regs.psr.read().into()
    }

    fn ts_count(&self) -> u16 {
        self.regs.tscv.read().tsc()
    }
}

/// A CAN bus in configuration mode
///
/// Before messages can be sent and received, it needs to be
/// [`Self::finalize`]d.
pub struct CanConfigurable<'a, Id, D>(
    /// The type invariant of CCE=0 is broken while this is wrapped.
    Can<'a, Id, D>,
);

/// Splits the next planned region off the front of the unassigned memory.
fn carve<'a>(
    remaining: &mut &'a mut [VolatileCell<u32>],
    region: Option<&Region>,
) -> &'a mut [VolatileCell<u32>] {
    let words = region.map_or(0, Region::words);
    let (window, rest) = mem::take(remaining).split_at_mut(words);
    *remaining = rest;
    window
}

fn element_words(region: Option<&Region>) -> usize {
    region.map_or(1, Region::element_words)
}

impl<'a, Id: CanId, D: Dependencies<Id>> CanConfigurable<'a, Id, D> {
    /// Opens the bus in configuration mode
    ///
    /// Plans the message RAM for `counts` with frame elements sized for
    /// `data_field_size`, zero-fills it, programs the layout into the
    /// controller and parcels the RAM out to the returned abstractions. The
    /// bus stays halted until [`Self::finalize`] is called; filters,
    /// interrupts and the remaining [`CanConfig`] fields can be set up in
    /// between.
    ///
    /// `memory` must be the controller's dedicated message RAM; this is
    /// checked against [`Dependencies::eligible_message_ram_start`].
    pub fn new(
        bitrate: HertzU32,
        dependencies: D,
        memory: &'a mut SharedMemory,
        counts: ElementCounts,
        data_field_size: DataFieldSize,
    ) -> Result<Self, ConfigurationError> {
        // Safety: `dependencies` implies ownership of the register block
        // pointed to by `Id`, so this is the unique handle to it.
        let regs = unsafe { Registers::<Id>::new(dependencies.register_block_start()) };

        if memory as *const SharedMemory as *const () != dependencies.eligible_message_ram_start() {
            return Err(ConfigurationError::MemoryNotAddressable);
        }

        let layout = MessageRamLayout::plan(&counts, data_field_size)?;
        let spin_budget = spin::one_ms_budget(dependencies.host_clock());
        let mut words: &mut [VolatileCell<u32>] = memory.init();

        let filters_standard = carve(&mut words, layout.standard_filters.as_ref());
        let filters_extended = carve(&mut words, layout.extended_filters.as_ref());
        let tx_buffers = carve(&mut words, layout.tx_buffers.as_ref());
        let rx_buffers = carve(&mut words, layout.rx_buffers.as_ref());
        let rx_fifo_0 = carve(&mut words, layout.rx_fifo_0.as_ref());
        let rx_fifo_1 = carve(&mut words, layout.rx_fifo_1.as_ref());
        let tx_event_fifo = carve(&mut words, layout.tx_event_fifo.as_ref());

        let mut aux = Aux {
            regs,
            dependencies,
            config: CanConfig::new(bitrate),
            filter_policy: GlobalFilterPolicy::default(),
            layout,
            data_field_size,
            // Safety: The memory was just zeroed, so all filters start out
            // disabled.
            filters_standard: unsafe { Filters::new(filters_standard) },
            filters_extended: unsafe { Filters::new(filters_extended) },
            spin_budget,
        };

        // The layout registers are guarded by INIT+CCE.
        aux.run_to_normal(false)?;
        aux.enable_cce()?;
        apply_ram_config(regs, &layout, data_field_size);

        // Safety: The register subsets delegated to these components are
        // disjoint and not touched by any other code holding this handle.
        let can = Can {
            interrupts: unsafe { InterruptConfiguration::new(regs) },
            rx_fifo_0: unsafe {
                RxFifo::new(rx_fifo_0, element_words(layout.rx_fifo_0.as_ref()), regs)
            },
            rx_fifo_1: unsafe {
                RxFifo::new(rx_fifo_1, element_words(layout.rx_fifo_1.as_ref()), regs)
            },
            rx_dedicated_buffers: unsafe {
                RxDedicatedBuffer::new(rx_buffers, element_words(layout.rx_buffers.as_ref()), regs)
            },
            tx: unsafe {
                Tx::new(
                    tx_buffers,
                    element_words(layout.tx_buffers.as_ref()),
                    regs,
                    spin_budget,
                )
            },
            tx_event_fifo: unsafe { TxEventFifo::new(tx_event_fifo, regs) },
            aux,
        };

        Ok(Self(can))
    }

    /// Raw access to the registers.
    ///
    /// # Safety
    /// The abstraction assumes that it has exclusive ownership of the
    /// registers. Direct access can break such assumptions.
    pub unsafe fn registers(&self) -> &RegisterBlock {
        &self.0.aux.regs
    }

    /// Allows reconfiguring the acceptance filters for standard IDs.
    pub fn filters_standard(&mut self) -> &mut FiltersStandard<'a, Id> {
        self.0.aux.filters_standard()
    }

    /// Allows reconfiguring the acceptance filters for extended IDs.
    pub fn filters_extended(&mut self) -> &mut FiltersExtended<'a, Id> {
        self.0.aux.filters_extended()
    }

    /// Allows reconfiguring interrupts.
    pub fn interrupts(&mut self) -> &mut InterruptConfiguration<Id> {
        &mut self.0.interrupts
    }

    /// Applies the default acceptance policy for frames no filter matched
    ///
    /// A policy set here is in place from the first moment of bus operation;
    /// [`Self::finalize`] re-applies it.
    pub fn set_global_filter_policy(&mut self, policy: GlobalFilterPolicy) {
        self.0.aux.set_global_filter_policy(policy);
    }

    /// Allows changing the configuration applied by [`Self::finalize`]
    pub fn config(&mut self) -> &mut CanConfig {
        &mut self.0.aux.config
    }

    /// Applies bit timing and the remaining [`CanConfig`] fields.
    fn apply_bus_config(&mut self) -> Result<(), ConfigurationError> {
        let aux = &self.0.aux;
        let regs = aux.regs;
        let config = &aux.config;
        if !(1..=16).contains(&config.timestamp.prescaler) {
            return Err(ConfigurationError::InvalidTimeStampPrescaler);
        }
        let can_clock = aux.dependencies.can_clock();

        let nominal =
            crate::config::BitTiming::solve(config.bitrate, can_clock, Phase::Nominal);
        if nominal.bitrate_error(config.bitrate) > config.max_bitrate_error.into() {
            return Err(ConfigurationError::BitRateDeviation {
                phase: Phase::Nominal,
                requested: config.bitrate,
                achieved: nominal.bitrate,
            });
        }

        // Register fields hold the real value minus one.
        let mut nbtp = Nbtp(0);
        nbtp.set_nsjw(nominal.sjw - 1);
        nbtp.set_ntseg1((nominal.tseg1 - 1) as u8);
        nbtp.set_ntseg2(nominal.tseg2 - 1);
        nbtp.set_nbrp(nominal.prescaler - 1);
        regs.nbtp.write(nbtp);

        match config.mode {
            Mode::Classic => regs.cccr.modify(|mut r| {
                r.set_fdoe(false);
                r
            }),
            Mode::Fd {
                allow_bit_rate_switching,
                data_bitrate,
            } => {
                regs.cccr.modify(|mut r| {
                    r.set_fdoe(true);
                    r.set_brse(allow_bit_rate_switching);
                    r
                });
                let data = crate::config::BitTiming::solve(data_bitrate, can_clock, Phase::Data);
                if data.bitrate_error(data_bitrate) > config.max_bitrate_error.into() {
                    return Err(ConfigurationError::BitRateDeviation {
                        phase: Phase::Data,
                        requested: data_bitrate,
                        achieved: data.bitrate,
                    });
                }
                let mut dbtp = Dbtp(0);
                dbtp.set_dsjw(data.sjw - 1);
                dbtp.set_dtseg1((data.tseg1 - 1) as u8);
                dbtp.set_dtseg2(data.tseg2 - 1);
                dbtp.set_dbrp((data.prescaler - 1) as u8);
                if let Some(offset) = data.tdc_offset {
                    dbtp.set_tdc(true);
                    let mut tdcr = Tdcr(0);
                    tdcr.set_tdco(offset);
                    regs.tdcr.write(tdcr);
                }
                regs.dbtp.write(dbtp);
            }
        };

        let mut tscc = Tscc(0);
        tscc.set_tss(config.timestamp.select.code());
        tscc.set_tcp(config.timestamp.prescaler - 1);
        regs.tscc.write(tscc);

        // Configure test/loopback mode
        regs.cccr.modify(|mut r| {
            r.set_test(config.loopback);
            r
        });
        regs.test.modify(|mut r| {
            r.set_lbck(config.loopback);
            r
        });

        // FIFO modes and watermarks; start addresses were programmed when
        // the RAM layout was applied.
        regs.rxf0.c.modify(|mut r| {
            r.set_fom(config.rx_fifo_0.mode.into());
            r.set_fwm(config.rx_fifo_0.watermark.min(64));
            r
        });
        regs.rxf1.c.modify(|mut r| {
            r.set_fom(config.rx_fifo_1.mode.into());
            r.set_fwm(config.rx_fifo_1.watermark.min(64));
            r
        });

        // Dedicated/queue split of the planned TX buffers
        let tx_total = aux.layout.tx_buffers.map_or(0, |r| r.count) as u8;
        let dedicated = config.tx.dedicated_buffers.min(tx_total);
        regs.txbc.modify(|mut r| {
            r.set_ndtb(dedicated);
            r.set_tfqs(tx_total - dedicated);
            r.set_tfqm(config.tx.tx_queue_submode.into());
            r
        });

        regs.txefc.modify(|mut r| {
            r.set_efwm(config.tx.tx_event_fifo_watermark.min(32));
            r
        });

        let policy = aux.filter_policy;
        self.0.aux.set_global_filter_policy(policy);
        Ok(())
    }

    /// Locks the configuration and enters normal operation.
    pub fn finalize(mut self) -> Result<Can<'a, Id, D>, ConfigurationError> {
        self.apply_bus_config()?;

        let mut can = self.0;
        // Enter normal operation (CCE is cleared automatically)
        can.aux.run_to_normal(true)?;

        Ok(can)
    }
}

/// Programs the planned layout into the start-address and element-size
/// registers.
fn apply_ram_config<Id: CanId>(
    regs: Registers<Id>,
    layout: &MessageRamLayout,
    data_field_size: DataFieldSize,
) {
    let word_offset = |region: Option<&Region>| region.map_or(0, Region::word_offset) as u16;
    let count = |region: Option<&Region>| region.map_or(0, |r| r.count) as u8;

    let mut sidfc = Sidfc(0);
    sidfc.set_flssa(word_offset(layout.standard_filters.as_ref()));
    sidfc.set_lss(count(layout.standard_filters.as_ref()));
    regs.sidfc.write(sidfc);

    let mut xidfc = Xidfc(0);
    xidfc.set_flesa(word_offset(layout.extended_filters.as_ref()));
    xidfc.set_lse(count(layout.extended_filters.as_ref()));
    regs.xidfc.write(xidfc);

    regs.rxbc.modify(|mut r| {
        r.set_rbsa(word_offset(layout.rx_buffers.as_ref()));
        r
    });

    let mut rxesc = Rxesc(0);
    rxesc.set_rbds(data_field_size.code());
    rxesc.set_f0ds(data_field_size.code());
    rxesc.set_f1ds(data_field_size.code());
    regs.rxesc.write(rxesc);

    regs.rxf0.c.modify(|mut r| {
        r.set_fsa(word_offset(layout.rx_fifo_0.as_ref()));
        r.set_fs(count(layout.rx_fifo_0.as_ref()));
        r
    });
    regs.rxf1.c.modify(|mut r| {
        r.set_fsa(word_offset(layout.rx_fifo_1.as_ref()));
        r.set_fs(count(layout.rx_fifo_1.as_ref()));
        r
    });

    // The dedicated/queue split is a bus-config concern; until then all
    // planned buffers count as queue so the region size is fixed here.
    regs.txbc.modify(|mut r| {
        r.set_tbsa(word_offset(layout.tx_buffers.as_ref()));
        r.set_ndtb(0);
        r.set_tfqs(count(layout.tx_buffers.as_ref()));
        r
    });

    let mut txesc = Txesc(0);
    txesc.set_tbds(data_field_size.code());
    regs.txesc.write(txesc);

    regs.txefc.modify(|mut r| {
        r.set_efsa(word_offset(layout.tx_event_fifo.as_ref()));
        r.set_efs(count(layout.tx_event_fifo.as_ref()));
        r
    });
}

impl<'a, Id: CanId, D: Dependencies<Id>> Can<'a, Id, D> {
    /// Raw access to the registers.
    ///
    /// # Safety
    /// The abstraction assumes that it has exclusive ownership of the
    /// registers. Direct access can break such assumptions.
    pub unsafe fn registers(&self) -> &RegisterBlock {
        &self.aux.regs
    }

    /// Halts the bus and re-enters configuration mode.
    pub fn configure(mut self) -> Result<CanConfigurable<'a, Id, D>, TransitionTimeout> {
        self.aux.run_to_normal(false)?;
        self.aux.enable_cce()?;
        Ok(CanConfigurable(self))
    }

    /// Shuts the bus down
    ///
    /// Disables all interrupts of this controller (interrupt-controller
    /// routing is the integration layer's concern) and halts it. The
    /// released dependencies can be used to open the bus again.
    pub fn close(mut self) -> Result<D, TransitionTimeout> {
        self.interrupts.disable_all();
        self.aux.run_to_normal(false)?;
        Ok(self.aux.dependencies)
    }
}

impl<Id: CanId, D: Dependencies<Id>> CanBus for Can<'_, Id, D> {
    fn error_counters(&self) -> ErrorCounters {
        self.aux.error_counters()
    }

    fn protocol_status(&self) -> ProtocolStatus {
        self.aux.protocol_status()
    }

    fn ts_count(&self) -> u16 {
        self.aux.ts_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_policy_rejects_everything() {
        let policy = GlobalFilterPolicy::default();
        assert_eq!(policy.non_matching_standard, NonMatchingAction::Reject);
        assert_eq!(policy.non_matching_extended, NonMatchingAction::Reject);
        assert!(policy.reject_remote_standard);
        assert!(policy.reject_remote_extended);
    }

    #[test]
    fn non_matching_action_codes() {
        assert_eq!(NonMatchingAction::StoreFifo0.code(), 0);
        assert_eq!(NonMatchingAction::StoreFifo1.code(), 1);
        // Both 0b10 and 0b11 reject; the driver writes 0b10.
        assert_eq!(NonMatchingAction::Reject.code(), 2);
    }
}
