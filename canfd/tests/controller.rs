//! End-to-end tests against an in-memory fake peripheral.
//!
//! The register block and the message RAM are plain host allocations handed
//! to the driver through the `Dependencies` trait. Registers keep whatever
//! the driver writes (there is no hardware behind them updating status
//! bits), so the tests either pre-load status registers to simulate the
//! controller or assert on the written configuration values.

use canfd::bus::{
    CanBus, CanConfigurable, ConfigurationError, GlobalFilterPolicy, NonMatchingAction,
};
use canfd::config::{Mode, Phase};
use canfd::filter::{Action, Filter, IndexOutOfRange};
use canfd::interrupt::{Interrupt, InterruptLine, InterruptSet};
use canfd::message::tx::{ClassicFrameType, FrameBuilder, FrameType};
use canfd::message::{DataFieldSize, Raw, TxEventType};
use canfd::ram::{ElementCounts, LayoutError, SharedMemory};
use canfd::reg::{Psr, RegisterBlock, Rxfs, Txefs};
use canfd::rx_fifo::FifoRead;
use canfd::tx_buffers::TransmitError;
use canfd_core::{CanId, Dependencies};
use embedded_can::{Id, StandardId};
use fugit::HertzU32;

struct FakeDependencies {
    regs: *const (),
    ram: *const (),
    can_clock: HertzU32,
}

unsafe impl<I: CanId> Dependencies<I> for FakeDependencies {
    fn register_block_start(&self) -> *const () {
        self.regs
    }

    fn eligible_message_ram_start(&self) -> *const () {
        self.ram
    }

    fn host_clock(&self) -> HertzU32 {
        HertzU32::MHz(100)
    }

    fn can_clock(&self) -> HertzU32 {
        self.can_clock
    }
}

struct FakeController {
    regs_ptr: *mut u32,
    ram_ptr: *mut u32,
    memory: &'static mut SharedMemory,
}

impl FakeController {
    fn new() -> Self {
        let regs = Box::leak(Box::new([0u32; 64]));
        let memory = Box::leak(Box::new(SharedMemory::new()));
        let ram_ptr = memory as *mut SharedMemory as *mut u32;
        Self {
            regs_ptr: regs.as_mut_ptr(),
            ram_ptr,
            memory,
        }
    }

    fn dependencies(&self, can_clock: HertzU32) -> FakeDependencies {
        FakeDependencies {
            regs: self.regs_ptr as *const (),
            ram: self.ram_ptr as *const (),
            can_clock,
        }
    }

    fn regs(&self) -> &RegisterBlock {
        unsafe { &*(self.regs_ptr as *const RegisterBlock) }
    }

    /// Simulates the controller depositing a word into message RAM.
    fn write_ram(&self, word_index: usize, value: u32) {
        unsafe { self.ram_ptr.add(word_index).write_volatile(value) }
    }

    fn read_ram(&self, word_index: usize) -> u32 {
        unsafe { self.ram_ptr.add(word_index).read_volatile() }
    }
}

/// Word offsets of the layout produced by [`counts`] with 64-byte data
/// fields: 8 standard filters, 2 extended filters, then 18-word frame
/// elements.
const TX_BUFFERS_START: usize = 12;
const RX_BUFFERS_START: usize = 48;
const RX_FIFO_0_START: usize = 84;
const TX_EVENT_FIFO_START: usize = 156;
const FRAME_WORDS: usize = 18;

fn counts() -> ElementCounts {
    ElementCounts {
        standard_filters: 8,
        extended_filters: 2,
        tx_buffers: 2,
        rx_buffers: 2,
        rx_fifo_0: 4,
        rx_fifo_1: 0,
        tx_event_fifo: 2,
    }
}

fn open<I: CanId>(
    fake: &mut FakeController,
    can_clock: HertzU32,
) -> CanConfigurable<'static, I, FakeDependencies> {
    let dependencies = fake.dependencies(can_clock);
    let memory = unsafe { &mut *(fake.memory as *mut SharedMemory) };
    CanConfigurable::new(
        HertzU32::kHz(500),
        dependencies,
        memory,
        counts(),
        DataFieldSize::B64,
    )
    .unwrap()
}

enum Can0 {}
unsafe impl CanId for Can0 {}

#[test]
fn open_programs_the_planned_layout() {
    let mut fake = FakeController::new();
    let _can = open::<Can0>(&mut fake, HertzU32::MHz(80));
    let regs = fake.regs();

    assert!(regs.cccr.read().init());
    assert!(regs.cccr.read().cce());

    let sidfc = regs.sidfc.read();
    assert_eq!(sidfc.flssa(), 0);
    assert_eq!(sidfc.lss(), 8);

    let xidfc = regs.xidfc.read();
    assert_eq!(xidfc.flesa(), 8);
    assert_eq!(xidfc.lse(), 2);

    let txbc = regs.txbc.read();
    assert_eq!(txbc.tbsa() as usize, TX_BUFFERS_START);
    assert_eq!(txbc.ndtb(), 0);
    assert_eq!(txbc.tfqs(), 2);

    assert_eq!(regs.rxbc.read().rbsa() as usize, RX_BUFFERS_START);

    let rxf0c = regs.rxf0.c.read();
    assert_eq!(rxf0c.fsa() as usize, RX_FIFO_0_START);
    assert_eq!(rxf0c.fs(), 4);

    let rxf1c = regs.rxf1.c.read();
    assert_eq!(rxf1c.fsa(), 0);
    assert_eq!(rxf1c.fs(), 0);

    let txefc = regs.txefc.read();
    assert_eq!(txefc.efsa() as usize, TX_EVENT_FIFO_START);
    assert_eq!(txefc.efs(), 2);

    let rxesc = regs.rxesc.read();
    assert_eq!(rxesc.rbds(), 7);
    assert_eq!(rxesc.f0ds(), 7);
    assert_eq!(rxesc.f1ds(), 7);
    assert_eq!(regs.txesc.read().tbds(), 7);
}

enum Can1 {}
unsafe impl CanId for Can1 {}

#[test]
fn finalize_applies_bit_timing_and_filter_policy() {
    let mut fake = FakeController::new();
    let mut can = open::<Can1>(&mut fake, HertzU32::MHz(80));
    can.config().mode = Mode::Fd {
        allow_bit_rate_switching: true,
        data_bitrate: HertzU32::MHz(2),
    };
    let can = can.finalize().unwrap();
    let regs = fake.regs();

    // 500 kbit/s from 80 MHz: prescaler 1, 160 quanta, sampled at 87.5 %.
    let nbtp = regs.nbtp.read();
    assert_eq!(nbtp.nbrp(), 0);
    assert_eq!(nbtp.ntseg1(), 138);
    assert_eq!(nbtp.ntseg2(), 19);
    assert_eq!(nbtp.nsjw(), 19);

    // 2 Mbit/s data phase: 40 quanta, sampled at 75 %, no delay
    // compensation below 2.5 Mbit/s.
    let dbtp = regs.dbtp.read();
    assert_eq!(dbtp.dbrp(), 0);
    assert_eq!(dbtp.dtseg1(), 28);
    assert_eq!(dbtp.dtseg2(), 9);
    assert_eq!(dbtp.dsjw(), 9);
    assert!(!dbtp.tdc());

    let cccr = regs.cccr.read();
    assert!(cccr.fdoe());
    assert!(cccr.brse());
    assert!(!cccr.init());

    // Conservative default: reject non-matching and remote frames.
    let gfc = regs.gfc.read();
    assert_eq!(gfc.anfs(), 2);
    assert_eq!(gfc.anfe(), 2);
    assert!(gfc.rrfs());
    assert!(gfc.rrfe());

    let tscc = regs.tscc.read();
    assert_eq!(tscc.tss(), 0);
    assert_eq!(tscc.tcp(), 0);

    assert_eq!(can.ts_count(), 0);
}

enum Can2 {}
unsafe impl CanId for Can2 {}

#[test]
fn transmission_writes_the_element_before_the_request_bit() {
    let mut fake = FakeController::new();
    let can = open::<Can2>(&mut fake, HertzU32::MHz(80));
    let mut can = can.finalize().unwrap();
    let regs = fake.regs();

    let payload: [u8; 16] = core::array::from_fn(|i| i as u8);
    let frame = FrameBuilder {
        id: Id::Standard(StandardId::new(0x123).unwrap()),
        frame_type: FrameType::FlexibleDatarate {
            payload: &payload,
            bit_rate_switching: false,
            force_error_state_indicator: false,
        },
        store_tx_event: Some(0x42),
    }
    .build(can.aux.data_field_size())
    .unwrap();

    can.tx.transmit(0, &frame, false).unwrap();
    assert_eq!(regs.txbar.read(), 1);

    // Element header and payload landed in the planned TX region.
    assert_eq!(fake.read_ram(TX_BUFFERS_START), 0x123 << 18);
    assert_eq!(
        fake.read_ram(TX_BUFFERS_START + 1),
        (10 << 16) | (1 << 21) | (1 << 23) | (0x42 << 24)
    );
    assert_eq!(fake.read_ram(TX_BUFFERS_START + 2), 0x03020100);
    assert_eq!(fake.read_ram(TX_BUFFERS_START + 5), 0x0f0e0d0c);

    // The request is still pending, so the buffer reports busy without
    // touching memory.
    assert_eq!(
        can.tx.transmit(0, &frame, false),
        Err(TransmitError::Busy)
    );

    assert_eq!(
        can.tx.transmit(5, &frame, false),
        Err(TransmitError::OutOfBounds)
    );

    // "Hardware" consumes the request; the queue put index points at
    // buffer 0 again.
    regs.txbar.write(0);
    can.tx.transmit_queued(&frame).unwrap();
    assert_eq!(regs.txbar.read(), 1);
}

enum Can3 {}
unsafe impl CanId for Can3 {}

#[test]
fn reception_drains_fifo_and_dedicated_buffers() {
    let mut fake = FakeController::new();
    let can = open::<Can3>(&mut fake, HertzU32::MHz(80));
    let mut can = can.finalize().unwrap();
    let regs = fake.regs();

    assert!(matches!(can.rx_fifo_0.receive(), FifoRead::Empty));
    assert!(can.rx_fifo_0.is_empty());

    // A frame at get index 1: standard ID 0x321, 8 bytes, matched by
    // filter 5, timestamp 0x1234.
    let element = RX_FIFO_0_START + FRAME_WORDS;
    fake.write_ram(element, 0x321 << 18);
    fake.write_ram(element + 1, (8 << 16) | (5 << 24) | 0x1234);
    fake.write_ram(element + 2, 0xdeadbeef);
    fake.write_ram(element + 3, 0x00c0ffee);
    regs.rxf0.s.write(Rxfs::from(1 | (1 << 8)));

    let frame = match can.rx_fifo_0.receive() {
        FifoRead::Received(frame) => frame,
        other => panic!("expected a frame, got {other:?}"),
    };
    assert_eq!(frame.id(), Id::Standard(StandardId::new(0x321).unwrap()));
    assert_eq!(frame.data(), &[0xef, 0xbe, 0xad, 0xde, 0xee, 0xff, 0xc0, 0x00][..]);
    assert_eq!(frame.timestamp(), 0x1234);
    assert_eq!(frame.filter_index(), Some(5));
    // The read was acknowledged at the hardware's get index.
    assert_eq!(regs.rxf0.a.read().fai(), 1);

    // Message-lost flag set: the frame is still handed out, and the driver
    // clears RF0L through the write-1-to-clear interrupt register.
    regs.rxf0.s.write(Rxfs::from(1 | (1 << 25)));
    fake.write_ram(RX_FIFO_0_START, 0x100 << 18);
    fake.write_ram(RX_FIFO_0_START + 1, 0);
    match can.rx_fifo_0.receive() {
        FifoRead::ReceivedWithLoss(frame) => {
            assert_eq!(frame.id(), Id::Standard(StandardId::new(0x100).unwrap()));
        }
        other => panic!("expected a frame with loss, got {other:?}"),
    }
    assert!(regs.ir.read().rf0l());

    // Dedicated buffers: new-data flags for indexes 0 and 1, lower CAN ID
    // wins the any-buffer drain.
    fake.write_ram(RX_BUFFERS_START, 0x200 << 18);
    fake.write_ram(RX_BUFFERS_START + 1, 0);
    fake.write_ram(RX_BUFFERS_START + FRAME_WORDS, 0x100 << 18);
    fake.write_ram(RX_BUFFERS_START + FRAME_WORDS + 1, 0);
    regs.ndat1.write(0b11);

    let frame = can.rx_dedicated_buffers.receive_any().unwrap();
    assert_eq!(frame.id(), Id::Standard(StandardId::new(0x100).unwrap()));
    // Exactly the drained index was handed back (write-1-to-clear).
    assert_eq!(regs.ndat1.read(), 0b10);

    regs.ndat1.write(0b01);
    assert!(can.rx_dedicated_buffers.receive(1).is_none());
    assert!(can.rx_dedicated_buffers.receive(0).is_some());
}

enum Can4 {}
unsafe impl CanId for Can4 {}

#[test]
fn tx_event_fifo_reports_markers() {
    let mut fake = FakeController::new();
    let can = open::<Can4>(&mut fake, HertzU32::MHz(80));
    let mut can = can.finalize().unwrap();
    let regs = fake.regs();

    assert!(can.tx_event_fifo.pop().is_none());
    assert_eq!(can.tx_event_fifo.capacity(), 2);

    // Event at get index 1 for a transmitted frame with marker 0x42,
    // captured at timestamp 0x1234.
    let element = TX_EVENT_FIFO_START + 2;
    fake.write_ram(element, 0x123 << 18);
    fake.write_ram(element + 1, (8 << 16) | (1 << 22) | (0x42 << 24) | 0x1234);
    regs.txefs.write(Txefs::from(1 | (1 << 8)));

    let event = can.tx_event_fifo.pop().unwrap();
    assert_eq!(event.message_marker(), 0x42);
    assert_eq!(event.event_type(), TxEventType::TxEvent);
    assert_eq!(event.dlc(), 8);
    assert_eq!(event.timestamp(), 0x1234);
    assert_eq!(regs.txefa.read().efai(), 1);
}

enum Can5 {}
unsafe impl CanId for Can5 {}

#[test]
fn filters_land_at_their_planned_offsets() {
    let mut fake = FakeController::new();
    let mut can = open::<Can5>(&mut fake, HertzU32::MHz(80));

    let filter = Filter::Classic {
        action: Action::StoreFifo0,
        filter: StandardId::new(0x123).unwrap(),
        mask: StandardId::MAX,
    };
    assert_eq!(can.filters_standard().push(filter).ok(), Some(0));
    assert_eq!(
        fake.read_ram(0),
        0x7ff | (0x123 << 16) | (0x1 << 27) | (2 << 30)
    );

    // The planned count is 8; index 8 is rejected without a write.
    assert_eq!(can.filters_standard().set(8, filter), Err(IndexOutOfRange));
    assert_eq!(fake.read_ram(4), 0);
}

enum Can6 {}
unsafe impl CanId for Can6 {}

#[test]
fn interrupt_enable_routes_and_drains_flags() {
    let mut fake = FakeController::new();
    let mut can = open::<Can6>(&mut fake, HertzU32::MHz(80));
    let regs = fake.regs();

    let wanted: InterruptSet = [
        Interrupt::RxFifo0NewMessage,
        Interrupt::RxFifo0MessageLost,
    ]
    .into_iter()
    .collect();
    let owned = can.interrupts().enable(wanted, InterruptLine::Line0).unwrap();

    let enabled = regs.ie.read();
    assert!(enabled.rf0n());
    assert!(enabled.rf0l());
    assert_eq!(u32::from(enabled), (1 << 0) | (1 << 3));
    assert!(regs.ile.read().eint0());
    assert!(!regs.ile.read().eint1());

    // Enabling an already-owned interrupt fails and names the culprit.
    let again: InterruptSet = [Interrupt::RxFifo0NewMessage].into_iter().collect();
    assert!(can.interrupts().enable(again, InterruptLine::Line0).is_err());

    // A flagged interrupt is visible through the owned set only.
    regs.ir.write(InterruptSet::from((1 << 0) | (1 << 9)));
    let flagged: Vec<Interrupt> = owned.iter_flagged().collect();
    assert_eq!(flagged, [Interrupt::RxFifo0NewMessage]);
}

enum Can7 {}
unsafe impl CanId for Can7 {}

#[test]
fn open_rejects_memory_outside_the_eligible_region() {
    let fake = FakeController::new();
    let mut dependencies = fake.dependencies(HertzU32::MHz(80));
    dependencies.ram = core::ptr::null();
    let memory = Box::leak(Box::new(SharedMemory::new()));
    let result = CanConfigurable::<Can7, _>::new(
        HertzU32::kHz(500),
        dependencies,
        memory,
        counts(),
        DataFieldSize::B64,
    );
    assert!(matches!(
        result,
        Err(ConfigurationError::MemoryNotAddressable)
    ));
}

enum Can8 {}
unsafe impl CanId for Can8 {}

#[test]
fn open_rejects_an_oversubscribed_layout() {
    let mut fake = FakeController::new();
    let dependencies = fake.dependencies(HertzU32::MHz(80));
    let memory = unsafe { &mut *(fake.memory as *mut SharedMemory) };
    let mut counts = counts();
    counts.rx_fifo_0 = 65;
    let result = CanConfigurable::<Can8, _>::new(
        HertzU32::kHz(500),
        dependencies,
        memory,
        counts,
        DataFieldSize::B64,
    );
    assert!(matches!(
        result,
        Err(ConfigurationError::Layout(LayoutError::TooManyElements { .. }))
    ));
}

enum Can9 {}
unsafe impl CanId for Can9 {}

enum Can10 {}
unsafe impl CanId for Can10 {}

#[test]
fn transmission_fails_soft_when_the_bus_stays_busy() {
    let mut fake = FakeController::new();
    let can = open::<Can10>(&mut fake, HertzU32::MHz(80));
    let mut can = can.finalize().unwrap();
    let regs = fake.regs();

    // Receiver activity (ACT = 2) that never ends.
    regs.psr.write(Psr::from(2 << 3));

    let frame = FrameBuilder {
        id: Id::Standard(StandardId::new(0x321).unwrap()),
        frame_type: FrameType::Classic(ClassicFrameType::Data(&[1, 2, 3])),
        store_tx_event: None,
    }
    .build(can.aux.data_field_size())
    .unwrap();

    assert_eq!(
        can.tx.transmit(0, &frame, false),
        Err(TransmitError::BusUnavailable)
    );
    // The element was written, but no request was asserted.
    assert_eq!(regs.txbar.read(), 0);
    assert_eq!(fake.read_ram(TX_BUFFERS_START), 0x321 << 18);

    // A retry succeeds once the bus goes idle.
    regs.psr.write(Psr::from(1 << 3));
    can.tx.transmit(0, &frame, false).unwrap();
    assert_eq!(regs.txbar.read(), 1);
}

enum Can11 {}
unsafe impl CanId for Can11 {}

#[test]
fn filter_policy_set_before_finalize_is_applied() {
    let mut fake = FakeController::new();
    let mut can = open::<Can11>(&mut fake, HertzU32::MHz(80));
    can.set_global_filter_policy(GlobalFilterPolicy {
        non_matching_standard: NonMatchingAction::StoreFifo0,
        non_matching_extended: NonMatchingAction::StoreFifo1,
        reject_remote_standard: false,
        reject_remote_extended: true,
    });

    // The register reflects the policy before the bus runs, and finalize
    // keeps it.
    let check = |regs: &RegisterBlock| {
        let gfc = regs.gfc.read();
        assert_eq!(gfc.anfs(), 0);
        assert_eq!(gfc.anfe(), 1);
        assert!(!gfc.rrfs());
        assert!(gfc.rrfe());
    };
    check(fake.regs());
    let _can = can.finalize().unwrap();
    check(fake.regs());
}

#[test]
fn finalize_rejects_an_unreachable_bit_rate() {
    let mut fake = FakeController::new();
    // An 8 MHz CAN clock cannot express an 8 Mbit/s data phase.
    let mut can = open::<Can9>(&mut fake, HertzU32::MHz(8));
    can.config().mode = Mode::Fd {
        allow_bit_rate_switching: true,
        data_bitrate: HertzU32::MHz(8),
    };
    match can.finalize() {
        Err(ConfigurationError::BitRateDeviation { phase, .. }) => {
            assert_eq!(phase, Phase::Data)
        }
        _ => panic!("expected a bit rate deviation error"),
    }
}
