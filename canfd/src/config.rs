//! CAN bus configuration
//!
//! Bit timing is derived from a target bit rate by [`BitTiming::solve`], a
//! search over the whole legal time-quanta range in the style of the Linux
//! `can_calc_bittiming` helper. The search is total: it always returns the
//! closest achievable timing, and the achieved bit rate is reported back so
//! the caller can judge the quantization error. Whether that error is
//! acceptable is decided at configuration time against
//! [`CanConfig::max_bitrate_error`], not inside the search.

use core::ops::RangeInclusive;
use fugit::HertzU32;

/// Synchronization segment, always one time quantum
const SYNC_SEG: u32 = 1;

/// Data-phase bit rates above this get transmitter delay compensation
const TDC_THRESHOLD_BPS: u32 = 2_500_000;

/// Default acceptance threshold for the bit rate quantization error,
/// in one-hundredth percent units (0.50%)
pub const DEFAULT_MAX_BITRATE_ERROR: u16 = 50;

/// Configuration for the CAN bus
#[derive(Copy, Clone)]
pub struct CanConfig {
    /// Target bit rate for everything except the data phase of bit rate
    /// switched FD frames
    pub bitrate: HertzU32,
    /// Run controller in CAN-FD mode
    pub mode: Mode,
    /// Modes of testing
    pub loopback: bool,
    /// Maximum accepted deviation between the target bit rate and the rate
    /// the solver can actually achieve, in one-hundredth percent units
    ///
    /// Exceeding it fails configuration; it never rejects the solver's
    /// result silently.
    pub max_bitrate_error: u16,
    /// Timestamp configuration
    pub timestamp: Timestamp,
    /// RX FIFO 0
    pub rx_fifo_0: RxFifoConfig,
    /// RX FIFO 1
    pub rx_fifo_1: RxFifoConfig,
    /// TX configuration
    pub tx: TxConfig,
}

impl CanConfig {
    /// Create an instance
    ///
    /// Nominal bitrate value must be provided, all other settings come
    /// pre-populated with default values.
    pub fn new(bitrate: HertzU32) -> Self {
        Self {
            bitrate,
            mode: Default::default(),
            loopback: Default::default(),
            max_bitrate_error: DEFAULT_MAX_BITRATE_ERROR,
            timestamp: Default::default(),
            rx_fifo_0: Default::default(),
            rx_fifo_1: Default::default(),
            tx: Default::default(),
        }
    }
}

/// Enable/disable CAN-FD and related features
#[derive(Default, Copy, Clone)]
pub enum Mode {
    /// Classic mode with 8-bytes data. Reception of an FD frame is considered
    /// an error.
    #[default]
    Classic,
    /// Transmission and reception of CAN FD frames (with up to 64 bytes of
    /// data) is enabled. This does not prevent use of classic CAN frames.
    Fd {
        /// If `true`, FD frames can be transmitted with bit rate switching.
        ///
        /// Regardless of this setting, data phase timing still must be
        /// configured as *reception* of bit-rate-switched frames is still
        /// possible.
        allow_bit_rate_switching: bool,
        /// Target bit rate for the data phase of bit rate switched FD frames
        data_bitrate: HertzU32,
    },
}

/// Timestamp counter configuration
#[derive(Copy, Clone)]
pub struct Timestamp {
    /// Counting mode of time stamp timer
    pub select: TimestampSelect,
    /// Time stamp timer prescaler, bit times per tick
    /// Valid values are: 1 <= ts_prescale <= 16
    pub prescaler: u8,
}

impl Default for Timestamp {
    fn default() -> Self {
        Self {
            select: TimestampSelect::Zero,
            prescaler: 1,
        }
    }
}

/// Counting mode of the timestamp timer
#[derive(Default, Copy, Clone, PartialEq, Eq)]
pub enum TimestampSelect {
    /// Counter is disabled, timestamps read as zero
    #[default]
    Zero,
    /// Counter increments every `prescaler` bit times
    Increment,
    /// Timestamps come from an external counter
    External,
}

impl TimestampSelect {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Zero => 0,
            Self::Increment => 1,
            Self::External => 2,
        }
    }
}

/// Denotes a RX FIFO configuration
#[derive(Default, Copy, Clone)]
pub struct RxFifoConfig {
    /// FIFO mode
    pub mode: RxFifoMode,
    /// Denotes queue fullness required to trigger a corresponding interrupt
    ///
    /// Any value greater than 64 is interpreted as 64; 0 means that interrupt
    /// is disabled
    pub watermark: u8,
}

/// Mode of operation for the RX FIFO
#[derive(Default, Copy, Clone)]
pub struct RxFifoMode(RxFifoModeVariant);

impl RxFifoMode {
    /// Blocking mode
    ///
    /// When the RX FIFO is full, incoming frames are dropped until at least
    /// one frame has been read out from the FIFO.
    pub fn blocking() -> Self {
        Self(RxFifoModeVariant::Blocking)
    }
    /// Overwriting mode
    ///
    /// When the RX FIFO is full, the oldest frame will be deleted and a new
    /// frame will take its place.
    ///
    /// # Safety
    /// For the RX FIFO running in this mode, the controller *does NOT
    /// provide* any synchronization primitives that the user can rely on in
    /// order to guarantee integrity of the data being received.
    ///
    /// General guideline from the datasheet suggests that the user should
    /// never read the oldest element in queue (as there is a risk that the
    /// frame is currently being overwritten) and the index should be
    /// offsetted by 1 or more (counting from the oldest frame) depending on
    /// the speed of the CPU.
    pub unsafe fn overwrite() -> Self {
        Self(RxFifoModeVariant::Overwrite)
    }
}

/// Mode of operation for the RX FIFO (inner enum)
#[derive(Default, Copy, Clone)]
pub enum RxFifoModeVariant {
    /// Blocking mode
    ///
    /// More details at [`RxFifoMode::blocking`]
    #[default]
    Blocking,
    /// Overwriting mode
    ///
    /// More details at [`RxFifoMode::overwrite`]
    Overwrite,
}

impl From<RxFifoMode> for bool {
    fn from(val: RxFifoMode) -> Self {
        match val.0 {
            RxFifoModeVariant::Overwrite => true,
            RxFifoModeVariant::Blocking => false,
        }
    }
}

/// Denotes a TX related configuration
#[derive(Default, Copy, Clone)]
pub struct TxConfig {
    /// Denotes TX event queue fullness required to trigger a corresponding
    /// interrupt
    ///
    /// Any value greater than 32 is interpreted as 32; 0 means that interrupt
    /// is disabled
    pub tx_event_fifo_watermark: u8,
    /// Number of TX buffers reserved for dedicated (indexed) transmission
    ///
    /// The remaining planned TX buffers form the queue. Values above the
    /// planned buffer count are capped to it, leaving no queue.
    pub dedicated_buffers: u8,
    /// TX queue submode
    pub tx_queue_submode: TxQueueMode,
}

/// Mode of operation for the transmit queue
#[derive(Default, Copy, Clone)]
pub enum TxQueueMode {
    /// Frames are sent according to the order they are enqueued
    #[default]
    Fifo,
    /// Frames are sent according to their priority
    ///
    /// Lower ID means higher priority. Frames of the same ID are sent in an
    /// arbitrary order. This is the same order as arbitration on the bus
    /// would give.
    Priority,
}

impl From<TxQueueMode> for bool {
    fn from(val: TxQueueMode) -> Self {
        match val {
            TxQueueMode::Priority => true,
            TxQueueMode::Fifo => false,
        }
    }
}

/// Bit timing phase being solved for
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Arbitration phase and non-switched frames
    Nominal,
    /// Data phase of bit rate switched FD frames
    Data,
}

impl Phase {
    pub(crate) fn ranges(self) -> &'static BitTimingRanges {
        match self {
            Self::Nominal => &NOMINAL_BIT_TIMING_RANGES,
            Self::Data => &DATA_BIT_TIMING_RANGES,
        }
    }
}

/// Valid values of a [`BitTiming`] struct
pub(crate) struct BitTimingRanges {
    pub(crate) tseg1: RangeInclusive<u32>,
    pub(crate) tseg2: RangeInclusive<u32>,
    pub(crate) prescaler: RangeInclusive<u32>,
    pub(crate) sjw_max: u32,
}

pub(crate) const NOMINAL_BIT_TIMING_RANGES: BitTimingRanges = BitTimingRanges {
    tseg1: 2..=256,
    tseg2: 2..=128,
    prescaler: 1..=512,
    sjw_max: 128,
};

pub(crate) const DATA_BIT_TIMING_RANGES: BitTimingRanges = BitTimingRanges {
    tseg1: 1..=32,
    tseg2: 1..=16,
    prescaler: 1..=32,
    sjw_max: 16,
};

/// Bit-timing parameters for one phase
///
/// All fields hold *real* values; the minus-one encoding the hardware
/// registers expect is applied when the registers are written.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitTiming {
    /// Bit rate prescaler
    pub prescaler: u16,
    /// Time quanta between the synchronization segment and the sample point
    pub tseg1: u16,
    /// Time quanta after the sample point
    pub tseg2: u8,
    /// Synchronization jump width
    pub sjw: u8,
    /// Bit rate this timing actually produces
    ///
    /// May differ from the requested rate due to quantization; the deviation
    /// is checked against [`CanConfig::max_bitrate_error`] when the
    /// configuration is applied.
    pub bitrate: HertzU32,
    /// Achieved sample point in thousandths of the bit time
    pub sample_point: u16,
    /// Transmitter delay compensation offset in CAN clock periods
    ///
    /// `Some` only for data-phase timings fast enough to need secondary
    /// sample point correction.
    pub tdc_offset: Option<u8>,
}

#[derive(Copy, Clone)]
struct SegmentSplit {
    tseg1: u32,
    tseg2: u32,
    sample_point: u32,
    sample_point_error: u32,
}

impl BitTiming {
    /// Finds the timing parameters that get closest to `bitrate`
    ///
    /// The target sample point follows the usual NRZ defaults: 75.0% above
    /// 800 kbit/s, 80.0% above 500 kbit/s, 87.5% otherwise. Candidate
    /// bit times are walked from the longest legal one down to the shortest;
    /// for each, the prescaler is derived by parity-rounded integer division
    /// and clamped into the legal range, and the candidate with the smallest
    /// rate error wins, ties broken by sample point closeness.
    ///
    /// The search cannot fail. If the clock cannot express the requested
    /// rate, the returned [`BitTiming::bitrate`] simply deviates from the
    /// target.
    pub fn solve(bitrate: HertzU32, can_clock: HertzU32, phase: Phase) -> Self {
        let ranges = phase.ranges();
        let clock = can_clock.to_Hz();
        let target = bitrate.to_Hz().max(1);

        let sample_point_target = default_sample_point(target);

        let max_tseg = (ranges.tseg1.end() + ranges.tseg2.end()) * 2 + 1;
        let min_tseg = (ranges.tseg1.start() + ranges.tseg2.start()) * 2;

        let mut best_bitrate_error = u32::MAX;
        let mut best_sample_point_error = u32::MAX;
        let mut best_tseg = min_tseg / 2;
        let mut best_prescaler = *ranges.prescaler.start();

        for tseg in (min_tseg..=max_tseg).rev() {
            let tsegall = SYNC_SEG + tseg / 2;
            let prescaler = ((clock as u64 / (tsegall as u64 * target as u64)) as u32 + tseg % 2)
                .clamp(*ranges.prescaler.start(), *ranges.prescaler.end());

            let achieved = clock / (prescaler * tsegall);
            let bitrate_error = target.abs_diff(achieved);
            if bitrate_error > best_bitrate_error {
                continue;
            }
            if bitrate_error < best_bitrate_error {
                best_sample_point_error = u32::MAX;
            }

            let split = split_segments(ranges, sample_point_target, tseg / 2);
            if split.sample_point_error >= best_sample_point_error {
                continue;
            }

            best_bitrate_error = bitrate_error;
            best_sample_point_error = split.sample_point_error;
            best_tseg = tseg / 2;
            best_prescaler = prescaler;

            if bitrate_error == 0 && split.sample_point_error == 0 {
                break;
            }
        }

        let split = split_segments(ranges, sample_point_target, best_tseg);
        let sjw = split.tseg2.min(ranges.sjw_max);
        let achieved = clock / (best_prescaler * (SYNC_SEG + best_tseg));

        let tdc_offset = if phase == Phase::Data && achieved > TDC_THRESHOLD_BPS {
            // Secondary sample point offset, in CAN clock periods from the
            // start of the bit.
            Some((best_prescaler * (SYNC_SEG + split.tseg1)).min(127) as u8)
        } else {
            None
        };

        Self {
            prescaler: best_prescaler as u16,
            tseg1: split.tseg1 as u16,
            tseg2: split.tseg2 as u8,
            sjw: sjw as u8,
            bitrate: HertzU32::from_raw(achieved),
            sample_point: split.sample_point as u16,
            tdc_offset,
        }
    }

    /// Returns the number of time quanta that make up one bit time
    pub fn time_quanta_per_bit(&self) -> u32 {
        SYNC_SEG + u32::from(self.tseg1) + u32::from(self.tseg2)
    }

    /// Deviation from `target` in one-hundredth percent units
    pub fn bitrate_error(&self, target: HertzU32) -> u32 {
        let target = target.to_Hz().max(1);
        let error = target.abs_diff(self.bitrate.to_Hz());
        if error == 0 {
            0
        } else {
            (((error as u64) * 10_000 / target as u64) as u32).max(1)
        }
    }
}

fn default_sample_point(bitrate: u32) -> u32 {
    if bitrate > 800_000 {
        750
    } else if bitrate > 500_000 {
        800
    } else {
        875
    }
}

/// Splits `tseg` quanta (bit time without the synchronization segment) into
/// tseg1/tseg2 so that the sample point lands as close below the target as
/// the segment limits allow.
fn split_segments(ranges: &BitTimingRanges, sample_point_target: u32, tseg: u32) -> SegmentSplit {
    let mut best: Option<SegmentSplit> = None;
    let mut fallback: Option<SegmentSplit> = None;

    for i in 0..=1 {
        let bit_time = tseg + SYNC_SEG;
        let mut tseg2 = (bit_time - (sample_point_target * bit_time) / 1000)
            .saturating_sub(i)
            .clamp(*ranges.tseg2.start(), *ranges.tseg2.end());
        let mut tseg1 = tseg - tseg2;
        if tseg1 > *ranges.tseg1.end() {
            tseg1 = *ranges.tseg1.end();
            tseg2 = tseg - tseg1;
        }

        let sample_point = 1000 * (bit_time - tseg2) / bit_time;
        let candidate = SegmentSplit {
            tseg1,
            tseg2,
            sample_point,
            sample_point_error: sample_point_target.abs_diff(sample_point),
        };

        if sample_point <= sample_point_target
            && best.map_or(true, |b| candidate.sample_point_error < b.sample_point_error)
        {
            best = Some(candidate);
        }
        if fallback.map_or(true, |f| candidate.sample_point_error < f.sample_point_error) {
            fallback = Some(candidate);
        }
    }

    // The late-sampling fallback only triggers when the segment limits make
    // sampling at or before the target impossible; the search stays total.
    match best {
        Some(split) => split,
        None => {
            let mut split = fallback.unwrap_or(SegmentSplit {
                tseg1: *ranges.tseg1.start(),
                tseg2: *ranges.tseg2.start(),
                sample_point: 0,
                sample_point_error: u32::MAX,
            });
            split.sample_point_error = u32::MAX;
            split
        }
    }
}
