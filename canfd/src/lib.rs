#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
//! # canfd
//!
//! ## Overview
//! This crate provides a platform-agnostic CAN-FD controller HAL.
//!
//! It provides the following features:
//!
//! - classic CAN and CAN FD with bit rate switching support
//! - automatic bit timing derivation from a target bit rate, with an
//!   explicit acceptance threshold for the quantization error
//! - message RAM partitioning from runtime element counts, validated
//!   against the controller's capacity before anything is programmed
//! - message transmission using dedicated buffers, FIFO and priority queue
//! - message transmission cancellation and TX event capture
//! - message reception using dedicated buffers and two FIFOs
//! - acceptance filter configuration
//! - modular interrupt handling abstractions that enable lock-less usage of
//!   the two HW interrupt lines
//!
//! The controller is embedded in the MCU like any other peripheral. The
//! interface between them consists of two clock signals, two HW interrupt
//! lines, a memory-mapped register block and a dedicated RAM region (the
//! message RAM) both CPU and controller access.
//!
//! For the abstractions to be operational, that interface has to be
//! properly configured. This is assured through the safety requirements of
//! the [`canfd_core`] traits, which platform-specific HALs are expected to
//! implement: a [`Dependencies`] instance vouches for clocks, pins and
//! resets and hands the driver its register block and message RAM
//! addresses.
//!
//! ## Message RAM
//!
//! The message RAM must live at the address the platform routes to the
//! controller; [`Dependencies::eligible_message_ram_start`] lets the driver
//! verify the region a user provides, yet it is up to the user to place it
//! there. The usual way is a dedicated linker section:
//!
//! ```text
//! MEMORY
//! {
//!   FLASH : ORIGIN = 0x400000, LENGTH = 2M
//!   CAN : ORIGIN = 0x20400000, LENGTH = 64K
//!   RAM : ORIGIN = 0x20410000, LENGTH = 192K
//! }
//!
//! SECTIONS {
//!   .can (NOLOAD) :
//!   {
//!     *(.can .can.*);
//!   } > CAN
//! }
//! ```
//!
//! with the backing storage linked into it through `#[link_section]`. How
//! the RAM is partitioned is decided at runtime by the element counts
//! passed when opening the bus; see [`ElementCounts`].
//!
//! ## General usage example
//!
//! ```no_run
//! use canfd::bus::CanConfigurable;
//! use canfd::config::Mode;
//! use canfd::embedded_can as ecan;
//! use canfd::filter::{Action, Filter};
//! use canfd::message::DataFieldSize;
//! use canfd::prelude::*;
//! use canfd::ram::{ElementCounts, SharedMemory};
//! use fugit::HertzU32;
//! # pub enum Can0 {}
//! # unsafe impl canfd::core::CanId for Can0 {}
//! # pub struct Dependencies;
//! # unsafe impl canfd::core::Dependencies<Can0> for Dependencies {
//! #     fn register_block_start(&self) -> *const () { unreachable!() }
//! #     fn eligible_message_ram_start(&self) -> *const () { unreachable!() }
//! #     fn host_clock(&self) -> HertzU32 { unreachable!() }
//! #     fn can_clock(&self) -> HertzU32 { unreachable!() }
//! # }
//!
//! #[link_section = ".can"]
//! static mut MESSAGE_RAM: SharedMemory = SharedMemory::new();
//!
//! // `Dependencies` comes from the platform HAL.
//! let dependencies = Dependencies;
//!
//! let counts = ElementCounts {
//!     standard_filters: 8,
//!     tx_buffers: 8,
//!     rx_fifo_0: 16,
//!     tx_event_fifo: 8,
//!     ..Default::default()
//! };
//! let mut can = CanConfigurable::<Can0, _>::new(
//!     HertzU32::kHz(500),
//!     dependencies,
//!     unsafe { &mut MESSAGE_RAM },
//!     counts,
//!     DataFieldSize::B64,
//! )
//! .unwrap();
//!
//! // The bus is still halted and the config struct can be modified. More
//! // information can be found in the `config` module.
//! can.config().mode = Mode::Fd {
//!     allow_bit_rate_switching: true,
//!     data_bitrate: HertzU32::MHz(2),
//! };
//!
//! // This filter will put all messages with a standard ID into RX FIFO 0
//! can.filters_standard()
//!     .push(Filter::Classic {
//!         action: Action::StoreFifo0,
//!         filter: ecan::StandardId::MAX,
//!         mask: ecan::StandardId::ZERO,
//!     })
//!     .unwrap_or_else(|_| panic!("Standard filter application failed"));
//!
//! // Call to `finalize` puts the bus into operational mode
//! let can = can.finalize().unwrap();
//!
//! // `can` can be split into independent pieces
//! let rx_fifo_0 = can.rx_fifo_0;
//! let tx = can.tx;
//! let tx_event_fifo = can.tx_event_fifo;
//! let aux = can.aux;
//! ```
//!
//! [`Dependencies`]: canfd_core::Dependencies
//! [`Dependencies::eligible_message_ram_start`]: canfd_core::Dependencies::eligible_message_ram_start
//! [`ElementCounts`]: crate::ram::ElementCounts

pub mod bus;
pub mod config;
pub mod filter;
pub mod interrupt;
pub mod message;
pub mod prelude;
pub mod ram;
pub mod reg;
pub mod rx_dedicated_buffers;
pub mod rx_fifo;
pub mod tx_buffers;
pub mod tx_event_fifo;

mod spin;

pub use canfd_core as core;
pub use embedded_can;
