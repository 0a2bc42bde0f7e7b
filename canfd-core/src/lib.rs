#![no_std]
#![warn(missing_docs)]

//! `canfd-core` provides the thin integration layer between the platform
//! independent [`canfd`] crate and platform specific HAL crates.
//!
//! Traits from this crate are not supposed to be implemented by the
//! application developer; implementations should be provided by target HALs.
//!
//! Integrators are responsible for the soundness of the trait
//! implementations and for conforming to their safety prerequisites.
//!
//! [`canfd`]: <https://docs.rs/crate/canfd/>

pub use fugit;

/// Trait representing CAN-FD controller identity
///
/// Types implementing this trait are expected to be zero-sized marker types
/// identifying a specific controller instance on the platform (there might
/// be more than one). The marker only conveys *which* controller an
/// abstraction talks to; whether the controller can actually be accessed is
/// expressed by the [`Dependencies`] trait.
///
/// # Safety
/// At most one set of driver abstractions parametrized by a given `CanId`
/// type may exist at the same time.
pub unsafe trait CanId {}

/// Trait representing CAN-FD controller dependencies
///
/// Structs implementing [`Dependencies`] should
/// - enclose all object representable dependencies of the controller and
///   release them upon destruction
/// - be constructible only when it is safe and sound to interact with the
///   controller (clocks, pins and resets have been already configured)
/// - be a singleton (only a single instance of [`Dependencies`] for a
///   specific [`CanId`] must exist at the same time)
///
/// # Safety
/// While a [`Dependencies`] instance exists
/// - the returned register block and message RAM pointers must be valid for
///   volatile reads and writes and must not be accessed by any other code
/// - CAN related clocks must not change
/// - CAN related pin modes must not change
pub unsafe trait Dependencies<Id: CanId> {
    /// Start address of the controller's HW register block.
    fn register_block_start(&self) -> *const ();
    /// Start address of the controller's dedicated message RAM.
    ///
    /// The driver validates that the message RAM storage handed to it at
    /// construction time lives at this address.
    fn eligible_message_ram_start(&self) -> *const ();
    /// Frequency of the host / main / CPU clock.
    ///
    /// Used to calibrate the bounded busy-wait deadlines (bus idle,
    /// halt/run confirmation).
    fn host_clock(&self) -> fugit::HertzU32;
    /// Frequency of the CAN specific asynchronous clock.
    ///
    /// The bit-timing solver derives prescaler and segment values from this
    /// clock. It should have reasonably high precision and must be equal to
    /// or slower than the host clock.
    fn can_clock(&self) -> fugit::HertzU32;
}
