//! Commonly used traits

pub use crate::bus::CanBus as _;
pub use crate::filter::FilterElement as _;
pub use crate::message::Raw as _;
pub use crate::rx_fifo::GetRxFifoRegs as _;
