//! Handling of messages/frames

pub mod rx;
pub mod tx;
mod tx_event;

pub use tx_event::{TxEvent, TxEventType};

use core::cmp::min;
use embedded_can::{ExtendedId, Id, StandardId};
use vcell::VolatileCell;

/// Largest payload a CAN-FD frame can carry, in bytes
pub const MAX_DATA_LENGTH: usize = 64;

/// Size of the frame element header, in bytes
pub(crate) const HEADER_BYTES: usize = 8;

/// Payload capacity of the buffer and FIFO elements in message RAM
///
/// The controller stores every frame element as an 8-byte header followed by
/// a data field of this size; frames shorter than the field leave the tail
/// unused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataFieldSize {
    /// 8 byte data field
    B8,
    /// 12 byte data field
    B12,
    /// 16 byte data field
    B16,
    /// 20 byte data field
    B20,
    /// 24 byte data field
    B24,
    /// 32 byte data field
    B32,
    /// 48 byte data field
    B48,
    /// 64 byte data field
    #[default]
    B64,
}

impl DataFieldSize {
    /// Data field size in bytes
    pub fn bytes(self) -> usize {
        match self {
            Self::B8 => 8,
            Self::B12 => 12,
            Self::B16 => 16,
            Self::B20 => 20,
            Self::B24 => 24,
            Self::B32 => 32,
            Self::B48 => 48,
            Self::B64 => 64,
        }
    }

    /// Value of the element size configuration field selecting this size
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::B8 => 0,
            Self::B12 => 1,
            Self::B16 => 2,
            Self::B20 => 3,
            Self::B24 => 4,
            Self::B32 => 5,
            Self::B48 => 6,
            Self::B64 => 7,
        }
    }

    /// Full element size (header plus data field) in bytes
    pub(crate) fn element_bytes(self) -> usize {
        HEADER_BYTES + self.bytes()
    }
}

/// Data does not fit in the selected data field size
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TooMuchData;

/// Finds the smallest data length code that encodes at least `len` bytes
///
/// Any length in `0..=8` maps to itself; above that the CAN-FD payload sizes
/// are non-linear and the length is rounded up to the nearest legal size.
pub fn len_to_dlc(len: usize, fd_format: bool) -> Result<u8, TooMuchData> {
    if fd_format {
        match len {
            0..=8 => Ok(len as u8),
            9..=12 => Ok(9),
            13..=16 => Ok(10),
            17..=20 => Ok(11),
            21..=24 => Ok(12),
            25..=32 => Ok(13),
            33..=48 => Ok(14),
            49..=64 => Ok(15),
            _ => Err(TooMuchData),
        }
    } else {
        match len {
            0..=8 => Ok(len as u8),
            _ => Err(TooMuchData),
        }
    }
}

/// Converts a data length code to a length in bytes
pub fn dlc_to_len(dlc: u8, fd_format: bool) -> usize {
    if fd_format {
        match dlc {
            0..=8 => dlc.into(),
            9 => 12,
            10 => 16,
            11 => 20,
            12 => 24,
            13 => 32,
            14 => 48,
            _ => 64,
        }
    } else {
        match dlc {
            0..=8 => dlc.into(),
            _ => 8,
        }
    }
}

/// RX or TX frame in the controller's element representation
#[derive(Copy, Clone, Debug)]
pub(crate) struct RawFrame {
    pub(crate) header: [u32; 2],
    pub(crate) data: [u8; MAX_DATA_LENGTH],
}

/// Common accessors for all raw frame representations
pub trait Raw {
    /// CAN identifier of the frame
    fn id(&self) -> Id;
    /// Data length in bytes
    fn decoded_dlc(&self) -> usize;
    /// Data length code
    fn dlc(&self) -> u8;
    /// `true` if the header indicates the CAN FD format
    fn fd_format(&self) -> bool;
    /// Remote transmission request
    fn is_remote_frame(&self) -> bool;
    /// Data field
    fn data(&self) -> &[u8];
    /// `true` if the frame uses an extended (29-bit) ID
    fn is_extended(&self) -> bool;
    /// `true` if the sender indicated "error passive" state
    fn is_transmitter_error_passive(&self) -> bool;
    /// `true` if bit rate switching is used
    fn bit_rate_switching(&self) -> bool;
}

impl RawFrame {
    pub(crate) fn id(&self) -> Id {
        if self.is_extended() {
            // The mask ensures the ID is in range for a 29-bit integer
            Id::Extended(unsafe {
                ExtendedId::new_unchecked(self.header[0] & ExtendedId::MAX.as_raw())
            })
        } else {
            // The mask ensures the ID is in range for an 11-bit integer
            Id::Standard(unsafe {
                StandardId::new_unchecked((self.header[0] >> 18) as u16 & StandardId::MAX.as_raw())
            })
        }
    }

    pub(crate) fn decoded_dlc(&self) -> usize {
        dlc_to_len(self.dlc(), self.fd_format())
    }

    pub(crate) fn dlc(&self) -> u8 {
        ((self.header[1] >> 16) & 0xf) as u8 // DLC
    }

    pub(crate) fn fd_format(&self) -> bool {
        self.header[1] & (1 << 21) != 0 // FDF
    }

    pub(crate) fn is_remote_frame(&self) -> bool {
        self.header[0] & (1 << 29) != 0 // RTR
    }

    pub(crate) fn data(&self) -> &[u8] {
        if !self.is_remote_frame() {
            &self.data[..min(self.decoded_dlc(), self.data.len())]
        } else {
            &[]
        }
    }

    pub(crate) fn is_extended(&self) -> bool {
        self.header[0] & (1 << 30) != 0 // XTD
    }

    pub(crate) fn is_transmitter_error_passive(&self) -> bool {
        self.header[0] & (1 << 31) != 0 // ESI
    }

    pub(crate) fn bit_rate_switching(&self) -> bool {
        self.header[1] & (1 << 20) != 0 // BRS
    }

    /// Writes the header and the used part of the data field into a message
    /// RAM element.
    pub(crate) fn store(&self, element: &[VolatileCell<u32>]) {
        element[0].set(self.header[0]);
        element[1].set(self.header[1]);
        let data_words = element.len() - 2;
        let used = if self.is_remote_frame() {
            0
        } else {
            min(self.decoded_dlc().div_ceil(4), data_words)
        };
        for (i, cell) in element[2..2 + used].iter().enumerate() {
            let b = &self.data[4 * i..4 * i + 4];
            cell.set(u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
        }
    }

    /// Reads a frame back out of a message RAM element.
    pub(crate) fn load(element: &[VolatileCell<u32>]) -> Self {
        let header = [element[0].get(), element[1].get()];
        let mut raw = Self {
            header,
            data: [0; MAX_DATA_LENGTH],
        };
        let data_words = element.len() - 2;
        let used = min(raw.decoded_dlc().div_ceil(4), data_words);
        for i in 0..used {
            raw.data[4 * i..4 * i + 4].copy_from_slice(&element[2 + i].get().to_le_bytes());
        }
        raw
    }
}

macro_rules! impl_raw_accessors {
    ($t:ty) => {
        impl $crate::message::Raw for $t {
            fn id(&self) -> embedded_can::Id {
                self.0.id()
            }
            fn decoded_dlc(&self) -> usize {
                self.0.decoded_dlc()
            }
            fn dlc(&self) -> u8 {
                self.0.dlc()
            }
            fn fd_format(&self) -> bool {
                self.0.fd_format()
            }
            fn is_remote_frame(&self) -> bool {
                self.0.is_remote_frame()
            }
            fn data(&self) -> &[u8] {
                self.0.data()
            }
            fn is_extended(&self) -> bool {
                self.0.is_extended()
            }
            fn is_transmitter_error_passive(&self) -> bool {
                self.0.is_transmitter_error_passive()
            }
            fn bit_rate_switching(&self) -> bool {
                self.0.bit_rate_switching()
            }
        }
    };
}
pub(crate) use impl_raw_accessors;
