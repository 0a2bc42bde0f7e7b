//! Events for frames sent on the bus

use super::*;

/// TX event in the controller's element representation
///
/// Events carry a copy of the transmitted frame's header but no payload.
#[repr(transparent)]
#[derive(Copy, Clone, Debug)]
pub struct TxEvent(pub(crate) RawFrame);

impl_raw_accessors!(TxEvent);

impl TxEvent {
    /// Marker assigned to the frame at build time
    pub fn message_marker(&self) -> u8 {
        (self.0.header[1] >> 24) as u8
    }

    /// What kind of event this is
    pub fn event_type(&self) -> TxEventType {
        TxEventType::from((self.0.header[1] >> 22) & 3)
    }

    /// Timestamp counter value captured on start of frame transmission
    pub fn timestamp(&self) -> u16 {
        self.0.header[1] as u16
    }
}

/// Type of a TX event
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TxEventType {
    /// Value not defined by the hardware
    Reserved,
    /// Frame was transmitted
    TxEvent = 1,
    /// Frame was transmitted despite a pending cancellation request
    TxInSpiteOfCancellation = 2,
}

impl From<u32> for TxEventType {
    fn from(value: u32) -> Self {
        match value {
            1 => Self::TxEvent,
            2 => Self::TxInSpiteOfCancellation,
            _ => Self::Reserved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_and_event_type_are_decoded() {
        let event = TxEvent(RawFrame {
            header: [0x42 << 18, (8 << 16) | (1 << 22) | (0x99 << 24)],
            data: [0; MAX_DATA_LENGTH],
        });
        assert_eq!(event.message_marker(), 0x99);
        assert_eq!(event.event_type(), TxEventType::TxEvent);
        assert_eq!(event.dlc(), 8);
    }

    #[test]
    fn timestamp_is_the_low_header_half_word() {
        let event = TxEvent(RawFrame {
            header: [0, (8 << 16) | 0xcafe],
            data: [0; MAX_DATA_LENGTH],
        });
        assert_eq!(event.timestamp(), 0xcafe);
    }
}
