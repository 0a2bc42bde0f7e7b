//! Frames received from the bus.

use super::*;

/// RX frame in the controller's element representation
#[repr(transparent)]
#[derive(Copy, Clone, Debug)]
pub struct Frame(pub(crate) RawFrame);

impl_raw_accessors!(Frame);

impl Frame {
    /// Create a transmission builder echoing this frame
    pub fn as_tx_builder(&'_ self) -> tx::FrameBuilder<'_> {
        tx::FrameBuilder {
            id: self.id(),
            frame_type: if self.fd_format() {
                tx::FrameType::FlexibleDatarate {
                    payload: self.data(),
                    bit_rate_switching: self.bit_rate_switching(),
                    force_error_state_indicator: false,
                }
            } else {
                tx::FrameType::Classic(if self.is_remote_frame() {
                    tx::ClassicFrameType::Remote {
                        desired_len: dlc_to_len(self.dlc(), self.fd_format()),
                    }
                } else {
                    tx::ClassicFrameType::Data(self.data())
                })
            },
            store_tx_event: None,
        }
    }

    /// Timestamp counter value captured on start of frame reception
    pub fn timestamp(&self) -> u16 {
        self.0.header[1] as u16
    }

    /// Index of the filter that accepted the frame. `None` if no filter
    /// matched, but the frame was accepted due to controller-wide settings.
    pub fn filter_index(&self) -> Option<u8> {
        if self.accepted_non_matching_frame() {
            None
        } else {
            Some(((self.0.header[1] >> 24) & 0x7f) as u8)
        }
    }

    /// `true` if no filter matched, but the frame was accepted due to
    /// controller-wide settings. See also [`Self::filter_index`]
    pub fn accepted_non_matching_frame(&self) -> bool {
        self.0.header[1] & (1 << 31) != 0 // ANMF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reception_metadata_is_decoded_from_the_second_header_word() {
        let frame = Frame(RawFrame {
            header: [0x100 << 18, (8 << 16) | (0x12 << 24) | 0xbeef],
            data: [0; MAX_DATA_LENGTH],
        });
        assert_eq!(frame.timestamp(), 0xbeef);
        assert_eq!(frame.filter_index(), Some(0x12));
        assert!(!frame.accepted_non_matching_frame());
    }

    #[test]
    fn non_matching_frames_report_no_filter() {
        let frame = Frame(RawFrame {
            header: [0, (1u32 << 31) | (3 << 24)],
            data: [0; MAX_DATA_LENGTH],
        });
        assert!(frame.accepted_non_matching_frame());
        assert_eq!(frame.filter_index(), None);
    }
}
