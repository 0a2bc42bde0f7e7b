//! Frames to be sent on the bus

use super::*;

/// TX frame in the controller's element representation
#[repr(transparent)]
#[derive(Copy, Clone, Debug)]
pub struct Frame(pub(crate) RawFrame);

impl_raw_accessors!(Frame);

/// Selects the type of the Classic CAN frame.
pub enum ClassicFrameType<'a> {
    /// 0-8 byte frame payload
    Data(&'a [u8]),
    /// Requests transmission of the identified frame
    Remote {
        /// Length, in bytes, of the requested frame
        desired_len: usize,
    },
}

/// Selects frame type along with the valid payload type and configuration
/// specific to the chosen format.
pub enum FrameType<'a> {
    /// Classic CAN
    Classic(ClassicFrameType<'a>),
    /// CAN FD frame. Note that the controller must be initialized with CAN FD
    /// enabled to support this format.
    FlexibleDatarate {
        /// 0-64 byte frame payload. The payload must not be bigger than the
        /// data field size chosen at configuration time.
        payload: &'a [u8],
        /// Parts of the frame are transmitted at a higher bit rate. Note that
        /// bit rate switching must be enabled in the controller configuration
        /// as well.
        bit_rate_switching: bool,
        /// If `true`, the error state indicator of the frame will indicate
        /// 'error passive'. If `false`, the actual state of the
        /// controller will be indicated.
        force_error_state_indicator: bool,
    },
}

/// Describes a CAN frame that is not yet converted to the representation the
/// controller understands.
pub struct FrameBuilder<'a> {
    /// CAN identifier for the frame
    pub id: Id,
    /// Frame type with a payload
    pub frame_type: FrameType<'a>,
    /// If `Some(marker)`, this frame will store an event identified by
    /// `marker` in the TX event queue.
    pub store_tx_event: Option<u8>,
}

impl<'a> FrameBuilder<'a> {
    /// Create the frame in the format required by the controller.
    ///
    /// `data_field_size` is the data field size the controller was configured
    /// with; payloads exceeding it are rejected.
    pub fn build(self, data_field_size: DataFieldSize) -> Result<Frame, TooMuchData> {
        let mut data = [0; MAX_DATA_LENGTH];

        let mut copy_payload = |d: &[u8]| {
            if d.len() > data_field_size.bytes() {
                return Err(TooMuchData);
            }
            data[..d.len()].copy_from_slice(d);
            Ok(())
        };

        let id_field = match self.id {
            Id::Standard(id) => (id.as_raw() as u32) << 18,
            Id::Extended(id) => id.as_raw(),
        };
        let xtd = matches!(self.id, Id::Extended(_));
        let (fdf, brs, esi, rtr, len) = match self.frame_type {
            FrameType::Classic(payload) => {
                let (rtr, len) = match payload {
                    ClassicFrameType::Data(payload) => {
                        copy_payload(payload)?;
                        (false, payload.len())
                    }
                    ClassicFrameType::Remote { desired_len } => (true, desired_len),
                };
                (false, false, false, rtr, len)
            }
            FrameType::FlexibleDatarate {
                payload,
                bit_rate_switching: brs,
                force_error_state_indicator: esi,
            } => {
                copy_payload(payload)?;
                (true, brs, esi, false, payload.len())
            }
        };
        let dlc = len_to_dlc(len, fdf)?;
        let efc = self.store_tx_event.is_some();
        let mm = self.store_tx_event.unwrap_or(0);

        let t0 = id_field | (rtr as u32) << 29 | (xtd as u32) << 30 | (esi as u32) << 31;
        let t1 = (((dlc & 0xf) as u32) << 16)
            | ((brs as u32) << 20)
            | ((fdf as u32) << 21)
            | ((efc as u32) << 23)
            | ((mm as u32) << 24);
        Ok(Frame(RawFrame {
            header: [t0, t1],
            data,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_can::StandardId;

    #[test]
    fn fd_frame_header_encoding() {
        let frame = FrameBuilder {
            id: Id::Standard(StandardId::new(0x321).unwrap()),
            frame_type: FrameType::FlexibleDatarate {
                payload: &[1; 24],
                bit_rate_switching: true,
                force_error_state_indicator: false,
            },
            store_tx_event: Some(0x5a),
        }
        .build(DataFieldSize::B64)
        .unwrap();
        assert_eq!(frame.0.header[0], 0x321 << 18);
        // DLC 12 (24 bytes), BRS, FDF, EFC, MM
        assert_eq!(
            frame.0.header[1],
            (12 << 16) | (1 << 20) | (1 << 21) | (1 << 23) | (0x5a << 24)
        );
        assert_eq!(frame.decoded_dlc(), 24);
    }

    #[test]
    fn payload_must_fit_the_configured_data_field() {
        let r = FrameBuilder {
            id: Id::Standard(StandardId::ZERO),
            frame_type: FrameType::FlexibleDatarate {
                payload: &[0; 12],
                bit_rate_switching: false,
                force_error_state_indicator: false,
            },
            store_tx_event: None,
        }
        .build(DataFieldSize::B8);
        assert!(r.is_err());
    }

    #[test]
    fn remote_frame_encoding() {
        let frame = FrameBuilder {
            id: Id::Extended(embedded_can::ExtendedId::new(0x1234_5678).unwrap()),
            frame_type: FrameType::Classic(ClassicFrameType::Remote { desired_len: 8 }),
            store_tx_event: None,
        }
        .build(DataFieldSize::B8)
        .unwrap();
        assert!(frame.is_remote_frame());
        assert!(frame.is_extended());
        assert_eq!(frame.0.header[0] & 0x1fff_ffff, 0x1234_5678);
        assert_eq!(frame.dlc(), 8);
        assert!(frame.data().is_empty());
    }
}
