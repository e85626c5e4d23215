//! Codec configuration and Codec QoS types
//!
//! A [`Codec`] identifies the coding format negotiated for an ASE together with
//! its codec specific configuration. [`CodecQos`] carries the QoS parameters a
//! client proposes in the ASCS Config QoS operation. Numeric fields of
//! `CodecQos` are kept as raw protocol values so that validation can write the
//! documented "invalid" sentinels back into them.

use crate::AudioError;
use crate::constants::{MAX_CODEC_DATA, MAX_CODEC_DATA_LEN};
use heapless::Vec;

/// LC3 coding format identifier
pub const CODEC_LC3: u8 = 0x06;

/// Vendor specific coding format identifier
pub const CODEC_VENDOR: u8 = 0xFF;

/// LE 1M PHY bit
pub const PHY_1M: u8 = 0x01;
/// LE 2M PHY bit
pub const PHY_2M: u8 = 0x02;
/// LE Coded PHY bit
pub const PHY_CODED: u8 = 0x04;
/// Every PHY bit a QoS may carry
pub const PHY_ALL: u8 = PHY_1M | PHY_2M | PHY_CODED;

/// Codec specific configuration or metadata entry (LTV without the length)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecData {
    /// LTV type
    pub data_type: u8,
    /// LTV value
    pub value: Vec<u8, MAX_CODEC_DATA_LEN>,
}

impl CodecData {
    /// Build an entry from a type and a value slice
    ///
    /// # Errors
    /// Returns `AudioError::InvalidArgument` if the value does not fit
    pub fn new(data_type: u8, value: &[u8]) -> Result<Self, AudioError> {
        let value = Vec::from_slice(value).map_err(|()| AudioError::InvalidArgument)?;
        Ok(Self { data_type, value })
    }
}

/// Codec identity and configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codec {
    /// Coding format
    pub id: u8,
    /// Company ID (vendor specific codecs only)
    pub cid: u16,
    /// Vendor specific codec ID
    pub vid: u16,
    /// Codec specific configuration
    pub data: Vec<CodecData, MAX_CODEC_DATA>,
    /// Metadata attached to the codec
    pub meta: Vec<CodecData, MAX_CODEC_DATA>,
}

impl Codec {
    /// Create a codec with no configuration entries
    #[must_use]
    pub fn new(id: u8, cid: u16, vid: u16) -> Self {
        Self {
            id,
            cid,
            vid,
            data: Vec::new(),
            meta: Vec::new(),
        }
    }

    /// Create an LC3 codec
    #[must_use]
    pub fn lc3() -> Self {
        Self::new(CODEC_LC3, 0x0000, 0x0000)
    }

    /// Append a codec specific configuration entry
    ///
    /// # Errors
    /// Returns `AudioError::ResourceExhausted` when the entry table is full
    pub fn with_data(mut self, data: CodecData) -> Result<Self, AudioError> {
        self.data
            .push(data)
            .map_err(|_| AudioError::ResourceExhausted)?;
        Ok(self)
    }
}

/// Direction of a Codec QoS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QosDirection {
    /// Audio flows towards the local device
    In = 0x01,
    /// Audio flows away from the local device
    Out = 0x02,
    /// Audio flows both ways
    InOut = 0x03,
}

impl TryFrom<u8> for QosDirection {
    type Error = AudioError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::In),
            0x02 => Ok(Self::Out),
            0x03 => Ok(Self::InOut),
            _ => Err(AudioError::InvalidArgument),
        }
    }
}

/// SDU framing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Framing {
    /// Unframed ISOAL PDUs
    Unframed = 0x00,
    /// Framed ISOAL PDUs
    Framed = 0x01,
}

impl Framing {
    /// Decode a raw framing value
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(Self::Unframed),
            0x01 => Some(Self::Framed),
            _ => None,
        }
    }
}

/// Codec QoS parameters proposed for an ASE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CodecQos {
    /// Direction
    pub dir: QosDirection,
    /// SDU interval in microseconds
    pub interval: u32,
    /// Raw framing value, see [`Framing`]
    pub framing: u8,
    /// PHY bit mask
    pub phy: u8,
    /// Maximum SDU size in octets
    pub sdu: u16,
    /// Retransmission number
    pub rtn: u8,
    /// Maximum transport latency in milliseconds
    pub latency: u16,
    /// Presentation delay in microseconds
    pub pd: u32,
}

impl CodecQos {
    /// Unframed QoS on the 2M PHY
    #[must_use]
    pub const fn unframed(
        dir: QosDirection,
        interval: u32,
        sdu: u16,
        rtn: u8,
        latency: u16,
        pd: u32,
    ) -> Self {
        Self {
            dir,
            interval,
            framing: Framing::Unframed as u8,
            phy: PHY_2M,
            sdu,
            rtn,
            latency,
            pd,
        }
    }

    /// Decoded framing, `None` if the raw value is out of range
    #[must_use]
    pub const fn framing(&self) -> Option<Framing> {
        Framing::from_raw(self.framing)
    }
}

/// QoS envelope a capability accepts in the Config QoS operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QosPreference {
    /// Maximum transport latency in milliseconds
    pub latency: u16,
    /// Minimum supported presentation delay in microseconds
    pub pd_min: u32,
    /// Maximum supported presentation delay in microseconds
    pub pd_max: u32,
}

impl QosPreference {
    /// Build a preference from the maximum latency and the presentation delay range
    #[must_use]
    pub const fn new(latency: u16, pd_min: u32, pd_max: u32) -> Self {
        Self {
            latency,
            pd_min,
            pd_max,
        }
    }
}

impl Default for QosPreference {
    fn default() -> Self {
        Self::new(20, 20_000, 40_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_direction_decoding() {
        assert_eq!(QosDirection::try_from(0x01), Ok(QosDirection::In));
        assert_eq!(QosDirection::try_from(0x02), Ok(QosDirection::Out));
        assert_eq!(QosDirection::try_from(0x03), Ok(QosDirection::InOut));
        assert_eq!(
            QosDirection::try_from(0x00),
            Err(AudioError::InvalidArgument)
        );
        assert_eq!(
            QosDirection::try_from(0x04),
            Err(AudioError::InvalidArgument)
        );
    }

    #[test]
    fn test_framing_decoding() {
        let mut qos = CodecQos::unframed(QosDirection::Out, 10_000, 40, 2, 10, 40_000);
        assert_eq!(qos.framing(), Some(Framing::Unframed));

        qos.framing = Framing::Framed as u8;
        assert_eq!(qos.framing(), Some(Framing::Framed));

        qos.framing = 0x02;
        assert_eq!(qos.framing(), None);
    }

    #[test]
    fn test_codec_data_capacity() {
        assert!(CodecData::new(0x01, &[0x08]).is_ok());
        assert_eq!(
            CodecData::new(0x01, &[0u8; MAX_CODEC_DATA_LEN + 1]),
            Err(AudioError::InvalidArgument)
        );

        let mut codec = Codec::lc3();
        for i in 0..MAX_CODEC_DATA {
            codec = codec
                .with_data(CodecData::new(i as u8, &[0x00]).unwrap())
                .unwrap();
        }
        assert_eq!(
            codec.with_data(CodecData::new(0x10, &[0x00]).unwrap()),
            Err(AudioError::ResourceExhausted)
        );
    }
}
