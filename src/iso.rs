//! Isochronous transport contract
//!
//! The stack drives Connected Isochronous Groups and Streams through the
//! narrow [`IsoTransport`] trait: CIG create/terminate, CIS
//! connect/disconnect/send, inbound acceptor registration, and a per-channel
//! state query. Everything below that line (HCI commands, buffers, timing) is
//! the transport's business.

use crate::codec::{CodecQos, Framing, QosDirection};
use crate::{AudioError, SecurityLevel};
use bt_hci::param::ConnHandle;

/// Identifier of an isochronous channel owned by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsoChannelId(pub u8);

impl core::fmt::Display for IsoChannelId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "iso{}", self.0)
    }
}

/// Handle of a CIG created by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CigHandle(pub u8);

/// Transport state of an isochronous channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IsoState {
    /// No CIS
    Disconnected,
    /// CIS establishment in progress
    Connecting,
    /// CIS established
    Connected,
    /// CIS termination in progress
    Disconnecting,
}

/// Per-direction isochronous parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsoIoQos {
    /// Maximum SDU size
    pub sdu: u16,
    /// PHY bit mask
    pub phy: u8,
    /// Retransmission number
    pub rtn: u8,
}

/// Isochronous channel QoS, one descriptor per direction in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsoQos {
    /// Receive path
    pub rx: Option<IsoIoQos>,
    /// Transmit path
    pub tx: Option<IsoIoQos>,
}

/// Isochronous channel bound to an audio channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsoChannel {
    /// Transport identifier
    pub id: IsoChannelId,
    /// Transport QoS
    pub qos: IsoQos,
    bound: bool,
}

impl IsoChannel {
    /// Isochronous channel with no QoS and no CIG yet
    #[must_use]
    pub const fn new(id: IsoChannelId) -> Self {
        Self {
            id,
            qos: IsoQos { rx: None, tx: None },
            bound: false,
        }
    }

    /// Whether a CIG has been created with this channel as its CIS
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.bound
    }

    pub(crate) fn set_bound(&mut self, bound: bool) {
        self.bound = bound;
    }
}

/// CIS packing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Packing {
    /// Sequential (also used when no preference is expressed)
    Sequential = 0x00,
    /// Interleaved
    Interleaved = 0x01,
}

/// Worst case sleep clock accuracy of the central
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Sca {
    /// Unknown, 251 ppm to 500 ppm
    Unknown,
}

/// Parameters of a CIG creation request
#[derive(Debug, Clone, Copy)]
pub struct CigParams<'a> {
    /// Streams making up the group
    pub cis: &'a [IsoChannel],
    /// SDU framing
    pub framing: Framing,
    /// Packing preference
    pub packing: Packing,
    /// SDU interval in microseconds
    pub interval: u32,
    /// Maximum transport latency in milliseconds
    pub latency: u16,
    /// Sleep clock accuracy
    pub sca: Sca,
}

/// Inbound CIS request as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AcceptInfo {
    /// ACL the request arrived on
    pub acl: ConnHandle,
    /// Requested CIG
    pub cig_id: u8,
    /// Requested CIS
    pub cis_id: u8,
}

/// Isochronous transport consumed by the stack
///
/// Calls never block: completion of connect and disconnect is reported back
/// through [`AudioStack::iso_connected`](crate::AudioStack::iso_connected) and
/// [`AudioStack::iso_disconnected`](crate::AudioStack::iso_disconnected).
pub trait IsoTransport {
    /// Register the inbound CIS acceptor, called once on first listen
    ///
    /// # Errors
    /// Registration failure is reported to the listening caller
    fn register_server(&mut self, security: SecurityLevel) -> Result<(), AudioError>;

    /// Create a CIG containing the given streams
    ///
    /// # Errors
    /// Controller rejection of the group parameters
    fn create_cig(&mut self, params: &CigParams<'_>) -> Result<CigHandle, AudioError>;

    /// Terminate a CIG
    ///
    /// # Errors
    /// Controller rejection of the removal
    fn terminate_cig(&mut self, cig: CigHandle) -> Result<(), AudioError>;

    /// Establish the CIS of `iso` over `acl`
    ///
    /// # Errors
    /// Controller rejection of the request
    fn connect(&mut self, acl: ConnHandle, iso: IsoChannelId) -> Result<(), AudioError>;

    /// Terminate the CIS of `iso`
    ///
    /// # Errors
    /// `NotConnected` if there is no CIS, or a controller status
    fn disconnect(&mut self, iso: IsoChannelId) -> Result<(), AudioError>;

    /// Queue one SDU on the CIS of `iso`
    ///
    /// # Errors
    /// `NotConnected` if there is no CIS, or a controller status
    fn send(&mut self, iso: IsoChannelId, sdu: &[u8]) -> Result<(), AudioError>;

    /// Current transport state of `iso`
    fn state(&self, iso: IsoChannelId) -> IsoState;
}

/// Write the per-direction parts of `codec` into `qos`
///
/// `In` fills the receive path, `Out` the transmit path, and `InOut` gives both
/// paths the same descriptor.
pub fn qos_to_transport(qos: &mut IsoQos, codec: &CodecQos) {
    let io = IsoIoQos {
        sdu: codec.sdu,
        phy: codec.phy,
        rtn: codec.rtn,
    };

    match codec.dir {
        QosDirection::In => qos.rx = Some(io),
        QosDirection::Out => qos.tx = Some(io),
        QosDirection::InOut => {
            qos.rx = Some(io);
            qos.tx = Some(io);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec_qos(dir: QosDirection) -> CodecQos {
        CodecQos::unframed(dir, 10_000, 40, 2, 10, 40_000)
    }

    #[test]
    fn test_qos_to_transport_in() {
        let mut qos = IsoQos::default();
        qos_to_transport(&mut qos, &codec_qos(QosDirection::In));

        assert_eq!(
            qos.rx,
            Some(IsoIoQos {
                sdu: 40,
                phy: crate::codec::PHY_2M,
                rtn: 2
            })
        );
        assert_eq!(qos.tx, None);
    }

    #[test]
    fn test_qos_to_transport_out_keeps_rx() {
        let previous = IsoIoQos {
            sdu: 100,
            phy: crate::codec::PHY_1M,
            rtn: 4,
        };
        let mut qos = IsoQos {
            rx: Some(previous),
            tx: None,
        };
        qos_to_transport(&mut qos, &codec_qos(QosDirection::Out));

        assert_eq!(qos.rx, Some(previous));
        assert_eq!(qos.tx.map(|io| io.sdu), Some(40));
    }

    #[test]
    fn test_qos_to_transport_inout_aliases_paths() {
        let mut qos = IsoQos::default();
        let mut codec = codec_qos(QosDirection::InOut);
        codec.rtn = 5;
        qos_to_transport(&mut qos, &codec);

        assert!(qos.rx.is_some());
        assert_eq!(qos.rx, qos.tx);
        assert_eq!(qos.tx.map(|io| io.rtn), Some(5));
    }

    #[test]
    fn test_packing_hci_values() {
        assert_eq!(Packing::Sequential as u8, 0x00);
        assert_eq!(Packing::Interleaved as u8, 0x01);
    }

    #[test]
    fn test_iso_channel_starts_unbound() {
        let mut iso = IsoChannel::new(IsoChannelId(7));
        assert!(!iso.is_bound());
        assert_eq!(iso.qos, IsoQos::default());

        iso.set_bound(true);
        assert!(iso.is_bound());
    }
}
