#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(clippy::too_many_lines)]

#[macro_use]
mod fmt;

pub mod capability;
pub mod channel;
pub mod codec;
pub mod constants;
pub mod endpoint;
pub mod group;
pub mod iso;
pub mod listen;
pub mod qos;
pub mod shared;
mod stack;

#[cfg(test)]
mod testing;

pub use bt_hci::param::ConnHandle;
pub use capability::{Capability, CapabilityId, CapabilityOps, Role};
pub use channel::{AudioChannel, ChannelId, ChannelState, ChannelTable};
pub use codec::{Codec, CodecData, CodecQos, Framing, QosDirection, QosPreference};
pub use endpoint::{AseState, Endpoint, EndpointEvent, EndpointId, EndpointKind};
pub use group::{GroupId, UnicastGroup};
pub use iso::{AcceptInfo, CigHandle, IsoChannel, IsoChannelId, IsoQos, IsoState, IsoTransport};
pub use shared::SharedAudioStack;
pub use stack::AudioStack;

/// Security level requested for inbound isochronous connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityLevel {
    /// No encryption and no authentication
    L1,
    /// Encryption without authentication
    L2,
    /// Encryption and authentication
    L3,
    /// Authenticated LE Secure Connections with 128-bit keys
    L4,
}

/// Options for configuring an `AudioStack` instance
///
/// # Examples
///
/// ```rust
/// use lea_unicast::{AudioStackOptions, SecurityLevel};
///
/// // Use default options
/// let default_options = AudioStackOptions::default();
/// assert_eq!(default_options.iso_security, SecurityLevel::L2);
///
/// // Require authenticated links and let the application drive sink handshakes
/// let strict = AudioStackOptions {
///     iso_security: SecurityLevel::L3,
///     sink_autonomous: false,
/// };
/// ```
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AudioStackOptions {
    /// Security level passed when registering the inbound isochronous acceptor
    pub iso_security: SecurityLevel,
    /// Whether Sink capabilities perform the Receiver Start Ready and
    /// Receiver Stop Ready handshakes on their own after Enable and Disable
    pub sink_autonomous: bool,
}

impl Default for AudioStackOptions {
    fn default() -> Self {
        Self {
            iso_security: SecurityLevel::L2,
            sink_autonomous: true,
        }
    }
}

/// Errors reported by the audio channel core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AudioError {
    /// Unknown handle or malformed input, or a unicast-only operation on a broadcast endpoint
    InvalidArgument,
    /// Operation attempted outside the states that allow it (malformed request)
    InvalidState,
    /// QoS parameter outside the allowed range or the capability preference
    NotSupported,
    /// Redundant operation, the requested state already holds
    AlreadyInState,
    /// No free group, listen slot, or table entry
    ResourceExhausted,
    /// Requested entry does not exist
    NotFound,
    /// Isochronous transport absent when it was expected
    NotConnected,
    /// Inbound isochronous request without a matching listener
    PermissionDenied,
    /// Isochronous transport rejected the request with an HCI status code
    Hci(u8),
}

impl core::fmt::Display for AudioError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "Invalid argument"),
            Self::InvalidState => write!(f, "Invalid state"),
            Self::NotSupported => write!(f, "Not supported"),
            Self::AlreadyInState => write!(f, "Already in requested state"),
            Self::ResourceExhausted => write!(f, "No resources left"),
            Self::NotFound => write!(f, "Not found"),
            Self::NotConnected => write!(f, "Not connected"),
            Self::PermissionDenied => write!(f, "Permission denied"),
            Self::Hci(status) => write!(f, "HCI error 0x{status:02x}"),
        }
    }
}
