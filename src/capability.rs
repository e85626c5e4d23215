//! Local audio capabilities
//!
//! A capability pairs a codec the local device supports with the role it plays
//! (audio source or sink), the QoS envelope it prefers, and an operation table
//! that receives every ASE procedure for channels configured against it.

use crate::AudioError;
use crate::channel::{AudioChannel, ChannelId, ChannelTable};
use crate::codec::{Codec, CodecData, CodecQos, QosPreference};
use crate::endpoint::EndpointId;
use bt_hci::param::ConnHandle;

/// Index of a registered capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CapabilityId(pub(crate) u8);

impl CapabilityId {
    /// Position of the capability in the registration table
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Audio role of a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Audio source (produces audio)
    Source,
    /// Audio sink (consumes audio)
    Sink,
}

/// Role specific behavior for each ASE procedure
///
/// Only [`config`](CapabilityOps::config) is mandatory since it selects the
/// channel that will carry the stream. Every other operation defaults to
/// accepting the procedure without further action. An error returned from any
/// operation aborts the procedure and is reported to the caller unchanged,
/// except `NotConnected` from [`release`](CapabilityOps::release) which is
/// taken to mean the transport is already gone.
pub trait CapabilityOps {
    /// Pick the channel that will serve `ep` on `conn` with `codec`
    ///
    /// `channels` is the stack channel pool; [`ChannelTable::find_idle`]
    /// returns the first unused entry.
    ///
    /// # Errors
    /// Any error rejects the Config Codec operation
    fn config(
        &self,
        channels: &ChannelTable,
        conn: ConnHandle,
        ep: EndpointId,
        codec: &Codec,
    ) -> Result<ChannelId, AudioError>;

    /// Accept a new codec configuration for an already configured channel
    ///
    /// # Errors
    /// Any error rejects the reconfiguration
    fn reconfig(&self, _chan: &AudioChannel, _codec: &Codec) -> Result<(), AudioError> {
        Ok(())
    }

    /// Accept a validated Codec QoS
    ///
    /// # Errors
    /// Any error rejects the Config QoS operation
    fn qos(&self, _chan: &AudioChannel, _qos: &CodecQos) -> Result<(), AudioError> {
        Ok(())
    }

    /// Accept the Enable operation with its metadata
    ///
    /// # Errors
    /// Any error rejects the Enable operation
    fn enable(&self, _chan: &AudioChannel, _meta: &[CodecData]) -> Result<(), AudioError> {
        Ok(())
    }

    /// Accept an Update Metadata operation
    ///
    /// # Errors
    /// Any error rejects the update
    fn metadata(&self, _chan: &AudioChannel, _meta: &[CodecData]) -> Result<(), AudioError> {
        Ok(())
    }

    /// Accept the Disable operation
    ///
    /// # Errors
    /// Any error rejects the Disable operation
    fn disable(&self, _chan: &AudioChannel) -> Result<(), AudioError> {
        Ok(())
    }

    /// Accept the Receiver Start Ready operation
    ///
    /// # Errors
    /// Any error rejects the start
    fn start(&self, _chan: &AudioChannel) -> Result<(), AudioError> {
        Ok(())
    }

    /// Accept the Receiver Stop Ready operation
    ///
    /// # Errors
    /// Any error rejects the stop
    fn stop(&self, _chan: &AudioChannel) -> Result<(), AudioError> {
        Ok(())
    }

    /// Accept the Release operation
    ///
    /// # Errors
    /// `NotConnected` completes the release immediately, anything else rejects it
    fn release(&self, _chan: &AudioChannel) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Registered local capability
pub struct Capability<'a> {
    /// Role played by channels using this capability
    pub role: Role,
    /// Advertised codec
    pub codec: Codec,
    /// Preferred QoS envelope
    pub pref: QosPreference,
    /// Operation table
    pub ops: &'a dyn CapabilityOps,
}

impl<'a> Capability<'a> {
    /// Create a capability with the default QoS preference
    #[must_use]
    pub fn new(role: Role, codec: Codec, ops: &'a dyn CapabilityOps) -> Self {
        Self {
            role,
            codec,
            pref: QosPreference::default(),
            ops,
        }
    }

    /// Replace the QoS preference
    #[must_use]
    pub fn with_pref(mut self, pref: QosPreference) -> Self {
        self.pref = pref;
        self
    }
}

impl core::fmt::Debug for Capability<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Capability")
            .field("role", &self.role)
            .field("codec", &self.codec)
            .field("pref", &self.pref)
            .finish_non_exhaustive()
    }
}
