//! Audio channels
//!
//! An [`AudioChannel`] is the logical pairing of an ASE with the isochronous
//! channel that carries its audio. Channels live in a fixed pool inside the
//! stack and reference their endpoint, capability, connection and group by
//! handle. While a channel is not [`ChannelState::Idle`] it is attached: the
//! connection, capability, codec and endpoint references are all set and the
//! endpoint points back at the channel.

pub mod link;

use crate::AudioError;
use crate::capability::CapabilityId;
use crate::codec::{Codec, CodecQos};
use crate::constants::{MAX_AUDIO_CHANNELS, MAX_CHANNEL_LINKS};
use crate::endpoint::EndpointId;
use crate::group::GroupId;
use crate::iso::{IsoChannel, IsoChannelId};
use bt_hci::param::ConnHandle;
use heapless::Vec;

/// Index of a channel inside the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelId(pub(crate) u8);

impl ChannelId {
    /// Position of the channel in the channel pool
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "chan{}", self.0)
    }
}

/// Logical channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelState {
    /// Detached
    #[default]
    Idle,
    /// Attached to an endpoint with a codec configuration
    Configured,
    /// Isochronous stream established
    Streaming,
}

impl ChannelState {
    /// Name used in logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Configured => "configured",
            Self::Streaming => "streaming",
        }
    }
}

impl core::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical audio channel
#[derive(Debug, Clone)]
pub struct AudioChannel {
    pub(crate) id: ChannelId,
    pub(crate) state: ChannelState,
    pub(crate) conn: Option<ConnHandle>,
    pub(crate) cap: Option<CapabilityId>,
    pub(crate) codec: Option<Codec>,
    pub(crate) ep: Option<EndpointId>,
    pub(crate) group: Option<GroupId>,
    pub(crate) links: Vec<ChannelId, MAX_CHANNEL_LINKS>,
    pub(crate) iso: Option<IsoChannel>,
    pub(crate) qos: Option<CodecQos>,
}

impl AudioChannel {
    fn new(id: ChannelId, iso: Option<IsoChannel>) -> Self {
        Self {
            id,
            state: ChannelState::Idle,
            conn: None,
            cap: None,
            codec: None,
            ep: None,
            group: None,
            links: Vec::new(),
            iso,
            qos: None,
        }
    }

    /// Channel handle
    #[must_use]
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Logical state
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// ACL the channel is attached to
    #[must_use]
    pub fn conn(&self) -> Option<ConnHandle> {
        self.conn
    }

    /// Capability the channel was configured against
    #[must_use]
    pub fn capability(&self) -> Option<CapabilityId> {
        self.cap
    }

    /// Codec configuration in use
    #[must_use]
    pub fn codec(&self) -> Option<&Codec> {
        self.codec.as_ref()
    }

    /// Attached endpoint
    #[must_use]
    pub fn endpoint(&self) -> Option<EndpointId> {
        self.ep
    }

    /// Unicast group membership
    #[must_use]
    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    /// Peers this channel is synchronized with
    #[must_use]
    pub fn links(&self) -> &[ChannelId] {
        &self.links
    }

    /// Isochronous channel carrying the audio
    #[must_use]
    pub fn iso(&self) -> Option<&IsoChannel> {
        self.iso.as_ref()
    }

    /// Last accepted Codec QoS
    #[must_use]
    pub fn qos(&self) -> Option<&CodecQos> {
        self.qos.as_ref()
    }

    /// Whether the channel is attached to an endpoint
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.ep.is_some()
    }
}

/// Channel pool
#[derive(Debug, Default)]
pub struct ChannelTable {
    channels: Vec<AudioChannel, MAX_AUDIO_CHANNELS>,
}

impl ChannelTable {
    /// Create an empty pool
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    /// Add an Idle channel, optionally backed by an isochronous channel
    ///
    /// # Errors
    /// Returns `AudioError::ResourceExhausted` when the pool is full
    pub fn add(&mut self, iso: Option<IsoChannel>) -> Result<ChannelId, AudioError> {
        let id = ChannelId(self.channels.len() as u8);
        self.channels
            .push(AudioChannel::new(id, iso))
            .map_err(|_| AudioError::ResourceExhausted)?;
        Ok(id)
    }

    /// Get a channel
    #[must_use]
    pub fn get(&self, id: ChannelId) -> Option<&AudioChannel> {
        self.channels.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: ChannelId) -> Option<&mut AudioChannel> {
        self.channels.get_mut(id.index())
    }

    /// Get a channel or fail with `InvalidArgument`
    pub(crate) fn try_get(&self, id: ChannelId) -> Result<&AudioChannel, AudioError> {
        self.get(id).ok_or(AudioError::InvalidArgument)
    }

    pub(crate) fn try_get_mut(&mut self, id: ChannelId) -> Result<&mut AudioChannel, AudioError> {
        self.get_mut(id).ok_or(AudioError::InvalidArgument)
    }

    /// First Idle channel not attached to any endpoint
    #[must_use]
    pub fn find_idle(&self) -> Option<ChannelId> {
        self.channels
            .iter()
            .find(|chan| chan.state == ChannelState::Idle && chan.ep.is_none())
            .map(|chan| chan.id)
    }

    /// Channel carried by the isochronous channel `iso`
    #[must_use]
    pub fn find_by_iso(&self, iso: IsoChannelId) -> Option<ChannelId> {
        self.channels
            .iter()
            .find(|chan| chan.iso.is_some_and(|i| i.id == iso))
            .map(|chan| chan.id)
    }

    /// Iterate over all channels
    pub fn iter(&self) -> impl Iterator<Item = &AudioChannel> {
        self.channels.iter()
    }

    /// Number of channels in the pool
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the pool is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
