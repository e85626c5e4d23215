//! Audio Stream Endpoints
//!
//! An ASE is the protocol-visible state machine for one audio stream as
//! defined by the Audio Stream Control Service. The stack keeps one
//! [`Endpoint`] per ASE it serves (local) or mirrors (remote), plus broadcast
//! endpoints which only ever see the unicast operations rejected.
//!
//! ASE state is only written by the channel state machine, and every write is
//! checked against the ASCS transition graph in [`AseState::can_transition_to`].

use crate::AudioError;
use crate::channel::ChannelId;
use crate::constants::MAX_ENDPOINTS;
use heapless::Vec;

/// Index of an endpoint inside the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointId(pub(crate) u8);

impl EndpointId {
    /// Position of the endpoint in the endpoint table
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ep{}", self.0)
    }
}

/// Where the ASE lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EndpointKind {
    /// ASE exposed by the local ASCS server
    Local,
    /// ASE on a remote server, mirrored by the local client
    Remote,
    /// Broadcast source endpoint
    BroadcastSource,
    /// Broadcast sink endpoint
    BroadcastSink,
}

impl EndpointKind {
    /// Broadcast source or sink
    #[must_use]
    pub const fn is_broadcast(self) -> bool {
        matches!(self, Self::BroadcastSource | Self::BroadcastSink)
    }
}

/// ASE state values as carried in the ASE characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AseState {
    /// No codec configuration
    Idle = 0x00,
    /// Codec configured
    CodecConfigured = 0x01,
    /// QoS configured
    QosConfigured = 0x02,
    /// Enabling
    Enabling = 0x03,
    /// Streaming
    Streaming = 0x04,
    /// Disabling
    Disabling = 0x05,
    /// Releasing
    Releasing = 0x06,
}

impl AseState {
    /// Name used in logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CodecConfigured => "codec-configured",
            Self::QosConfigured => "qos-configured",
            Self::Enabling => "enabling",
            Self::Streaming => "streaming",
            Self::Disabling => "disabling",
            Self::Releasing => "releasing",
        }
    }

    /// Whether ASCS allows moving from `self` to `next`
    ///
    /// Same-state writes are allowed where the protocol re-announces the
    /// current state (reconfiguration, QoS update, metadata update).
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use AseState::{
            CodecConfigured, Disabling, Enabling, Idle, QosConfigured, Releasing, Streaming,
        };

        match (self, next) {
            (Idle | CodecConfigured | QosConfigured, CodecConfigured)
            | (CodecConfigured | QosConfigured, QosConfigured)
            | (QosConfigured | Enabling, Enabling)
            | (Enabling | Streaming, Streaming)
            | (Enabling | Streaming, Disabling)
            | (Enabling | Streaming | Disabling, QosConfigured)
            | (CodecConfigured | QosConfigured | Enabling | Streaming | Disabling, Releasing)
            | (Enabling | Streaming | Disabling | Releasing, CodecConfigured)
            | (Releasing, Idle) => true,
            _ => false,
        }
    }
}

impl core::fmt::Display for AseState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for AseState {
    type Error = AudioError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Idle),
            0x01 => Ok(Self::CodecConfigured),
            0x02 => Ok(Self::QosConfigured),
            0x03 => Ok(Self::Enabling),
            0x04 => Ok(Self::Streaming),
            0x05 => Ok(Self::Disabling),
            0x06 => Ok(Self::Releasing),
            _ => Err(AudioError::InvalidArgument),
        }
    }
}

/// Notification emitted whenever an endpoint changes in a way the ASCS
/// layer has to mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EndpointEvent {
    /// The ASE state was written (possibly to the same value)
    StateChanged {
        /// Endpoint
        endpoint: EndpointId,
        /// New state
        state: AseState,
    },
    /// The endpoint forgot its channel
    Detached {
        /// Endpoint
        endpoint: EndpointId,
        /// Channel that was attached
        channel: ChannelId,
    },
}

/// Audio Stream Endpoint
#[derive(Debug, Clone)]
pub struct Endpoint {
    id: EndpointId,
    kind: EndpointKind,
    state: AseState,
    cig_id: u8,
    cis_id: u8,
    chan: Option<ChannelId>,
}

impl Endpoint {
    fn new(id: EndpointId, kind: EndpointKind, cig_id: u8, cis_id: u8) -> Self {
        Self {
            id,
            kind,
            state: AseState::Idle,
            cig_id,
            cis_id,
            chan: None,
        }
    }

    /// Endpoint handle
    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Endpoint kind
    #[must_use]
    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Current ASE state
    #[must_use]
    pub fn state(&self) -> AseState {
        self.state
    }

    /// CIG identifier of the stream this ASE uses
    #[must_use]
    pub fn cig_id(&self) -> u8 {
        self.cig_id
    }

    /// CIS identifier of the stream this ASE uses
    #[must_use]
    pub fn cis_id(&self) -> u8 {
        self.cis_id
    }

    /// Channel currently attached, if any
    #[must_use]
    pub fn channel(&self) -> Option<ChannelId> {
        self.chan
    }

    /// Whether this is a local (server side) ASE
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.kind == EndpointKind::Local
    }

    /// Whether this is a broadcast endpoint
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.kind.is_broadcast()
    }

    pub(crate) fn set_stream_ids(&mut self, cig_id: u8, cis_id: u8) {
        self.cig_id = cig_id;
        self.cis_id = cis_id;
    }

    pub(crate) fn attach(&mut self, chan: ChannelId) {
        self.chan = Some(chan);
    }

    /// Clear the attached channel, returning it if it matched `chan`
    pub(crate) fn detach(&mut self, chan: ChannelId) -> bool {
        if self.chan == Some(chan) {
            self.chan = None;
            true
        } else {
            false
        }
    }

    /// Write a new ASE state
    ///
    /// # Errors
    /// Returns `AudioError::InvalidState` if ASCS does not allow the transition
    pub(crate) fn set_state(&mut self, state: AseState) -> Result<(), AudioError> {
        if !self.state.can_transition_to(state) {
            error!(
                "[ASE] {} invalid transition {} -> {}",
                self.id,
                self.state.as_str(),
                state.as_str()
            );
            return Err(AudioError::InvalidState);
        }

        debug!(
            "[ASE] {} {} -> {}",
            self.id,
            self.state.as_str(),
            state.as_str()
        );
        self.state = state;
        Ok(())
    }
}

/// Endpoint table
#[derive(Debug, Default)]
pub struct EndpointTable {
    endpoints: Vec<Endpoint, MAX_ENDPOINTS>,
}

impl EndpointTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
        }
    }

    /// Register an endpoint in the Idle state
    ///
    /// # Errors
    /// Returns `AudioError::ResourceExhausted` when the table is full
    pub fn add(
        &mut self,
        kind: EndpointKind,
        cig_id: u8,
        cis_id: u8,
    ) -> Result<EndpointId, AudioError> {
        let id = EndpointId(self.endpoints.len() as u8);
        self.endpoints
            .push(Endpoint::new(id, kind, cig_id, cis_id))
            .map_err(|_| AudioError::ResourceExhausted)?;
        Ok(id)
    }

    /// Get an endpoint
    #[must_use]
    pub fn get(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoints.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: EndpointId) -> Option<&mut Endpoint> {
        self.endpoints.get_mut(id.index())
    }

    /// Iterate over all endpoints
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    /// Number of registered endpoints
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether no endpoint is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
