//! Audio stack
//!
//! [`AudioStack`] owns every entity of the channel core: the channel pool, the
//! endpoint table, the registered capabilities, the unicast group pool and the
//! listen registry. Entities refer to each other by index handle only, so all
//! cross-entity invariants are maintained here, inside single `&mut self`
//! calls.
//!
//! ## Layout
//!
//! - this module: registration, accessors, logical channel state, teardown
//!   and transport callbacks
//! - [`lifecycle`]: ASE procedures (Config Codec through Release)
//! - [`binding`]: isochronous connect, disconnect, send and listen
//! - [`groups`]: unicast group creation and deletion
//!
//! ## Notifications
//!
//! Every ASE state write and every detach is queued as an [`EndpointEvent`]
//! which the ASCS layer drains with [`AudioStack::pop_event`].

mod binding;
mod groups;
mod lifecycle;

use crate::capability::{Capability, CapabilityId, CapabilityOps, Role};
use crate::channel::{AudioChannel, ChannelId, ChannelState, ChannelTable};
use crate::codec::QosPreference;
use crate::constants::{MAX_AUDIO_CHANNELS, MAX_CAPABILITIES, MAX_EVENTS};
use crate::endpoint::{AseState, Endpoint, EndpointEvent, EndpointId, EndpointKind, EndpointTable};
use crate::group::{GroupId, GroupPool, UnicastGroup};
use crate::iso::{IsoChannel, IsoChannelId, IsoTransport};
use crate::listen::ListenRegistry;
use crate::{AudioError, AudioStackOptions};
use bt_hci::param::ConnHandle;
use heapless::{Deque, Vec};

/// Capability facts copied out of the table before a procedure runs
#[derive(Clone, Copy)]
struct CapabilityRef<'a> {
    role: Role,
    pref: QosPreference,
    ops: &'a dyn CapabilityOps,
}

/// Unicast audio channel core
///
/// `T` is the isochronous transport the stack drives. Capability operation
/// tables are borrowed for `'a`.
pub struct AudioStack<'a, T: IsoTransport> {
    transport: T,
    options: AudioStackOptions,
    channels: ChannelTable,
    endpoints: EndpointTable,
    capabilities: Vec<Capability<'a>, MAX_CAPABILITIES>,
    groups: GroupPool,
    listen: ListenRegistry,
    events: Deque<EndpointEvent, MAX_EVENTS>,
}

impl<'a, T: IsoTransport> AudioStack<'a, T> {
    /// Create a stack with default options
    pub fn new(transport: T) -> Self {
        Self::with_options(transport, AudioStackOptions::default())
    }

    /// Create a stack with custom options
    pub fn with_options(transport: T, options: AudioStackOptions) -> Self {
        Self {
            transport,
            options,
            channels: ChannelTable::new(),
            endpoints: EndpointTable::new(),
            capabilities: Vec::new(),
            groups: GroupPool::new(),
            listen: ListenRegistry::new(),
            events: Deque::new(),
        }
    }

    /// Options the stack was created with
    #[must_use]
    pub fn options(&self) -> &AudioStackOptions {
        &self.options
    }

    /// The isochronous transport
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the isochronous transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Add an Idle channel, optionally carried by the isochronous channel `iso`
    ///
    /// # Errors
    /// Returns `AudioError::ResourceExhausted` when the channel pool is full
    pub fn add_channel(&mut self, iso: Option<IsoChannelId>) -> Result<ChannelId, AudioError> {
        let id = self.channels.add(iso.map(IsoChannel::new))?;
        debug!("[CHAN] added {}", id);
        Ok(id)
    }

    /// Add an endpoint in the Idle state
    ///
    /// # Errors
    /// Returns `AudioError::ResourceExhausted` when the endpoint table is full
    pub fn add_endpoint(
        &mut self,
        kind: EndpointKind,
        cig_id: u8,
        cis_id: u8,
    ) -> Result<EndpointId, AudioError> {
        let id = self.endpoints.add(kind, cig_id, cis_id)?;
        debug!("[ASE] added {} cig {} cis {}", id, cig_id, cis_id);
        Ok(id)
    }

    /// Register a local capability
    ///
    /// # Errors
    /// Returns `AudioError::ResourceExhausted` when the capability table is full
    pub fn add_capability(&mut self, cap: Capability<'a>) -> Result<CapabilityId, AudioError> {
        let id = CapabilityId(self.capabilities.len() as u8);
        self.capabilities
            .push(cap)
            .map_err(|_| AudioError::ResourceExhausted)?;
        Ok(id)
    }

    /// Set the CIG/CIS pair an endpoint streams on
    ///
    /// # Errors
    /// Returns `AudioError::InvalidArgument` if the endpoint is unknown
    pub fn set_stream_ids(
        &mut self,
        ep: EndpointId,
        cig_id: u8,
        cis_id: u8,
    ) -> Result<(), AudioError> {
        self.endpoints
            .get_mut(ep)
            .ok_or(AudioError::InvalidArgument)?
            .set_stream_ids(cig_id, cis_id);
        Ok(())
    }

    /// Get a channel
    #[must_use]
    pub fn channel(&self, id: ChannelId) -> Option<&AudioChannel> {
        self.channels.get(id)
    }

    /// The channel pool
    #[must_use]
    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    /// Get an endpoint
    #[must_use]
    pub fn endpoint(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoints.get(id)
    }

    /// Get a capability
    #[must_use]
    pub fn capability(&self, id: CapabilityId) -> Option<&Capability<'a>> {
        self.capabilities.get(id.index())
    }

    /// Get a unicast group
    #[must_use]
    pub fn group(&self, id: GroupId) -> Option<&UnicastGroup> {
        self.groups.get(id)
    }

    /// Whether `chan` waits for an inbound isochronous connection
    #[must_use]
    pub fn is_listening(&self, chan: ChannelId) -> bool {
        self.listen.contains(chan)
    }

    /// Oldest pending endpoint notification
    pub fn pop_event(&mut self) -> Option<EndpointEvent> {
        self.events.pop_front()
    }

    /// Link two Idle channels
    ///
    /// # Errors
    /// See [`ChannelTable::link`]
    pub fn link(&mut self, a: ChannelId, b: ChannelId) -> Result<(), AudioError> {
        self.channels.link(a, b)
    }

    /// Unlink `a` from `b`, or from every peer when `b` is `None`
    ///
    /// # Errors
    /// See [`ChannelTable::unlink`]
    pub fn unlink(&mut self, a: ChannelId, b: Option<ChannelId>) -> Result<(), AudioError> {
        self.channels.unlink(a, b)
    }

    /// Whether `a` and `b` are linked (always true for `a == b`)
    #[must_use]
    pub fn are_linked(&self, a: ChannelId, b: ChannelId) -> bool {
        self.channels.are_linked(a, b)
    }

    /// Move a channel to a new logical state
    ///
    /// Moving to [`ChannelState::Idle`] detaches the channel: the endpoint
    /// forgets it, the connection, capability and codec references are
    /// cleared, and unless the endpoint is a broadcast one the isochronous
    /// stream is disconnected.
    ///
    /// # Errors
    /// Returns `AudioError::InvalidArgument` if the channel is unknown
    pub fn set_state(&mut self, id: ChannelId, state: ChannelState) -> Result<(), AudioError> {
        let chan = self.channels.try_get_mut(id)?;
        let old = chan.state;

        debug!("[CHAN] {} {} -> {}", id, old.as_str(), state.as_str());

        if state == ChannelState::Streaming && old != ChannelState::Configured {
            warn!(
                "[CHAN] {} unexpected transition {} -> {}",
                id,
                old.as_str(),
                state.as_str()
            );
        }

        chan.state = state;

        if state == ChannelState::Idle {
            self.detach(id);
        }

        Ok(())
    }

    fn detach(&mut self, id: ChannelId) {
        let Some(chan) = self.channels.get_mut(id) else {
            return;
        };

        let ep = chan.ep.take();
        chan.conn = None;
        chan.cap = None;
        chan.codec = None;

        let mut broadcast = false;
        if let Some(ep) = ep.and_then(|ep| self.endpoints.get_mut(ep)) {
            broadcast = ep.is_broadcast();
            let endpoint = ep.id();
            if ep.detach(id) {
                self.notify(EndpointEvent::Detached {
                    endpoint,
                    channel: id,
                });
            }
        }

        if !broadcast {
            if let Err(err) = self.disconnect(id) {
                trace!("[CHAN] {} detach disconnect: {}", id, err);
            }
        }
    }

    /// Forcefully tear a channel down to Idle
    ///
    /// Terminates the CIG carrying the channel, drops every link and detaches
    /// it. A channel without a connection is left alone.
    ///
    /// # Errors
    /// Returns `AudioError::InvalidArgument` if the channel is unknown
    pub fn reset(&mut self, id: ChannelId) -> Result<(), AudioError> {
        if self.channels.try_get(id)?.conn.is_none() {
            return Ok(());
        }

        debug!("[CHAN] reset {}", id);

        if let Err(err) = self.terminate_transport(id) {
            error!("[GROUP] Failed to terminate CIG of {}: {}", id, err);
        }

        self.channels.unlink_all(id);
        self.set_state(id, ChannelState::Idle)
    }

    /// The ACL `conn` went away; reset every channel attached to it
    pub fn acl_disconnected(&mut self, conn: ConnHandle) {
        info!("[CHAN] ACL {:#x} disconnected", conn.raw());

        let attached: Vec<ChannelId, MAX_AUDIO_CHANNELS> = self
            .channels
            .iter()
            .filter(|chan| chan.conn == Some(conn))
            .map(AudioChannel::id)
            .collect();

        for id in attached {
            if let Err(err) = self.reset(id) {
                error!("[CHAN] Failed to reset {}: {}", id, err);
            }
        }
    }

    /// The CIS of `iso` was established
    ///
    /// # Errors
    /// * `AudioError::NotFound` if no channel uses `iso`
    /// * `AudioError::InvalidState` if the channel is Idle or detached
    pub fn iso_connected(&mut self, iso: IsoChannelId) -> Result<(), AudioError> {
        let id = self.channels.find_by_iso(iso).ok_or(AudioError::NotFound)?;
        let chan = self.channels.try_get(id)?;
        if chan.state == ChannelState::Idle || chan.ep.is_none() {
            warn!("[ISO] {} connected for detached {}", iso, id);
            return Err(AudioError::InvalidState);
        }

        info!("[ISO] {} connected for {}", iso, id);
        self.set_state(id, ChannelState::Streaming)
    }

    /// The CIS of `iso` was terminated
    ///
    /// # Errors
    /// Returns `AudioError::NotFound` if no channel uses `iso`
    pub fn iso_disconnected(&mut self, iso: IsoChannelId) -> Result<(), AudioError> {
        let id = self.channels.find_by_iso(iso).ok_or(AudioError::NotFound)?;
        info!("[ISO] {} disconnected for {}", iso, id);

        let has_cig = self.groups.find_by_cis(id).is_some();
        let chan = self.channels.try_get_mut(id)?;
        if !has_cig {
            if let Some(iso) = chan.iso.as_mut() {
                iso.set_bound(false);
            }
        }

        if chan.state == ChannelState::Streaming {
            self.set_state(id, ChannelState::Configured)?;
        }

        Ok(())
    }

    fn capability_ref(&self, id: ChannelId) -> Result<CapabilityRef<'a>, AudioError> {
        let cap = self
            .channels
            .try_get(id)?
            .cap
            .and_then(|cap| self.capabilities.get(cap.index()))
            .ok_or_else(|| {
                debug!("[CHAN] {} has no capability", id);
                AudioError::InvalidArgument
            })?;

        Ok(CapabilityRef {
            role: cap.role,
            pref: cap.pref,
            ops: cap.ops,
        })
    }

    fn endpoint_of(&self, id: ChannelId) -> Result<&Endpoint, AudioError> {
        self.channels
            .try_get(id)?
            .ep
            .and_then(|ep| self.endpoints.get(ep))
            .ok_or_else(|| {
                debug!("[CHAN] {} has no endpoint", id);
                AudioError::InvalidArgument
            })
    }

    fn set_ase_state(&mut self, ep: EndpointId, state: AseState) -> Result<(), AudioError> {
        self.endpoints
            .get_mut(ep)
            .ok_or(AudioError::InvalidArgument)?
            .set_state(state)?;
        self.notify(EndpointEvent::StateChanged {
            endpoint: ep,
            state,
        });
        Ok(())
    }

    fn notify(&mut self, event: EndpointEvent) {
        if self.events.is_full() {
            warn!("[ASE] event queue full, dropping oldest");
            self.events.pop_front();
        }

        // Room was made above
        self.events.push_back(event).ok();
    }
}

impl<T: IsoTransport> core::fmt::Debug for AudioStack<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AudioStack")
            .field("options", &self.options)
            .field("channels", &self.channels)
            .field("endpoints", &self.endpoints)
            .field("capabilities", &self.capabilities)
            .field("groups", &self.groups)
            .field("listen", &self.listen)
            .finish_non_exhaustive()
    }
}
