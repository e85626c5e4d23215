//! ASE procedures
//!
//! Each procedure checks the current ASE state of the endpoint attached to
//! the channel, hands the request to the capability's operation table and, for
//! local endpoints, performs the ASE state write. Remote endpoints only move
//! when the remote server notifies, through
//! [`AudioStack::remote_state_changed`].

use super::{AudioStack, CapabilityRef};
use crate::AudioError;
use crate::capability::{CapabilityId, Role};
use crate::channel::{ChannelId, ChannelState};
use crate::codec::{Codec, CodecData, CodecQos};
use crate::endpoint::{AseState, EndpointId, EndpointKind};
use crate::iso::{IsoTransport, qos_to_transport};
use crate::qos::validate;
use bt_hci::param::ConnHandle;

fn check_state(ep: EndpointId, state: AseState, allowed: &[AseState]) -> Result<(), AudioError> {
    if allowed.contains(&state) {
        return Ok(());
    }

    error!("[ASE] {} invalid state: {}", ep, state.as_str());
    Err(AudioError::InvalidState)
}

fn check_unicast(ep: EndpointId, kind: EndpointKind) -> Result<(), AudioError> {
    if kind.is_broadcast() {
        debug!("[ASE] {} is a broadcast endpoint", ep);
        return Err(AudioError::InvalidArgument);
    }

    Ok(())
}

impl<T: IsoTransport> AudioStack<'_, T> {
    /// Config Codec: pick a channel for `ep` through the capability and bind it
    ///
    /// The channel chosen by the capability is attached to `conn`, `cap` and
    /// `codec`, and moves to logical Configured. A local endpoint moves to
    /// Codec Configured. If the endpoint was serving another channel, that
    /// channel is detached first.
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` for an unknown endpoint or capability, a
    ///   codec the capability does not advertise, or a channel the capability
    ///   returned that is unknown or serves another endpoint
    /// * `AudioError::InvalidState` if the endpoint is not Idle, Codec
    ///   Configured or QoS Configured
    /// * any error of the capability's `config` operation
    pub fn config(
        &mut self,
        conn: ConnHandle,
        ep: EndpointId,
        cap: CapabilityId,
        codec: Codec,
    ) -> Result<ChannelId, AudioError> {
        debug!(
            "[ASE] config {} conn {:#x} codec id {:#x} cid {:#x} vid {:#x}",
            ep,
            conn.raw(),
            codec.id,
            codec.cid,
            codec.vid
        );

        let endpoint = self.endpoints.get(ep).ok_or(AudioError::InvalidArgument)?;
        let (kind, previous) = (endpoint.kind(), endpoint.channel());
        check_state(
            ep,
            endpoint.state(),
            &[
                AseState::Idle,
                AseState::CodecConfigured,
                AseState::QosConfigured,
            ],
        )?;

        let capability = self
            .capabilities
            .get(cap.index())
            .ok_or(AudioError::InvalidArgument)?;
        if capability.codec.id != codec.id {
            error!("[ASE] Invalid codec id {:#x}", codec.id);
            return Err(AudioError::InvalidArgument);
        }

        let ops = capability.ops;
        let id = ops.config(&self.channels, conn, ep, &codec)?;

        let chan = self.channels.try_get(id)?;
        if chan.ep.is_some_and(|attached| attached != ep) {
            error!("[ASE] {} already serves another endpoint", id);
            return Err(AudioError::InvalidArgument);
        }

        if let Some(previous) = previous.filter(|&previous| previous != id) {
            debug!("[ASE] {} replaces {} on {}", id, previous, ep);
            self.set_state(previous, ChannelState::Idle)?;
        }

        self.attach(id, conn, ep, cap, codec)?;

        if kind == EndpointKind::Local {
            self.set_ase_state(ep, AseState::CodecConfigured)?;
        }

        self.set_state(id, ChannelState::Configured)?;
        Ok(id)
    }

    /// Reconfigure an attached channel with `codec` from capability `cap`
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if the channel is not attached, its
    ///   endpoint is a broadcast one, or `cap` is unknown
    /// * `AudioError::InvalidState` if the endpoint is not Idle, Codec
    ///   Configured or QoS Configured
    /// * `AudioError::NotSupported` if `cap` does not advertise `codec`
    /// * any error of the capability's `reconfig` operation
    pub fn reconfig(
        &mut self,
        id: ChannelId,
        cap: CapabilityId,
        codec: Codec,
    ) -> Result<(), AudioError> {
        debug!("[ASE] reconfig {} codec id {:#x}", id, codec.id);

        let endpoint = self.endpoint_of(id)?;
        let (ep, kind, state) = (endpoint.id(), endpoint.kind(), endpoint.state());
        check_unicast(ep, kind)?;
        self.capability_ref(id)?;

        check_state(
            ep,
            state,
            &[
                AseState::Idle,
                AseState::CodecConfigured,
                AseState::QosConfigured,
            ],
        )?;

        let capability = self
            .capabilities
            .get(cap.index())
            .ok_or(AudioError::InvalidArgument)?;
        if capability.codec.id != codec.id {
            return Err(AudioError::NotSupported);
        }

        let ops = capability.ops;
        ops.reconfig(self.channels.try_get(id)?, &codec)?;

        let conn = self.channels.try_get(id)?.conn.ok_or(AudioError::NotConnected)?;
        self.attach(id, conn, ep, cap, codec)?;

        if kind == EndpointKind::Local {
            self.set_ase_state(ep, AseState::CodecConfigured)?;
        }

        self.set_state(id, ChannelState::Configured)
    }

    /// Config QoS: validate `qos` and hand it to the capability
    ///
    /// On failure of the range checks the offending field of `qos` is reset
    /// to its sentinel. On success the QoS is stored on the channel and
    /// written to its isochronous QoS; a local endpoint moves to QoS
    /// Configured and starts listening for the inbound CIS.
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if the channel is not attached or its
    ///   endpoint is a broadcast one
    /// * `AudioError::InvalidState` if the endpoint is not Codec Configured or
    ///   QoS Configured
    /// * `AudioError::NotSupported` if a QoS field is out of range
    /// * any error of the capability's `qos` operation
    pub fn qos(&mut self, id: ChannelId, qos: &mut CodecQos) -> Result<(), AudioError> {
        debug!("[ASE] qos {}", id);

        let endpoint = self.endpoint_of(id)?;
        let (ep, kind, state) = (endpoint.id(), endpoint.kind(), endpoint.state());
        let CapabilityRef { pref, ops, .. } = self.capability_ref(id)?;
        check_unicast(ep, kind)?;
        check_state(
            ep,
            state,
            &[AseState::CodecConfigured, AseState::QosConfigured],
        )?;

        validate(qos, &pref)?;
        ops.qos(self.channels.try_get(id)?, qos)?;

        let chan = self.channels.try_get_mut(id)?;
        chan.qos = Some(*qos);
        if let Some(iso) = chan.iso.as_mut() {
            qos_to_transport(&mut iso.qos, qos);
        }

        if kind == EndpointKind::Local {
            self.set_ase_state(ep, AseState::QosConfigured)?;
            if let Err(err) = self.listen(id) {
                warn!("[LISTEN] {} not listening: {}", id, err);
            }
        }

        Ok(())
    }

    /// Enable with `meta`
    ///
    /// A local endpoint moves to Enabling. A local Sink that is no longer
    /// waiting for its CIS then runs the Receiver Start Ready handshake
    /// itself when [`AudioStackOptions::sink_autonomous`] is set.
    ///
    /// [`AudioStackOptions::sink_autonomous`]: crate::AudioStackOptions::sink_autonomous
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if the channel is not attached
    /// * `AudioError::InvalidState` if the endpoint is not QoS Configured
    /// * any error of the capability's `enable` operation or of the
    ///   autonomous start
    pub fn enable(&mut self, id: ChannelId, meta: &[CodecData]) -> Result<(), AudioError> {
        debug!("[ASE] enable {} meta count {}", id, meta.len());

        let endpoint = self.endpoint_of(id)?;
        let (ep, kind, state) = (endpoint.id(), endpoint.kind(), endpoint.state());
        let CapabilityRef { role, ops, .. } = self.capability_ref(id)?;
        check_state(ep, state, &[AseState::QosConfigured])?;

        ops.enable(self.channels.try_get(id)?, meta)?;

        if kind != EndpointKind::Local {
            return Ok(());
        }

        self.set_ase_state(ep, AseState::Enabling)?;

        if self.listen.contains(id) {
            return Ok(());
        }

        if role == Role::Source || !self.options.sink_autonomous {
            return Ok(());
        }

        self.start(id)
    }

    /// Update Metadata with `meta`; a local endpoint re-announces its state
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if the channel is not attached
    /// * `AudioError::InvalidState` if the endpoint is not Enabling or Streaming
    /// * any error of the capability's `metadata` operation
    pub fn metadata(&mut self, id: ChannelId, meta: &[CodecData]) -> Result<(), AudioError> {
        debug!("[ASE] metadata {} count {}", id, meta.len());

        let endpoint = self.endpoint_of(id)?;
        let (ep, kind, state) = (endpoint.id(), endpoint.kind(), endpoint.state());
        let CapabilityRef { ops, .. } = self.capability_ref(id)?;
        check_state(ep, state, &[AseState::Enabling, AseState::Streaming])?;

        ops.metadata(self.channels.try_get(id)?, meta)?;

        if kind == EndpointKind::Local {
            self.set_ase_state(ep, state)?;
        }

        Ok(())
    }

    /// Disable
    ///
    /// A local endpoint moves to Disabling; a local Sink then runs the
    /// Receiver Stop Ready handshake itself when autonomous handshakes are
    /// enabled.
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if the channel is not attached
    /// * `AudioError::InvalidState` if the endpoint is not Enabling or Streaming
    /// * any error of the capability's `disable` operation or of the
    ///   autonomous stop
    pub fn disable(&mut self, id: ChannelId) -> Result<(), AudioError> {
        debug!("[ASE] disable {}", id);

        let endpoint = self.endpoint_of(id)?;
        let (ep, kind, state) = (endpoint.id(), endpoint.kind(), endpoint.state());
        let CapabilityRef { role, ops, .. } = self.capability_ref(id)?;
        check_state(ep, state, &[AseState::Enabling, AseState::Streaming])?;

        ops.disable(self.channels.try_get(id)?)?;

        if kind != EndpointKind::Local {
            return Ok(());
        }

        self.set_ase_state(ep, AseState::Disabling)?;

        if role == Role::Source || !self.options.sink_autonomous {
            return Ok(());
        }

        self.stop(id)
    }

    /// Receiver Start Ready; a local endpoint moves to Streaming
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if the channel is not attached or its
    ///   endpoint is a broadcast one
    /// * `AudioError::InvalidState` if the endpoint is not Enabling
    /// * any error of the capability's `start` operation
    pub fn start(&mut self, id: ChannelId) -> Result<(), AudioError> {
        debug!("[ASE] start {}", id);

        let endpoint = self.endpoint_of(id)?;
        let (ep, kind, state) = (endpoint.id(), endpoint.kind(), endpoint.state());
        check_unicast(ep, kind)?;
        let CapabilityRef { ops, .. } = self.capability_ref(id)?;
        check_state(ep, state, &[AseState::Enabling])?;

        ops.start(self.channels.try_get(id)?)?;

        if kind == EndpointKind::Local {
            self.set_ase_state(ep, AseState::Streaming)?;
        }

        Ok(())
    }

    /// Receiver Stop Ready
    ///
    /// A local endpoint terminates its CIS, moves back to QoS Configured and
    /// listens again, whether or not a CIS was still up.
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if the channel is not attached or its
    ///   endpoint is a broadcast one
    /// * `AudioError::InvalidState` if the endpoint is not Disabling
    /// * any error of the capability's `stop` operation
    pub fn stop(&mut self, id: ChannelId) -> Result<(), AudioError> {
        debug!("[ASE] stop {}", id);

        let endpoint = self.endpoint_of(id)?;
        let (ep, kind, state) = (endpoint.id(), endpoint.kind(), endpoint.state());
        check_unicast(ep, kind)?;
        let CapabilityRef { ops, .. } = self.capability_ref(id)?;
        check_state(ep, state, &[AseState::Disabling])?;

        ops.stop(self.channels.try_get(id)?)?;

        if kind != EndpointKind::Local {
            return Ok(());
        }

        match self.disconnect(id) {
            Ok(()) => debug!("[ISO] {} disconnecting", id),
            Err(err) => debug!("[ISO] {} disconnect: {}", id, err),
        }

        self.set_ase_state(ep, AseState::QosConfigured)?;
        if let Err(err) = self.listen(id) {
            warn!("[LISTEN] {} not listening: {}", id, err);
        }

        Ok(())
    }

    /// Release, optionally keeping the codec configuration cached
    ///
    /// A local endpoint moves to Releasing, or straight back to Codec
    /// Configured when `cache` is set. If the capability reports the
    /// transport already gone, the channel is detached at once instead.
    ///
    /// # Errors
    /// * `AudioError::AlreadyInState` if the channel is Idle
    /// * `AudioError::InvalidArgument` if the channel is not attached or its
    ///   endpoint is a broadcast one
    /// * `AudioError::InvalidState` if the endpoint is Idle or Releasing
    /// * any error of the capability's `release` operation except
    ///   `NotConnected`
    pub fn release(&mut self, id: ChannelId, cache: bool) -> Result<(), AudioError> {
        debug!("[ASE] release {} cache {}", id, cache);

        if self.channels.try_get(id)?.state == ChannelState::Idle {
            debug!("[CHAN] {} is idle", id);
            return Err(AudioError::AlreadyInState);
        }

        let endpoint = self.endpoint_of(id)?;
        let (ep, kind, state) = (endpoint.id(), endpoint.kind(), endpoint.state());
        check_unicast(ep, kind)?;
        let CapabilityRef { ops, .. } = self.capability_ref(id)?;
        check_state(
            ep,
            state,
            &[
                AseState::CodecConfigured,
                AseState::QosConfigured,
                AseState::Enabling,
                AseState::Streaming,
                AseState::Disabling,
            ],
        )?;

        match ops.release(self.channels.try_get(id)?) {
            Ok(()) => {}
            Err(AudioError::NotConnected) => {
                debug!("[ASE] {} transport already gone", id);
                return self.set_state(id, ChannelState::Idle);
            }
            Err(err) => return Err(err),
        }

        if kind != EndpointKind::Local {
            return Ok(());
        }

        let next = if cache {
            AseState::CodecConfigured
        } else {
            AseState::Releasing
        };
        self.set_ase_state(ep, next)
    }

    /// Finish a local release: the endpoint goes Idle and the channel detaches
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if the channel is not attached to a
    ///   local endpoint
    /// * `AudioError::InvalidState` if the endpoint is not Releasing
    pub fn release_complete(&mut self, id: ChannelId) -> Result<(), AudioError> {
        debug!("[ASE] release complete {}", id);

        let endpoint = self.endpoint_of(id)?;
        let (ep, kind, state) = (endpoint.id(), endpoint.kind(), endpoint.state());
        if kind != EndpointKind::Local {
            return Err(AudioError::InvalidArgument);
        }
        check_state(ep, state, &[AseState::Releasing])?;

        self.set_ase_state(ep, AseState::Idle)?;
        self.set_state(id, ChannelState::Idle)
    }

    /// Mirror a state notification from a remote ASE
    ///
    /// A remote endpoint going Idle detaches its channel.
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if `ep` is unknown or not remote
    /// * `AudioError::InvalidState` if the transition is not allowed by ASCS
    pub fn remote_state_changed(
        &mut self,
        ep: EndpointId,
        state: AseState,
    ) -> Result<(), AudioError> {
        let endpoint = self.endpoints.get(ep).ok_or(AudioError::InvalidArgument)?;
        if endpoint.kind() != EndpointKind::Remote {
            return Err(AudioError::InvalidArgument);
        }
        let chan = endpoint.channel();

        self.set_ase_state(ep, state)?;

        if let Some(chan) = chan.filter(|_| state == AseState::Idle) {
            self.set_state(chan, ChannelState::Idle)?;
        }

        Ok(())
    }

    fn attach(
        &mut self,
        id: ChannelId,
        conn: ConnHandle,
        ep: EndpointId,
        cap: CapabilityId,
        codec: Codec,
    ) -> Result<(), AudioError> {
        debug!("[CHAN] attach {} to {} conn {:#x}", id, ep, conn.raw());

        let chan = self.channels.try_get_mut(id)?;
        chan.conn = Some(conn);
        chan.cap = Some(cap);
        chan.codec = Some(codec);
        chan.ep = Some(ep);

        self.endpoints
            .get_mut(ep)
            .ok_or(AudioError::InvalidArgument)?
            .attach(id);
        Ok(())
    }
}
