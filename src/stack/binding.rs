//! Isochronous binding
//!
//! Connects a channel's isochronous channel to the transport. On the client
//! side a single-CIS CIG is created lazily before the first connect; on the
//! server side the channel registers in the listen registry and the remote
//! establishes the CIS.

use super::AudioStack;
use crate::AudioError;
use crate::channel::{ChannelId, ChannelState, ChannelTable};
use crate::codec::CodecQos;
use crate::endpoint::{AseState, EndpointKind, EndpointTable};
use crate::group::{CigBinding, UnicastGroup};
use crate::iso::{
    AcceptInfo, CigParams, IsoChannelId, IsoState, IsoTransport, Packing, Sca, qos_to_transport,
};
use crate::listen::{ListenKey, ListenOutcome};

fn listen_key(
    channels: &ChannelTable,
    endpoints: &EndpointTable,
    id: ChannelId,
) -> Option<ListenKey> {
    let chan = channels.get(id)?;
    let ep = endpoints.get(chan.ep?)?;
    Some(ListenKey {
        conn: chan.conn,
        cig_id: ep.cig_id(),
        cis_id: ep.cis_id(),
    })
}

impl<T: IsoTransport> AudioStack<'_, T> {
    /// Create the CIG carrying `id` if it does not exist yet
    ///
    /// `qos` is written to the isochronous QoS unless it is the QoS already
    /// stored on the channel. The CIG goes to the channel's own group when
    /// that group has none yet, otherwise to the first free group.
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if the channel is unknown, has no
    ///   isochronous channel, or `qos` carries an unknown framing
    /// * `AudioError::ResourceExhausted` if no group can hold the CIG
    /// * any error of the transport's CIG creation
    pub fn bind_transport(&mut self, id: ChannelId, qos: &CodecQos) -> Result<(), AudioError> {
        let chan = self.channels.try_get_mut(id)?;
        let stored = chan.qos;
        let group = chan.group;

        let Some(iso) = chan.iso.as_mut() else {
            error!("[GROUP] Unable to bind {}: isochronous channel not set", id);
            return Err(AudioError::InvalidArgument);
        };

        let Some(framing) = qos.framing() else {
            error!("[GROUP] Unable to bind {}: framing {:#x}", id, qos.framing);
            return Err(AudioError::InvalidArgument);
        };

        if stored.as_ref() != Some(qos) {
            qos_to_transport(&mut iso.qos, qos);
        }

        if iso.is_bound() {
            return Ok(());
        }

        let cis = *iso;
        let Some(slot) = self.groups.cig_slot(group) else {
            error!("[GROUP] Unable to bind {}: no free group", id);
            return Err(AudioError::ResourceExhausted);
        };

        let params = CigParams {
            cis: core::slice::from_ref(&cis),
            framing,
            packing: Packing::Sequential,
            interval: qos.interval,
            latency: qos.latency,
            sca: Sca::Unknown,
        };

        let handle = match self.transport.create_cig(&params) {
            Ok(handle) => handle,
            Err(err) => {
                error!("[GROUP] CIG creation failed: {}", err);
                return Err(err);
            }
        };

        info!("[GROUP] {} carries CIG {} for {}", slot, handle.0, id);

        if let Some(group) = self.groups.get_mut(slot) {
            group.cig = Some(CigBinding { handle, cis: id });
        }
        if let Some(iso) = self.channels.get_mut(id).and_then(|chan| chan.iso.as_mut()) {
            iso.set_bound(true);
        }

        Ok(())
    }

    /// Terminate the CIG whose only stream is `id`
    ///
    /// A channel without an isochronous channel, or whose CIG is already
    /// gone, is left alone.
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if the channel is unknown
    /// * any error of the transport's CIG termination
    pub fn terminate_transport(&mut self, id: ChannelId) -> Result<(), AudioError> {
        if self.channels.try_get(id)?.iso.is_none() {
            debug!("[GROUP] {} not bound", id);
            return Ok(());
        }

        let Some(slot) = self.groups.find_by_cis(id) else {
            debug!("[GROUP] CIG not found for {}", id);
            return Ok(());
        };
        let Some(cig) = self.groups.get(slot).and_then(UnicastGroup::cig) else {
            return Ok(());
        };

        self.transport.terminate_cig(cig.handle)?;
        info!("[GROUP] CIG {} terminated", cig.handle.0);

        if let Some(group) = self.groups.get_mut(slot) {
            group.cig = None;
        }
        if let Some(iso) = self.channels.get_mut(id).and_then(|chan| chan.iso.as_mut()) {
            iso.set_bound(false);
        }

        Ok(())
    }

    /// Establish the CIS of `id`
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if the channel is unknown, has no
    ///   isochronous channel or no connection
    /// * `AudioError::NotConnected` if the CIG could not be created
    /// * `AudioError::AlreadyInState` if the CIS is already established
    /// * any error of the transport's connect
    pub fn connect(&mut self, id: ChannelId) -> Result<(), AudioError> {
        let chan = self.channels.try_get(id)?;
        let (Some(iso), Some(conn)) = (chan.iso, chan.conn) else {
            debug!("[ISO] {} has no isochronous channel or connection", id);
            return Err(AudioError::InvalidArgument);
        };
        let qos = chan.qos;

        debug!("[ISO] connect {} over {}", id, iso.id);

        match self.transport.state(iso.id) {
            IsoState::Disconnected => {
                let Some(qos) = qos else {
                    error!("[ISO] Unable to connect {}: QoS not set", id);
                    return Err(AudioError::NotConnected);
                };

                if let Err(err) = self.bind_transport(id, &qos) {
                    error!("[ISO] Unable to connect {}: {}", id, err);
                    return Err(AudioError::NotConnected);
                }

                self.transport.connect(conn, iso.id)
            }
            IsoState::Connecting => Ok(()),
            IsoState::Connected => Err(AudioError::AlreadyInState),
            IsoState::Disconnecting => self.transport.connect(conn, iso.id),
        }
    }

    /// Stop listening for `id` and terminate its CIS
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if the channel is unknown
    /// * `AudioError::NotConnected` if there is no CIS to terminate
    /// * any error of the transport's disconnect
    pub fn disconnect(&mut self, id: ChannelId) -> Result<(), AudioError> {
        let iso = self.channels.try_get(id)?.iso;

        debug!("[ISO] disconnect {}", id);

        self.listen.cancel(id);

        match iso {
            Some(iso) if iso.is_bound() => self.transport.disconnect(iso.id),
            _ => Err(AudioError::NotConnected),
        }
    }

    /// Queue one SDU on the CIS of `id`
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if the channel is unknown, not attached
    ///   or attached to a broadcast sink
    /// * `AudioError::InvalidState` if the channel is not Streaming, or its
    ///   unicast endpoint is not Streaming
    /// * `AudioError::NotConnected` if the channel has no isochronous channel
    /// * any error of the transport's send
    pub fn send(&mut self, id: ChannelId, sdu: &[u8]) -> Result<(), AudioError> {
        let chan = self.channels.try_get(id)?;
        let Some(ep) = chan.ep.and_then(|ep| self.endpoints.get(ep)) else {
            return Err(AudioError::InvalidArgument);
        };

        if chan.state != ChannelState::Streaming {
            debug!("[ISO] {} not ready for streaming", id);
            return Err(AudioError::InvalidState);
        }

        match ep.kind() {
            EndpointKind::BroadcastSink => {
                debug!("[ISO] Cannot send on broadcast sink {}", id);
                return Err(AudioError::InvalidArgument);
            }
            EndpointKind::BroadcastSource => {}
            EndpointKind::Local | EndpointKind::Remote => {
                if ep.state() != AseState::Streaming {
                    error!("[ASE] {} invalid state: {}", ep.id(), ep.state().as_str());
                    return Err(AudioError::InvalidState);
                }
            }
        }

        let iso = chan.iso.ok_or(AudioError::NotConnected)?;
        self.transport.send(iso.id, sdu)
    }

    /// Resolve an inbound CIS request to the isochronous channel waiting for it
    ///
    /// The channel leaves the listen registry and its CIS counts as bound.
    ///
    /// # Errors
    /// Returns `AudioError::PermissionDenied` if no channel listens for the
    /// requested CIG/CIS pair
    pub fn accept(&mut self, info: &AcceptInfo) -> Result<IsoChannelId, AudioError> {
        debug!(
            "[LISTEN] accept acl {:#x} cig {} cis {}",
            info.acl.raw(),
            info.cig_id,
            info.cis_id
        );

        let channels = &self.channels;
        let endpoints = &self.endpoints;
        let id = self
            .listen
            .resolve(info.cig_id, info.cis_id, |chan| {
                listen_key(channels, endpoints, chan)
            })
            .map_err(|_| AudioError::PermissionDenied)?;

        let iso = self
            .channels
            .get_mut(id)
            .and_then(|chan| chan.iso.as_mut())
            .ok_or(AudioError::PermissionDenied)?;
        iso.set_bound(true);

        info!("[LISTEN] {} accepted on {}", id, iso.id);
        Ok(iso.id)
    }

    /// Wait for the inbound CIS of `id`
    pub(crate) fn listen(&mut self, id: ChannelId) -> Result<(), AudioError> {
        if self.channels.try_get(id)?.iso.is_none() {
            debug!("[LISTEN] {} has no isochronous channel", id);
            return Err(AudioError::InvalidArgument);
        }

        let key = listen_key(&self.channels, &self.endpoints, id).ok_or(AudioError::InvalidArgument)?;

        debug!("[LISTEN] {} cig {} cis {}", id, key.cig_id, key.cis_id);

        if !self.listen.is_registered() {
            if let Err(err) = self.transport.register_server(self.options.iso_security) {
                error!("[LISTEN] Acceptor registration failed: {}", err);
                return Err(err);
            }
            self.listen.mark_registered();
        }

        let channels = &self.channels;
        let endpoints = &self.endpoints;
        let outcome = self
            .listen
            .listen(id, key, |chan| listen_key(channels, endpoints, chan))?;

        if let ListenOutcome::Linked(peer) = outcome {
            self.channels.insert_link(peer, id)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::capability::{Capability, Role};
    use crate::channel::{ChannelId, ChannelState};
    use crate::codec::{Codec, CodecQos, QosDirection};
    use crate::constants::MAX_UNICAST_GROUPS;
    use crate::endpoint::{AseState, EndpointKind};
    use crate::group::GroupId;
    use crate::iso::{AcceptInfo, IsoChannelId, IsoState, Packing};
    use crate::testing::{MockCapability, MockTransport};
    use crate::{AudioError, AudioStack, ConnHandle, SecurityLevel};

    const ACL: u16 = 0x40;

    fn qos() -> CodecQos {
        CodecQos::unframed(QosDirection::InOut, 10_000, 40, 2, 10, 20_000)
    }

    /// Client side stack with a remote endpoint configured and QoS set
    fn client(ops: &MockCapability) -> (AudioStack<'_, MockTransport>, ChannelId) {
        let mut stack = AudioStack::new(MockTransport::new());
        let cap = stack
            .add_capability(Capability::new(Role::Source, Codec::lc3(), ops))
            .unwrap();
        let ep = stack.add_endpoint(EndpointKind::Remote, 1, 1).unwrap();
        let chan = stack.add_channel(Some(IsoChannelId(2))).unwrap();

        stack
            .config(ConnHandle::new(ACL), ep, cap, Codec::lc3())
            .unwrap();
        stack.remote_state_changed(ep, AseState::CodecConfigured).unwrap();
        stack.qos(chan, &mut qos()).unwrap();
        (stack, chan)
    }

    #[test]
    fn test_connect_creates_cig_once() {
        let ops = MockCapability::new();
        let (mut stack, chan) = client(&ops);

        stack.connect(chan).unwrap();
        assert_eq!(stack.transport().cigs_created, 1);
        assert_eq!(stack.transport().packing, Some(Packing::Sequential));
        assert_eq!(
            stack.transport().connects.as_slice(),
            &[(ConnHandle::new(ACL), IsoChannelId(2))]
        );
        assert!(stack.channel(chan).unwrap().iso().unwrap().is_bound());

        let group = stack.group(GroupId(0)).unwrap();
        assert_eq!(group.cig().map(|cig| cig.cis), Some(chan));

        // Still connecting: nothing new is issued
        stack.connect(chan).unwrap();
        assert_eq!(stack.transport().connects.len(), 1);

        stack
            .transport_mut()
            .set_state(IsoChannelId(2), IsoState::Connected);
        assert_eq!(stack.connect(chan), Err(AudioError::AlreadyInState));
    }

    #[test]
    fn test_connect_reuses_existing_cig() {
        let ops = MockCapability::new();
        let (mut stack, chan) = client(&ops);

        stack.connect(chan).unwrap();
        stack
            .transport_mut()
            .set_state(IsoChannelId(2), IsoState::Disconnected);
        stack.connect(chan).unwrap();

        assert_eq!(stack.transport().cigs_created, 1);
        assert_eq!(stack.transport().connects.len(), 2);
    }

    #[test]
    fn test_connect_cig_failure_is_not_connected() {
        let ops = MockCapability::new();
        let (mut stack, chan) = client(&ops);
        stack.transport_mut().fail_create_cig = Some(AudioError::Hci(0x12));

        assert_eq!(stack.connect(chan), Err(AudioError::NotConnected));
        assert!(stack.transport().connects.is_empty());
        assert!(!stack.channel(chan).unwrap().iso().unwrap().is_bound());
    }

    #[test]
    fn test_connect_requires_iso_channel() {
        let mut stack = AudioStack::new(MockTransport::new());
        let chan = stack.add_channel(None).unwrap();

        assert_eq!(stack.connect(chan), Err(AudioError::InvalidArgument));
        assert_eq!(stack.disconnect(chan), Err(AudioError::NotConnected));
    }

    #[test]
    fn test_bind_transport_exhausted() {
        let ops = MockCapability::new();
        let (mut stack, chan) = client(&ops);

        for _ in 0..2 {
            let other = stack.add_channel(None).unwrap();
            stack.create_group(&[other]).unwrap();
        }
        // Occupy the remaining slots directly
        for index in 2..MAX_UNICAST_GROUPS {
            stack
                .groups
                .get_mut(GroupId(index as u8))
                .unwrap()
                .chans
                .push(ChannelId(0))
                .unwrap();
        }

        assert_eq!(
            stack.bind_transport(chan, &qos()),
            Err(AudioError::ResourceExhausted)
        );
    }

    #[test]
    fn test_bind_transport_uses_own_group() {
        let ops = MockCapability::new();
        let (mut stack, chan) = client(&ops);
        let other = stack.add_channel(None).unwrap();
        stack.create_group(&[other]).unwrap();
        let group = stack.create_group(&[chan]).unwrap();

        stack.bind_transport(chan, &qos()).unwrap();
        assert_eq!(
            stack.group(group).unwrap().cig().map(|cig| cig.cis),
            Some(chan)
        );
    }

    #[test]
    fn test_bind_transport_writes_new_qos() {
        let ops = MockCapability::new();
        let (mut stack, chan) = client(&ops);

        let mut update = qos();
        update.sdu = 120;
        stack.bind_transport(chan, &update).unwrap();

        let iso = stack.channel(chan).unwrap().iso().unwrap();
        assert_eq!(iso.qos.rx.map(|io| io.sdu), Some(120));
        assert_eq!(iso.qos.tx.map(|io| io.sdu), Some(120));
    }

    #[test]
    fn test_terminate_transport() {
        let ops = MockCapability::new();
        let (mut stack, chan) = client(&ops);

        // Nothing to terminate yet
        stack.terminate_transport(chan).unwrap();
        assert_eq!(stack.transport().cigs_terminated, 0);

        stack.connect(chan).unwrap();
        stack.terminate_transport(chan).unwrap();
        assert_eq!(stack.transport().cigs_terminated, 1);
        assert!(stack.group(GroupId(0)).unwrap().is_free());
        assert!(!stack.channel(chan).unwrap().iso().unwrap().is_bound());
    }

    #[test]
    fn test_terminate_failure_keeps_cig() {
        let ops = MockCapability::new();
        let (mut stack, chan) = client(&ops);
        stack.connect(chan).unwrap();
        stack.transport_mut().fail_terminate_cig = Some(AudioError::Hci(0x0C));

        assert_eq!(stack.terminate_transport(chan), Err(AudioError::Hci(0x0C)));
        assert!(stack.group(GroupId(0)).unwrap().cig().is_some());
    }

    #[test]
    fn test_reset_terminates_cig() {
        let ops = MockCapability::new();
        let (mut stack, chan) = client(&ops);
        stack.connect(chan).unwrap();

        stack.reset(chan).unwrap();
        assert_eq!(stack.transport().cigs_terminated, 1);
        assert_eq!(stack.channel(chan).unwrap().state(), ChannelState::Idle);
    }

    #[test]
    fn test_disconnect_cancels_listen() {
        let ops = MockCapability::new();
        let mut stack = AudioStack::new(MockTransport::new());
        let cap = stack
            .add_capability(Capability::new(Role::Sink, Codec::lc3(), &ops))
            .unwrap();
        let ep = stack.add_endpoint(EndpointKind::Local, 1, 1).unwrap();
        let chan = stack.add_channel(Some(IsoChannelId(0))).unwrap();
        stack
            .config(ConnHandle::new(ACL), ep, cap, Codec::lc3())
            .unwrap();
        stack.qos(chan, &mut qos()).unwrap();
        assert!(stack.is_listening(chan));

        assert_eq!(stack.disconnect(chan), Err(AudioError::NotConnected));
        assert!(!stack.is_listening(chan));
    }

    #[test]
    fn test_listen_registers_acceptor_once() {
        let ops = MockCapability::new();
        let mut stack = AudioStack::new(MockTransport::new());
        let cap = stack
            .add_capability(Capability::new(Role::Sink, Codec::lc3(), &ops))
            .unwrap();

        for cis in 1..=2 {
            let ep = stack.add_endpoint(EndpointKind::Local, 1, cis).unwrap();
            let chan = stack.add_channel(Some(IsoChannelId(cis))).unwrap();
            stack
                .config(ConnHandle::new(ACL), ep, cap, Codec::lc3())
                .unwrap();
            stack.qos(chan, &mut qos()).unwrap();
        }

        assert_eq!(stack.transport().registered, 1);
        assert_eq!(stack.transport().security, Some(SecurityLevel::L2));
    }

    #[test]
    fn test_listen_links_channels_sharing_a_cis() {
        let ops = MockCapability::new();
        let mut stack = AudioStack::new(MockTransport::new());
        let cap = stack
            .add_capability(Capability::new(Role::Sink, Codec::lc3(), &ops))
            .unwrap();

        let mut chans = [ChannelId(0); 2];
        for chan in &mut chans {
            let ep = stack.add_endpoint(EndpointKind::Local, 1, 1).unwrap();
            *chan = stack.add_channel(Some(IsoChannelId(0))).unwrap();
            stack
                .config(ConnHandle::new(ACL), ep, cap, Codec::lc3())
                .unwrap();
            stack.qos(*chan, &mut qos()).unwrap();
        }

        assert!(stack.is_listening(chans[0]));
        assert!(!stack.is_listening(chans[1]));
        assert!(stack.are_linked(chans[0], chans[1]));
    }

    #[test]
    fn test_accept_without_listener() {
        let mut stack = AudioStack::new(MockTransport::new());
        let info = AcceptInfo {
            acl: ConnHandle::new(ACL),
            cig_id: 1,
            cis_id: 1,
        };

        assert_eq!(stack.accept(&info), Err(AudioError::PermissionDenied));
    }

    #[test]
    fn test_listen_requires_iso_channel() {
        let ops = MockCapability::new();
        let mut stack = AudioStack::new(MockTransport::new());
        let cap = stack
            .add_capability(Capability::new(Role::Sink, Codec::lc3(), &ops))
            .unwrap();
        let ep = stack.add_endpoint(EndpointKind::Local, 1, 1).unwrap();
        let chan = stack.add_channel(None).unwrap();
        stack
            .config(ConnHandle::new(ACL), ep, cap, Codec::lc3())
            .unwrap();

        stack.qos(chan, &mut qos()).unwrap();
        assert_eq!(
            stack.endpoint(ep).unwrap().state(),
            AseState::QosConfigured
        );
        assert!(!stack.is_listening(chan));
        assert_eq!(stack.listen(chan), Err(AudioError::InvalidArgument));
        assert_eq!(stack.transport().registered, 0);
        assert!(stack.listen.is_empty());
    }

    #[test]
    fn test_send_requires_streaming() {
        let ops = MockCapability::new();
        let mut stack = AudioStack::new(MockTransport::new());
        let cap = stack
            .add_capability(Capability::new(Role::Source, Codec::lc3(), &ops))
            .unwrap();
        let ep = stack.add_endpoint(EndpointKind::Local, 1, 1).unwrap();
        let chan = stack.add_channel(Some(IsoChannelId(0))).unwrap();

        assert_eq!(stack.send(chan, &[0; 4]), Err(AudioError::InvalidArgument));

        stack
            .config(ConnHandle::new(ACL), ep, cap, Codec::lc3())
            .unwrap();
        assert_eq!(stack.send(chan, &[0; 4]), Err(AudioError::InvalidState));

        // Logical streaming is not enough without a streaming ASE
        stack.set_state(chan, ChannelState::Streaming).unwrap();
        assert_eq!(stack.send(chan, &[0; 4]), Err(AudioError::InvalidState));

        stack.qos(chan, &mut qos()).unwrap();
        stack
            .accept(&AcceptInfo {
                acl: ConnHandle::new(ACL),
                cig_id: 1,
                cis_id: 1,
            })
            .unwrap();
        stack.enable(chan, &[]).unwrap();
        stack.start(chan).unwrap();
        stack.iso_connected(IsoChannelId(0)).unwrap();

        stack.send(chan, &[1, 2, 3]).unwrap();
        assert_eq!(stack.transport().sent, 1);
    }

    #[test]
    fn test_send_broadcast() {
        let ops = MockCapability::new();
        let mut stack = AudioStack::new(MockTransport::new());
        let cap = stack
            .add_capability(Capability::new(Role::Source, Codec::lc3(), &ops))
            .unwrap();
        let source = stack
            .add_endpoint(EndpointKind::BroadcastSource, 0, 0)
            .unwrap();
        let sink = stack.add_endpoint(EndpointKind::BroadcastSink, 0, 1).unwrap();
        let tx = stack.add_channel(Some(IsoChannelId(0))).unwrap();

        stack
            .config(ConnHandle::new(ACL), source, cap, Codec::lc3())
            .unwrap();
        let rx = stack.add_channel(Some(IsoChannelId(1))).unwrap();
        stack
            .config(ConnHandle::new(ACL), sink, cap, Codec::lc3())
            .unwrap();
        stack.set_state(tx, ChannelState::Streaming).unwrap();
        stack.set_state(rx, ChannelState::Streaming).unwrap();

        stack.send(tx, &[0; 2]).unwrap();
        assert_eq!(stack.send(rx, &[0; 2]), Err(AudioError::InvalidArgument));
    }
}
