//! Test doubles for the isochronous transport and capability operations

use crate::capability::CapabilityOps;
use crate::channel::{AudioChannel, ChannelId, ChannelTable};
use crate::codec::{Codec, CodecData, CodecQos};
use crate::endpoint::EndpointId;
use crate::iso::{CigHandle, CigParams, IsoChannelId, IsoState, IsoTransport, Packing};
use crate::{AudioError, SecurityLevel};
use bt_hci::param::ConnHandle;
use core::cell::{Cell, RefCell};
use heapless::{FnvIndexMap, Vec};

/// Transport that records every request and succeeds unless told otherwise
#[derive(Debug, Default)]
pub struct MockTransport {
    pub registered: u8,
    pub security: Option<SecurityLevel>,
    pub cigs_created: u8,
    pub packing: Option<Packing>,
    pub cigs_terminated: u8,
    pub connects: Vec<(ConnHandle, IsoChannelId), 16>,
    pub disconnects: Vec<IsoChannelId, 16>,
    pub sent: usize,
    pub fail_create_cig: Option<AudioError>,
    pub fail_terminate_cig: Option<AudioError>,
    states: FnvIndexMap<u8, IsoState, 16>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&mut self, iso: IsoChannelId, state: IsoState) {
        self.states.insert(iso.0, state).ok();
    }

    pub fn state_of(&self, iso: IsoChannelId) -> IsoState {
        self.states
            .get(&iso.0)
            .copied()
            .unwrap_or(IsoState::Disconnected)
    }
}

impl IsoTransport for MockTransport {
    fn register_server(&mut self, security: SecurityLevel) -> Result<(), AudioError> {
        self.registered += 1;
        self.security = Some(security);
        Ok(())
    }

    fn create_cig(&mut self, params: &CigParams<'_>) -> Result<CigHandle, AudioError> {
        assert_eq!(params.cis.len(), 1);
        self.packing = Some(params.packing);
        if let Some(err) = self.fail_create_cig {
            return Err(err);
        }

        let handle = CigHandle(self.cigs_created);
        self.cigs_created += 1;
        Ok(handle)
    }

    fn terminate_cig(&mut self, _cig: CigHandle) -> Result<(), AudioError> {
        if let Some(err) = self.fail_terminate_cig {
            return Err(err);
        }

        self.cigs_terminated += 1;
        Ok(())
    }

    fn connect(&mut self, acl: ConnHandle, iso: IsoChannelId) -> Result<(), AudioError> {
        self.connects.push((acl, iso)).ok();
        self.set_state(iso, IsoState::Connecting);
        Ok(())
    }

    fn disconnect(&mut self, iso: IsoChannelId) -> Result<(), AudioError> {
        self.disconnects.push(iso).ok();
        self.set_state(iso, IsoState::Disconnecting);
        Ok(())
    }

    fn send(&mut self, _iso: IsoChannelId, _sdu: &[u8]) -> Result<(), AudioError> {
        self.sent += 1;
        Ok(())
    }

    fn state(&self, iso: IsoChannelId) -> IsoState {
        self.state_of(iso)
    }
}

/// Capability operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Config,
    Reconfig,
    Qos,
    Enable,
    Metadata,
    Disable,
    Start,
    Stop,
    Release,
}

/// Capability that records calls and fails the operations it is told to
///
/// `config` picks the channel set with [`MockCapability::select`], or the
/// first idle one.
#[derive(Debug, Default)]
pub struct MockCapability {
    target: Cell<Option<ChannelId>>,
    failures: RefCell<Vec<(Op, AudioError), 9>>,
    calls: RefCell<Vec<Op, 32>>,
}

impl MockCapability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&self, chan: Option<ChannelId>) {
        self.target.set(chan);
    }

    pub fn fail(&self, op: Op, err: AudioError) {
        let mut failures = self.failures.borrow_mut();
        failures.retain(|(failing, _)| *failing != op);
        failures.push((op, err)).ok();
    }

    pub fn called(&self, op: Op) -> bool {
        self.calls.borrow().contains(&op)
    }

    fn record(&self, op: Op) -> Result<(), AudioError> {
        self.calls.borrow_mut().push(op).ok();
        match self.failures.borrow().iter().find(|(failing, _)| *failing == op) {
            Some(&(_, err)) => Err(err),
            None => Ok(()),
        }
    }
}

impl CapabilityOps for MockCapability {
    fn config(
        &self,
        channels: &ChannelTable,
        _conn: ConnHandle,
        _ep: EndpointId,
        _codec: &Codec,
    ) -> Result<ChannelId, AudioError> {
        self.record(Op::Config)?;
        self.target
            .get()
            .or_else(|| channels.find_idle())
            .ok_or(AudioError::ResourceExhausted)
    }

    fn reconfig(&self, _chan: &AudioChannel, _codec: &Codec) -> Result<(), AudioError> {
        self.record(Op::Reconfig)
    }

    fn qos(&self, _chan: &AudioChannel, _qos: &CodecQos) -> Result<(), AudioError> {
        self.record(Op::Qos)
    }

    fn enable(&self, _chan: &AudioChannel, _meta: &[CodecData]) -> Result<(), AudioError> {
        self.record(Op::Enable)
    }

    fn metadata(&self, _chan: &AudioChannel, _meta: &[CodecData]) -> Result<(), AudioError> {
        self.record(Op::Metadata)
    }

    fn disable(&self, _chan: &AudioChannel) -> Result<(), AudioError> {
        self.record(Op::Disable)
    }

    fn start(&self, _chan: &AudioChannel) -> Result<(), AudioError> {
        self.record(Op::Start)
    }

    fn stop(&self, _chan: &AudioChannel) -> Result<(), AudioError> {
        self.record(Op::Stop)
    }

    fn release(&self, _chan: &AudioChannel) -> Result<(), AudioError> {
        self.record(Op::Release)
    }
}

/// Operation table relying on every default
pub struct DefaultCapability;

impl CapabilityOps for DefaultCapability {
    fn config(
        &self,
        channels: &ChannelTable,
        _conn: ConnHandle,
        _ep: EndpointId,
        _codec: &Codec,
    ) -> Result<ChannelId, AudioError> {
        channels.find_idle().ok_or(AudioError::ResourceExhausted)
    }
}
