//! Shared access to an [`AudioStack`]
//!
//! The stack itself is single owner. When the ASCS server, the transport
//! event handler and the application run in separate tasks, wrap it in a
//! [`SharedAudioStack`] so every entry point is serialized by one
//! `embassy_sync` mutex.
//!
//! ```rust,ignore
//! static STACK: StaticCell<SharedAudioStack<'static, CriticalSectionRawMutex, Iso>> =
//!     StaticCell::new();
//!
//! let stack = STACK.init(SharedAudioStack::new(AudioStack::new(iso)));
//! stack.lock().await.enable(chan, &[])?;
//! ```

use crate::AudioError;
use crate::endpoint::EndpointEvent;
use crate::iso::{AcceptInfo, IsoChannelId, IsoTransport};
use crate::stack::AudioStack;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard, TryLockError};

/// [`AudioStack`] behind an async mutex
pub struct SharedAudioStack<'a, M: RawMutex, T: IsoTransport> {
    inner: Mutex<M, AudioStack<'a, T>>,
}

impl<'a, M: RawMutex, T: IsoTransport> SharedAudioStack<'a, M, T> {
    /// Wrap a stack
    pub const fn new(stack: AudioStack<'a, T>) -> Self {
        Self {
            inner: Mutex::new(stack),
        }
    }

    /// Wait for exclusive access to the stack
    pub async fn lock(&self) -> MutexGuard<'_, M, AudioStack<'a, T>> {
        self.inner.lock().await
    }

    /// Exclusive access if nobody else holds the stack
    ///
    /// # Errors
    /// Returns `TryLockError` if the stack is currently locked
    pub fn try_lock(&self) -> Result<MutexGuard<'_, M, AudioStack<'a, T>>, TryLockError> {
        self.inner.try_lock()
    }

    /// Resolve an inbound CIS request, see [`AudioStack::accept`]
    ///
    /// # Errors
    /// Returns `AudioError::PermissionDenied` if no channel waits for the stream
    pub async fn accept(&self, info: &AcceptInfo) -> Result<IsoChannelId, AudioError> {
        self.lock().await.accept(info)
    }

    /// Pop the oldest endpoint notification
    pub async fn next_event(&self) -> Option<EndpointEvent> {
        self.lock().await.pop_event()
    }

    /// Unwrap the stack
    pub fn into_inner(self) -> AudioStack<'a, T> {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, Role};
    use crate::codec::{Codec, CodecQos, QosDirection};
    use crate::endpoint::{AseState, EndpointKind};
    use crate::testing::{DefaultCapability, MockTransport};
    use crate::ConnHandle;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn test_accept_through_shared_stack() {
        let ops = DefaultCapability;
        let mut stack = AudioStack::new(MockTransport::new());
        let cap = stack
            .add_capability(Capability::new(Role::Source, Codec::lc3(), &ops))
            .unwrap();
        let ep = stack.add_endpoint(EndpointKind::Local, 2, 3).unwrap();
        let chan = stack.add_channel(Some(IsoChannelId(9))).unwrap();
        stack
            .config(ConnHandle::new(0x40), ep, cap, Codec::lc3())
            .unwrap();
        let mut qos = CodecQos::unframed(QosDirection::In, 7_500, 30, 2, 8, 25_000);
        stack.qos(chan, &mut qos).unwrap();

        let shared: SharedAudioStack<'_, NoopRawMutex, _> = SharedAudioStack::new(stack);
        let info = AcceptInfo {
            acl: ConnHandle::new(0x40),
            cig_id: 2,
            cis_id: 3,
        };

        assert_eq!(block_on(shared.accept(&info)), Ok(IsoChannelId(9)));
        assert_eq!(
            block_on(shared.accept(&info)),
            Err(AudioError::PermissionDenied)
        );

        assert_eq!(
            block_on(shared.next_event()),
            Some(EndpointEvent::StateChanged {
                endpoint: ep,
                state: AseState::CodecConfigured
            })
        );
        assert_eq!(
            block_on(shared.next_event()),
            Some(EndpointEvent::StateChanged {
                endpoint: ep,
                state: AseState::QosConfigured
            })
        );
        assert_eq!(block_on(shared.next_event()), None);
    }

    #[test]
    fn test_try_lock_while_locked() {
        let shared: SharedAudioStack<'_, NoopRawMutex, _> =
            SharedAudioStack::new(AudioStack::new(MockTransport::new()));

        let guard = shared.try_lock().unwrap();
        assert!(shared.try_lock().is_err());
        drop(guard);

        block_on(async {
            let mut stack = shared.lock().await;
            stack.add_channel(None).unwrap();
        });
        assert_eq!(shared.into_inner().channels().len(), 1);
    }
}
