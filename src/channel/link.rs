//! Channel links
//!
//! Channels that must move together (for instance the left and right channel
//! of a stereo pair sharing one CIG/CIS) are linked. Links are symmetric: both
//! channels hold the other's handle, and both sides are always updated in the
//! same call.

use super::{ChannelId, ChannelState, ChannelTable};
use crate::AudioError;

impl ChannelTable {
    /// Whether `a` and `b` belong to the same synchronized set
    ///
    /// A channel is always linked to itself.
    #[must_use]
    pub fn are_linked(&self, a: ChannelId, b: ChannelId) -> bool {
        if a == b {
            return true;
        }

        self.get(a).is_some_and(|chan| chan.links.contains(&b))
    }

    /// Link two Idle channels
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if either handle is unknown
    /// * `AudioError::InvalidState` if either channel is not Idle
    /// * `AudioError::AlreadyInState` if the channels are already linked
    /// * `AudioError::ResourceExhausted` if either side has no room for another link
    pub fn link(&mut self, a: ChannelId, b: ChannelId) -> Result<(), AudioError> {
        debug!("[CHAN] link {} {}", a, b);

        for id in [a, b] {
            if self.try_get(id)?.state != ChannelState::Idle {
                debug!("[CHAN] {} is not idle", id);
                return Err(AudioError::InvalidState);
            }
        }

        if self.are_linked(a, b) {
            return Err(AudioError::AlreadyInState);
        }

        self.insert_link(a, b)
    }

    /// Remove the link between `a` and `b`, or every link of `a` when `b` is `None`
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if a handle is unknown
    /// * `AudioError::InvalidState` if a channel involved is not Idle
    /// * `AudioError::NotFound` if `a` and `b` are not linked
    pub fn unlink(&mut self, a: ChannelId, b: Option<ChannelId>) -> Result<(), AudioError> {
        debug!("[CHAN] unlink {}", a);

        if self.try_get(a)?.state != ChannelState::Idle {
            debug!("[CHAN] {} is not idle", a);
            return Err(AudioError::InvalidState);
        }

        let Some(b) = b else {
            for &peer in self.try_get(a)?.links.iter() {
                if self.try_get(peer)?.state != ChannelState::Idle {
                    debug!("[CHAN] {} is not idle", peer);
                    return Err(AudioError::InvalidState);
                }
            }
            self.unlink_all(a);
            return Ok(());
        };

        if self.try_get(b)?.state != ChannelState::Idle {
            debug!("[CHAN] {} is not idle", b);
            return Err(AudioError::InvalidState);
        }

        if !self.remove_link(a, b) {
            return Err(AudioError::NotFound);
        }

        Ok(())
    }

    /// Add the `a` <-> `b` edge without any state check
    pub(crate) fn insert_link(&mut self, a: ChannelId, b: ChannelId) -> Result<(), AudioError> {
        if a == b || self.are_linked(a, b) {
            return Ok(());
        }

        if self.try_get(a)?.links.is_full() || self.try_get(b)?.links.is_full() {
            return Err(AudioError::ResourceExhausted);
        }

        // Both sides were checked for room above
        self.try_get_mut(a)?.links.push(b).ok();
        self.try_get_mut(b)?.links.push(a).ok();
        Ok(())
    }

    /// Drop every edge of `a` without any state check
    pub(crate) fn unlink_all(&mut self, a: ChannelId) {
        let Some(chan) = self.get_mut(a) else {
            return;
        };

        let peers = core::mem::take(&mut chan.links);
        for peer in peers {
            if let Some(peer) = self.get_mut(peer) {
                peer.links.retain(|&id| id != a);
            }
        }
    }

    fn remove_link(&mut self, a: ChannelId, b: ChannelId) -> bool {
        let mut found = false;

        for (from, to) in [(a, b), (b, a)] {
            if let Some(chan) = self.get_mut(from) {
                if let Some(pos) = chan.links.iter().position(|&id| id == to) {
                    chan.links.swap_remove(pos);
                    found = true;
                }
            }
        }

        found
    }
}
