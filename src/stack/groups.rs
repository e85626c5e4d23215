//! Unicast group management

use super::AudioStack;
use crate::AudioError;
use crate::channel::{ChannelId, ChannelState};
use crate::constants::MAX_GROUP_STREAMS;
use crate::group::GroupId;
use crate::iso::IsoTransport;

fn groupable(state: ChannelState) -> bool {
    matches!(state, ChannelState::Idle | ChannelState::Configured)
}

impl<T: IsoTransport> AudioStack<'_, T> {
    /// Put `chans` into the first free unicast group
    ///
    /// Nothing is modified unless every channel can join.
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if more than `MAX_GROUP_STREAMS`
    ///   channels are given or a channel is unknown
    /// * `AudioError::ResourceExhausted` if every group is in use
    /// * `AudioError::AlreadyInState` if a channel is streaming, already in a
    ///   group, or listed twice
    pub fn create_group(&mut self, chans: &[ChannelId]) -> Result<GroupId, AudioError> {
        if chans.len() > MAX_GROUP_STREAMS {
            debug!(
                "[GROUP] Too many channels provided: {}/{}",
                chans.len(),
                MAX_GROUP_STREAMS
            );
            return Err(AudioError::InvalidArgument);
        }

        let Some(id) = self.groups.find_free() else {
            debug!("[GROUP] Could not allocate any more unicast groups");
            return Err(AudioError::ResourceExhausted);
        };

        for (index, &chan) in chans.iter().enumerate() {
            let member = self.channels.try_get(chan)?;
            if !groupable(member.state) || member.group.is_some() || chans[..index].contains(&chan)
            {
                debug!(
                    "[GROUP] Incorrect {} state: {}",
                    chan,
                    member.state.as_str()
                );
                return Err(AudioError::AlreadyInState);
            }
        }

        let group = self.groups.get_mut(id).ok_or(AudioError::InvalidArgument)?;
        for &chan in chans {
            // Length was checked against the capacity above
            group.chans.push(chan).ok();
            if let Some(member) = self.channels.get_mut(chan) {
                member.group = Some(id);
            }
        }

        info!("[GROUP] created {} with {} channels", id, chans.len());
        Ok(id)
    }

    /// Return a unicast group to the pool
    ///
    /// # Panics
    /// If the group still holds a CIG; CIGs are terminated through channel
    /// teardown before a group may be deleted.
    ///
    /// # Errors
    /// * `AudioError::InvalidArgument` if the group is unknown or a member
    ///   channel is streaming
    pub fn delete_group(&mut self, id: GroupId) -> Result<(), AudioError> {
        let group = self.groups.get(id).ok_or(AudioError::InvalidArgument)?;

        for &chan in group.channels() {
            if let Some(member) = self.channels.get(chan) {
                if !groupable(member.state) {
                    debug!("[GROUP] {} invalid state {}", chan, member.state.as_str());
                    return Err(AudioError::InvalidArgument);
                }
            }
        }

        assert!(group.cig().is_none(), "CIG shall be terminated");

        let members = group.chans.clone();
        for chan in members {
            if let Some(member) = self.channels.get_mut(chan) {
                member.group = None;
            }
        }

        if let Some(group) = self.groups.get_mut(id) {
            group.clear();
        }

        info!("[GROUP] deleted {}", id);
        Ok(())
    }
}
