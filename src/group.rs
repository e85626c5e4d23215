//! Unicast groups
//!
//! A unicast group is the stack's view of one CIG: an ordered set of member
//! channels and, once the first stream is bound, the transport's CIG handle.
//! Groups come from a fixed pool shared by every connection. Creation and
//! deletion go through [`AudioStack`](crate::AudioStack), which checks member
//! channel states; the pool itself only tracks slots.

use crate::channel::ChannelId;
use crate::constants::{MAX_GROUP_STREAMS, MAX_UNICAST_GROUPS};
use crate::iso::CigHandle;
use heapless::Vec;

/// Index of a unicast group in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GroupId(pub(crate) u8);

impl GroupId {
    /// Position of the group in the pool
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for GroupId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "group{}", self.0)
    }
}

/// CIG created for a single stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CigBinding {
    /// Transport handle
    pub handle: CigHandle,
    /// Channel whose isochronous channel is the CIG's only CIS
    pub cis: ChannelId,
}

/// One CIG slot
#[derive(Debug, Clone, Default)]
pub struct UnicastGroup {
    pub(crate) chans: Vec<ChannelId, MAX_GROUP_STREAMS>,
    pub(crate) cig: Option<CigBinding>,
}

impl UnicastGroup {
    /// Member channels in insertion order
    #[must_use]
    pub fn channels(&self) -> &[ChannelId] {
        &self.chans
    }

    /// CIG bound to this slot
    #[must_use]
    pub fn cig(&self) -> Option<CigBinding> {
        self.cig
    }

    /// Whether the slot has neither members nor a CIG
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.chans.is_empty() && self.cig.is_none()
    }

    pub(crate) fn clear(&mut self) {
        self.chans.clear();
        self.cig = None;
    }
}

/// Fixed pool of unicast groups
#[derive(Debug)]
pub struct GroupPool {
    groups: [UnicastGroup; MAX_UNICAST_GROUPS],
}

impl GroupPool {
    /// Create a pool of free groups
    #[must_use]
    pub fn new() -> Self {
        Self {
            groups: core::array::from_fn(|_| UnicastGroup::default()),
        }
    }

    /// Get a group
    #[must_use]
    pub fn get(&self, id: GroupId) -> Option<&UnicastGroup> {
        self.groups.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: GroupId) -> Option<&mut UnicastGroup> {
        self.groups.get_mut(id.index())
    }

    /// First group with no members and no CIG
    #[must_use]
    pub fn find_free(&self) -> Option<GroupId> {
        self.groups
            .iter()
            .position(UnicastGroup::is_free)
            .map(|index| GroupId(index as u8))
    }

    /// Slot that will hold a new CIG for a channel of group `preferred`
    ///
    /// The channel's own group is used when it has no CIG yet, otherwise the
    /// first free slot.
    #[must_use]
    pub fn cig_slot(&self, preferred: Option<GroupId>) -> Option<GroupId> {
        preferred
            .filter(|&id| self.get(id).is_some_and(|group| group.cig.is_none()))
            .or_else(|| self.find_free())
    }

    /// Group whose CIG has `chan` as its stream
    #[must_use]
    pub fn find_by_cis(&self, chan: ChannelId) -> Option<GroupId> {
        self.groups
            .iter()
            .position(|group| group.cig.is_some_and(|cig| cig.cis == chan))
            .map(|index| GroupId(index as u8))
    }

    /// Iterate over all groups
    pub fn iter(&self) -> impl Iterator<Item = &UnicastGroup> {
        self.groups.iter()
    }
}

impl Default for GroupPool {
    fn default() -> Self {
        Self::new()
    }
}
