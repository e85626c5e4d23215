//! Listen registry
//!
//! Local ASEs that reached QoS Configured wait for the remote client to
//! establish their CIS. Each waiting channel occupies one slot of a fixed
//! table, keyed by the `(cig_id, cis_id)` of its endpoint. Channels sharing a
//! connection and a stream key are linked and represented by a single slot.
//! Inbound CIS requests are resolved here to the waiting channel.

use crate::AudioError;
use crate::channel::ChannelId;
use crate::constants::MAX_LISTEN_SLOTS;
use bt_hci::param::ConnHandle;

/// Key identifying the stream a channel waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenKey {
    /// ACL of the channel
    pub conn: Option<ConnHandle>,
    /// CIG identifier of the endpoint
    pub cig_id: u8,
    /// CIS identifier of the endpoint
    pub cis_id: u8,
}

impl ListenKey {
    fn same_stream(&self, cig_id: u8, cis_id: u8) -> bool {
        self.cig_id == cig_id && self.cis_id == cis_id
    }

    fn shares_iso(&self, other: &Self) -> bool {
        self.conn.is_some() && self.conn == other.conn && self.same_stream(other.cig_id, other.cis_id)
    }
}

/// Result of a successful [`ListenRegistry::listen`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenOutcome {
    /// The channel already had a slot
    AlreadyListening,
    /// Another listening channel shares the stream; the caller links the two
    Linked(ChannelId),
    /// A free slot was claimed
    Claimed,
}

/// Fixed-size table of channels waiting for an inbound CIS
#[derive(Debug, Default)]
pub struct ListenRegistry {
    slots: [Option<ChannelId>; MAX_LISTEN_SLOTS],
    registered: bool,
}

impl ListenRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: [None; MAX_LISTEN_SLOTS],
            registered: false,
        }
    }

    /// Whether the inbound acceptor has been registered with the transport
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub(crate) fn mark_registered(&mut self) {
        self.registered = true;
    }

    /// Whether `chan` occupies a slot
    #[must_use]
    pub fn contains(&self, chan: ChannelId) -> bool {
        self.slots.contains(&Some(chan))
    }

    /// Number of occupied slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether no slot is occupied
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register `chan` as waiting for the stream identified by `key`
    ///
    /// `key_of` returns the key of a channel already in the table.
    ///
    /// # Errors
    /// Returns `AudioError::ResourceExhausted` when every slot is taken
    pub fn listen(
        &mut self,
        chan: ChannelId,
        key: ListenKey,
        key_of: impl Fn(ChannelId) -> Option<ListenKey>,
    ) -> Result<ListenOutcome, AudioError> {
        let mut free = None;

        for (index, slot) in self.slots.iter().enumerate() {
            match *slot {
                Some(other) if other == chan => return Ok(ListenOutcome::AlreadyListening),
                Some(other) => {
                    if key_of(other).is_some_and(|other_key| other_key.shares_iso(&key)) {
                        debug!("[LISTEN] {} shares stream with {}", chan, other);
                        return Ok(ListenOutcome::Linked(other));
                    }
                }
                None => {
                    if free.is_none() {
                        free = Some(index);
                    }
                }
            }
        }

        let Some(index) = free else {
            error!("[LISTEN] Unable to listen: no slot left");
            return Err(AudioError::ResourceExhausted);
        };

        debug!("[LISTEN] {} slot {}", chan, index);
        self.slots[index] = Some(chan);
        Ok(ListenOutcome::Claimed)
    }

    /// Resolve an inbound request for `(cig_id, cis_id)` and free its slot
    ///
    /// # Errors
    /// Returns `AudioError::NotFound` when no channel listens for that stream
    pub fn resolve(
        &mut self,
        cig_id: u8,
        cis_id: u8,
        key_of: impl Fn(ChannelId) -> Option<ListenKey>,
    ) -> Result<ChannelId, AudioError> {
        for slot in &mut self.slots {
            let Some(chan) = *slot else {
                continue;
            };

            if key_of(chan).is_some_and(|key| key.same_stream(cig_id, cis_id)) {
                *slot = None;
                return Ok(chan);
            }
        }

        error!("[LISTEN] No channel listening for cig {} cis {}", cig_id, cis_id);
        Err(AudioError::NotFound)
    }

    /// Stop listening for `chan`; nothing happens if it was not listening
    pub fn cancel(&mut self, chan: ChannelId) {
        for slot in &mut self.slots {
            if *slot == Some(chan) {
                *slot = None;
            }
        }
    }
}
