//! `lea-unicast` Constants
//!
//! Pool capacities and protocol-mandated ranges used throughout the crate.
//! Every pool is a fixed-capacity `heapless` container sized by one of these
//! limits.

/// Maximum number of audio channels the stack can track
pub const MAX_AUDIO_CHANNELS: usize = 12;

/// Maximum number of Audio Stream Endpoints (local and remote)
pub const MAX_ENDPOINTS: usize = 8;

/// Maximum number of registered local capabilities
pub const MAX_CAPABILITIES: usize = 4;

/// Number of unicast groups (CIGs) in the shared pool
pub const MAX_UNICAST_GROUPS: usize = 9;

/// Maximum number of channels a single unicast group may hold
pub const MAX_GROUP_STREAMS: usize = 2;

/// Number of listen slots, one per isochronous channel the controller supports
pub const MAX_LISTEN_SLOTS: usize = 4;

/// Maximum number of peers a channel can be linked with
pub const MAX_CHANNEL_LINKS: usize = 4;

/// Maximum number of codec specific configuration or metadata entries
pub const MAX_CODEC_DATA: usize = 4;

/// Maximum length of a single codec data value in bytes
pub const MAX_CODEC_DATA_LEN: usize = 16;

/// Capacity of the endpoint notification queue
pub const MAX_EVENTS: usize = 16;

/// Minimum SDU interval in microseconds
pub const QOS_INTERVAL_MIN: u32 = 0x0000_00FF;

/// Maximum SDU interval in microseconds
pub const QOS_INTERVAL_MAX: u32 = 0x00FF_FFFF;

/// Maximum SDU size in octets
pub const QOS_SDU_MAX: u16 = 0x0FFF;

/// Minimum max transport latency in milliseconds
pub const QOS_LATENCY_MIN: u16 = 0x0005;

/// Maximum max transport latency in milliseconds
pub const QOS_LATENCY_MAX: u16 = 0x0FA0;

/// Sentinel written to an SDU interval that failed validation
pub const INVALID_INTERVAL: u32 = 0;

/// Sentinel written to a framing value that failed validation
pub const INVALID_FRAMING: u8 = 0xFF;

/// Sentinel written to a PHY mask that failed validation
pub const INVALID_PHY: u8 = 0x00;

/// Sentinel written to an SDU size that failed validation
pub const INVALID_SDU: u16 = 0xFFFF;

/// Sentinel written to a latency that failed validation
pub const INVALID_LATENCY: u16 = 0;

/// Sentinel written to a presentation delay that failed validation
pub const INVALID_PRESENTATION_DELAY: u32 = 0;
