//! Codec QoS validation
//!
//! Checks a proposed [`CodecQos`] against the ranges ASCS mandates for the
//! Config QoS operation and against the preferred envelope of the capability
//! serving the ASE. Checks run in a fixed order and stop at the first
//! violation, which is reported by resetting the offending field to its
//! "invalid" sentinel.

use crate::AudioError;
use crate::codec::{CodecQos, PHY_ALL, QosPreference};
use crate::constants::{
    INVALID_FRAMING, INVALID_INTERVAL, INVALID_LATENCY, INVALID_PHY, INVALID_PRESENTATION_DELAY,
    INVALID_SDU, QOS_INTERVAL_MAX, QOS_INTERVAL_MIN, QOS_LATENCY_MAX, QOS_LATENCY_MIN, QOS_SDU_MAX,
};

/// Validate `qos` against protocol ranges and the capability preference `pref`
///
/// # Errors
/// Returns `AudioError::NotSupported` on the first field out of range, after
/// writing that field's sentinel into `qos`
pub fn validate(qos: &mut CodecQos, pref: &QosPreference) -> Result<(), AudioError> {
    if !(QOS_INTERVAL_MIN..=QOS_INTERVAL_MAX).contains(&qos.interval) {
        error!(
            "[QOS] Interval not within allowed range: {} ({}-{})",
            qos.interval,
            QOS_INTERVAL_MIN,
            QOS_INTERVAL_MAX
        );
        qos.interval = INVALID_INTERVAL;
        return Err(AudioError::NotSupported);
    }

    if qos.framing().is_none() {
        error!("[QOS] Invalid framing {:#x}", qos.framing);
        qos.framing = INVALID_FRAMING;
        return Err(AudioError::NotSupported);
    }

    if qos.phy == 0 || qos.phy & !PHY_ALL != 0 {
        error!("[QOS] Invalid PHY {:#x}", qos.phy);
        qos.phy = INVALID_PHY;
        return Err(AudioError::NotSupported);
    }

    if qos.sdu > QOS_SDU_MAX {
        error!("[QOS] Invalid SDU {}", qos.sdu);
        qos.sdu = INVALID_SDU;
        return Err(AudioError::NotSupported);
    }

    if !(QOS_LATENCY_MIN..=QOS_LATENCY_MAX).contains(&qos.latency) {
        error!("[QOS] Invalid latency {}", qos.latency);
        qos.latency = INVALID_LATENCY;
        return Err(AudioError::NotSupported);
    }

    if qos.latency > pref.latency {
        error!(
            "[QOS] Latency above preference: max {} latency {}",
            pref.latency,
            qos.latency
        );
        qos.latency = INVALID_LATENCY;
        return Err(AudioError::NotSupported);
    }

    if !(pref.pd_min..=pref.pd_max).contains(&qos.pd) {
        error!(
            "[QOS] Presentation delay not within range: min {} max {} pd {}",
            pref.pd_min,
            pref.pd_max,
            qos.pd
        );
        qos.pd = INVALID_PRESENTATION_DELAY;
        return Err(AudioError::NotSupported);
    }

    Ok(())
}
