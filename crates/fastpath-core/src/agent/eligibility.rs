//! Eligibility gate: may this request run on the fast path?
//!
//! Pure. Requests that fail the gate go to the caller's heavier execution
//! path instead; ineligibility is not an error.

use fastpath_types::config::EngineConfig;
use fastpath_types::group::GroupSettings;

use crate::llm::client::ModelClient;

/// Outcome of the eligibility check. Anything but `Eligible` names the
/// first reason the request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// The fast path is switched off globally.
    Disabled,
    /// The group set `fast_path = false`.
    GroupOptOut,
    /// Images, audio or documents need the heavier path.
    HasMedia,
    ClientUnavailable,
}

impl Eligibility {
    pub fn is_eligible(self) -> bool {
        self == Eligibility::Eligible
    }
}

pub fn check_eligibility(
    config: &EngineConfig,
    group: &GroupSettings,
    has_media: bool,
    client: &dyn ModelClient,
) -> Eligibility {
    if !config.enabled {
        Eligibility::Disabled
    } else if group.opts_out() {
        Eligibility::GroupOptOut
    } else if has_media {
        Eligibility::HasMedia
    } else if !client.is_available() {
        Eligibility::ClientUnavailable
    } else {
        Eligibility::Eligible
    }
}

pub fn is_eligible(
    config: &EngineConfig,
    group: &GroupSettings,
    has_media: bool,
    client: &dyn ModelClient,
) -> bool {
    check_eligibility(config, group, has_media, client).is_eligible()
}
