// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discovery constants shared by all peers of the application

use std::collections::BTreeMap;

/// Service name peers advertise under
pub const SERVICE_TYPE: &str = "rps-game";

/// Key (and value) of the same-app discovery filter
pub const INTENT_KEY: &str = "rps-game-intent";

/// Key/value pairs published while advertising
pub type DiscoveryInfo = BTreeMap<String, String>;

/// Discovery info published by a host: `{key: key}`
pub fn discovery_info(intent_key: &str) -> DiscoveryInfo {
    let mut info = DiscoveryInfo::new();
    info.insert(intent_key.to_string(), intent_key.to_string());
    info
}

/// Whether an advertised peer belongs to this application
pub fn intent_matches(info: &DiscoveryInfo, intent_key: &str) -> bool {
    info.get(intent_key).map(String::as_str) == Some(intent_key)
}
