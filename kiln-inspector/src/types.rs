//! Debug-protocol listing types

use serde::Deserialize;
use url::Url;

/// Identifier prefix of the target running the user's own code, as opposed
/// to the engine's internal system targets.
pub const USER_TARGET_PREFIX: &str = "core:user";

/// One entry of the debug-protocol listing endpoint.
///
/// The listing carries more fields (titles, frontend URLs); only the ones
/// the bridge reads are decoded.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectorTarget {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub web_socket_debugger_url: String,
}

/// A debuggable execution context, ready for external tooling to attach to.
///
/// Regenerated on every restart: the websocket URL embeds a fresh
/// uniqueness token, so two targets are never equal across reloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugTarget {
    pub id: String,
    pub websocket_url: Url,
}
