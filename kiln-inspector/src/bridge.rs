//! Listing fetch, target selection, and URL rewriting

use chrono::Utc;
use tracing::debug;
use url::Url;

use crate::error::{InspectorError, Result};
use crate::types::{DebugTarget, InspectorTarget, USER_TARGET_PREFIX};

/// Listing endpoint for an engine debugging on `port`.
pub fn listing_url(port: u16) -> Url {
    Url::parse(&format!("http://127.0.0.1:{port}/json")).expect("listing URL is valid")
}

/// Client for the engine's debug-protocol listing endpoint.
#[derive(Debug, Clone)]
pub struct InspectorBridge {
    client: reqwest::Client,
}

impl Default for InspectorBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl InspectorBridge {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Find the worker's own debugger target behind `listing`.
    ///
    /// Returns `Ok(None)` when the listing has no user-code target yet; the
    /// debugger is temporarily unavailable, not broken. Transport and decode
    /// problems surface as errors for the caller to log.
    pub async fn discover(&self, listing: &Url) -> Result<Option<DebugTarget>> {
        let targets: Vec<InspectorTarget> = self
            .client
            .get(listing.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!("Inspector listing returned {} targets", targets.len());

        match select_user_target(&targets) {
            Some(target) => {
                let mut url = Url::parse(&target.web_socket_debugger_url)?;
                uniquify(&mut url)?;
                Ok(Some(DebugTarget {
                    id: target.id.clone(),
                    websocket_url: url,
                }))
            }
            None => Ok(None),
        }
    }
}

/// Pick the first target whose id marks it as the user's own code.
pub fn select_user_target(targets: &[InspectorTarget]) -> Option<&InspectorTarget> {
    targets.iter().find(|t| t.id.starts_with(USER_TARGET_PREFIX))
}

/// Embed a fresh token in the URL's username component.
///
/// Watchers keyed on URL identity must treat every restart as a new
/// endpoint even when the socket path collides with the previous instance.
/// Query parameters cause reconnect loops and fragments are rejected by
/// websocket clients, so the username is the one mutable component.
fn uniquify(url: &mut Url) -> Result<()> {
    let token = format!("{}-{}", Utc::now().timestamp_millis(), rand::random::<u64>());
    url.set_username(&token)
        .map_err(|_| InspectorError::Rewrite(url.to_string()))
}
