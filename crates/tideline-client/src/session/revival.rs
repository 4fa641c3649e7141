use std::sync::Arc;

use preview_proto::{BufferId, ReviveRequest, RevivalToken};
use tracing::{debug, info};

use crate::client::PreviewSurface;
use crate::transport::{PreviewTransport, TransportError};

use super::{RetryPolicy, SessionContext};

/// Converts a revival token into a fresh buffer identity.
///
/// Entered only once the server has declared the original session gone.
/// Attempts retry indefinitely on the floor-bounded schedule; a rejection
/// is never fatal because revival is the only recovery path left.
pub struct RevivalClient<T, S> {
    transport: Arc<T>,
    surface: Arc<S>,
    policy: RetryPolicy,
}

impl<T, S> RevivalClient<T, S>
where
    T: PreviewTransport,
    S: PreviewSurface,
{
    pub fn new(transport: Arc<T>, surface: Arc<S>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            surface,
            policy,
        }
    }

    /// One revival attempt. Returns the fresh identity on acceptance,
    /// `None` when the server rejects the token.
    pub async fn attempt_revive(
        &self,
        token: &RevivalToken,
    ) -> Result<Option<BufferId>, TransportError> {
        let request = ReviveRequest {
            revivable_key: token.clone(),
        };
        let response = self.transport.revive(&request).await?;
        Ok(response.accepted().cloned())
    }

    /// Retries until the server accepts the token, then rebinds the
    /// session: new identity, marker discarded (it belonged to the dead
    /// session), token consumed, page navigated to the new view.
    ///
    /// Returns `None` only when no token is present, which callers rule out
    /// before entering revival.
    pub async fn run(&self, context: &mut SessionContext) -> Option<BufferId> {
        loop {
            let token = context.revival_token.clone()?;
            match self.attempt_revive(&token).await {
                Ok(Some(buffer_id)) => {
                    context.buffer_id = buffer_id.clone();
                    context.timestamp = None;
                    context.revival_token = None;
                    self.surface.navigate_to(&buffer_id);
                    info!(
                        target: "preview.revival",
                        buffer_id = %buffer_id,
                        "session revived"
                    );
                    return Some(buffer_id);
                }
                Ok(None) => {
                    debug!(target: "preview.revival", "revival rejected; retrying");
                }
                Err(error) => {
                    debug!(
                        target: "preview.revival",
                        error = %error,
                        "revival transport failure; retrying"
                    );
                }
            }
            tokio::time::sleep(self.policy.delay()).await;
        }
    }
}
