use crate::guard::SessionError;
use grammers_client::Client;
use std::future::Future;

/// Asks Telegram whether the session behind `client` is still signed in.
///
/// Not routed through `run_telegram_request`: the probe must not queue
/// behind paced queries or sleep through flood waits.
pub(crate) async fn check_authorized(client: &Client) -> Result<bool, SessionError> {
    authorization_status(client.is_authorized()).await
}

/// A network failure is a transport error, not a "no".
async fn authorization_status<E, Fut>(check: Fut) -> Result<bool, SessionError>
where
    E: std::fmt::Display,
    Fut: Future<Output = Result<bool, E>>,
{
    check
        .await
        .map_err(|e| SessionError::Transport(format!("authorization check failed: {e}")))
}
