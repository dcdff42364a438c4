use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use voice_application::{BotDispatcher, DispatchOutcome};

use crate::{inbound_event, TelegramClient};

const RETRY_BACKOFF: Duration = Duration::from_secs(3);

/// Long-polls `getUpdates` and dispatches each update on its own task until
/// `shutdown` resolves. In-flight conversions are awaited before returning so
/// their scratch space is released.
pub async fn run_polling<S>(
    client: Arc<TelegramClient>,
    dispatcher: Arc<BotDispatcher>,
    poll_timeout_secs: u64,
    shutdown: S,
) where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut offset: Option<i64> = None;
    let mut in_flight = JoinSet::new();

    tracing::info!(poll_timeout_secs, "telegram long polling started");

    loop {
        while in_flight.try_join_next().is_some() {}

        let updates = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            polled = client.get_updates(offset, poll_timeout_secs) => polled,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(err) => {
                tracing::warn!(error = %err, "polling telegram failed, retrying");
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(RETRY_BACKOFF) => continue,
                }
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);
            let event = inbound_event(&update);
            let dispatcher = dispatcher.clone();
            let update_id = update.update_id;
            in_flight.spawn(async move {
                match dispatcher.dispatch(event).await {
                    Ok(DispatchOutcome::Converted(report)) => tracing::debug!(
                        update_id,
                        request_id = %report.request_id,
                        delivered = report.is_delivered(),
                        "update handled"
                    ),
                    Ok(_) => tracing::trace!(update_id, "update handled"),
                    Err(err) => tracing::warn!(update_id, error = %err, "update rejected"),
                }
            });
        }
    }

    tracing::info!(
        in_flight = in_flight.len(),
        "telegram polling stopped, waiting for in-flight updates"
    );
    while let Some(joined) = in_flight.join_next().await {
        if let Err(err) = joined {
            tracing::error!(error = %err, "update task aborted");
        }
    }
}
