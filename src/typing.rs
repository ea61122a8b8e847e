//! Keep-alive typing indicator. Discord's typing state expires after a few
//! seconds, so a background task rebroadcasts it while a generation call
//! is in flight. The guard aborts the task on drop, which covers every
//! exit path of the caller.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{AbortHandle, Abortable};
use serenity::all::ChannelId;
use serenity::http::Http;
use tracing::debug;

const REBROADCAST_INTERVAL: Duration = Duration::from_secs(5);

pub struct TypingGuard {
    handle: AbortHandle,
}

impl Drop for TypingGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start broadcasting "typing" in `channel_id` until the guard is dropped.
pub fn keep_typing(http: Arc<Http>, channel_id: ChannelId) -> TypingGuard {
    let (handle, registration) = AbortHandle::new_pair();
    let task = Abortable::new(
        async move {
            loop {
                if let Err(e) = http.broadcast_typing(channel_id).await {
                    debug!("Typing broadcast failed for {channel_id}: {e}");
                }
                tokio::time::sleep(REBROADCAST_INTERVAL).await;
            }
        },
        registration,
    );
    tokio::spawn(task);
    TypingGuard { handle }
}
