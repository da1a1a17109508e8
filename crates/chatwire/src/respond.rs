//! Responding to messages: the filtered callback on top of the stream.

use std::future::Future;

use chatwire_protocol::{IncomingMessage, Timestamp};
use chatwire_transport::Transport;
use tokio::task::JoinHandle;

use crate::{Driver, DriverError, FilterPolicy, MessageFilter, Verdict};

/// Per-call overrides of the configured filter policy and auto-join list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RespondOptions {
    pub rooms: Option<Vec<String>>,
    pub all_public: Option<bool>,
    pub dm: Option<bool>,
    pub livechat: Option<bool>,
    pub edited: Option<bool>,
}

impl RespondOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rooms<S: Into<String>>(mut self, rooms: impl IntoIterator<Item = S>) -> Self {
        self.rooms = Some(rooms.into_iter().map(Into::into).collect());
        self
    }

    pub fn all_public(mut self, enabled: bool) -> Self {
        self.all_public = Some(enabled);
        self
    }

    pub fn dm(mut self, enabled: bool) -> Self {
        self.dm = Some(enabled);
        self
    }

    pub fn livechat(mut self, enabled: bool) -> Self {
        self.livechat = Some(enabled);
        self
    }

    pub fn edited(mut self, enabled: bool) -> Self {
        self.edited = Some(enabled);
        self
    }

    fn merge(self, defaults: FilterPolicy, default_rooms: &[String]) -> (FilterPolicy, Vec<String>) {
        let policy = FilterPolicy {
            dm: self.dm.unwrap_or(defaults.dm),
            livechat: self.livechat.unwrap_or(defaults.livechat),
            edited: self.edited.unwrap_or(defaults.edited),
            all_public: self.all_public.unwrap_or(defaults.all_public),
        };
        let rooms = self.rooms.unwrap_or_else(|| default_rooms.to_vec());
        (policy, rooms)
    }
}

/// Handle to a running responder. Dropping it leaves the responder
/// running; call [`stop`](Self::stop) to end delivery.
#[derive(Debug)]
pub struct Responder {
    task: JoinHandle<()>,
}

impl Responder {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl<T: Transport> Driver<T> {
    /// Calls `callback` for every message that passes the filter.
    ///
    /// If no room has been joined yet, the configured rooms are joined
    /// first (unless listening on all public rooms); a failed join is
    /// logged and responding starts anyway. Only messages newer than the
    /// moment this is called are delivered. Undecodable events are passed
    /// to the callback as [`DriverError::MalformedEvent`].
    ///
    /// The callback runs on the responder task, one message at a time.
    pub async fn respond_to_messages<F, Fut>(
        &self,
        mut callback: F,
        options: RespondOptions,
    ) -> Result<Responder, DriverError>
    where
        F: FnMut(Result<IncomingMessage, DriverError>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (policy, rooms) = options.merge(self.config().filter_policy(), &self.config().rooms);

        let none_joined = self.inner.membership.lock().await.is_empty();
        if none_joined && !rooms.is_empty() && !policy.all_public {
            if let Err(e) = self.join_rooms(&rooms).await {
                tracing::warn!(error = %e, "joining configured rooms failed");
            }
        }

        let mut filter = MessageFilter::new(policy, Timestamp::now());
        let mut events = self.react_to_messages().await?;
        let driver = self.clone();

        tracing::info!(?policy, "responding to messages");
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let incoming = match event {
                    Ok(incoming) => incoming,
                    Err(e) => {
                        callback(Err(e.into())).await;
                        continue;
                    }
                };

                let own_user = driver.user_id();
                let verdict = {
                    let membership = driver.inner.membership.lock().await;
                    filter.evaluate(&incoming, own_user.as_ref(), &membership)
                };

                match verdict {
                    Verdict::Deliver => {
                        tracing::debug!(
                            room_id = %incoming.message.room_id,
                            id = %incoming.message.id,
                            "delivering message"
                        );
                        callback(Ok(incoming)).await;
                    }
                    Verdict::Drop(reason) => {
                        tracing::trace!(id = %incoming.message.id, %reason, "message dropped");
                    }
                }
            }
            tracing::debug!("responder stopped, message stream closed");
        });

        Ok(Responder { task })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_options_override_defaults() {
        let defaults = FilterPolicy {
            dm: true,
            ..FilterPolicy::default()
        };
        let (policy, rooms) = RespondOptions::new()
            .dm(false)
            .edited(true)
            .merge(defaults, &["general".to_string()]);

        assert!(!policy.dm);
        assert!(policy.edited);
        assert_eq!(rooms, vec!["general"]);
    }

    #[test]
    fn test_merge_explicit_rooms_replace_configured() {
        let (_, rooms) = RespondOptions::new()
            .rooms(["random"])
            .merge(FilterPolicy::default(), &["general".to_string()]);

        assert_eq!(rooms, vec!["random"]);
    }
}
