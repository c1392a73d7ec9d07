//! Request/response over a dedicated message channel per call.

use std::cell::RefCell;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::oneshot;
use futures::future::{Either, select};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::HostEvent;

pub const TRIGGER_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const TRIGGER_TIMED_OUT: &str = "Trigger timed-out in getting a response";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TriggerError {
    #[error("Trigger timed-out in getting a response")]
    TimedOut,
    #[error("embedded app rejected the trigger: {0}")]
    Rejected(Value),
    #[error("reply channel closed before a response arrived")]
    ChannelClosed,
    #[error("frame transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

impl MessageEnvelope {
    #[must_use]
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}

/// Result of a trigger that was not rejected. A timeout is reported here
/// rather than as an error so callers can tell "no answer" from "refused".
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Replied(Value),
    TimedOut,
}

impl TriggerOutcome {
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }

    /// The timeout error carried by a timed-out outcome.
    #[must_use]
    pub fn error(&self) -> Option<TriggerError> {
        match self {
            Self::Replied(_) => None,
            Self::TimedOut => Some(TriggerError::TimedOut),
        }
    }

    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Replied(value) => Some(value),
            Self::TimedOut => None,
        }
    }
}

/// Write half of a reply channel. Only the first reply is delivered.
pub struct ReplySender {
    sender: RefCell<Option<oneshot::Sender<Value>>>,
}

impl ReplySender {
    /// Returns `false` when a reply was already delivered or the receiver is gone.
    pub fn send(&self, reply: Value) -> bool {
        match self.sender.borrow_mut().take() {
            Some(sender) => sender.send(reply).is_ok(),
            None => false,
        }
    }
}

/// Read half of a reply channel plus the hook that closes the underlying port.
pub struct ReplyPort {
    receiver: oneshot::Receiver<Value>,
    close: Option<Box<dyn FnOnce()>>,
}

impl ReplyPort {
    #[must_use]
    pub fn new(receiver: oneshot::Receiver<Value>, close: impl FnOnce() + 'static) -> Self {
        Self {
            receiver,
            close: Some(Box::new(close)),
        }
    }

    #[must_use]
    pub fn detached(receiver: oneshot::Receiver<Value>) -> Self {
        Self {
            receiver,
            close: None,
        }
    }

    /// Idempotent.
    pub fn close(&mut self) {
        if let Some(close) = self.close.take() {
            close();
        }
    }
}

impl Drop for ReplyPort {
    fn drop(&mut self) {
        self.close();
    }
}

#[must_use]
pub fn reply_channel() -> (ReplySender, oneshot::Receiver<Value>) {
    let (sender, receiver) = oneshot::channel();
    (
        ReplySender {
            sender: RefCell::new(Some(sender)),
        },
        receiver,
    )
}

/// The frame the host talks to.
#[async_trait(?Send)]
pub trait FrameTransport {
    /// Posts `envelope` to the frame restricted to `target_origin`, handing
    /// over a fresh reply port.
    fn post(
        &self,
        envelope: &MessageEnvelope,
        target_origin: &str,
    ) -> Result<ReplyPort, TriggerError>;

    /// Detaches and reattaches the frame so the embedded app fully reloads.
    fn reload(&self) -> Result<(), TriggerError>;

    async fn sleep(&self, duration: Duration);
}

pub async fn process_trigger<T>(
    transport: &T,
    event: HostEvent,
    host_origin: &str,
    payload: Value,
) -> Result<TriggerOutcome, TriggerError>
where
    T: FrameTransport + ?Sized,
{
    if event == HostEvent::Reload {
        transport.reload()?;
        tracing::debug!("embedded frame reloaded");
        return Ok(TriggerOutcome::Replied(Value::Null));
    }

    let envelope = MessageEnvelope::new(event.as_str(), payload);
    let mut port = transport.post(&envelope, host_origin)?;

    let outcome = {
        let timeout = transport.sleep(TRIGGER_TIMEOUT);
        futures::pin_mut!(timeout);
        match select(&mut port.receiver, timeout).await {
            Either::Left((Ok(reply), _)) => settle_reply(reply),
            Either::Left((Err(oneshot::Canceled), _)) => Err(TriggerError::ChannelClosed),
            Either::Right(((), _)) => {
                tracing::warn!(event = %event, "trigger timed out");
                Ok(TriggerOutcome::TimedOut)
            }
        }
    };
    port.close();
    outcome
}

fn settle_reply(reply: Value) -> Result<TriggerOutcome, TriggerError> {
    match reply.get("error") {
        Some(error) if is_truthy(error) => Err(TriggerError::Rejected(error.clone())),
        _ => Ok(TriggerOutcome::Replied(reply)),
    }
}

/// JavaScript truthiness of a JSON value.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
