#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use visual_embed_core::auth_service::{AuthTransport, TokenLoginMethod};
use visual_embed_core::auth_token::{AuthError, AuthTokenProvider, TokenService, UserAlert};
use visual_embed_core::events::{EmbedEvent, Responder};
use visual_embed_core::trigger::{
    FrameTransport, MessageEnvelope, ReplyPort, ReplySender, TriggerError, reply_channel,
};

type AutoReply = Box<dyn Fn(&MessageEnvelope) -> Option<Value>>;

/// In-memory frame. Replies come from `auto_reply` or are held for the test
/// to answer later.
#[derive(Default)]
pub struct FakeFrame {
    pub posted: RefCell<Vec<(MessageEnvelope, String)>>,
    pending: RefCell<VecDeque<(MessageEnvelope, ReplySender)>>,
    auto_reply: RefCell<Option<AutoReply>>,
    pub reloads: Cell<usize>,
    pub closed_ports: Rc<Cell<usize>>,
}

impl FakeFrame {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn replying(reply: impl Fn(&MessageEnvelope) -> Option<Value> + 'static) -> Rc<Self> {
        let frame = Self::default();
        *frame.auto_reply.borrow_mut() = Some(Box::new(reply));
        Rc::new(frame)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Answers the first held request whose payload satisfies `matches`.
    pub fn reply_where(&self, matches: impl Fn(&MessageEnvelope) -> bool, reply: Value) -> bool {
        let mut pending = self.pending.borrow_mut();
        let Some(index) = pending.iter().position(|(envelope, _)| matches(envelope)) else {
            return false;
        };
        let Some((_, sender)) = pending.remove(index) else {
            return false;
        };
        sender.send(reply)
    }

    /// Drops every held reply sender without answering.
    pub fn abandon_pending(&self) {
        self.pending.borrow_mut().clear();
    }

    pub fn last_posted(&self) -> Option<MessageEnvelope> {
        self.posted.borrow().last().map(|(envelope, _)| envelope.clone())
    }
}

#[async_trait(?Send)]
impl FrameTransport for FakeFrame {
    fn post(
        &self,
        envelope: &MessageEnvelope,
        target_origin: &str,
    ) -> Result<ReplyPort, TriggerError> {
        self.posted
            .borrow_mut()
            .push((envelope.clone(), target_origin.to_string()));
        let (sender, receiver) = reply_channel();
        let auto = self
            .auto_reply
            .borrow()
            .as_ref()
            .and_then(|reply| reply(envelope));
        match auto {
            Some(reply) => {
                sender.send(reply);
            }
            None => self.pending.borrow_mut().push_back((envelope.clone(), sender)),
        }
        let closed = Rc::clone(&self.closed_ports);
        Ok(ReplyPort::new(receiver, move || closed.set(closed.get() + 1)))
    }

    fn reload(&self) -> Result<(), TriggerError> {
        self.reloads.set(self.reloads.get() + 1);
        Ok(())
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Verification and endpoint fetch with scripted answers.
pub struct FakeTokenService {
    pub valid_tokens: RefCell<Vec<String>>,
    pub verify_error: Cell<bool>,
    pub verify_calls: Cell<usize>,
    pub endpoint_tokens: RefCell<VecDeque<String>>,
}

impl FakeTokenService {
    pub fn accepting(tokens: &[&str]) -> Rc<Self> {
        Rc::new(Self {
            valid_tokens: RefCell::new(tokens.iter().map(ToString::to_string).collect()),
            verify_error: Cell::new(false),
            verify_calls: Cell::new(0),
            endpoint_tokens: RefCell::new(VecDeque::new()),
        })
    }
}

#[async_trait(?Send)]
impl TokenService for FakeTokenService {
    async fn verify_token(&self, token: &str) -> Result<bool, AuthError> {
        self.verify_calls.set(self.verify_calls.get() + 1);
        tokio::task::yield_now().await;
        if self.verify_error.get() {
            return Err(AuthError::Request {
                message: "network down".to_string(),
            });
        }
        Ok(self.valid_tokens.borrow().iter().any(|valid| valid == token))
    }

    async fn fetch_auth_token(&self, _auth_endpoint: &str) -> Result<String, AuthError> {
        self.endpoint_tokens
            .borrow_mut()
            .pop_front()
            .ok_or(AuthError::Http {
                status: 500,
                body: "exhausted".to_string(),
            })
    }
}

/// Hands out scripted tokens in order, repeating the last one.
pub struct ScriptedTokens {
    tokens: RefCell<VecDeque<Value>>,
    pub calls: Cell<usize>,
}

impl ScriptedTokens {
    pub fn new(tokens: Vec<Value>) -> Rc<Self> {
        Rc::new(Self {
            tokens: RefCell::new(tokens.into()),
            calls: Cell::new(0),
        })
    }
}

#[async_trait(?Send)]
impl AuthTokenProvider for ScriptedTokens {
    async fn get_auth_token(&self) -> Result<Value, AuthError> {
        self.calls.set(self.calls.get() + 1);
        tokio::task::yield_now().await;
        let mut tokens = self.tokens.borrow_mut();
        let next = if tokens.len() > 1 {
            tokens.pop_front()
        } else {
            tokens.front().cloned()
        };
        next.ok_or_else(|| AuthError::TokenSource("no tokens scripted".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingAlert {
    pub messages: RefCell<Vec<String>>,
}

impl UserAlert for RecordingAlert {
    fn alert(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}

#[derive(Default)]
pub struct RecordedEvents {
    pub events: RefCell<Vec<(EmbedEvent, Value)>>,
}

impl RecordedEvents {
    pub fn tags(&self) -> Vec<EmbedEvent> {
        self.events.borrow().iter().map(|(event, _)| *event).collect()
    }
}

impl visual_embed_core::events::EmbedEventSink for RecordedEvents {
    fn execute_event(&self, event: EmbedEvent, data: Value) {
        self.events.borrow_mut().push((event, data));
    }
}

#[derive(Default)]
pub struct RecordingResponder {
    pub replies: RefCell<Vec<Value>>,
}

impl Responder for RecordingResponder {
    fn respond(&self, reply: Value) {
        self.replies.borrow_mut().push(reply);
    }
}

/// Session endpoints with a switchable "already logged in" state.
#[derive(Default)]
pub struct FakeAuthTransport {
    pub logged_in: Cell<bool>,
    pub accept_login: Cell<bool>,
    pub token_logins: RefCell<Vec<(String, String, TokenLoginMethod)>>,
    pub basic_logins: Cell<usize>,
    pub logouts: Cell<usize>,
    pub session_info_calls: Cell<usize>,
}

#[async_trait(?Send)]
impl AuthTransport for FakeAuthTransport {
    async fn fetch_session_info(&self) -> Result<Value, AuthError> {
        self.session_info_calls.set(self.session_info_calls.get() + 1);
        if self.logged_in.get() {
            Ok(serde_json::json!({"userName": "tsadmin"}))
        } else {
            Err(AuthError::Http {
                status: 401,
                body: "unauthorized".to_string(),
            })
        }
    }

    async fn fetch_preauth_info(&self) -> Result<Value, AuthError> {
        Ok(serde_json::json!({}))
    }

    async fn token_login(
        &self,
        username: &str,
        auth_token: &str,
        method: TokenLoginMethod,
    ) -> Result<bool, AuthError> {
        self.token_logins
            .borrow_mut()
            .push((username.to_string(), auth_token.to_string(), method));
        let accepted = self.accept_login.get();
        self.logged_in.set(accepted);
        Ok(accepted)
    }

    async fn basic_login(&self, _username: &str, _password: &str) -> Result<bool, AuthError> {
        self.basic_logins.set(self.basic_logins.get() + 1);
        let accepted = self.accept_login.get();
        self.logged_in.set(accepted);
        Ok(accepted)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        self.logouts.set(self.logouts.get() + 1);
        self.logged_in.set(false);
        Ok(())
    }
}
