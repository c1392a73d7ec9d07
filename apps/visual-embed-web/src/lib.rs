#[cfg(target_arch = "wasm32")]
mod wasm {
    use std::rc::Rc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;
    use visual_embed_core::auth_token::{AuthError, AuthTokenProvider, UserAlert};
    use visual_embed_core::events::{EmbedEventSink, Responder};
    use visual_embed_core::trigger::{ReplyPort, TRIGGER_TIMED_OUT, reply_channel};
    use visual_embed_core::{
        EmbedConfig, EmbedEvent, EmbedSession, FrameTransport, HostEvent, HostEventError,
        MessageEnvelope, TriggerError, TriggerOutcome, ViewConfig,
    };
    use wasm_bindgen::JsCast;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen_futures::{JsFuture, future_to_promise};
    use web_sys::{HtmlIFrameElement, MessageChannel, MessageEvent, MessagePort};

    struct MessageChannelTransport {
        frame: HtmlIFrameElement,
    }

    #[async_trait(?Send)]
    impl FrameTransport for MessageChannelTransport {
        fn post(
            &self,
            envelope: &MessageEnvelope,
            target_origin: &str,
        ) -> Result<ReplyPort, TriggerError> {
            let window = self
                .frame
                .content_window()
                .ok_or_else(|| TriggerError::Transport("embedded frame has no window".to_string()))?;
            let channel = MessageChannel::new().map_err(transport_error)?;

            let (sender, receiver) = reply_channel();
            let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
                sender.send(js_to_json(&event.data()));
            });
            let port1 = channel.port1();
            port1.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
            let port = ReplyPort::new(receiver, move || {
                port1.set_onmessage(None);
                port1.close();
                drop(on_message);
            });

            let data = serde_json::to_value(envelope)
                .map_err(|error| TriggerError::Transport(error.to_string()))?;
            let message = json_to_js(&data).map_err(transport_error)?;
            let transfer = js_sys::Array::of1(&channel.port2());
            window
                .post_message_with_transfer(&message, target_origin, &transfer)
                .map_err(transport_error)?;
            Ok(port)
        }

        fn reload(&self) -> Result<(), TriggerError> {
            let Some(parent) = self.frame.parent_node() else {
                return Err(TriggerError::Transport(
                    "embedded frame is not attached".to_string(),
                ));
            };
            let next = self.frame.next_sibling();
            parent.remove_child(&self.frame).map_err(transport_error)?;
            parent
                .insert_before(&self.frame, next.as_ref())
                .map_err(transport_error)?;
            Ok(())
        }

        async fn sleep(&self, duration: Duration) {
            gloo_timers::future::sleep(duration).await;
        }
    }

    struct WindowAlert;

    impl UserAlert for WindowAlert {
        fn alert(&self, message: &str) {
            let Some(window) = web_sys::window() else {
                tracing::error!(message, "user alert without a window");
                return;
            };
            if window.alert_with_message(message).is_err() {
                tracing::error!(message, "window.alert failed");
            }
        }
    }

    struct JsTokenProvider {
        callback: js_sys::Function,
    }

    #[async_trait(?Send)]
    impl AuthTokenProvider for JsTokenProvider {
        async fn get_auth_token(&self) -> Result<Value, AuthError> {
            let result = self
                .callback
                .call0(&JsValue::NULL)
                .map_err(|error| AuthError::TokenSource(js_error_message(&error)))?;
            let resolved = match result.dyn_into::<js_sys::Promise>() {
                Ok(promise) => JsFuture::from(promise)
                    .await
                    .map_err(|error| AuthError::TokenSource(js_error_message(&error)))?,
                Err(value) => value,
            };
            Ok(js_to_json(&resolved))
        }
    }

    struct JsEventSink {
        callback: js_sys::Function,
    }

    impl EmbedEventSink for JsEventSink {
        fn execute_event(&self, event: EmbedEvent, data: Value) {
            let payload = json_to_js(&data).unwrap_or(JsValue::NULL);
            if let Err(error) =
                self.callback
                    .call2(&JsValue::NULL, &JsValue::from_str(event.as_str()), &payload)
            {
                tracing::warn!(event = %event, error = %js_error_message(&error), "event listener threw");
            }
        }
    }

    struct JsResponder {
        port: Option<MessagePort>,
    }

    impl Responder for JsResponder {
        fn respond(&self, reply: Value) {
            let Some(port) = &self.port else {
                tracing::warn!("no reply port for embedded app event");
                return;
            };
            let posted = json_to_js(&reply).and_then(|message| port.post_message(&message));
            if let Err(error) = posted {
                tracing::warn!(error = %js_error_message(&error), "failed to reply to embedded app");
            }
        }
    }

    #[wasm_bindgen(start)]
    pub fn start() {
        console_error_panic_hook::set_once();
    }

    /// One embedded frame driven from JavaScript.
    #[wasm_bindgen]
    pub struct EmbedHandle {
        session: Rc<EmbedSession>,
    }

    #[wasm_bindgen]
    impl EmbedHandle {
        #[wasm_bindgen(constructor)]
        pub fn new(
            frame: HtmlIFrameElement,
            embed_config_json: &str,
            view_config_json: &str,
            on_event: js_sys::Function,
            get_auth_token: Option<js_sys::Function>,
        ) -> Result<EmbedHandle, JsValue> {
            let config: EmbedConfig = serde_json::from_str(embed_config_json)
                .map_err(|error| js_error(&format!("invalid embed config: {error}")))?;
            let view: ViewConfig = serde_json::from_str(view_config_json)
                .map_err(|error| js_error(&format!("invalid view config: {error}")))?;

            let mut builder = EmbedSession::builder(
                config,
                view,
                Rc::new(MessageChannelTransport { frame }),
                Rc::new(JsEventSink { callback: on_event }),
            )
            .alert(Rc::new(WindowAlert));
            if let Some(callback) = get_auth_token {
                builder = builder.token_provider(Rc::new(JsTokenProvider { callback }));
            }
            let session = builder
                .build()
                .map_err(|error| js_error(&error.to_string()))?;
            Ok(EmbedHandle {
                session: Rc::new(session),
            })
        }

        /// Resolves with the reply as JSON text, or with an `Error` on timeout.
        pub fn trigger(&self, event: &str, payload_json: &str) -> js_sys::Promise {
            let session = Rc::clone(&self.session);
            let event = event.parse::<HostEvent>();
            let payload = parse_payload(payload_json);
            future_to_promise(async move {
                let event = event.map_err(|error| js_error(&error.to_string()))?;
                let payload = payload?;
                match session.trigger(event, payload).await {
                    Ok(TriggerOutcome::Replied(reply)) => Ok(JsValue::from_str(&reply.to_string())),
                    Ok(TriggerOutcome::TimedOut) => Ok(js_sys::Error::new(TRIGGER_TIMED_OUT).into()),
                    Err(HostEventError::Rejected(error)) => Err(JsValue::from_str(&error.to_string())),
                    Err(error) => Err(js_error(&error.to_string())),
                }
            })
        }

        #[wasm_bindgen(js_name = interceptInitData)]
        pub fn intercept_init_data(&self) -> String {
            serde_json::to_string(&self.session.intercept_init_data())
                .unwrap_or_else(|_| "{}".to_string())
        }

        #[wasm_bindgen(js_name = processApiInterceptResponse)]
        pub fn process_api_intercept_response(&self, payload_json: &str) -> Result<String, JsValue> {
            let payload = parse_payload(payload_json)?;
            Ok(self
                .session
                .process_api_intercept_response(payload)
                .to_string())
        }

        #[wasm_bindgen(js_name = resetCachedAuthToken)]
        pub fn reset_cached_auth_token(&self) {
            self.session.reset_cached_auth_token();
        }

        /// Routes one message the embedded app posted to the host window.
        #[wasm_bindgen(js_name = handleMessage)]
        pub fn handle_message(
            &self,
            event_type: &str,
            data_json: &str,
            port: Option<MessagePort>,
        ) -> js_sys::Promise {
            let session = Rc::clone(&self.session);
            let event = event_type.parse::<EmbedEvent>();
            let data = parse_payload(data_json);
            future_to_promise(async move {
                let event = event.map_err(|error| js_error(&error.to_string()))?;
                let data = data?;
                session
                    .handle_embed_event(event, data, &JsResponder { port })
                    .await;
                Ok(JsValue::UNDEFINED)
            })
        }

        pub fn authenticate(&self) -> js_sys::Promise {
            let session = Rc::clone(&self.session);
            future_to_promise(async move {
                session
                    .authenticate()
                    .await
                    .map(JsValue::from_bool)
                    .map_err(|error| js_error(&error.to_string()))
            })
        }

        pub fn logout(&self, do_not_disable_auto_login: bool) -> js_sys::Promise {
            let session = Rc::clone(&self.session);
            future_to_promise(async move {
                session
                    .logout(do_not_disable_auto_login)
                    .await
                    .map(|()| JsValue::UNDEFINED)
                    .map_err(|error| js_error(&error.to_string()))
            })
        }
    }

    fn parse_payload(raw: &str) -> Result<Value, JsValue> {
        if raw.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(raw).map_err(|error| js_error(&format!("invalid JSON payload: {error}")))
    }

    fn js_to_json(value: &JsValue) -> Value {
        if value.is_undefined() {
            return Value::Null;
        }
        js_sys::JSON::stringify(value)
            .ok()
            .and_then(|text| text.as_string())
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or(Value::Null)
    }

    fn json_to_js(value: &Value) -> Result<JsValue, JsValue> {
        js_sys::JSON::parse(&value.to_string())
    }

    fn js_error(message: &str) -> JsValue {
        js_sys::Error::new(message).into()
    }

    fn js_error_message(value: &JsValue) -> String {
        value
            .dyn_ref::<js_sys::Error>()
            .map(|error| String::from(error.message()))
            .or_else(|| value.as_string())
            .unwrap_or_else(|| "unknown JavaScript error".to_string())
    }

    fn transport_error(value: JsValue) -> TriggerError {
        TriggerError::Transport(js_error_message(&value))
    }
}
