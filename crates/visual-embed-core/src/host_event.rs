//! Maps host events onto the generic UiPassthrough RPC, with fallback to the
//! legacy per-event trigger.

use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::api_intercept::AnswerTmlSource;
use crate::events::HostEvent;
use crate::trigger::{FrameTransport, TriggerError, TriggerOutcome, is_truthy, process_trigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UiPassthroughApi {
    AddVizToPinboard,
    SaveAnswer,
    GetDiscoverabilityStatus,
    GetAvailableUiPassthroughs,
    GetAnswerConfig,
    GetPinboardTabInfo,
    GetUnsavedAnswerTml,
}

impl UiPassthroughApi {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddVizToPinboard => "addVizToPinboard",
            Self::SaveAnswer => "saveAnswer",
            Self::GetDiscoverabilityStatus => "getDiscoverabilityStatus",
            Self::GetAvailableUiPassthroughs => "getAvailableUiPassthroughs",
            Self::GetAnswerConfig => "getAnswerConfig",
            Self::GetPinboardTabInfo => "getPinboardTabInfo",
            Self::GetUnsavedAnswerTml => "getUnsavedAnswerTml",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiPassthroughRequest {
    #[serde(rename = "type")]
    pub api: UiPassthroughApi,
    pub parameters: Value,
}

/// One target's answer to a passthrough call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiPassthroughEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl UiPassthroughEntry {
    // Both fields use JS truthiness.
    fn error(&self) -> Option<&Value> {
        self.error.as_ref().filter(|error| is_truthy(error))
    }

    fn value(&self) -> Option<&Value> {
        self.value.as_ref().filter(|value| is_truthy(value))
    }

    fn is_answered(&self) -> bool {
        self.error().is_some() || self.value().is_some()
    }
}

pub type UiPassthroughArrayResponse = Vec<UiPassthroughEntry>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostEventError {
    #[error("No answer found{}.", viz_suffix(.viz_id))]
    NoAnswer { viz_id: Option<String> },
    #[error("embedded app returned an error: {0}")]
    Rejected(Value),
    #[error("Trigger timed-out in getting a response")]
    TimedOut,
    #[error(transparent)]
    Trigger(TriggerError),
}

impl From<TriggerError> for HostEventError {
    fn from(error: TriggerError) -> Self {
        match error {
            TriggerError::TimedOut => Self::TimedOut,
            TriggerError::Rejected(value) => Self::Rejected(value),
            other => Self::Trigger(other),
        }
    }
}

fn viz_suffix(viz_id: &Option<String>) -> String {
    viz_id
        .as_ref()
        .map(|id| format!(" for vizId: {id}"))
        .unwrap_or_default()
}

/// Where a host event is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEventRoute {
    PinToLiveboard,
    SaveAnswer,
    Legacy(HostEvent),
}

/// Decides the route from the event tag and the payload shape. Every event is
/// listed so a new tag cannot silently take the wrong path.
#[must_use]
pub fn route_host_event(event: HostEvent, payload: &Value) -> HostEventRoute {
    match event {
        HostEvent::Pin if has_value(payload, "newVizName") => HostEventRoute::PinToLiveboard,
        HostEvent::Pin => HostEventRoute::Legacy(HostEvent::Pin),
        HostEvent::SaveAnswer if has_value(payload, "name") => HostEventRoute::SaveAnswer,
        HostEvent::SaveAnswer => HostEventRoute::Legacy(HostEvent::Save),
        HostEvent::Search
        | HostEvent::DrillDown
        | HostEvent::SetVisibleVizs
        | HostEvent::SetVisibleTabs
        | HostEvent::SetHiddenTabs
        | HostEvent::SetActiveTab
        | HostEvent::UpdateRuntimeFilters
        | HostEvent::UpdateFilters
        | HostEvent::OpenFilter
        | HostEvent::AddColumns
        | HostEvent::RemoveColumn
        | HostEvent::Navigate
        | HostEvent::Reload
        | HostEvent::Save
        | HostEvent::Download
        | HostEvent::DownloadAsPdf
        | HostEvent::DownloadAsCsv
        | HostEvent::DownloadAsXlsx
        | HostEvent::Explore
        | HostEvent::Edit
        | HostEvent::MakeACopy
        | HostEvent::Remove
        | HostEvent::Share
        | HostEvent::Schedule
        | HostEvent::SchedulesList
        | HostEvent::ExportTml
        | HostEvent::EditTml
        | HostEvent::UpdateTml
        | HostEvent::GetTml
        | HostEvent::GetIframeUrl
        | HostEvent::GetAnswerSession
        | HostEvent::GetFilters
        | HostEvent::GetTabs
        | HostEvent::GetParameters
        | HostEvent::UpdateParameters
        | HostEvent::ShowUnderlyingData
        | HostEvent::ResetSearch
        | HostEvent::Present
        | HostEvent::ExitPresentMode
        | HostEvent::UiPassthrough => HostEventRoute::Legacy(event),
    }
}

/// A key counts only when its value is truthy, so `null` and `""` do not.
fn has_value(payload: &Value, key: &str) -> bool {
    payload.get(key).is_some_and(is_truthy)
}

/// Copies whichever of two alias keys is set into the other.
fn mirror_alias(object: &mut Map<String, Value>, primary: &str, alias: &str) {
    let present = |object: &Map<String, Value>, key: &str| {
        object.get(key).filter(|value| !value.is_null()).cloned()
    };
    let resolved = present(object, primary).or_else(|| present(object, alias));
    if let Some(value) = resolved {
        object.insert(primary.to_string(), value.clone());
        object.insert(alias.to_string(), value);
    }
}

#[derive(Clone)]
pub struct HostEventClient {
    transport: Rc<dyn FrameTransport>,
    host: String,
}

impl HostEventClient {
    #[must_use]
    pub fn new(transport: Rc<dyn FrameTransport>, host: impl Into<String>) -> Self {
        Self {
            transport,
            host: host.into(),
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Raw per-target answers. A reply that is not an array has no answers.
    pub async fn trigger_ui_passthrough_api(
        &self,
        api: UiPassthroughApi,
        parameters: Value,
    ) -> Result<UiPassthroughArrayResponse, HostEventError> {
        let request = UiPassthroughRequest { api, parameters };
        let payload = serde_json::to_value(&request)
            .map_err(|error| HostEventError::Trigger(TriggerError::Transport(error.to_string())))?;
        let outcome = process_trigger(
            self.transport.as_ref(),
            HostEvent::UiPassthrough,
            &self.host,
            payload,
        )
        .await?;
        let reply = match outcome {
            TriggerOutcome::Replied(reply) => reply,
            TriggerOutcome::TimedOut => return Err(HostEventError::TimedOut),
        };
        match serde_json::from_value::<UiPassthroughArrayResponse>(reply) {
            Ok(entries) => Ok(entries),
            Err(error) => {
                tracing::debug!(%error, api = api.as_str(), "passthrough reply is not an entry array");
                Ok(Vec::new())
            }
        }
    }

    /// First answered entry, unwrapped.
    pub async fn handle_ui_passthrough_for_host_event(
        &self,
        api: UiPassthroughApi,
        parameters: Value,
    ) -> Result<Value, HostEventError> {
        let viz_id = parameters
            .get("vizId")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let entries = self.trigger_ui_passthrough_api(api, parameters).await?;
        let Some(entry) = entries.into_iter().find(UiPassthroughEntry::is_answered) else {
            return Err(HostEventError::NoAnswer { viz_id });
        };

        if let Some(error) = entry.error() {
            return Err(HostEventError::Rejected(error.clone()));
        }
        let value = entry.value().cloned().unwrap_or(Value::Null);
        if let Some(errors) = value.get("errors").filter(|errors| is_truthy(errors)) {
            return Err(HostEventError::Rejected(errors.clone()));
        }
        Ok(value)
    }

    /// Sends the event unchanged through the per-call channel.
    pub async fn host_event_fallback(
        &self,
        event: HostEvent,
        payload: Value,
    ) -> Result<TriggerOutcome, HostEventError> {
        process_trigger(self.transport.as_ref(), event, &self.host, payload)
            .await
            .map_err(HostEventError::from)
    }

    pub async fn trigger_host_event(
        &self,
        event: HostEvent,
        payload: Value,
    ) -> Result<TriggerOutcome, HostEventError> {
        let result = match route_host_event(event, &payload) {
            HostEventRoute::PinToLiveboard => self.handle_pin_event(payload).await,
            HostEventRoute::SaveAnswer => self.handle_save_answer_event(payload).await,
            HostEventRoute::Legacy(legacy) => return self.host_event_fallback(legacy, payload).await,
        };
        match result {
            Ok(value) => Ok(TriggerOutcome::Replied(value)),
            Err(HostEventError::TimedOut) => Ok(TriggerOutcome::TimedOut),
            Err(error) => Err(error),
        }
    }

    async fn handle_pin_event(&self, payload: Value) -> Result<Value, HostEventError> {
        let mut request = into_object(payload);
        mirror_alias(&mut request, "pinboardId", "liveboardId");
        mirror_alias(&mut request, "newPinboardName", "newLiveboardName");

        let value = self
            .handle_ui_passthrough_for_host_event(
                UiPassthroughApi::AddVizToPinboard,
                Value::Object(request),
            )
            .await?;
        let mut response = into_object(value);
        mirror_alias(&mut response, "pinboardId", "liveboardId");
        mirror_alias(&mut response, "newPinboardName", "newLiveboardName");
        Ok(Value::Object(response))
    }

    async fn handle_save_answer_event(&self, payload: Value) -> Result<Value, HostEventError> {
        let value = self
            .handle_ui_passthrough_for_host_event(UiPassthroughApi::SaveAnswer, payload)
            .await?;
        let answer_id = value
            .pointer("/saveResponse/data/Answer__save/answer/id")
            .cloned()
            .unwrap_or(Value::Null);
        let mut response = into_object(value);
        response.insert("answerId".to_string(), answer_id);
        Ok(Value::Object(response))
    }

    /// Names of the passthrough APIs the embedded app supports.
    pub async fn get_available_ui_passthroughs(&self) -> Result<Vec<String>, HostEventError> {
        let value = self
            .handle_ui_passthrough_for_host_event(
                UiPassthroughApi::GetAvailableUiPassthroughs,
                json!({}),
            )
            .await?;
        let keys = value
            .get("keys")
            .and_then(Value::as_array)
            .map(|keys| {
                keys.iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(keys)
    }
}

#[async_trait(?Send)]
impl AnswerTmlSource for HostEventClient {
    type Error = HostEventError;

    async fn get_unsaved_answer_tml(
        &self,
        session_id: Option<&str>,
        viz_id: Option<&str>,
    ) -> Result<Value, Self::Error> {
        let mut parameters = Map::new();
        if let Some(session_id) = session_id {
            parameters.insert("sessionId".to_string(), json!(session_id));
        }
        if let Some(viz_id) = viz_id {
            parameters.insert("vizId".to_string(), json!(viz_id));
        }
        let value = self
            .handle_ui_passthrough_for_host_event(
                UiPassthroughApi::GetUnsavedAnswerTml,
                Value::Object(parameters),
            )
            .await?;
        Ok(value.get("tml").cloned().unwrap_or(value))
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(object) => object,
        Value::Null => Map::new(),
        other => {
            let mut object = Map::new();
            object.insert("value".to_string(), other);
            object
        }
    }
}
