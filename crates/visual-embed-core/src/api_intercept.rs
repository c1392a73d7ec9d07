//! Negotiates which fetches inside the frame are relayed to the host, and
//! translates the host's decisions back into something the frame executes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::config::{EmbedConfig, ViewConfig};
use crate::events::{EmbedEvent, EmbedEventSink};
use crate::trigger::is_truthy;

pub const ERROR_PARSING_API_INTERCEPT_BODY: &str = "Error parsing api intercept body";
pub const PARSING_API_INTERCEPT_BODY_ERROR: &str = "PARSING_API_INTERCEPT_BODY_ERROR";
pub const DEFAULT_LEGACY_ERROR_TITLE: &str = "Error Fetching Data";
pub const DEFAULT_LEGACY_ERROR_DESCRIPTION: &str = "Something went wrong";

const ANSWER_DATA_URLS: &[&str] = &[
    "/prism/?op=GetChartWithData",
    "/prism/?op=GetTableWithHeadlineData",
    "/prism/?op=GetTableWithData",
];
const LIVEBOARD_DATA_URLS: &[&str] = &["/prism/?op=LoadContextBook"];
const METADATA_URLS: &[&str] = &[
    "/prism/?op=GetMetadataObjects",
    "/prism/?op=GetHeadersByIds",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterceptedApiType {
    AnswerData,
    LiveboardData,
    Metadata,
    #[serde(rename = "ALL")]
    All,
}

impl InterceptedApiType {
    /// Categories with a fixed URL table, in match priority order.
    pub const CATEGORIES: &'static [InterceptedApiType] =
        &[Self::AnswerData, Self::LiveboardData, Self::Metadata];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnswerData => "AnswerData",
            Self::LiveboardData => "LiveboardData",
            Self::Metadata => "Metadata",
            Self::All => "ALL",
        }
    }

    #[must_use]
    pub fn from_name(raw: &str) -> Option<Self> {
        match raw {
            "AnswerData" => Some(Self::AnswerData),
            "LiveboardData" => Some(Self::LiveboardData),
            "Metadata" => Some(Self::Metadata),
            "ALL" => Some(Self::All),
            _ => None,
        }
    }

    #[must_use]
    pub fn url_patterns(self) -> &'static [&'static str] {
        match self {
            Self::AnswerData => ANSWER_DATA_URLS,
            Self::LiveboardData => LIVEBOARD_DATA_URLS,
            Self::Metadata => METADATA_URLS,
            Self::All => &[],
        }
    }
}

/// Intercept settings handed to the frame at init.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptInitData {
    pub enable_api_intercept: bool,
    pub intercept_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intercept_timeout: Option<u64>,
}

#[must_use]
pub fn get_intercept_init_data(embed: &EmbedConfig, view: &ViewConfig) -> InterceptInitData {
    let legacy = view.legacy_viz_data_intercept();
    let requested =
        embed.enable_api_intercept == Some(true) || view.enable_api_intercept == Some(true) || legacy;
    if !requested || view.enable_api_intercept == Some(false) {
        return InterceptInitData::default();
    }

    let mut combined: Vec<&str> = embed
        .intercept_urls
        .iter()
        .chain(view.intercept_urls.iter())
        .map(String::as_str)
        .collect();
    if legacy {
        combined.push(InterceptedApiType::AnswerData.as_str());
    }

    let intercept_urls = if combined.contains(&InterceptedApiType::All.as_str()) {
        vec![InterceptedApiType::All.as_str().to_string()]
    } else {
        expand_intercept_urls(embed.host(), &combined)
    };

    InterceptInitData {
        enable_api_intercept: true,
        intercept_urls,
        intercept_timeout: view.intercept_timeout.or(embed.intercept_timeout),
    }
}

/// Expands categories to their URL tables and absolutizes relative paths.
/// Repeated categories expand once per occurrence.
#[must_use]
pub fn expand_intercept_urls(host: &str, entries: &[&str]) -> Vec<String> {
    entries
        .iter()
        .flat_map(|entry| match InterceptedApiType::from_name(entry) {
            Some(category) => category.url_patterns().to_vec(),
            None => vec![*entry],
        })
        .map(|url| absolutize(host, url))
        .collect()
}

fn absolutize(host: &str, url: &str) -> String {
    if url.starts_with('/') {
        format!("{host}{url}")
    } else {
        url.to_string()
    }
}

#[must_use]
pub fn url_type_for(url: &str) -> InterceptedApiType {
    InterceptedApiType::CATEGORIES
        .iter()
        .copied()
        .find(|category| category.url_patterns().iter().any(|pattern| url.contains(pattern)))
        .unwrap_or(InterceptedApiType::All)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterceptParseError {
    #[error("intercept event data is not a string")]
    NotAString,
    #[error("intercept envelope is not valid JSON: {0}")]
    Envelope(String),
    #[error("intercept request body is not valid JSON: {0}")]
    Body(String),
    #[error("intercept request body has unexpected type")]
    UnexpectedBody,
}

#[derive(Debug, Deserialize)]
struct RawInterceptEnvelope {
    input: String,
    #[serde(default)]
    init: Option<Map<String, Value>>,
}

/// An intercepted fetch with its JSON body decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptedRequest {
    pub input: String,
    /// Fetch init without the body.
    pub init: Map<String, Value>,
    pub body: Option<Value>,
}

impl InterceptedRequest {
    #[must_use]
    pub fn variables(&self) -> Option<&Value> {
        self.body.as_ref()?.get("variables")
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.variables()?
            .get("session")?
            .get("sessionId")?
            .as_str()
    }

    #[must_use]
    pub fn viz_id(&self) -> Option<&str> {
        self.variables()?.get("contextBookId")?.as_str()
    }
}

/// Decodes the JSON-in-JSON intercept envelope carried in event data.
pub fn parse_intercept_envelope(data: &Value) -> Result<InterceptedRequest, InterceptParseError> {
    let Value::String(raw) = data else {
        return Err(InterceptParseError::NotAString);
    };
    let envelope: RawInterceptEnvelope = serde_json::from_str(raw)
        .map_err(|error| InterceptParseError::Envelope(error.to_string()))?;
    let mut init = envelope.init.unwrap_or_default();
    let body = match init.remove("body") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(
            serde_json::from_str(&text)
                .map_err(|error| InterceptParseError::Body(error.to_string()))?,
        ),
        Some(_) => return Err(InterceptParseError::UnexpectedBody),
    };
    Ok(InterceptedRequest {
        input: envelope.input,
        init,
        body,
    })
}

/// Fetches the unsaved answer TML that legacy viz-data listeners expect.
#[async_trait(?Send)]
pub trait AnswerTmlSource {
    type Error: std::fmt::Display;

    async fn get_unsaved_answer_tml(
        &self,
        session_id: Option<&str>,
        viz_id: Option<&str>,
    ) -> Result<Value, Self::Error>;
}

pub struct InterceptEventParams<'a, S: ?Sized> {
    pub event_data: &'a Value,
    pub execute_event: &'a dyn EmbedEventSink,
    pub view_config: &'a ViewConfig,
    pub answer_tml: &'a S,
}

/// Relays one intercepted fetch to host listeners. Never fails: parse
/// problems are reported as an `Error` event.
pub async fn handle_intercept_event<S>(params: InterceptEventParams<'_, S>)
where
    S: AnswerTmlSource + ?Sized,
{
    let request = match parse_intercept_envelope(params.event_data) {
        Ok(request) => request,
        Err(error) => {
            tracing::error!(%error, "failed to parse api intercept body");
            params.execute_event.execute_event(
                EmbedEvent::Error,
                json!({
                    "errorType": "API_INTERCEPT",
                    "message": ERROR_PARSING_API_INTERCEPT_BODY,
                    "code": PARSING_API_INTERCEPT_BODY_ERROR,
                    "error": ERROR_PARSING_API_INTERCEPT_BODY,
                }),
            );
            return;
        }
    };

    let url_type = url_type_for(&request.input);

    if params.view_config.legacy_viz_data_intercept() && url_type == InterceptedApiType::AnswerData
    {
        match params
            .answer_tml
            .get_unsaved_answer_tml(request.session_id(), request.viz_id())
            .await
        {
            Ok(answer_tml) => params.execute_event.execute_event(
                EmbedEvent::OnBeforeGetVizDataIntercept,
                json!({ "data": answer_tml }),
            ),
            Err(error) => tracing::warn!(%error, "unsaved answer TML unavailable"),
        }
    }

    let mut payload = request.init;
    payload.insert("body".to_string(), request.body.unwrap_or(Value::Null));
    payload.insert("url".to_string(), Value::String(request.input));
    payload.insert(
        "urlType".to_string(),
        Value::String(url_type.as_str().to_string()),
    );
    params
        .execute_event
        .execute_event(EmbedEvent::ApiIntercept, Value::Object(payload));
}

/// Normalizes a host reply to an intercept. New-format replies pass through.
#[must_use]
pub fn process_api_intercept_response(payload: Value) -> Value {
    let is_legacy = payload
        .pointer("/data/error")
        .is_some_and(is_truthy);
    if is_legacy {
        return process_legacy_intercept_response(&payload);
    }
    payload
}

#[must_use]
pub fn process_legacy_intercept_response(payload: &Value) -> Value {
    // Text may sit beside the error flag or inside an error object.
    let text_at = |field: &str, fallback: &str| {
        [format!("/data/{field}"), format!("/data/error/{field}")]
            .iter()
            .find_map(|pointer| {
                payload
                    .pointer(pointer)
                    .and_then(Value::as_str)
                    .filter(|text| !text.is_empty())
            })
            .unwrap_or(fallback)
            .to_string()
    };
    let title = text_at("errorText", DEFAULT_LEGACY_ERROR_TITLE);
    let description = text_at("errorDescription", DEFAULT_LEGACY_ERROR_DESCRIPTION);
    let execute = payload
        .pointer("/data/execute")
        .cloned()
        .unwrap_or(Value::Null);

    json!({
        "data": {
            "execute": execute,
            "response": {
                "body": {
                    "errors": [{
                        "title": title,
                        "description": description,
                        "isUserError": true,
                    }],
                    "data": {},
                },
            },
        },
    })
}
