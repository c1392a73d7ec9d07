mod support;

use async_trait::async_trait;
use serde_json::{Value, json};
use support::RecordedEvents;
use visual_embed_core::api_intercept::{
    AnswerTmlSource, InterceptEventParams, PARSING_API_INTERCEPT_BODY_ERROR,
    get_intercept_init_data, handle_intercept_event, process_api_intercept_response,
    process_legacy_intercept_response,
};
use visual_embed_core::{EmbedConfig, EmbedEvent, ViewConfig};

const HOST: &str = "https://ts.example.com";

struct FixedTml(Result<Value, String>);

#[async_trait(?Send)]
impl AnswerTmlSource for FixedTml {
    type Error = String;

    async fn get_unsaved_answer_tml(
        &self,
        session_id: Option<&str>,
        viz_id: Option<&str>,
    ) -> Result<Value, Self::Error> {
        assert_eq!(session_id, Some("session-1"));
        assert_eq!(viz_id, Some("viz-1"));
        self.0.clone()
    }
}

fn intercept_event(input: &str) -> Value {
    let body = json!({
        "variables": {"session": {"sessionId": "session-1"}, "contextBookId": "viz-1"},
    });
    Value::String(
        json!({
            "input": input,
            "init": {"method": "POST", "body": body.to_string()},
        })
        .to_string(),
    )
}

#[test]
fn intercept_is_disabled_by_default() {
    let init = get_intercept_init_data(&EmbedConfig::new(HOST), &ViewConfig::default());
    assert!(!init.enable_api_intercept);
    assert!(init.intercept_urls.is_empty());
    assert_eq!(init.intercept_timeout, None);
    assert_eq!(
        serde_json::to_value(&init).expect("serialize"),
        json!({"enableApiIntercept": false, "interceptUrls": []})
    );
}

#[test]
fn answer_data_expands_to_three_absolute_urls() {
    let embed = EmbedConfig {
        enable_api_intercept: Some(true),
        ..EmbedConfig::new(HOST)
    };
    let view = ViewConfig {
        intercept_urls: vec!["AnswerData".to_string()],
        ..ViewConfig::default()
    };
    let init = get_intercept_init_data(&embed, &view);
    assert_eq!(
        init.intercept_urls,
        vec![
            format!("{HOST}/prism/?op=GetChartWithData"),
            format!("{HOST}/prism/?op=GetTableWithHeadlineData"),
            format!("{HOST}/prism/?op=GetTableWithData"),
        ]
    );
}

#[test]
fn all_dominates_other_entries() {
    let view = ViewConfig {
        enable_api_intercept: Some(true),
        intercept_urls: vec![
            "AnswerData".to_string(),
            "ALL".to_string(),
            "/api/custom".to_string(),
        ],
        intercept_timeout: Some(5_000),
        ..ViewConfig::default()
    };
    let embed = EmbedConfig {
        intercept_timeout: Some(1_000),
        ..EmbedConfig::new(HOST)
    };
    let init = get_intercept_init_data(&embed, &view);
    assert_eq!(init.intercept_urls, vec!["ALL".to_string()]);
    assert_eq!(init.intercept_timeout, Some(5_000));
}

#[test]
fn view_can_opt_out_of_global_intercept() {
    let embed = EmbedConfig {
        enable_api_intercept: Some(true),
        intercept_urls: vec!["LiveboardData".to_string()],
        ..EmbedConfig::new(HOST)
    };
    let view = ViewConfig {
        enable_api_intercept: Some(false),
        ..ViewConfig::default()
    };
    assert!(!get_intercept_init_data(&embed, &view).enable_api_intercept);
}

#[test]
fn legacy_flag_requests_answer_data() {
    let view = ViewConfig {
        is_on_before_get_viz_data_intercept_enabled: true,
        ..ViewConfig::default()
    };
    let init = get_intercept_init_data(&EmbedConfig::new(HOST), &view);
    assert!(init.enable_api_intercept);
    assert_eq!(init.intercept_urls.len(), 3);
}

#[tokio::test]
async fn unparsable_body_emits_exactly_one_error() {
    let events = RecordedEvents::default();
    let data = json!("{\"input\": \"/x\", \"init\": {\"body\": \"{broken\"}}");
    handle_intercept_event(InterceptEventParams {
        event_data: &data,
        execute_event: &events,
        view_config: &ViewConfig::default(),
        answer_tml: &FixedTml(Ok(Value::Null)),
    })
    .await;

    let recorded = events.events.borrow();
    assert_eq!(recorded.len(), 1);
    let (event, payload) = &recorded[0];
    assert_eq!(*event, EmbedEvent::Error);
    assert_eq!(payload["code"], PARSING_API_INTERCEPT_BODY_ERROR);
    assert_eq!(payload["errorType"], "API_INTERCEPT");
}

#[tokio::test]
async fn intercepted_request_is_forwarded_with_url_type() {
    let events = RecordedEvents::default();
    let data = intercept_event(&format!("{HOST}/prism/?op=LoadContextBook"));
    handle_intercept_event(InterceptEventParams {
        event_data: &data,
        execute_event: &events,
        view_config: &ViewConfig::default(),
        answer_tml: &FixedTml(Err("unused".to_string())),
    })
    .await;

    let recorded = events.events.borrow();
    assert_eq!(events.tags(), vec![EmbedEvent::ApiIntercept]);
    let payload = &recorded[0].1;
    assert_eq!(payload["urlType"], "LiveboardData");
    assert_eq!(payload["method"], "POST");
    assert_eq!(payload["body"]["variables"]["contextBookId"], "viz-1");
}

#[tokio::test]
async fn legacy_listener_gets_answer_tml_first() {
    let events = RecordedEvents::default();
    let view = ViewConfig {
        is_on_before_get_viz_data_intercept_enabled: true,
        ..ViewConfig::default()
    };
    let data = intercept_event(&format!("{HOST}/prism/?op=GetChartWithData"));
    handle_intercept_event(InterceptEventParams {
        event_data: &data,
        execute_event: &events,
        view_config: &view,
        answer_tml: &FixedTml(Ok(json!({"answer": {"name": "unsaved"}}))),
    })
    .await;

    assert_eq!(
        events.tags(),
        vec![EmbedEvent::OnBeforeGetVizDataIntercept, EmbedEvent::ApiIntercept]
    );
    assert_eq!(
        events.events.borrow()[0].1,
        json!({"data": {"answer": {"name": "unsaved"}}})
    );
}

#[tokio::test]
async fn failed_tml_fetch_still_forwards_intercept() {
    let events = RecordedEvents::default();
    let view = ViewConfig {
        is_on_before_get_viz_data_intercept_enabled: true,
        ..ViewConfig::default()
    };
    let data = intercept_event(&format!("{HOST}/prism/?op=GetTableWithData"));
    handle_intercept_event(InterceptEventParams {
        event_data: &data,
        execute_event: &events,
        view_config: &view,
        answer_tml: &FixedTml(Err("frame gone".to_string())),
    })
    .await;

    assert_eq!(events.tags(), vec![EmbedEvent::ApiIntercept]);
}

#[test]
fn response_normalization_is_identity_for_new_format() {
    assert_eq!(process_api_intercept_response(Value::Null), Value::Null);
    let payload = json!({"execute": true});
    assert_eq!(process_api_intercept_response(payload.clone()), payload);
    let payload = json!({"data": {"execute": true, "response": {"body": {}}}});
    assert_eq!(process_api_intercept_response(payload.clone()), payload);
}

#[test]
fn legacy_errors_are_always_user_errors() {
    for legacy in [
        json!({"data": {"execute": false, "error": {"errorText": "Denied", "errorDescription": "No access"}}}),
        json!({"data": {"execute": true, "error": true, "errorText": "Blocked"}}),
    ] {
        let converted = process_api_intercept_response(legacy.clone());
        assert_eq!(converted, process_legacy_intercept_response(&legacy));
        assert_eq!(
            converted.pointer("/data/response/body/errors/0/isUserError"),
            Some(&json!(true))
        );
    }

    let converted = process_api_intercept_response(json!({
        "data": {"execute": false, "error": {"errorText": "Denied", "errorDescription": "No access"}},
    }));
    assert_eq!(
        converted.pointer("/data/response/body/errors/0/title"),
        Some(&json!("Denied"))
    );
    assert_eq!(
        converted.pointer("/data/response/body/errors/0/description"),
        Some(&json!("No access"))
    );
}
