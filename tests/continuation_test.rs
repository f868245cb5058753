//! Conversation state across turns

mod common;

use common::*;
use futures::StreamExt;
use serde_json::json;
use structured_stream::{ConversationItem, ResponseAssembler, StreamEvent};

/// Scenario: three turns in one session.
/// Expected: each request references the response created by the turn before it.
#[tokio::test]
async fn test_continuation_id_threads_through_turns() {
    let transport = ScriptedTransport::new(vec![
        Reply::Lines(text_response("resp_1", &["First"])),
        Reply::Lines(text_response("resp_2", &["Second"])),
        Reply::Lines(text_response("resp_3", &["Third"])),
    ]);
    let mut session = session_with(Vec::new(), transport.clone());

    assert_eq!(session.previous_response_id(), None);
    session.respond([ConversationItem::user_text("one")]).await.unwrap();
    assert_eq!(session.previous_response_id(), Some("resp_1"));
    session.respond([ConversationItem::user_text("two")]).await.unwrap();
    assert_eq!(session.previous_response_id(), Some("resp_2"));
    session.respond([ConversationItem::user_text("three")]).await.unwrap();

    let requests = transport.requests();
    assert!(requests[0].get("previousResponseId").is_none());
    assert_eq!(requests[1]["previousResponseId"], "resp_1");
    assert_eq!(requests[2]["previousResponseId"], "resp_2");
    assert_eq!(session.previous_response_id(), Some("resp_3"));
}

#[tokio::test]
async fn test_untyped_request_body() {
    let transport = ScriptedTransport::new(vec![Reply::Lines(text_response("resp_1", &["Hi"]))]);
    let mut session = session_with(Vec::new(), transport.clone());

    session
        .respond([ConversationItem::user_text("Hello")])
        .await
        .unwrap();

    let body = &transport.requests()[0];
    assert_eq!(body["instructions"], "You are a kitchen assistant.");
    assert_eq!(body["stream"], json!("true"));
    assert_eq!(body["tools"], json!([]));
    assert!(body.get("schema").is_none());
    assert_eq!(body["input"][0]["type"], "message");
    assert_eq!(body["input"][0]["content"][0]["text"], "Hello");
}

/// The continuation id changes as soon as the response is created, even if the
/// stream is abandoned before completion.
#[tokio::test]
async fn test_continuation_set_on_created() {
    let transport = ScriptedTransport::new(vec![Reply::Lines(vec![
        created("resp_9"),
        message_added(0),
    ])]);
    let mut session = session_with(Vec::new(), transport);

    let result = session.respond([ConversationItem::user_text("cut short")]).await;

    assert!(result.is_err());
    assert_eq!(session.previous_response_id(), Some("resp_9"));
}

#[tokio::test]
async fn test_reset_starts_a_fresh_conversation() {
    let transport = ScriptedTransport::new(vec![
        Reply::Lines(text_response("resp_1", &["a"])),
        Reply::Lines(text_response("resp_2", &["b"])),
    ]);
    let mut session = session_with(Vec::new(), transport.clone());

    session.respond([ConversationItem::user_text("one")]).await.unwrap();
    session.reset();
    session.respond([ConversationItem::user_text("two")]).await.unwrap();

    assert!(transport.requests()[1].get("previousResponseId").is_none());
    assert_eq!(session.transcript().len(), 2);
}

/// Malformed and misaddressed records do not change what the caller sees.
#[tokio::test]
async fn test_noise_is_transparent_to_reconstruction() {
    let clean = text_response("resp_1", &["Sour", "dough"]);
    let mut noisy = clean.clone();
    noisy.insert(1, "{\"type\":\"response.output_item.add".to_string());
    noisy.insert(3, "data: [DONE]".to_string());
    noisy.insert(4, delta(5, "stray"));
    noisy.insert(6, "not json at all".to_string());

    let transport = ScriptedTransport::new(vec![Reply::Lines(clean), Reply::Lines(noisy)]);
    let mut session = session_with(Vec::new(), transport);

    let from_clean = collect_events(&mut session).await;
    let from_noisy = collect_events(&mut session).await;

    // The misaddressed delta is a valid event; it reaches the caller but does
    // not change the reconstruction.
    assert_eq!(from_noisy.len(), from_clean.len() + 1);

    let rebuild = |events: &[StreamEvent]| {
        let mut assembler = ResponseAssembler::new();
        for event in events {
            if let StreamEvent::Completed(_) = event {
                continue;
            }
            let _ = assembler.apply(event);
        }
        assembler.into_response().unwrap()
    };
    assert_eq!(rebuild(&from_clean).output_text(), "Sourdough");
    assert_eq!(rebuild(&from_clean), rebuild(&from_noisy));
}

async fn collect_events(session: &mut structured_stream::Session) -> Vec<StreamEvent> {
    session
        .stream([ConversationItem::user_text("go")])
        .map(|e| e.unwrap())
        .collect()
        .await
}
