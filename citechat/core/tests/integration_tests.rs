//! Integration tests for the timeline driver
//!
//! These tests run whole round trips through [`TimelineDriver`] against the
//! scripted backend and, at the end, against a mock HTTP server.
//! Tests cover:
//! - Optimistic append and live observation of streamed text
//! - Edit truncation and renumbering
//! - Regenerate keeping length and numbering
//! - Resuming a topic from history

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use citechat_core::backend::test_utils::{RecordedRequest, ScriptedBackend, ScriptedReply};
use citechat_core::streaming::bridge;
use citechat_core::{
    ChatError, ChatSession, Citation, HistoryMessage, Timeline, TimelineDriver, Topic, TopicId,
    TrieveBackend, Turn, TurnRole,
};

fn assistant(sort_order: u32, content: &str) -> Turn {
    let mut turn = Turn::assistant_placeholder(sort_order);
    turn.content = content.to_string();
    turn
}

/// A session on an existing topic with `exchanges` answered questions
fn session_with(exchanges: u32) -> ChatSession {
    let turns = (1..=exchanges).flat_map(|i| {
        [
            Turn::user(2 * i - 1, format!("question {i}")),
            assistant(2 * i, &format!("answer {i}")),
        ]
    });
    let topic = Topic {
        id: TopicId::new(),
        name: "Existing".to_string(),
    };
    ChatSession::with_topic(topic, Timeline::from_turns(turns))
}

fn sort_orders(session: &ChatSession) -> Vec<u32> {
    session
        .timeline()
        .turns()
        .iter()
        .map(|t| t.sort_order)
        .collect()
}

// =============================================================================
// Append
// =============================================================================

/// Append is optimistic, then text arrives delta by delta.
#[tokio::test]
async fn test_append_scenario_observed_live() {
    let (sink, fragments) = bridge::channel();
    let driver = TimelineDriver::new(
        ScriptedBackend::new().with_reply(ScriptedReply::Stream(fragments)),
    );

    let topic = Topic {
        id: TopicId::new(),
        name: "Small talk".to_string(),
    };
    let mut session = ChatSession::with_topic(
        topic,
        Timeline::from_turns([Turn::user(1, "hi"), assistant(2, "hello")]),
    );
    let mut updates = session.subscribe();

    let producer = async move {
        let before = updates.wait_for(|s| s.is_running).await.unwrap().clone();
        assert_eq!(
            before.turns,
            vec![
                Turn::user(1, "hi"),
                assistant(2, "hello"),
                Turn::user(3, "how are you"),
                assistant(4, ""),
            ]
        );
        assert_eq!(before.turns[3].citations, None);

        sink.push("[]|").await.unwrap();
        sink.push("|I'm ").await.unwrap();

        let typed = updates
            .wait_for(|s| s.turns.last().is_some_and(|t| t.content == "I'm "))
            .await
            .unwrap()
            .clone();
        assert!(typed.is_running);
        assert_eq!(typed.turns[3].citations, Some(Vec::new()));

        sink.push("fine").await.unwrap();
    };

    let (result, ()) = tokio::join!(driver.append(&mut session, "how are you"), producer);
    result.unwrap();

    let last = session.timeline().last().unwrap();
    assert_eq!(last.sort_order, 4);
    assert_eq!(last.role, TurnRole::Assistant);
    assert_eq!(last.content, "I'm fine");
    assert_eq!(last.citations, Some(Vec::new()));
    assert!(!session.is_running());
    assert!(!session.snapshot().is_running);
}

/// Delimiters in the answer text are ordinary text.
#[tokio::test]
async fn test_append_keeps_delimiters_in_answer() {
    let driver = TimelineDriver::new(ScriptedBackend::new().with_reply(
        ScriptedReply::fragments([
            r#"[{"id":"doc-1","link":"https://example.com/a||b"}]"#,
            "||use a || b",
            " or c||d",
        ]),
    ));
    let mut session = session_with(1);

    driver.append(&mut session, "which?").await.unwrap();

    let last = session.timeline().last().unwrap();
    assert_eq!(last.content, "use a || b or c||d");
    assert_eq!(
        last.citations,
        Some(vec![
            Citation::new("doc-1").with_link("https://example.com/a||b")
        ])
    );
}

/// A stream with no delimiter decodes entirely as text.
#[tokio::test]
async fn test_append_without_citations() {
    let driver = TimelineDriver::new(
        ScriptedBackend::new().with_reply(ScriptedReply::fragments(["plain ", "answer"])),
    );
    let mut session = session_with(1);

    driver.append(&mut session, "no sources?").await.unwrap();

    let last = session.timeline().last().unwrap();
    assert_eq!(last.content, "plain answer");
    assert_eq!(last.citations, None);
}

// =============================================================================
// Edit
// =============================================================================

#[tokio::test]
async fn test_edit_at_truncates_and_renumbers() {
    for k in 1..=6u32 {
        let driver = TimelineDriver::new(
            ScriptedBackend::new().with_reply(ScriptedReply::fragments(["[]||edited answer"])),
        );
        let mut session = session_with(3);
        let topic_id = session.topic().unwrap().id;

        driver
            .edit_at(&mut session, "rephrased", Some(k.to_string().as_str()))
            .await
            .unwrap();

        assert_eq!(sort_orders(&session), (1..=k + 2).collect::<Vec<_>>());
        let turns = session.timeline().turns();
        assert_eq!(turns[k as usize], Turn::user(k + 1, "rephrased"));
        assert_eq!(turns[k as usize + 1].content, "edited answer");
        assert_eq!(
            driver.backend().requests(),
            vec![RecordedRequest::Edit {
                topic_id,
                sort_order: k + 1,
                content: "rephrased".to_string(),
            }]
        );
    }
}

#[tokio::test]
async fn test_edit_first_message() {
    let driver = TimelineDriver::new(
        ScriptedBackend::new().with_reply(ScriptedReply::fragments(["[]||from scratch"])),
    );
    let mut session = session_with(2);

    driver.edit_at(&mut session, "start over", None).await.unwrap();

    assert_eq!(sort_orders(&session), vec![1, 2]);
    assert_eq!(session.timeline().turns()[0].content, "start over");
    assert!(matches!(
        driver.backend().requests()[0],
        RecordedRequest::Edit { sort_order: 1, .. }
    ));
}

#[tokio::test]
async fn test_edit_unknown_turn_changes_nothing() {
    let driver = TimelineDriver::new(ScriptedBackend::new());
    let mut session = session_with(2);
    let before = session.timeline().clone();
    let mut updates = session.subscribe();
    updates.mark_unchanged();

    let err = driver
        .edit_at(&mut session, "never sent", Some("99"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ChatError::TurnNotFound {
            id: "99".to_string()
        }
    );
    assert_eq!(err.to_string(), "message with id 99 not found");
    assert_eq!(session.timeline(), &before);
    assert!(!updates.has_changed().unwrap());
    assert!(driver.backend().requests().is_empty());
}

// =============================================================================
// Regenerate
// =============================================================================

#[tokio::test]
async fn test_regenerate_keeps_length_and_numbering() {
    let driver = TimelineDriver::new(ScriptedBackend::new().with_reply(
        ScriptedReply::fragments([r#"[{"id":"fresh"}]||new "#, "answer"]),
    ));
    let mut session = session_with(2);
    let orders = sort_orders(&session);
    let topic_id = session.topic().unwrap().id;
    let mut updates = session.subscribe();

    let (result, cleared) = tokio::join!(driver.regenerate_last(&mut session), async {
        updates
            .wait_for(|s| s.turns.last().is_some_and(|t| t.content.is_empty()))
            .await
            .unwrap()
            .clone()
    });
    result.unwrap();

    assert_eq!(cleared.turns.len(), 4);
    assert_eq!(cleared.turns[3].citations, None);

    assert_eq!(sort_orders(&session), orders);
    let last = session.timeline().last().unwrap();
    assert_eq!(last.content, "new answer");
    assert_eq!(last.citations, Some(vec![Citation::new("fresh")]));
    assert_eq!(session.timeline().turns()[1].content, "answer 1");
    assert_eq!(
        driver.backend().requests(),
        vec![RecordedRequest::Regenerate { topic_id }]
    );
}

// =============================================================================
// Resume
// =============================================================================

#[tokio::test]
async fn test_resume_from_history_then_append() {
    let history = vec![
        HistoryMessage {
            sort_order: 0,
            role: "system".to_string(),
            content: "Answer from the docs.".to_string(),
            id: None,
            created_at: None,
        },
        HistoryMessage {
            sort_order: 2,
            role: "assistant".to_string(),
            content: "Thirty days.".to_string(),
            id: None,
            created_at: None,
        },
        HistoryMessage {
            sort_order: 1,
            role: "user".to_string(),
            content: "Refund window?".to_string(),
            id: None,
            created_at: None,
        },
    ];
    let driver = TimelineDriver::new(
        ScriptedBackend::new()
            .with_history(history)
            .with_reply(ScriptedReply::fragments(["[]||Yes."])),
    );
    let topic_id = TopicId::new();

    let mut session = driver.resume(topic_id).await.unwrap();
    assert_eq!(sort_orders(&session), vec![1, 2]);
    assert_eq!(session.timeline().turns()[0].role, TurnRole::User);
    assert_eq!(session.title(), None);

    driver.append(&mut session, "Even on sale items?").await.unwrap();

    assert_eq!(sort_orders(&session), vec![1, 2, 3, 4]);
    assert_eq!(
        driver.backend().requests(),
        vec![
            RecordedRequest::History { topic_id },
            RecordedRequest::Create {
                topic_id,
                content: "Even on sale items?".to_string(),
            },
        ]
    );
}

// =============================================================================
// HTTP end to end
// =============================================================================

#[tokio::test]
async fn test_trieve_round_trip() {
    let server = MockServer::start().await;
    let topic_id = TopicId::new();

    Mock::given(method("POST"))
        .and(path("/api/topic"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": topic_id.to_string(),
            "name": "Shipping"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/message"))
        .and(body_partial_json(json!({
            "topic_id": topic_id.to_string(),
            "new_message_content": "How long does shipping take?"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"[{"id":"ship-1","metadata":{"title":"Shipping FAQ"}}]||Two to five days || usually three."#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let driver = TimelineDriver::new(TrieveBackend::new(server.uri(), "ds-1"));
    let mut session = ChatSession::new();

    driver
        .append(&mut session, "How long does shipping take?")
        .await
        .unwrap();

    assert_eq!(session.title(), Some("Shipping"));
    let last = session.timeline().last().unwrap();
    assert_eq!(last.content, "Two to five days || usually three.");
    let citations = last.citations.as_ref().unwrap();
    assert_eq!(citations[0].title(), Some("Shipping FAQ"));
}
