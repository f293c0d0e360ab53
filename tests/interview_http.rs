//! Integration tests for the interview REST API.
//!
//! Each test spins up the Axum app on a random port backed by an in-memory
//! database and talks to it through the real HTTP client (cookie store
//! included). Generative tests add a stub chat-completion server.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use axum_extra::extract::cookie::Key;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::timeout;

use chat_interview::client::{
    InputMode, InterviewClient, PresentationDriver, Resolution, Speaker, Submission,
    resolve_answer_conflict,
};
use chat_interview::interview::{AppState, SessionPolicy, TurnCoordinator, interview_routes};
use chat_interview::llm::{ChatMessage, CompletionsClient, CompletionsConfig};
use chat_interview::questions::{
    GenerationStage, GenerativeQuestions, QuestionSource, StaticQuestions,
};
use chat_interview::store::LibSqlBackend;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Start the interview app with `source` on a random port, return its base URL.
async fn start_server(source: Arc<dyn QuestionSource>) -> String {
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let coordinator = TurnCoordinator::new(db, source, SessionPolicy::default());
    let app = interview_routes(AppState {
        coordinator: Arc::new(coordinator),
        cookie_key: Key::generate(),
        cookie_secure: false,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://127.0.0.1:{port}")
}

async fn start_static(questions: &[&str]) -> String {
    let source = StaticQuestions::new(questions.iter().map(|q| q.to_string()).collect()).unwrap();
    start_server(Arc::new(source)).await
}

type Captured = Arc<Mutex<Vec<Value>>>;

/// Stub completion endpoint: records each request body and answers with
/// `status` and a reply derived from the request.
async fn start_completions(status: StatusCode) -> (String, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route(
            "/v1/chat/completions",
            post(
                move |State(captured): State<Captured>, Json(body): Json<Value>| async move {
                    let n = {
                        let mut calls = captured.lock().await;
                        calls.push(body);
                        calls.len()
                    };
                    if !status.is_success() {
                        return (status, Json(json!({"error": {"message": "model overloaded"}})));
                    }
                    (
                        status,
                        Json(json!({
                            "choices": [{
                                "message": {"role": "assistant", "content": format!("generated #{n}")}
                            }]
                        })),
                    )
                },
            ),
        )
        .with_state(Arc::clone(&captured));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://127.0.0.1:{port}/v1/chat/completions"), captured)
}

async fn start_generative(status: StatusCode) -> (String, Captured) {
    let (url, captured) = start_completions(status).await;
    let client = CompletionsClient::new(CompletionsConfig {
        api_key: Some(SecretString::from("sk-integration")),
        model: "gpt-stub".to_string(),
        url,
        timeout: Duration::from_secs(5),
    })
    .unwrap();
    let base = start_server(Arc::new(GenerativeQuestions::new(client))).await;
    (base, captured)
}

/// Last message of a captured completion request.
fn steering(body: &Value) -> &str {
    body["messages"]
        .as_array()
        .and_then(|m| m.last())
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
}

// ── Static interview ─────────────────────────────────────────────────

#[tokio::test]
async fn scenario_register_then_first_answer() {
    timeout(TEST_TIMEOUT, async {
        let base = start_static(&["Q1", "Q2", "Q3"]).await;
        let client = InterviewClient::new(&base).unwrap();

        let point = client.which_question().await.unwrap();
        assert!(point.success);
        assert_eq!(point.question_index, 0);
        assert!(point.name.is_none());

        assert_eq!(client.register("Ana").await.unwrap(), "Ana");
        assert_eq!(client.answer("Q1", "blue", None).await.unwrap(), 1);

        let point = client.which_question().await.unwrap();
        assert_eq!(point.question_index, 1);
        assert_eq!(point.name.as_deref(), Some("Ana"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn resume_twice_is_identical() {
    timeout(TEST_TIMEOUT, async {
        let base = start_static(&["Q1"]).await;
        let client = InterviewClient::new(&base).unwrap();

        let first = client.which_question().await.unwrap();
        let second = client.which_question().await.unwrap();
        assert_eq!(first.question_index, second.question_index);
        assert_eq!(first.name, second.name);
        assert_eq!(first.state, second.state);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn n_answers_give_progress_n_in_order() {
    timeout(TEST_TIMEOUT, async {
        let base = start_static(&["Q1", "Q2", "Q3", "Q4"]).await;
        let client = InterviewClient::new(&base).unwrap();
        client.register("Ana").await.unwrap();

        for (i, answer) in ["a1", "a2", "a3"].iter().enumerate() {
            let question = client.ask_question(&[]).await.unwrap();
            assert_eq!(question.content, format!("Q{}", i + 1));
            let progress = client
                .answer(&question.content, answer, Some(i as u32))
                .await
                .unwrap();
            assert_eq!(progress, i as u32 + 1);
        }

        let ledger = client.answer_list().await.unwrap();
        let pairs: Vec<_> = ledger
            .iter()
            .map(|e| (e.question.as_str(), e.answer.as_str()))
            .collect();
        assert_eq!(pairs, [("Q1", "a1"), ("Q2", "a2"), ("Q3", "a3")]);
        assert!(ledger.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn reload_replays_ledger_into_alternating_messages() {
    timeout(TEST_TIMEOUT, async {
        let base = start_static(&["Q1", "Q2", "Q3", "Q4"]).await;
        let client = InterviewClient::new(&base).unwrap();
        client.register("Ana").await.unwrap();
        for (i, q) in ["Q1", "Q2", "Q3"].iter().enumerate() {
            client.answer(q, &format!("a{}", i + 1), Some(i as u32)).await.unwrap();
        }

        // Page reload: same cookie, fresh driver.
        let point = client.which_question().await.unwrap();
        let ledger = client.answer_list().await.unwrap();
        assert_eq!(ledger.len(), 3);

        let mut driver = PresentationDriver::new();
        driver.mount(&point, &ledger);
        let messages = driver.messages();
        assert_eq!(messages.len(), 6);
        let speakers: Vec<_> = messages.iter().map(|m| m.speaker).collect();
        assert_eq!(
            speakers,
            [
                Speaker::Bot,
                Speaker::User,
                Speaker::Bot,
                Speaker::User,
                Speaker::Bot,
                Speaker::User
            ]
        );
        assert_eq!(messages[4].text, "Q3");
        assert_eq!(messages[5].text, "a3");
        assert!(driver.should_request_next());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn static_list_exhausts_with_gone() {
    timeout(TEST_TIMEOUT, async {
        let base = start_static(&["Q1"]).await;
        let client = InterviewClient::new(&base).unwrap();
        client.register("Ana").await.unwrap();
        client.answer("Q1", "yes", Some(0)).await.unwrap();

        let err = client.ask_question(&[]).await.unwrap_err();
        assert!(err.is_exhausted(), "{err}");

        let point = client.which_question().await.unwrap();
        assert!(point.state.is_terminal());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn duplicate_submit_with_index_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let base = start_static(&["Q1", "Q2"]).await;
        let client = InterviewClient::new(&base).unwrap();
        client.register("Ana").await.unwrap();

        assert_eq!(client.answer("Q1", "blue", Some(0)).await.unwrap(), 1);
        let err = client.answer("Q1", "blue", Some(0)).await.unwrap_err();
        assert!(err.is_conflict(), "{err}");
        assert_eq!(client.answer_list().await.unwrap().len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn sessions_are_isolated_by_cookie() {
    timeout(TEST_TIMEOUT, async {
        let base = start_static(&["Q1", "Q2"]).await;
        let ana = InterviewClient::new(&base).unwrap();
        let bob = InterviewClient::new(&base).unwrap();

        ana.register("Ana").await.unwrap();
        ana.answer("Q1", "blue", None).await.unwrap();

        let point = bob.which_question().await.unwrap();
        assert_eq!(point.question_index, 0);
        assert!(bob.answer_list().await.unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn failures_use_the_common_envelope() {
    timeout(TEST_TIMEOUT, async {
        let base = start_static(&["Q1"]).await;
        let http = reqwest::Client::new();

        let resp = http
            .post(format!("{base}/answer"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "validation");
        assert!(body["error"]["message"].is_string());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn driver_walks_static_interview_end_to_end() {
    timeout(TEST_TIMEOUT, async {
        let base = start_static(&["Q1", "Q2"]).await;
        let client = InterviewClient::new(&base).unwrap();

        let point = client.which_question().await.unwrap();
        let ledger = client.answer_list().await.unwrap();
        let mut driver = PresentationDriver::new();
        driver.mount(&point, &ledger);

        let mut replies = ["Ana", "blue", "green"].into_iter();
        loop {
            if driver.is_revealing() {
                driver.reveal_complete();
            }
            if driver.should_request_next() {
                driver.begin_request();
                match client.ask_question(&driver.history()).await {
                    Ok(message) => driver.push_bot(message.content, true),
                    Err(e) if e.is_exhausted() => driver.mark_complete(),
                    Err(e) => panic!("unexpected failure: {e}"),
                }
                continue;
            }
            if driver.is_complete() {
                break;
            }

            assert!(driver.gate_open());
            let reply = replies.next().expect("ran out of replies");
            match driver.submit(reply).unwrap() {
                Submission::Register { name } => {
                    client.register(&name).await.unwrap();
                    driver.name_registered();
                }
                Submission::Answer {
                    question,
                    answer,
                    expected,
                } => {
                    let progress = client.answer(&question, &answer, Some(expected)).await.unwrap();
                    driver.answer_recorded(progress);
                }
            }
        }

        assert_eq!(driver.progress(), 2);
        let texts: Vec<_> = driver.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts[1..], ["Ana", "Q1", "blue", "Q2", "green"]);
    })
    .await
    .expect("test timed out");
}

/// Mount a driver, register `name` and show the first question.
async fn reach_first_question(client: &InterviewClient, name: &str) -> PresentationDriver {
    let point = client.which_question().await.unwrap();
    let ledger = client.answer_list().await.unwrap();
    let mut driver = PresentationDriver::new();
    driver.mount(&point, &ledger);
    driver.reveal_complete();

    let Some(Submission::Register { name }) = driver.submit(name) else {
        panic!("expected a name submission");
    };
    client.register(&name).await.unwrap();
    driver.name_registered();

    assert!(driver.should_request_next());
    driver.begin_request();
    let question = client.ask_question(&driver.history()).await.unwrap();
    driver.push_bot(question.content, true);
    driver.reveal_complete();
    driver
}

fn answer_submission(driver: &mut PresentationDriver, text: &str) -> (String, String, u32) {
    match driver.submit(text) {
        Some(Submission::Answer {
            question,
            answer,
            expected,
        }) => (question, answer, expected),
        other => panic!("expected an answer submission, got {other:?}"),
    }
}

#[tokio::test]
async fn answer_from_another_tab_withdraws_the_local_one() {
    timeout(TEST_TIMEOUT, async {
        let base = start_static(&["Q1", "Q2"]).await;
        let client = InterviewClient::new(&base).unwrap();
        let mut driver = reach_first_question(&client, "Ana").await;
        let other_tab = client.clone();

        let (question, answer, expected) = answer_submission(&mut driver, "mine");
        assert_eq!(other_tab.answer("Q1", "theirs", Some(0)).await.unwrap(), 1);

        let err = client.answer(&question, &answer, Some(expected)).await.unwrap_err();
        assert!(err.is_conflict());
        let resolution = resolve_answer_conflict(&client, &mut driver, &question, &answer)
            .await
            .unwrap();

        assert_eq!(resolution, Resolution::Withdrawn);
        let texts: Vec<_> = driver.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["Q1", "theirs"]);
        assert_eq!(driver.progress(), 1);
        assert!(driver.should_request_next());

        let ledger = client.answer_list().await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].answer, "theirs");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn answer_stored_by_earlier_attempt_is_kept() {
    timeout(TEST_TIMEOUT, async {
        let base = start_static(&["Q1", "Q2"]).await;
        let client = InterviewClient::new(&base).unwrap();
        let mut driver = reach_first_question(&client, "Ana").await;

        let (question, answer, expected) = answer_submission(&mut driver, "blue");
        // First attempt landed but its response never arrived.
        client.answer(&question, &answer, Some(expected)).await.unwrap();
        let err = client.answer(&question, &answer, Some(expected)).await.unwrap_err();
        assert!(err.is_conflict());

        let resolution = resolve_answer_conflict(&client, &mut driver, &question, &answer)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Stored);
        let last = driver.messages().last().unwrap();
        assert_eq!((last.speaker, last.text.as_str()), (Speaker::User, "blue"));
        assert_eq!(driver.progress(), 1);
        assert_eq!(client.answer_list().await.unwrap().len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn replaced_session_falls_back_to_name_prompt() {
    timeout(TEST_TIMEOUT, async {
        let base = start_static(&["Q1", "Q2"]).await;
        let client = InterviewClient::new(&base).unwrap();
        let mut driver = reach_first_question(&client, "Ana").await;

        // A client without the old cookie lands in a brand new session.
        let replaced = InterviewClient::new(&base).unwrap();
        let (question, answer, expected) = answer_submission(&mut driver, "blue");
        let err = replaced.answer(&question, &answer, Some(expected)).await.unwrap_err();
        assert!(err.is_conflict());

        let resolution = resolve_answer_conflict(&replaced, &mut driver, &question, &answer)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Withdrawn);
        assert_eq!(driver.mode(), InputMode::Name);
        assert_eq!(driver.progress(), 0);
        assert!(!driver.should_request_next());
        assert_eq!(driver.messages().len(), 1);
        assert_eq!(driver.messages()[0].speaker, Speaker::Bot);

        driver.reveal_complete();
        assert!(matches!(driver.submit("Ana"), Some(Submission::Register { .. })));
    })
    .await
    .expect("test timed out");
}

// ── Generative interview ─────────────────────────────────────────────

#[tokio::test]
async fn scenario_generated_greeting_then_first_question() {
    timeout(TEST_TIMEOUT, async {
        let (base, captured) = start_generative(StatusCode::OK).await;
        let client = InterviewClient::new(&base).unwrap();

        let greeting = client.ask_question(&[]).await.unwrap();
        assert_eq!(greeting, ChatMessage::assistant("generated #1"));
        assert_eq!(client.which_question().await.unwrap().question_index, 0);

        // The visitor's name is recorded like any answer.
        assert_eq!(client.answer(&greeting.content, "Ana", Some(0)).await.unwrap(), 1);

        let question = client
            .ask_question(&[ChatMessage::user("Ana")])
            .await
            .unwrap();
        assert_eq!(question.content, "generated #2");

        let calls = captured.lock().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0]["model"], "gpt-stub");
        assert_eq!(calls[0]["messages"].as_array().unwrap().len(), 2);
        assert_eq!(steering(&calls[0]), GenerationStage::Greeting.instruction());
        assert_eq!(calls[1]["messages"].as_array().unwrap().len(), 3);
        assert_eq!(calls[1]["messages"][1]["content"], "Ana");
        assert_eq!(steering(&calls[1]), GenerationStage::Opening.instruction());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn generative_rejects_register() {
    timeout(TEST_TIMEOUT, async {
        let (base, _captured) = start_generative(StatusCode::OK).await;
        let client = InterviewClient::new(&base).unwrap();
        let err = client.register("Ana").await.unwrap_err();
        assert!(err.is_conflict(), "{err}");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn upstream_failure_surfaces_as_bad_gateway() {
    timeout(TEST_TIMEOUT, async {
        let (base, _captured) = start_generative(StatusCode::SERVICE_UNAVAILABLE).await;
        let http = reqwest::Client::new();

        let resp = http
            .post(format!("{base}/askQuestion"))
            .json(&json!({"messageQueue": []}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_GATEWAY);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["kind"], "generation_failed");
        assert_eq!(body["error"]["upstream"]["status"], 503);
        assert!(
            body["error"]["upstream"]["body"]
                .as_str()
                .unwrap()
                .contains("model overloaded")
        );

        let client = InterviewClient::new(&base).unwrap();
        let err = client.ask_question(&[]).await.unwrap_err();
        assert!(err.is_generation_failure());
    })
    .await
    .expect("test timed out");
}
