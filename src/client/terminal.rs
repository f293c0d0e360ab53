//! Terminal front end. Drives a [`PresentationDriver`] against a running
//! server from stdin/stdout.

use std::io::Write;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use super::api::InterviewClient;
use super::driver::{ConversationMessage, PresentationDriver, Speaker, Submission};
use super::resync::{Resolution, resolve_answer_conflict};
use super::reveal::spawn_reveal;
use crate::config::ClientConfig;
use crate::error::ClientError;

const CLOSING_LINE: &str = "That was the last question. Thanks for chatting!";

/// Forward stdin lines to a channel.
fn spawn_stdin() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break, // EOF
                Err(e) => {
                    tracing::error!("Error reading stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

fn print_message(message: &ConversationMessage) {
    match message.speaker {
        Speaker::Bot => println!("bot> {}", message.text),
        Speaker::User => println!("you> {}", message.text),
    }
}

fn prompt() {
    print!("you> ");
    let _ = std::io::stdout().flush();
}

async fn reveal(text: String, config: &ClientConfig) {
    print!("bot> ");
    let mut reveal = spawn_reveal(text, config.typing_interval, |c| {
        print!("{c}");
        let _ = std::io::stdout().flush();
    });
    reveal.finished().await;
    println!();
}

fn report(action: &str, err: &ClientError) {
    if err.is_generation_failure() {
        eprintln!("! The bot could not come up with a question ({err}). Type /retry to try again.");
    } else if err.kind() == Some("persistence_failure") {
        eprintln!("! The server could not save your progress ({err}).");
    } else {
        eprintln!("! Could not {action}: {err}");
    }
}

/// Run one interview session until it completes or the user quits.
pub async fn run(config: ClientConfig) -> anyhow::Result<()> {
    let client = InterviewClient::new(config.server_url.clone())?;
    let point = client
        .which_question()
        .await
        .with_context(|| format!("Could not reach the interview server at {}", config.server_url))?;
    let ledger = client.answer_list().await.context("Could not load earlier answers")?;

    let mut driver = PresentationDriver::new();
    driver.mount(&point, &ledger);
    for message in driver.messages().iter().filter(|m| !m.fresh) {
        print_message(message);
    }
    if let Some(name) = &point.name {
        println!("(Welcome back, {name}!)");
    }

    let mut input = spawn_stdin();

    loop {
        if driver.is_revealing() {
            if let Some(last) = driver.messages().last() {
                reveal(last.text.clone(), &config).await;
            }
            driver.reveal_complete();

            let mut early = 0;
            while input.try_recv().is_ok() {
                early += 1;
            }
            if early > 0 {
                eprintln!("(input typed during the question was ignored)");
            }
        }

        if driver.should_request_next() {
            driver.begin_request();
            match client.ask_question(&driver.history()).await {
                Ok(message) => {
                    driver.push_bot(message.content, true);
                    continue;
                }
                Err(e) if e.is_exhausted() => driver.mark_complete(),
                Err(e) => {
                    driver.request_failed();
                    report("fetch the next question", &e);
                    if !e.is_generation_failure() {
                        eprintln!("  Type /retry to ask again.");
                    }
                }
            }
        }

        if driver.is_complete() {
            println!("{CLOSING_LINE}");
            break;
        }

        prompt();
        let Some(line) = input.recv().await else {
            break;
        };
        match line.trim() {
            "/quit" => break,
            "/retry" => {
                if driver.is_stalled() {
                    driver.retry();
                } else {
                    eprintln!("(nothing to retry)");
                }
                continue;
            }
            _ => {}
        }

        let Some(submission) = driver.submit(&line) else {
            if !line.trim().is_empty() {
                eprintln!("(wait for the next question)");
            }
            continue;
        };

        match submission {
            Submission::Register { name } => match client.register(&name).await {
                Ok(name) => {
                    tracing::debug!(name = %name, "Name registered");
                    driver.name_registered();
                }
                Err(e) => {
                    driver.submission_failed();
                    report("register your name", &e);
                }
            },
            Submission::Answer {
                question,
                answer,
                expected,
            } => match client.answer(&question, &answer, Some(expected)).await {
                Ok(progress) => driver.answer_recorded(progress),
                Err(e) if e.is_conflict() => {
                    match resolve_answer_conflict(&client, &mut driver, &question, &answer).await {
                        Ok(Resolution::Stored) => {}
                        Ok(Resolution::Withdrawn) => {
                            eprintln!("! Your answer was not saved. Picking up where the server left off:");
                            for message in driver.messages().iter().filter(|m| !m.fresh) {
                                print_message(message);
                            }
                        }
                        Err(e) => {
                            report("check whether your answer was saved", &e);
                            eprintln!("  Please send it again.");
                        }
                    }
                }
                Err(e) if e.is_exhausted() => {
                    driver.submission_failed();
                    driver.mark_complete();
                }
                Err(e) => {
                    driver.submission_failed();
                    report("save your answer", &e);
                    eprintln!("  Please send it again.");
                }
            },
        }
    }

    Ok(())
}
