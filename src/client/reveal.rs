//! Typed reveal of bot messages.
//!
//! A reveal runs as its own task: one character per tick, then a completion
//! signal. Dropping the handle cancels it.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to a running reveal.
pub struct Reveal {
    task: JoinHandle<()>,
    done: Option<oneshot::Receiver<()>>,
}

/// Start revealing `text`, handing each character to `emit` every `interval`.
///
/// The first character is emitted immediately.
pub fn spawn_reveal<F>(text: String, interval: Duration, mut emit: F) -> Reveal
where
    F: FnMut(char) + Send + 'static,
{
    let (done_tx, done_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        for c in text.chars() {
            ticker.tick().await;
            emit(c);
        }
        let _ = done_tx.send(());
    });

    Reveal {
        task,
        done: Some(done_rx),
    }
}

impl Reveal {
    /// Wait for the reveal to finish. Returns `false` if it was cancelled
    /// before emitting everything.
    pub async fn finished(&mut self) -> bool {
        match self.done.take() {
            Some(done) => done.await.is_ok(),
            None => false,
        }
    }

    /// Stop revealing. Characters not yet emitted are dropped.
    pub fn cancel(&mut self) {
        self.task.abort();
    }
}

impl Drop for Reveal {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn collector() -> (Arc<Mutex<String>>, impl FnMut(char) + Send + 'static) {
        let out = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&out);
        (out, move |c| sink.lock().unwrap().push(c))
    }

    #[tokio::test]
    async fn reveals_whole_text_then_signals() {
        let (out, emit) = collector();
        let mut reveal = spawn_reveal("héllo".to_string(), Duration::from_millis(1), emit);
        assert!(reveal.finished().await);
        assert_eq!(out.lock().unwrap().as_str(), "héllo");
        // A second wait does not block.
        assert!(!reveal.finished().await);
    }

    #[tokio::test(start_paused = true)]
    async fn reveals_one_character_per_tick() {
        let (out, emit) = collector();
        let mut reveal = spawn_reveal("abcd".to_string(), Duration::from_millis(50), emit);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(out.lock().unwrap().as_str(), "a");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(out.lock().unwrap().as_str(), "ab");

        assert!(reveal.finished().await);
        assert_eq!(out.lock().unwrap().as_str(), "abcd");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_output_and_reports_unfinished() {
        let (out, emit) = collector();
        let mut reveal = spawn_reveal("abcdef".to_string(), Duration::from_millis(50), emit);

        tokio::time::sleep(Duration::from_millis(60)).await;
        reveal.cancel();
        assert!(!reveal.finished().await);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(out.lock().unwrap().as_str(), "ab");
    }

    #[tokio::test]
    async fn empty_text_completes_immediately() {
        let (out, emit) = collector();
        let mut reveal = spawn_reveal(String::new(), Duration::from_secs(60), emit);
        assert!(reveal.finished().await);
        assert!(out.lock().unwrap().is_empty());
    }
}
