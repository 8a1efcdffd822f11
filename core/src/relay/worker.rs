//! Live worker: take events from the inbound queue one at a time, in delivery order, and run
//! each through the handler. On cancellation the event in flight finishes first.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::event::{dispatch, ChatEvent, EventHandler};
use super::log::truncate_content_default;

/// Returns the number of events handled.
pub async fn run_worker(
    mut inbound_rx: mpsc::Receiver<ChatEvent>,
    handler: Arc<dyn EventHandler>,
    cancel: CancellationToken,
) -> u64 {
    let mut handled = 0u64;
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = inbound_rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let msg = event.message();
        debug!(kind = event.kind(), source = %msg.peer, content = %truncate_content_default(&msg.text), "event received");
        // not raced against `cancel`: an in-flight notification runs to completion or timeout
        dispatch(handler.as_ref(), &event).await;
        handled += 1;
    }
    info!(handled, "worker stopped");
    handled
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::relay::event::{IncomingMessage, Peer};

    #[derive(Default)]
    struct SlowRecorder {
        seen: Mutex<Vec<String>>,
        delay: Duration,
    }

    #[async_trait]
    impl EventHandler for SlowRecorder {
        async fn on_new_message(&self, msg: &IncomingMessage) {
            tokio::time::sleep(self.delay).await;
            self.seen.lock().unwrap().push(msg.text.clone());
        }

        async fn on_edited_message(&self, msg: &IncomingMessage) {
            self.seen.lock().unwrap().push(format!("edit:{}", msg.text));
        }
    }

    fn event(text: &str) -> ChatEvent {
        ChatEvent::ChannelPost(IncomingMessage::new(text, Peer::Channel(1), Utc::now()))
    }

    #[tokio::test]
    async fn handles_events_in_delivery_order() {
        let (tx, rx) = mpsc::channel(8);
        let handler = Arc::new(SlowRecorder::default());
        tx.send(event("1")).await.unwrap();
        tx.send(ChatEvent::EditedChannelPost(IncomingMessage::new("2", Peer::Channel(1), Utc::now())))
            .await
            .unwrap();
        tx.send(event("3")).await.unwrap();
        drop(tx);

        let handled = run_worker(rx, handler.clone(), CancellationToken::new()).await;

        assert_eq!(handled, 3);
        assert_eq!(*handler.seen.lock().unwrap(), vec!["1", "edit:2", "3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_finishes_in_flight_event() {
        let (tx, rx) = mpsc::channel(8);
        let handler = Arc::new(SlowRecorder { delay: Duration::from_secs(5), ..Default::default() });
        let cancel = CancellationToken::new();
        tx.send(event("in-flight")).await.unwrap();
        tx.send(event("queued")).await.unwrap();

        let worker = tokio::spawn(run_worker(rx, handler.clone(), cancel.clone()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        let handled = worker.await.unwrap();

        assert_eq!(handled, 1);
        assert_eq!(*handler.seen.lock().unwrap(), vec!["in-flight"]);
        drop(tx);
    }
}
