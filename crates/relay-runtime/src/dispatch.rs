//! The per-session consumer that feeds events to the workflow one at a time.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use relay_core::events::{Event, StopEvent};
use relay_core::message::tags;
use tokio::sync::mpsc;

use crate::relay::Relay;
use crate::session::{QueueEntry, Session};
use crate::workflow::Workflow;

pub(crate) async fn run(
    session: Arc<Session>,
    mut workflow: Box<dyn Workflow>,
    mut queue: mpsc::UnboundedReceiver<QueueEntry>,
) {
    let relay = Relay::new(Arc::clone(&session));

    while let Some(entry) = queue.recv().await {
        let message = match entry {
            QueueEntry::Stop => break,
            QueueEntry::Event(message) => message,
        };
        let tag = message.tag().to_owned();
        let is_stop = message.is_tag(tags::STOP);

        let event = match Event::decode(&message) {
            Ok(Some(event)) => Some(event),
            Ok(None) => {
                tracing::debug!(%tag, "no callback for event");
                None
            }
            Err(e) if is_stop => {
                tracing::warn!(%tag, error = %e, "malformed stop event, delivering without payload");
                Some(Event::Stop(StopEvent::default()))
            }
            Err(e) => {
                tracing::warn!(%tag, error = %e, "dropping malformed event");
                None
            }
        };

        if let Some(event) = event {
            session.enter_callback(is_stop);
            let outcome = AssertUnwindSafe(deliver(workflow.as_mut(), &relay, event))
                .catch_unwind()
                .await;
            session.exit_callback();
            if let Err(panic) = outcome {
                tracing::error!(%tag, panic = panic_message(panic.as_ref()), "workflow callback panicked");
            }
        }

        if is_stop {
            let reason = session.stop_reason().unwrap_or_else(|| "stopped".to_owned());
            session.stop(&reason);
            break;
        }
    }

    tracing::debug!("dispatch loop finished");
}

async fn deliver(workflow: &mut dyn Workflow, relay: &Relay, event: Event) {
    match event {
        Event::Start(e) => workflow.on_start(relay, e).await,
        Event::Stop(e) => workflow.on_stop(relay, e).await,
        Event::InteractionLifecycle(e) => workflow.on_interaction_lifecycle(relay, e).await,
        Event::Prompt(e) => workflow.on_prompt(relay, e).await,
        Event::Timer(e) => workflow.on_timer(relay, e).await,
        Event::TimerFired(e) => workflow.on_timer_fired(relay, e).await,
        Event::Button(e) => workflow.on_button(relay, e).await,
        Event::Notification(e) => workflow.on_notification(relay, e).await,
        Event::Sms(e) => workflow.on_sms(relay, e).await,
        Event::Speech(e) => workflow.on_speech(relay, e).await,
        Event::Incident(e) => workflow.on_incident(relay, e).await,
        Event::CallStartRequest(e) => workflow.on_call_start_request(relay, e).await,
        Event::CallReceived(e) => workflow.on_call_received(relay, e).await,
        Event::CallRinging(e) => workflow.on_call_ringing(relay, e).await,
        Event::CallProgressing(e) => workflow.on_call_progressing(relay, e).await,
        Event::CallConnected(e) => workflow.on_call_connected(relay, e).await,
        Event::CallDisconnected(e) => workflow.on_call_disconnected(relay, e).await,
        Event::CallFailed(e) => workflow.on_call_failed(relay, e).await,
        Event::PlayInboxMessages(e) => workflow.on_play_inbox_messages(relay, e).await,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
