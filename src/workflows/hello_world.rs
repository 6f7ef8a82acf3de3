use relay_runtime::relay_core::events::{InteractionLifecycleEvent, StartEvent};
use relay_runtime::relay_core::types::Language;
use relay_runtime::{async_trait, Relay, Workflow};

use super::{log_failure, INTERACTION};

/// Says "hello world" in a new interaction, then terminates.
#[derive(Default)]
pub struct HelloWorld;

#[async_trait]
impl Workflow for HelloWorld {
    async fn on_start(&mut self, relay: &Relay, event: StartEvent) {
        let Some(source_uri) = event.source_uri() else {
            tracing::warn!("start event without source_uri");
            return;
        };
        tracing::debug!(source_uri, "hello world started");
        log_failure(
            "start_interaction",
            relay.start_interaction(source_uri, INTERACTION, None).await,
        );
    }

    async fn on_interaction_lifecycle(&mut self, relay: &Relay, event: InteractionLifecycleEvent) {
        let Some(interaction) = event.source_uri.as_deref() else {
            return;
        };
        if event.is_started() {
            log_failure(
                "say_and_wait",
                relay.say_and_wait(interaction, "hello world", Language::English).await,
            );
            log_failure(
                "end_interaction",
                relay.end_interaction(interaction, INTERACTION).await,
            );
        } else if event.is_ended() {
            log_failure("terminate", relay.terminate().await);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::workflows::test_support::*;
    use relay_runtime::SessionState;

    #[tokio::test]
    async fn greets_then_terminates() {
        let (handle, transport) = start("hello");
        handle.session.on_message(START);

        let (frame, id) = expect_request(&transport, "wf_api_start_interaction_request").await;
        assert_eq!(frame["_target"]["uris"][0], "urn:device:1");
        assert_eq!(frame["name"], "interaction name");
        ack(&handle, "start_interaction", &id);

        lifecycle(&handle, "started");
        let (frame, id) = expect_request(&transport, "wf_api_say_request").await;
        assert_eq!(frame["text"], "hello world");
        assert_eq!(frame["_target"]["uris"][0], "urn:interaction:1");
        finish_prompt(&handle, &id);

        let (_, id) = expect_request(&transport, "wf_api_end_interaction_request").await;
        ack(&handle, "end_interaction", &id);

        lifecycle(&handle, "ended");
        expect_request(&transport, "wf_api_terminate_request").await;
        handle.dispatcher.await.unwrap();
        assert_eq!(handle.session.state(), SessionState::Closed);
        assert_eq!(transport.close_reasons(), vec!["terminated".to_string()]);
    }
}
