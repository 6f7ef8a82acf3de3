use relay_runtime::relay_core::events::{InteractionLifecycleEvent, StartEvent, TimerFiredEvent};
use relay_runtime::relay_core::types::{Language, TimeoutType, TimerType};
use relay_runtime::{async_trait, Relay, Workflow};

use super::{log_failure, INTERACTION};

const FIRST: &str = "first timer";
const SECOND: &str = "second timer";

/// Arms two timers and terminates when the first fires, cancelling the
/// second.
#[derive(Default)]
pub struct Timers {
    interaction: Option<String>,
}

#[async_trait]
impl Workflow for Timers {
    async fn on_start(&mut self, relay: &Relay, event: StartEvent) {
        if let Some(source_uri) = event.source_uri() {
            log_failure(
                "start_interaction",
                relay.start_interaction(source_uri, INTERACTION, None).await,
            );
        }
    }

    async fn on_interaction_lifecycle(&mut self, relay: &Relay, event: InteractionLifecycleEvent) {
        self.interaction = event.source_uri.clone();
        let Some(interaction) = self.interaction.as_deref() else {
            return;
        };
        if !event.is_started() {
            return;
        }
        log_failure(
            "say_and_wait",
            relay.say_and_wait(interaction, "setting timers", Language::English).await,
        );
        log_failure(
            "set_timer",
            relay.set_timer(TimerType::Timeout, FIRST, 5, TimeoutType::Seconds).await,
        );
        log_failure(
            "set_timer",
            relay.set_timer(TimerType::Timeout, SECOND, 10, TimeoutType::Seconds).await,
        );
    }

    async fn on_timer_fired(&mut self, relay: &Relay, event: TimerFiredEvent) {
        let name = event.name.unwrap_or_default();
        tracing::debug!(timer = %name, "timer fired");
        if let Some(interaction) = self.interaction.as_deref() {
            let text = format!("{name} fired");
            log_failure(
                "say_and_wait",
                relay.say_and_wait(interaction, &text, Language::English).await,
            );
        }
        log_failure("clear_timer", relay.clear_timer(SECOND).await);
        log_failure("terminate", relay.terminate().await);
    }
}

#[cfg(test)]
mod tests {
    use crate::workflows::test_support::*;

    #[tokio::test]
    async fn first_timer_ends_the_workflow() {
        let (handle, transport) = start("timers");
        lifecycle(&handle, "started");

        let (frame, id) = expect_request(&transport, "wf_api_say_request").await;
        assert_eq!(frame["text"], "setting timers");
        finish_prompt(&handle, &id);

        let (first, _) = expect_request(&transport, "wf_api_set_timer_request").await;
        assert_eq!(first["name"], "first timer");
        assert_eq!(first["timeout"], 5);
        assert_eq!(first["timeout_type"], "secs");
        assert_eq!(first["type"], "timeout");
        let (second, _) = expect_request(&transport, "wf_api_set_timer_request").await;
        assert_eq!(second["name"], "second timer");

        handle
            .session
            .on_message(r#"{"_type":"wf_api_timer_fired_event","name":"first timer"}"#);
        let (frame, id) = expect_request(&transport, "wf_api_say_request").await;
        assert_eq!(frame["text"], "first timer fired");
        finish_prompt(&handle, &id);

        let (clear, _) = expect_request(&transport, "wf_api_clear_timer_request").await;
        assert_eq!(clear["name"], "second timer");
        expect_request(&transport, "wf_api_terminate_request").await;
        handle.dispatcher.await.unwrap();
    }
}
