use std::collections::HashMap;

use relay_runtime::relay_core::events::{ButtonEvent, InteractionLifecycleEvent, StartEvent};
use relay_runtime::relay_core::types::Language;
use relay_runtime::{async_trait, Relay, Workflow};

use super::{log_failure, INTERACTION};

/// Counts presses per button and tap pattern and reads the tally back.
#[derive(Default)]
pub struct ButtonCount {
    interaction: Option<String>,
    counts: HashMap<(String, String), u32>,
}

impl ButtonCount {
    fn record(&mut self, button: &str, taps: &str) -> u32 {
        let count = self
            .counts
            .entry((button.to_owned(), taps.to_owned()))
            .or_default();
        *count += 1;
        *count
    }
}

#[async_trait]
impl Workflow for ButtonCount {
    async fn on_start(&mut self, relay: &Relay, event: StartEvent) {
        if let Some(source_uri) = event.source_uri() {
            log_failure(
                "start_interaction",
                relay.start_interaction(source_uri, INTERACTION, None).await,
            );
        }
    }

    async fn on_interaction_lifecycle(&mut self, _relay: &Relay, event: InteractionLifecycleEvent) {
        self.interaction = event.source_uri;
    }

    async fn on_button(&mut self, relay: &Relay, event: ButtonEvent) {
        let button = event.button.unwrap_or_else(|| "unknown".into());
        let taps = event.taps.unwrap_or_else(|| "unknown".into());
        let count = self.record(&button, &taps);
        tracing::debug!(%button, %taps, count, "button pressed");

        let Some(interaction) = self.interaction.as_deref() else {
            return;
        };
        let text = format!("{taps} clicked {button} {count} times");
        log_failure(
            "say_and_wait",
            relay.say_and_wait(interaction, &text, Language::English).await,
        );
    }
}
