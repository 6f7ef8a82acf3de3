use relay_runtime::relay_core::events::{InteractionLifecycleEvent, StartEvent, TimerFiredEvent};
use relay_runtime::relay_core::types::{Language, TimeoutType, TimerType};
use relay_runtime::{async_trait, ActionError, Relay, Workflow};

use super::{log_failure, INTERACTION};

/// Walks through the LED effects, one every three seconds.
#[derive(Default)]
pub struct Leds {
    interaction: Option<String>,
}

impl Leds {
    async fn step(&self, relay: &Relay, uri: &str, timer: &str) -> Result<(), ActionError> {
        let (next, spoken) = match timer {
            "rainbow" => {
                relay.rainbow(uri, -1).await?;
                ("rotate", "rainbow")
            }
            "rotate" => {
                relay.rotate(uri, "00ff00").await?;
                ("flash", "rotate")
            }
            "flash" => {
                relay.flash(uri, "ff00ff", 5).await?;
                ("breathe", "flash")
            }
            "breathe" => {
                relay.breathe(uri, "ff00ff").await?;
                ("vibrate", "breathe")
            }
            "vibrate" => {
                relay.switch_all_led_off(uri).await?;
                relay.vibrate(uri, &[100, 500, 500, 500, 500, 500]).await?;
                ("finish", "vibrate")
            }
            "finish" => {
                relay.say_and_wait(uri, "goodbye", Language::English).await?;
                relay.switch_all_led_off(uri).await?;
                return relay.terminate().await;
            }
            other => {
                tracing::debug!(timer = other, "ignoring unknown timer");
                return Ok(());
            }
        };
        relay.say_and_wait(uri, spoken, Language::English).await?;
        relay
            .set_timer(TimerType::Timeout, next, 3, TimeoutType::Seconds)
            .await
    }
}

#[async_trait]
impl Workflow for Leds {
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
        let (Some(uri), true) = (self.interaction.as_deref(), event.is_started()) else {
            return;
        };
        let result = async {
            relay.switch_all_led_on(uri, "ff0000").await?;
            relay.say_and_wait(uri, "red", Language::English).await?;
            relay
                .set_timer(TimerType::Timeout, "rainbow", 3, TimeoutType::Seconds)
                .await
        }
        .await;
        log_failure("led_intro", result);
    }

    async fn on_timer_fired(&mut self, relay: &Relay, event: TimerFiredEvent) {
        let (Some(uri), Some(timer)) = (self.interaction.as_deref(), event.name.as_deref()) else {
            return;
        };
        log_failure("led_step", self.step(relay, uri, timer).await);
    }
}
