use relay_runtime::relay_core::events::{InteractionLifecycleEvent, StartEvent};
use relay_runtime::relay_core::types::Language;
use relay_runtime::{async_trait, ActionError, Relay, Workflow};

use super::log_failure;

const INTERACTION: &str = "device info interaction";
const DEVICE_NAME: &str = "optimus prime";

/// Renames the device, then reads back each device attribute aloud.
#[derive(Default)]
pub struct DeviceInfo;

/// Fields the device may not report. Other failures still end the report.
fn optional<T>(result: Result<T, ActionError>) -> Result<Option<T>, ActionError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ActionError::MissingField(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn or_unavailable(value: Option<String>) -> String {
    value.unwrap_or_else(|| "unavailable".into())
}

async fn report(relay: &Relay, uri: &str) -> Result<(), ActionError> {
    let say = move |text: String| async move {
        relay.say_and_wait(uri, &text, Language::English).await
    };

    relay.set_device_name(uri, DEVICE_NAME).await?;
    let name = relay.get_device_name(uri, true).await?;
    say(format!("Device name is {name}")).await?;

    let enabled = optional(relay.get_device_location_enabled(uri, false).await)?;
    let state = if enabled.unwrap_or(false) { "enabled" } else { "disabled" };
    say(format!("Location services are {state}")).await?;

    let id = relay.get_device_id(uri, true).await?;
    say(format!("Device id is {id}")).await?;

    let address = optional(relay.get_device_address(uri, false).await)?;
    say(format!("Device address is {}", or_unavailable(address))).await?;

    let latlong = optional(relay.get_device_location(uri, false).await)?
        .map(|[lat, long]| format!("{lat} lat {long} long"));
    say(format!("Device lat long is {}", or_unavailable(latlong))).await?;

    let indoor = optional(relay.get_device_indoor_location(uri, false).await)?;
    say(format!("Device indoor location is {}", or_unavailable(indoor))).await?;

    let battery = match optional(relay.get_device_battery(uri, false).await)? {
        Some(percent) => format!("Device battery is {percent} percent"),
        None => "Device battery is unknown".into(),
    };
    say(battery).await?;

    let device_type = relay.get_device_type(uri, true).await?;
    say(format!("Device type is {device_type}")).await?;

    let username = relay.get_device_username(uri, true).await?;
    say(format!("Device username is {username}")).await
}

#[async_trait]
impl Workflow for DeviceInfo {
    async fn on_start(&mut self, relay: &Relay, event: StartEvent) {
        if let Some(source_uri) = event.source_uri() {
            log_failure(
                "start_interaction",
                relay.start_interaction(source_uri, INTERACTION, None).await,
            );
        }
    }

    async fn on_interaction_lifecycle(&mut self, relay: &Relay, event: InteractionLifecycleEvent) {
        let Some(uri) = event.source_uri.as_deref() else {
            return;
        };
        if event.is_started() {
            log_failure("device_report", report(relay, uri).await);
            log_failure("end_interaction", relay.end_interaction(uri, INTERACTION).await);
        } else if event.is_ended() {
            log_failure("terminate", relay.terminate().await);
        }
    }
}
