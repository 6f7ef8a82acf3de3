//! Sample workflows served by the `relay` binary.

mod button_count;
mod device_info;
mod hello_world;
mod leds;
mod timers;

pub use button_count::ButtonCount;
pub use device_info::DeviceInfo;
pub use hello_world::HelloWorld;
pub use leds::Leds;
pub use timers::Timers;

use relay_runtime::WorkflowRegistry;

/// Interaction name shared by the samples.
const INTERACTION: &str = "interaction name";

pub fn register_all(registry: &mut WorkflowRegistry) {
    registry.register_default::<HelloWorld>("hello");
    registry.register_default::<ButtonCount>("buttons");
    registry.register_default::<Timers>("timers");
    registry.register_default::<Leds>("leds");
    registry.register_default::<DeviceInfo>("device_info");
}

/// Log a failed action and carry on; samples never abort a callback.
fn log_failure<T>(action: &'static str, result: Result<T, relay_runtime::ActionError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(action, error = %e, "action failed");
            None
        }
    }
}
