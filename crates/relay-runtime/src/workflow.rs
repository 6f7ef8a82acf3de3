use async_trait::async_trait;
use relay_core::events::{
    ButtonEvent, CallEvent, IncidentEvent, InteractionLifecycleEvent, NotificationEvent,
    PlayInboxMessagesEvent, PromptEvent, SmsEvent, SpeechEvent, StartEvent, StopEvent,
    TimerEvent, TimerFiredEvent,
};

use crate::relay::Relay;

/// Callbacks a workflow reacts to. Every method defaults to a no-op, so a
/// workflow overrides only the events it cares about.
///
/// Callbacks for one session never run concurrently: the next event is not
/// delivered until the current callback returns. A callback may await
/// actions on `relay`; long waits hold up the events behind it.
#[async_trait]
pub trait Workflow: Send + 'static {
    async fn on_start(&mut self, _relay: &Relay, _event: StartEvent) {}

    async fn on_stop(&mut self, _relay: &Relay, _event: StopEvent) {}

    async fn on_interaction_lifecycle(&mut self, _relay: &Relay, _event: InteractionLifecycleEvent) {}

    async fn on_prompt(&mut self, _relay: &Relay, _event: PromptEvent) {}

    async fn on_timer(&mut self, _relay: &Relay, _event: TimerEvent) {}

    async fn on_timer_fired(&mut self, _relay: &Relay, _event: TimerFiredEvent) {}

    async fn on_button(&mut self, _relay: &Relay, _event: ButtonEvent) {}

    async fn on_notification(&mut self, _relay: &Relay, _event: NotificationEvent) {}

    async fn on_sms(&mut self, _relay: &Relay, _event: SmsEvent) {}

    async fn on_speech(&mut self, _relay: &Relay, _event: SpeechEvent) {}

    async fn on_incident(&mut self, _relay: &Relay, _event: IncidentEvent) {}

    async fn on_call_start_request(&mut self, _relay: &Relay, _event: CallEvent) {}

    async fn on_call_received(&mut self, _relay: &Relay, _event: CallEvent) {}

    async fn on_call_ringing(&mut self, _relay: &Relay, _event: CallEvent) {}

    async fn on_call_progressing(&mut self, _relay: &Relay, _event: CallEvent) {}

    async fn on_call_connected(&mut self, _relay: &Relay, _event: CallEvent) {}

    async fn on_call_disconnected(&mut self, _relay: &Relay, _event: CallEvent) {}

    async fn on_call_failed(&mut self, _relay: &Relay, _event: CallEvent) {}

    async fn on_play_inbox_messages(&mut self, _relay: &Relay, _event: PlayInboxMessagesEvent) {}
}
