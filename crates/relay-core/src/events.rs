use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::EventDecodeError;
use crate::message::Message;

/// Every event tag a workflow can receive. One variant per wire tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Stop,
    InteractionLifecycle,
    Prompt,
    Timer,
    TimerFired,
    Button,
    Notification,
    Sms,
    Speech,
    Incident,
    CallStartRequest,
    CallReceived,
    CallRinging,
    CallProgressing,
    CallConnected,
    CallDisconnected,
    CallFailed,
    PlayInboxMessages,
}

impl EventKind {
    pub const ALL: [EventKind; 19] = [
        Self::Start,
        Self::Stop,
        Self::InteractionLifecycle,
        Self::Prompt,
        Self::Timer,
        Self::TimerFired,
        Self::Button,
        Self::Notification,
        Self::Sms,
        Self::Speech,
        Self::Incident,
        Self::CallStartRequest,
        Self::CallReceived,
        Self::CallRinging,
        Self::CallProgressing,
        Self::CallConnected,
        Self::CallDisconnected,
        Self::CallFailed,
        Self::PlayInboxMessages,
    ];

    /// Semantic tag, i.e. the `_type` with `wf_api_` and `_event` stripped.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::InteractionLifecycle => "interaction_lifecycle",
            Self::Prompt => "prompt",
            Self::Timer => "timer",
            Self::TimerFired => "timer_fired",
            Self::Button => "button",
            Self::Notification => "notification",
            Self::Sms => "sms",
            Self::Speech => "speech",
            Self::Incident => "incident",
            Self::CallStartRequest => "call_start_request",
            Self::CallReceived => "call_received",
            Self::CallRinging => "call_ringing",
            Self::CallProgressing => "call_progressing",
            Self::CallConnected => "call_connected",
            Self::CallDisconnected => "call_disconnected",
            Self::CallFailed => "call_failed",
            Self::PlayInboxMessages => "play_inbox_messages",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.tag() == tag)
    }

    pub fn wire_type(&self) -> String {
        format!("wf_api_{}_event", self.tag())
    }
}

/// A decoded event, ready for dispatch to a workflow callback.
#[derive(Clone, Debug)]
pub enum Event {
    Start(StartEvent),
    Stop(StopEvent),
    InteractionLifecycle(InteractionLifecycleEvent),
    Prompt(PromptEvent),
    Timer(TimerEvent),
    TimerFired(TimerFiredEvent),
    Button(ButtonEvent),
    Notification(NotificationEvent),
    Sms(SmsEvent),
    Speech(SpeechEvent),
    Incident(IncidentEvent),
    CallStartRequest(CallEvent),
    CallReceived(CallEvent),
    CallRinging(CallEvent),
    CallProgressing(CallEvent),
    CallConnected(CallEvent),
    CallDisconnected(CallEvent),
    CallFailed(CallEvent),
    PlayInboxMessages(PlayInboxMessagesEvent),
}

impl Event {
    /// Decode an event message. `Ok(None)` means the tag has no callback.
    pub fn decode(message: &Message) -> Result<Option<Self>, EventDecodeError> {
        let Some(kind) = EventKind::from_tag(message.tag()).filter(|_| message.is_event()) else {
            return Ok(None);
        };
        Self::decode_as(kind, message).map(Some)
    }

    fn decode_as(kind: EventKind, message: &Message) -> Result<Self, EventDecodeError> {
        let wrap = |source| EventDecodeError {
            tag: kind.tag().to_owned(),
            source,
        };
        let event = match kind {
            EventKind::Start => Self::Start(message.decode().map_err(wrap)?),
            EventKind::Stop => Self::Stop(message.decode().map_err(wrap)?),
            EventKind::InteractionLifecycle => {
                Self::InteractionLifecycle(message.decode().map_err(wrap)?)
            }
            EventKind::Prompt => Self::Prompt(message.decode().map_err(wrap)?),
            EventKind::Timer => Self::Timer(message.decode().map_err(wrap)?),
            EventKind::TimerFired => Self::TimerFired(message.decode().map_err(wrap)?),
            EventKind::Button => Self::Button(message.decode().map_err(wrap)?),
            EventKind::Notification => Self::Notification(message.decode().map_err(wrap)?),
            EventKind::Sms => Self::Sms(message.decode().map_err(wrap)?),
            EventKind::Speech => Self::Speech(message.decode().map_err(wrap)?),
            EventKind::Incident => Self::Incident(message.decode().map_err(wrap)?),
            EventKind::CallStartRequest => Self::CallStartRequest(message.decode().map_err(wrap)?),
            EventKind::CallReceived => Self::CallReceived(message.decode().map_err(wrap)?),
            EventKind::CallRinging => Self::CallRinging(message.decode().map_err(wrap)?),
            EventKind::CallProgressing => Self::CallProgressing(message.decode().map_err(wrap)?),
            EventKind::CallConnected => Self::CallConnected(message.decode().map_err(wrap)?),
            EventKind::CallDisconnected => Self::CallDisconnected(message.decode().map_err(wrap)?),
            EventKind::CallFailed => Self::CallFailed(message.decode().map_err(wrap)?),
            EventKind::PlayInboxMessages => {
                Self::PlayInboxMessages(message.decode().map_err(wrap)?)
            }
        };
        Ok(event)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Start(_) => EventKind::Start,
            Self::Stop(_) => EventKind::Stop,
            Self::InteractionLifecycle(_) => EventKind::InteractionLifecycle,
            Self::Prompt(_) => EventKind::Prompt,
            Self::Timer(_) => EventKind::Timer,
            Self::TimerFired(_) => EventKind::TimerFired,
            Self::Button(_) => EventKind::Button,
            Self::Notification(_) => EventKind::Notification,
            Self::Sms(_) => EventKind::Sms,
            Self::Speech(_) => EventKind::Speech,
            Self::Incident(_) => EventKind::Incident,
            Self::CallStartRequest(_) => EventKind::CallStartRequest,
            Self::CallReceived(_) => EventKind::CallReceived,
            Self::CallRinging(_) => EventKind::CallRinging,
            Self::CallProgressing(_) => EventKind::CallProgressing,
            Self::CallConnected(_) => EventKind::CallConnected,
            Self::CallDisconnected(_) => EventKind::CallDisconnected,
            Self::CallFailed(_) => EventKind::CallFailed,
            Self::PlayInboxMessages(_) => EventKind::PlayInboxMessages,
        }
    }
}

// --- Payloads ---
//
// Only the fields the runtime or typical workflows read are typed. Anything
// else the peer sends lands in `extra` untouched.

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(rename = "type", default)]
    pub trigger_type: Option<String>,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// The workflow has been triggered.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StartEvent {
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StartEvent {
    /// URI of the device that triggered the workflow, if the trigger names one.
    pub fn source_uri(&self) -> Option<&str> {
        self.trigger.args.get("source_uri").and_then(Value::as_str)
    }
}

/// The workflow has stopped, normally after `terminate` or on a platform error.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StopEvent {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InteractionLifecycleEvent {
    /// `started`, `resumed`, `suspended`, `ended` or `failed`.
    #[serde(rename = "type", default)]
    pub lifecycle_type: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub source_uri: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InteractionLifecycleEvent {
    pub fn is_started(&self) -> bool {
        self.lifecycle_type.as_deref() == Some("started")
    }

    pub fn is_ended(&self) -> bool {
        self.lifecycle_type.as_deref() == Some("ended")
    }
}

/// Marks the start and end of text-to-speech delivery to a device.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PromptEvent {
    #[serde(default)]
    pub id: Option<String>,
    /// `started`, `stopped` or `failed`.
    #[serde(rename = "type", default)]
    pub prompt_type: Option<String>,
    #[serde(default)]
    pub source_uri: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimerEvent {
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimerFiredEvent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ButtonEvent {
    #[serde(default)]
    pub source_uri: Option<String>,
    /// `action` or `channel`.
    #[serde(default)]
    pub button: Option<String>,
    /// `single`, `double`, `triple` or `long`.
    #[serde(default)]
    pub taps: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotificationState {
    #[serde(default)]
    pub acknowledged: Vec<String>,
    #[serde(default)]
    pub created: Vec<String>,
    #[serde(default)]
    pub cancelled: Vec<String>,
    #[serde(default)]
    pub timed_out: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(default)]
    pub source_uri: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub notification_state: Option<NotificationState>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SmsEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Speech captured on a device. During a `listen`, `request_id` is the
/// id of the listen request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SpeechEvent {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub source_uri: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IncidentEvent {
    #[serde(rename = "type", default)]
    pub incident_type: Option<String>,
    #[serde(default)]
    pub incident_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Shared payload for the call-progress family of events.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CallEvent {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub onnet: Option<Value>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub start_time_epoch: Option<Value>,
    #[serde(default)]
    pub connect_time_epoch: Option<Value>,
    #[serde(default)]
    pub end_time_epoch: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlayInboxMessagesEvent {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::classify;

    #[test]
    fn every_kind_roundtrips_through_tag() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_tag(kind.tag()), Some(kind));
            let msg = classify(&format!(r#"{{"_type":"{}"}}"#, kind.wire_type()));
            assert_eq!(msg.tag(), kind.tag());
            let event = Event::decode(&msg).unwrap().unwrap();
            assert_eq!(event.kind(), kind);
        }
    }

    #[test]
    fn seven_call_progress_events() {
        let calls = EventKind::ALL
            .iter()
            .filter(|k| k.tag().starts_with("call_"))
            .count();
        assert_eq!(calls, 7);
    }

    #[test]
    fn start_event_exposes_source_uri() {
        let msg = classify(
            r#"{"_type":"wf_api_start_event","trigger":{"type":"phrase","args":{"source_uri":"urn:dev:1","phrase":"hi"}}}"#,
        );
        let Some(Event::Start(start)) = Event::decode(&msg).unwrap() else {
            panic!("expected start");
        };
        assert_eq!(start.source_uri(), Some("urn:dev:1"));
        assert_eq!(start.trigger.trigger_type.as_deref(), Some("phrase"));
        assert_eq!(start.extra["_type"], "wf_api_start_event");
    }

    #[test]
    fn unknown_event_tag_is_not_dispatchable() {
        let msg = classify(r#"{"_type":"wf_api_progress_event","_id":"abc"}"#);
        assert!(Event::decode(&msg).unwrap().is_none());
    }

    #[test]
    fn response_with_event_tag_is_not_an_event() {
        let msg = classify(r#"{"_type":"wf_api_start_response","_id":"abc"}"#);
        assert!(Event::decode(&msg).unwrap().is_none());
    }

    #[test]
    fn wrong_field_type_is_a_decode_error() {
        let msg = classify(r#"{"_type":"wf_api_button_event","button":7}"#);
        let err = Event::decode(&msg).unwrap_err();
        assert_eq!(err.tag, "button");
    }

    #[test]
    fn lifecycle_helpers() {
        let msg = classify(
            r#"{"_type":"wf_api_interaction_lifecycle_event","type":"started","source_uri":"urn:i:1"}"#,
        );
        let Some(Event::InteractionLifecycle(ev)) = Event::decode(&msg).unwrap() else {
            panic!("expected lifecycle");
        };
        assert!(ev.is_started());
        assert!(!ev.is_ended());
        assert_eq!(ev.source_uri.as_deref(), Some("urn:i:1"));
    }

    #[test]
    fn call_events_accept_numeric_epochs() {
        let msg = classify(
            r#"{"_type":"wf_api_call_connected_event","call_id":"c1","start_time_epoch":1700000000,"onnet":true}"#,
        );
        let Some(Event::CallConnected(call)) = Event::decode(&msg).unwrap() else {
            panic!("expected call connected");
        };
        assert_eq!(call.call_id.as_deref(), Some("c1"));
        assert_eq!(call.start_time_epoch, Some(Value::from(1_700_000_000)));
    }
}
