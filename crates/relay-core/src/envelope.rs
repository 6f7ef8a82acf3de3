//! Outbound request envelopes.
//!
//! A request is a flat JSON object: `_type`, `_id`, an optional
//! `_target: {"uris": [..]}` and the verb-specific fields.

use serde_json::{json, Map, Value};

use crate::ids::RequestId;
use crate::message::TYPE_FIELD;

pub const ID_FIELD: &str = "_id";
pub const TARGET_FIELD: &str = "_target";

/// Every request verb the runtime can send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestType {
    StartInteraction,
    EndInteraction,
    Say,
    Listen,
    Play,
    StopPlayback,
    Vibrate,
    SetLeds,
    SetTimer,
    ClearTimer,
    GetDeviceInfo,
    SetDeviceInfo,
    SetDeviceMode,
    SetUserProfile,
    SetChannel,
    PowerOff,
    SetVar,
    GetVar,
    UnsetVar,
    Notification,
    Terminate,
}

impl RequestType {
    pub const ALL: [RequestType; 21] = [
        Self::StartInteraction,
        Self::EndInteraction,
        Self::Say,
        Self::Listen,
        Self::Play,
        Self::StopPlayback,
        Self::Vibrate,
        Self::SetLeds,
        Self::SetTimer,
        Self::ClearTimer,
        Self::GetDeviceInfo,
        Self::SetDeviceInfo,
        Self::SetDeviceMode,
        Self::SetUserProfile,
        Self::SetChannel,
        Self::PowerOff,
        Self::SetVar,
        Self::GetVar,
        Self::UnsetVar,
        Self::Notification,
        Self::Terminate,
    ];

    /// The `_type` value sent on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::StartInteraction => "wf_api_start_interaction_request",
            Self::EndInteraction => "wf_api_end_interaction_request",
            Self::Say => "wf_api_say_request",
            Self::Listen => "wf_api_listen_request",
            Self::Play => "wf_api_play_request",
            Self::StopPlayback => "wf_api_stop_playback_request",
            Self::Vibrate => "wf_api_vibrate_request",
            Self::SetLeds => "wf_api_set_led_request",
            Self::SetTimer => "wf_api_set_timer_request",
            Self::ClearTimer => "wf_api_clear_timer_request",
            Self::GetDeviceInfo => "wf_api_get_device_info_request",
            Self::SetDeviceInfo => "wf_api_set_device_info_request",
            Self::SetDeviceMode => "wf_api_set_device_mode_request",
            Self::SetUserProfile => "wf_api_set_user_profile_request",
            Self::SetChannel => "wf_api_set_channel_request",
            Self::PowerOff => "wf_api_device_power_off_request",
            Self::SetVar => "wf_api_set_var_request",
            Self::GetVar => "wf_api_get_var_request",
            Self::UnsetVar => "wf_api_unset_var_request",
            Self::Notification => "wf_api_notification_request",
            Self::Terminate => "wf_api_terminate_request",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A request ready to send, with the id it will be correlated by.
#[derive(Clone, Debug)]
pub struct Envelope {
    id: RequestId,
    body: Map<String, Value>,
}

impl Envelope {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn wire_type(&self) -> Option<&str> {
        self.body.get(TYPE_FIELD).and_then(Value::as_str)
    }

    /// Add a verb field after construction. Reserved keys are left alone.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if is_reserved(&key) {
            tracing::debug!(field = %key, "ignoring reserved field in request fields");
            return;
        }
        self.body.insert(key, value);
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.body)
    }
}

fn is_reserved(key: &str) -> bool {
    key == TYPE_FIELD || key == ID_FIELD || key == TARGET_FIELD
}

/// Build a request envelope with a fresh correlation id.
///
/// Caller fields never overwrite `_type`, `_id` or `_target`.
pub fn build_request(
    request_type: RequestType,
    target: Option<&str>,
    fields: Map<String, Value>,
) -> Envelope {
    let id = RequestId::generate();
    let mut body = Map::new();
    body.insert(TYPE_FIELD.to_owned(), Value::from(request_type.wire_name()));
    body.insert(ID_FIELD.to_owned(), Value::from(id.as_str()));
    if let Some(uri) = target {
        body.insert(TARGET_FIELD.to_owned(), make_target(uri));
    }
    for (key, value) in fields {
        if is_reserved(&key) {
            tracing::debug!(field = %key, "ignoring reserved field in request fields");
            continue;
        }
        body.insert(key, value);
    }
    Envelope { id, body }
}

/// The `_target` wrapper for a single device or interaction URI.
pub fn make_target(uri: &str) -> Value {
    json!({ "uris": [uri] })
}
