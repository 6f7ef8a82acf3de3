//! Typed device actions. Each one is a thin wrapper over [`Relay::invoke`].

use relay_core::envelope::{build_request, RequestType};
use relay_core::message::Message;
use relay_core::types::{
    DeviceField, DeviceInfo, DeviceInfoQuery, DeviceMode, Language, LedEffect, LedInfo,
    TimeoutType, TimerType,
};
use serde_json::{json, Map, Value};

use crate::correlator::Continuation;
use crate::error::ActionError;
use crate::relay::Relay;

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn string_field(message: Option<Message>, key: &'static str) -> Option<String> {
    message.and_then(|m| m.get_str(key).map(str::to_owned))
}

impl Relay {
    async fn call(
        &self,
        request_type: RequestType,
        target: Option<&str>,
        body: Value,
    ) -> Result<Option<Message>, ActionError> {
        self.invoke(request_type, target, fields(body), Continuation::Immediate)
            .await
    }

    async fn call_and_wait(
        &self,
        request_type: RequestType,
        target: Option<&str>,
        body: Value,
    ) -> Result<Option<Message>, ActionError> {
        self.invoke(request_type, target, fields(body), Continuation::WaitForFollowUp)
            .await
    }

    async fn post(
        &self,
        request_type: RequestType,
        target: Option<&str>,
        body: Value,
    ) -> Result<(), ActionError> {
        self.invoke(request_type, target, fields(body), Continuation::FireAndForget)
            .await
            .map(|_| ())
    }

    // --- Interactions ---

    pub async fn start_interaction(
        &self,
        target: &str,
        name: &str,
        options: Option<Value>,
    ) -> Result<(), ActionError> {
        let options = options.unwrap_or_else(|| json!({}));
        self.call(
            RequestType::StartInteraction,
            Some(target),
            json!({ "name": name, "options": options }),
        )
        .await
        .map(|_| ())
    }

    pub async fn end_interaction(&self, target: &str, name: &str) -> Result<(), ActionError> {
        self.call(RequestType::EndInteraction, Some(target), json!({ "name": name }))
            .await
            .map(|_| ())
    }

    // --- Speech and audio ---

    /// Start text-to-speech and return the prompt id without waiting for it
    /// to finish.
    pub async fn say(
        &self,
        target: &str,
        text: &str,
        lang: Language,
    ) -> Result<Option<String>, ActionError> {
        let response = self
            .call(RequestType::Say, Some(target), json!({ "text": text, "lang": lang }))
            .await?;
        Ok(string_field(response, "id"))
    }

    /// Speak and return once the device reports the prompt has stopped.
    pub async fn say_and_wait(
        &self,
        target: &str,
        text: &str,
        lang: Language,
    ) -> Result<(), ActionError> {
        self.call_and_wait(RequestType::Say, Some(target), json!({ "text": text, "lang": lang }))
            .await
            .map(|_| ())
    }

    /// Listen for speech and return what was recognised. The speech event
    /// carries this request's id in `request_id`.
    pub async fn listen(
        &self,
        target: &str,
        phrases: &[&str],
        transcribe: bool,
        timeout_secs: u64,
        alt_lang: Option<Language>,
    ) -> Result<String, ActionError> {
        let mut body = json!({
            "phrases": phrases,
            "transcribe": transcribe,
            "timeout": timeout_secs,
        });
        if let Some(lang) = alt_lang {
            body["alt_lang"] = json!(lang);
        }
        let mut envelope = build_request(RequestType::Listen, Some(target), fields(body));
        let request_id = Value::from(envelope.id().as_str());
        envelope.insert("request_id", request_id);

        let result = self
            .send_envelope(RequestType::Listen, envelope, Continuation::WaitForFollowUp)
            .await?;
        string_field(result, "text").ok_or(ActionError::MissingField("text"))
    }

    pub async fn play(&self, target: &str, filename: &str) -> Result<Option<String>, ActionError> {
        let response = self
            .call(RequestType::Play, Some(target), json!({ "filename": filename }))
            .await?;
        Ok(string_field(response, "id"))
    }

    pub async fn play_and_wait(&self, target: &str, filename: &str) -> Result<(), ActionError> {
        self.call_and_wait(RequestType::Play, Some(target), json!({ "filename": filename }))
            .await
            .map(|_| ())
    }

    pub async fn stop_playback(&self, target: &str, ids: &[String]) -> Result<(), ActionError> {
        self.call(RequestType::StopPlayback, Some(target), json!({ "ids": ids }))
            .await
            .map(|_| ())
    }

    // --- LEDs and haptics ---

    pub async fn vibrate(&self, target: &str, pattern: &[u64]) -> Result<(), ActionError> {
        self.call(RequestType::Vibrate, Some(target), json!({ "pattern": pattern }))
            .await
            .map(|_| ())
    }

    pub async fn set_leds(
        &self,
        target: &str,
        effect: LedEffect,
        args: LedInfo,
    ) -> Result<(), ActionError> {
        self.call(RequestType::SetLeds, Some(target), json!({ "effect": effect, "args": args }))
            .await
            .map(|_| ())
    }

    pub async fn switch_all_led_on(&self, target: &str, color: &str) -> Result<(), ActionError> {
        self.set_leds(target, LedEffect::Static, LedInfo::ring(color)).await
    }

    pub async fn switch_all_led_off(&self, target: &str) -> Result<(), ActionError> {
        self.set_leds(target, LedEffect::Off, LedInfo::default()).await
    }

    pub async fn rainbow(&self, target: &str, rotations: i64) -> Result<(), ActionError> {
        let args = LedInfo {
            rotations: Some(rotations),
            ..LedInfo::default()
        };
        self.set_leds(target, LedEffect::Rainbow, args).await
    }

    /// Spin a single lit LED around the ring until told otherwise.
    pub async fn rotate(&self, target: &str, color: &str) -> Result<(), ActionError> {
        let mut args = LedInfo {
            rotations: Some(-1),
            ..LedInfo::default()
        };
        args.colors.insert("1".to_owned(), Value::from(color));
        self.set_leds(target, LedEffect::Rotate, args).await
    }

    pub async fn flash(&self, target: &str, color: &str, count: i64) -> Result<(), ActionError> {
        let args = LedInfo {
            count: Some(count),
            ..LedInfo::ring(color)
        };
        self.set_leds(target, LedEffect::Flash, args).await
    }

    pub async fn breathe(&self, target: &str, color: &str) -> Result<(), ActionError> {
        let args = LedInfo {
            count: Some(-1),
            ..LedInfo::ring(color)
        };
        self.set_leds(target, LedEffect::Breathe, args).await
    }

    // --- Timers ---

    pub async fn set_timer(
        &self,
        timer_type: TimerType,
        name: &str,
        timeout: u64,
        timeout_type: TimeoutType,
    ) -> Result<(), ActionError> {
        self.post(
            RequestType::SetTimer,
            None,
            json!({
                "type": timer_type,
                "name": name,
                "timeout": timeout,
                "timeout_type": timeout_type,
            }),
        )
        .await
    }

    pub async fn clear_timer(&self, name: &str) -> Result<(), ActionError> {
        self.post(RequestType::ClearTimer, None, json!({ "name": name }))
            .await
    }

    // --- Device info ---

    pub async fn get_device_info(
        &self,
        target: &str,
        query: DeviceInfoQuery,
        refresh: bool,
    ) -> Result<DeviceInfo, ActionError> {
        let response = self
            .call(
                RequestType::GetDeviceInfo,
                Some(target),
                json!({ "query": query, "refresh": refresh }),
            )
            .await?
            .ok_or_else(|| ActionError::Decode("empty response".into()))?;
        response
            .decode()
            .map_err(|e| ActionError::Decode(e.to_string()))
    }

    pub async fn get_device_name(&self, target: &str, refresh: bool) -> Result<String, ActionError> {
        self.get_device_info(target, DeviceInfoQuery::Name, refresh)
            .await?
            .name
            .ok_or(ActionError::MissingField("name"))
    }

    pub async fn get_device_battery(&self, target: &str, refresh: bool) -> Result<i64, ActionError> {
        self.get_device_info(target, DeviceInfoQuery::Battery, refresh)
            .await?
            .battery
            .ok_or(ActionError::MissingField("battery"))
    }

    /// Latitude and longitude.
    pub async fn get_device_location(
        &self,
        target: &str,
        refresh: bool,
    ) -> Result<[f64; 2], ActionError> {
        self.get_device_info(target, DeviceInfoQuery::LatLong, refresh)
            .await?
            .latlong
            .ok_or(ActionError::MissingField("latlong"))
    }

    pub async fn get_device_id(&self, target: &str, refresh: bool) -> Result<String, ActionError> {
        self.get_device_info(target, DeviceInfoQuery::Id, refresh)
            .await?
            .id
            .ok_or(ActionError::MissingField("id"))
    }

    pub async fn get_device_address(
        &self,
        target: &str,
        refresh: bool,
    ) -> Result<String, ActionError> {
        self.get_device_info(target, DeviceInfoQuery::Address, refresh)
            .await?
            .address
            .ok_or(ActionError::MissingField("address"))
    }

    pub async fn get_device_indoor_location(
        &self,
        target: &str,
        refresh: bool,
    ) -> Result<String, ActionError> {
        self.get_device_info(target, DeviceInfoQuery::IndoorLocation, refresh)
            .await?
            .indoor_location
            .ok_or(ActionError::MissingField("indoor_location"))
    }

    pub async fn get_device_type(&self, target: &str, refresh: bool) -> Result<String, ActionError> {
        self.get_device_info(target, DeviceInfoQuery::Type, refresh)
            .await?
            .device_type
            .ok_or(ActionError::MissingField("type"))
    }

    pub async fn get_device_username(
        &self,
        target: &str,
        refresh: bool,
    ) -> Result<String, ActionError> {
        self.get_device_info(target, DeviceInfoQuery::Username, refresh)
            .await?
            .username
            .ok_or(ActionError::MissingField("username"))
    }

    pub async fn get_device_location_enabled(
        &self,
        target: &str,
        refresh: bool,
    ) -> Result<bool, ActionError> {
        self.get_device_info(target, DeviceInfoQuery::LocationEnabled, refresh)
            .await?
            .location_enabled
            .ok_or(ActionError::MissingField("location_enabled"))
    }

    pub async fn set_device_info(
        &self,
        target: &str,
        field: DeviceField,
        value: &str,
    ) -> Result<(), ActionError> {
        self.call(
            RequestType::SetDeviceInfo,
            Some(target),
            json!({ "field": field, "value": value }),
        )
        .await
        .map(|_| ())
    }

    pub async fn set_device_name(&self, target: &str, name: &str) -> Result<(), ActionError> {
        self.set_device_info(target, DeviceField::Label, name).await
    }

    pub async fn set_location_enabled(&self, target: &str, enabled: bool) -> Result<(), ActionError> {
        self.set_device_info(target, DeviceField::LocationEnabled, &enabled.to_string())
            .await
    }

    pub async fn set_device_mode(&self, target: &str, mode: DeviceMode) -> Result<(), ActionError> {
        self.call(RequestType::SetDeviceMode, Some(target), json!({ "mode": mode }))
            .await
            .map(|_| ())
    }

    pub async fn set_channel(
        &self,
        target: &str,
        channel_name: &str,
        suppress_tts: bool,
        disable_home_channel: bool,
    ) -> Result<(), ActionError> {
        self.call(
            RequestType::SetChannel,
            Some(target),
            json!({
                "channel_name": channel_name,
                "suppress_tts": suppress_tts,
                "disable_home_channel": disable_home_channel,
            }),
        )
        .await
        .map(|_| ())
    }

    pub async fn set_user_profile(
        &self,
        target: &str,
        username: &str,
        force: bool,
    ) -> Result<(), ActionError> {
        self.call(
            RequestType::SetUserProfile,
            Some(target),
            json!({ "username": username, "force": force }),
        )
        .await
        .map(|_| ())
    }

    pub async fn power_down_device(&self, target: &str) -> Result<(), ActionError> {
        self.call(RequestType::PowerOff, Some(target), json!({ "restart": false }))
            .await
            .map(|_| ())
    }

    pub async fn restart_device(&self, target: &str) -> Result<(), ActionError> {
        self.call(RequestType::PowerOff, Some(target), json!({ "restart": true }))
            .await
            .map(|_| ())
    }

    // --- Workflow variables ---

    pub async fn set_var(&self, name: &str, value: &str) -> Result<(), ActionError> {
        self.call(RequestType::SetVar, None, json!({ "name": name, "value": value }))
            .await
            .map(|_| ())
    }

    /// `None` when the variable is unset.
    pub async fn get_var(&self, name: &str) -> Result<Option<String>, ActionError> {
        let response = self
            .call(RequestType::GetVar, None, json!({ "name": name }))
            .await?;
        Ok(string_field(response, "value"))
    }

    pub async fn unset_var(&self, name: &str) -> Result<(), ActionError> {
        self.call(RequestType::UnsetVar, None, json!({ "name": name }))
            .await
            .map(|_| ())
    }

    // --- Notifications and lifecycle ---

    /// Send a `broadcast`, `alert` or `notify` style notification to a
    /// device or group.
    pub async fn notify(
        &self,
        target: &str,
        kind: &str,
        name: &str,
        text: &str,
    ) -> Result<(), ActionError> {
        self.post(
            RequestType::Notification,
            Some(target),
            json!({ "type": kind, "name": name, "text": text }),
        )
        .await
    }

    /// Ask the platform to end this workflow instance, then close the
    /// session without waiting for the remote stop.
    pub async fn terminate(&self) -> Result<(), ActionError> {
        let sent = self.post(RequestType::Terminate, None, json!({})).await;
        self.stop_session("terminated");
        sent
    }
}
