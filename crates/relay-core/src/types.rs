//! Small vocabularies used as request fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum!(
    /// Animation played on a device's LED ring.
    LedEffect {
        Rainbow => "rainbow",
        Rotate => "rotate",
        Flash => "flash",
        Breathe => "breathe",
        Static => "static",
        Off => "off",
    }
);

wire_enum!(
    TimerType {
        Timeout => "timeout",
        Interval => "interval",
    }
);

wire_enum!(
    TimeoutType {
        Milliseconds => "ms",
        Seconds => "secs",
        Minutes => "mins",
        Hours => "hrs",
    }
);

wire_enum!(
    DeviceInfoQuery {
        Name => "name",
        Id => "id",
        Address => "address",
        LatLong => "latlong",
        IndoorLocation => "indoor_location",
        Battery => "battery",
        Type => "type",
        Username => "username",
        LocationEnabled => "location_enabled",
    }
);

wire_enum!(
    DeviceMode {
        Panic => "panic",
        Alarm => "alarm",
        None => "none",
    }
);

wire_enum!(
    /// Device attribute writable with `set_device_info`.
    DeviceField {
        Label => "label",
        LocationEnabled => "location_enabled",
        Channel => "channel",
    }
);

wire_enum!(
    Language {
        English => "en-US",
        German => "de-DE",
        Spanish => "es-ES",
        French => "fr-FR",
        Italian => "it-IT",
        Russian => "ru-RU",
        Swedish => "sv-SE",
        Turkish => "tr-TR",
        Hindi => "hi-IN",
        Icelandic => "is-IS",
        Japanese => "ja-JP",
        Korean => "ko-KR",
        Polish => "pl-PK",
        Portuguese => "pt-BR",
        Norwegian => "nb-NO",
        Dutch => "nl-NL",
        Chinese => "zh",
    }
);

impl Default for Language {
    fn default() -> Self {
        Self::English
    }
}

/// Options for `set_leds`. Unset fields are left to the device default.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LedInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotations: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_delay: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_repeats: Option<i64>,
    /// LED index (`"1"`..`"12"` or `"ring"`) to hex colour.
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    pub colors: Map<String, Value>,
}

impl LedInfo {
    pub fn ring(color: &str) -> Self {
        let mut colors = Map::new();
        colors.insert("ring".to_owned(), Value::from(color));
        Self {
            colors,
            ..Self::default()
        }
    }
}

/// Decoded `get_device_info` response. Only the field that was queried is set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latlong: Option<[f64; 2]>,
    #[serde(default)]
    pub indoor_location: Option<String>,
    #[serde(default)]
    pub battery: Option<i64>,
    #[serde(rename = "type", default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub location_enabled: Option<bool>,
}
