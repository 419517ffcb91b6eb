use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::str::FromStr;

/// Sample rate of microphone audio sent to the live endpoint.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;
/// Sample rate of synthesized audio returned by the live endpoint.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;
/// Frames per capture window. Each window becomes one realtime input chunk.
pub const CAPTURE_WINDOW_FRAMES: usize = 4096;
/// MIME descriptor attached to every outbound capture chunk.
pub const CAPTURE_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Prebuilt voices offered by the live endpoint.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Voice {
    Puck,
    Charon,
    Kore,
    Fenrir,
    Aoede,
    Leda,
    Orus,
    #[default]
    Zephyr,
    Custom(String),
}

impl Voice {
    pub fn as_str(&self) -> &str {
        match self {
            Voice::Puck => "Puck",
            Voice::Charon => "Charon",
            Voice::Kore => "Kore",
            Voice::Fenrir => "Fenrir",
            Voice::Aoede => "Aoede",
            Voice::Leda => "Leda",
            Voice::Orus => "Orus",
            Voice::Zephyr => "Zephyr",
            Voice::Custom(s) => s,
        }
    }
}

impl Serialize for Voice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "puck" => Voice::Puck,
            "charon" => Voice::Charon,
            "kore" => Voice::Kore,
            "fenrir" => Voice::Fenrir,
            "aoede" => Voice::Aoede,
            "leda" => Voice::Leda,
            "orus" => Voice::Orus,
            "zephyr" => Voice::Zephyr,
            _ => Voice::Custom(s.to_string()),
        })
    }
}

impl<'de> Deserialize<'de> for Voice {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Voice::from_str(&s).unwrap_or_else(|never| match never {}))
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq)]
pub enum Modality {
    #[serde(rename = "TEXT")]
    Text,
    #[serde(rename = "AUDIO")]
    Audio,
}
