use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, MalformedIdError};

/// Length of a mesh identity in bytes.
pub const PEER_ID_LEN: usize = 20;

/// Mesh participant identity.
///
/// Displayed and parsed as a `0x`-prefixed lowercase hex string. The string
/// form never contains a colon, so it is safe as the recipient half of a
/// wire payload.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId([u8; PEER_ID_LEN]);

impl PeerId {
    pub const fn from_bytes(bytes: [u8; PEER_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Fresh random identity (used by the in-memory mesh).
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; PEER_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", short_id(self))
    }
}

impl FromStr for PeerId {
    type Err = MalformedIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.len() != PEER_ID_LEN * 2 {
            return Err(MalformedIdError::new(s));
        }
        let mut bytes = [0u8; PEER_ID_LEN];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| MalformedIdError::new(s))?;
        Ok(Self(bytes))
    }
}

impl Serialize for PeerId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PeerId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Truncated label for a peer: the first 10 characters of its string form
/// followed by `...`.
pub fn short_id(id: &PeerId) -> String {
    let full = id.to_string();
    let cut = full.len().min(10);
    format!("{}...", &full[..cut])
}

// ── Colours ────────────────────────────────────────────────────────────

/// Colour carried on the wire. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColourState {
    Red,
    Green,
    Blue,
}

impl ColourState {
    pub const ALL: [ColourState; 3] = [ColourState::Red, ColourState::Green, ColourState::Blue];

    /// Canonical wire name.
    pub fn name(self) -> &'static str {
        match self {
            ColourState::Red => "RED",
            ColourState::Green => "GREEN",
            ColourState::Blue => "BLUE",
        }
    }
}

impl fmt::Display for ColourState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColourState {
    type Err = DecodeError;

    /// Exact match against the wire names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColourState::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| DecodeError::UnknownColour(s.to_string()))
    }
}

/// Everything a screen may be painted with. `TextLight` is display-only
/// and has no wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayColour {
    Mesh(ColourState),
    TextLight,
}

impl DisplayColour {
    /// The wire colour, if this value may be transmitted.
    pub fn transmittable(self) -> Option<ColourState> {
        match self {
            DisplayColour::Mesh(c) => Some(c),
            DisplayColour::TextLight => None,
        }
    }
}

impl From<ColourState> for DisplayColour {
    fn from(c: ColourState) -> Self {
        DisplayColour::Mesh(c)
    }
}

// ── Message ────────────────────────────────────────────────────────────

/// An addressed colour change: "set `recipient`'s display to `colour`".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Message {
    pub recipient: PeerId,
    pub colour: ColourState,
}

impl Message {
    pub fn new(recipient: PeerId, colour: ColourState) -> Self {
        Self { recipient, colour }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_display_parse_roundtrip() {
        let id = PeerId::from_bytes([0xab; PEER_ID_LEN]);
        let s = id.to_string();
        assert!(s.starts_with("0x"));
        assert_eq!(s.len(), 2 + PEER_ID_LEN * 2);
        assert_eq!(s.parse::<PeerId>().unwrap(), id);
    }

    #[test]
    fn peer_id_parse_accepts_bare_and_uppercase_hex() {
        let id = PeerId::from_bytes([0x1f; PEER_ID_LEN]);
        let bare = hex::encode(id.as_bytes()).to_uppercase();
        assert_eq!(bare.parse::<PeerId>().unwrap(), id);
    }

    #[test]
    fn peer_id_parse_rejects_garbage() {
        let bad_hex = format!("0x{}", "zz".repeat(PEER_ID_LEN));
        for bad in ["", "0x", "0x1234", "not-an-id", bad_hex.as_str()] {
            let err = bad.parse::<PeerId>().unwrap_err();
            assert_eq!(err.input, bad);
        }
    }

    #[test]
    fn peer_id_string_has_no_colon() {
        let id = PeerId::random();
        assert!(!id.to_string().contains(':'));
    }

    #[test]
    fn short_id_truncates() {
        let id = PeerId::from_bytes([0x42; PEER_ID_LEN]);
        assert_eq!(short_id(&id), "0x42424242...");
    }

    #[test]
    fn colour_parse_is_case_sensitive() {
        assert_eq!("RED".parse::<ColourState>().unwrap(), ColourState::Red);
        assert_eq!(
            "green".parse::<ColourState>(),
            Err(DecodeError::UnknownColour("green".into()))
        );
        assert_eq!(
            "Blue".parse::<ColourState>(),
            Err(DecodeError::UnknownColour("Blue".into()))
        );
        assert!(matches!(
            "PURPLE".parse::<ColourState>(),
            Err(DecodeError::UnknownColour(s)) if s == "PURPLE"
        ));
    }

    #[test]
    fn text_light_is_not_transmittable() {
        assert_eq!(DisplayColour::TextLight.transmittable(), None);
        assert_eq!(
            DisplayColour::from(ColourState::Green).transmittable(),
            Some(ColourState::Green)
        );
    }

    #[test]
    fn colour_serde_uses_wire_names() {
        let json = serde_json::to_string(&ColourState::Blue).unwrap();
        assert_eq!(json, "\"BLUE\"");
    }
}
