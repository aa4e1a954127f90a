/// Wire codec for colour messages.
///
/// Payload format: UTF-8 text `"<recipient>:<COLOUR>"`. The separator is the
/// first `:`; colour names are the exact uppercase literals.
use crate::error::{DecodeError, MalformedIdError};
use crate::types::{ColourState, Message, PeerId};

/// Separator between the recipient and the colour name.
pub const SEPARATOR: u8 = b':';

/// Encode a colour change addressed to `recipient`.
pub fn encode(recipient: PeerId, colour: ColourState) -> Vec<u8> {
    format!("{}:{}", recipient, colour.name()).into_bytes()
}

/// Encode an already-built message.
pub fn encode_message(message: &Message) -> Vec<u8> {
    encode(message.recipient, message.colour)
}

/// Decode a payload. Pure, no side effects.
pub fn decode(payload: &[u8]) -> Result<Message, DecodeError> {
    let split = payload
        .iter()
        .position(|b| *b == SEPARATOR)
        .ok_or(DecodeError::MissingSeparator)?;
    let (head, tail) = (&payload[..split], &payload[split + 1..]);

    let recipient = match std::str::from_utf8(head) {
        Ok(s) => s.parse::<PeerId>()?,
        Err(_) => {
            return Err(DecodeError::InvalidPeerId(MalformedIdError::new(
                String::from_utf8_lossy(head),
            )))
        }
    };

    let colour = match std::str::from_utf8(tail) {
        Ok(s) => s.parse::<ColourState>()?,
        Err(_) => {
            return Err(DecodeError::UnknownColour(
                String::from_utf8_lossy(tail).into_owned(),
            ))
        }
    };

    Ok(Message { recipient, colour })
}
