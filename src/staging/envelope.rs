//! Read-side decoding of staged payloads.
//!
//! Producers have written several shapes over time. Each is classified into an
//! [`Envelope`] and stepped until it yields the flat item list.

use serde_json::{Map, Value};
use tracing::{debug, warn};

/// A wrapped string may itself hold a wrapped payload; stop unwrapping after this many layers.
const MAX_UNWRAP: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// `[{...}, {...}]`
    BareList(Vec<Value>),
    /// `[{"value": "<json text>"}]`
    WrappedString(String),
    /// `[{"value": [{...}]}]`
    WrappedList(Vec<Value>),
    /// `{...}`
    BareObject(Map<String, Value>),
    Unrecognized,
}

enum Step {
    Next(Envelope),
    Done(Vec<Value>),
}

impl Envelope {
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Array(mut items) => {
                let wrapped = items
                    .first()
                    .and_then(Value::as_object)
                    .is_some_and(|first| first.contains_key("value"));
                if !wrapped {
                    return Envelope::BareList(items);
                }
                match items.swap_remove(0) {
                    Value::Object(mut first) => match first.remove("value") {
                        Some(Value::String(text)) => Envelope::WrappedString(text),
                        Some(Value::Array(inner)) => Envelope::WrappedList(inner),
                        _ => Envelope::Unrecognized,
                    },
                    _ => Envelope::Unrecognized,
                }
            }
            Value::Object(object) => Envelope::BareObject(object),
            _ => Envelope::Unrecognized,
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            Envelope::BareList(_) => "bare_list",
            Envelope::WrappedString(_) => "wrapped_string",
            Envelope::WrappedList(_) => "wrapped_list",
            Envelope::BareObject(_) => "bare_object",
            Envelope::Unrecognized => "unrecognized",
        }
    }

    fn step(self) -> Step {
        match self {
            Envelope::BareList(items) | Envelope::WrappedList(items) => Step::Done(items),
            Envelope::BareObject(object) => Step::Done(vec![Value::Object(object)]),
            Envelope::WrappedString(text) => match serde_json::from_str::<Value>(&text) {
                Ok(inner) => Step::Next(Envelope::classify(inner)),
                Err(e) => {
                    warn!(error = %e, "Wrapped staging value is not valid JSON");
                    Step::Next(Envelope::Unrecognized)
                }
            },
            Envelope::Unrecognized => Step::Done(Vec::new()),
        }
    }

    /// Flat list of staged items. Unrecognized shapes give an empty list.
    pub fn into_items(self) -> Vec<Value> {
        let mut current = self;
        for _ in 0..MAX_UNWRAP {
            match current.step() {
                Step::Done(items) => return items,
                Step::Next(next) => current = next,
            }
        }
        warn!("Staging payload nested too deeply, ignoring it");
        Vec::new()
    }
}

/// Decode a raw staged payload into article dictionaries.
pub fn decode_payload(raw: &str) -> Vec<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => {
            let envelope = Envelope::classify(value);
            debug!(shape = envelope.shape(), "Decoding staging payload");
            envelope.into_items()
        }
        Err(e) => {
            warn!(error = %e, "Staging payload is not valid JSON");
            Vec::new()
        }
    }
}
