use serde::Serialize;
use std::fmt;

/// A single value reported by an EZO sensor.
///
/// Most circuits answer with a number, but some answer with a token such as
/// `low` or an error word. Those are kept verbatim so the controller sees
/// exactly what the device said.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reading {
    Number(f64),
    Text(String),
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Debug keeps the trailing ".0" on whole numbers
            Reading::Number(value) => write!(f, "{:?}", value),
            Reading::Text(text) => f.write_str(text),
        }
    }
}
