//! Decoded deliveries handed to the consuming application

use bytes::Bytes;

/// A plain delivery on a subscribed subject, no reply expected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub payload: Bytes,
}

/// A delivery carrying a reply subject: the publisher expects a response
/// published on `reply`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub subject: String,
    pub reply: String,
    pub payload: Bytes,
}

/// The correlated reply to a [`crate::Client::request`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub payload: Bytes,
}

/// One entry in the general message sink, drained by [`crate::Client::get`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Message(Message),
    Request(Request),
}

impl Delivery {
    /// Subject the delivery arrived on
    pub fn subject(&self) -> &str {
        match self {
            Delivery::Message(m) => &m.subject,
            Delivery::Request(r) => &r.subject,
        }
    }

    /// Raw payload bytes
    pub fn payload(&self) -> &Bytes {
        match self {
            Delivery::Message(m) => &m.payload,
            Delivery::Request(r) => &r.payload,
        }
    }
}
