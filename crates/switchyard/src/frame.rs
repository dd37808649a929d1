//! Wire envelopes exchanged over the transport.
//!
//! Requests carry an `id`, a `method` and optional `params`. Inbound frames
//! are either responses (an `id` plus `result` or `error`) or events (a
//! `method` naming the topic plus optional `params`); the presence of `id` is
//! the only discriminator.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{MuxError, RemoteError};

/// An outbound call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id echoed back by the response.
    pub id: i64,
    /// The method to invoke.
    pub method: String,
    /// Parameters; omitted from the wire when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Creates a request. JSON `null` params are treated as absent.
    #[must_use]
    pub fn new(id: i64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params: (!params.is_null()).then_some(params),
        }
    }

    /// Serialises the request into a frame.
    ///
    /// # Errors
    ///
    /// Returns the serialiser error if the params cannot be encoded.
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Parses a request frame.
    ///
    /// # Errors
    ///
    /// Returns the parse error when the frame is not a request envelope.
    pub fn decode(frame: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(frame)
    }
}

/// A response to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id of the originating request.
    pub id: i64,
    /// The result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl Response {
    /// Builds a successful response.
    #[must_use]
    pub const fn success(id: i64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    #[must_use]
    pub const fn failure(id: i64, error: RemoteError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Parses a response frame.
    ///
    /// # Errors
    ///
    /// Returns the parse error when the frame is not a response envelope.
    pub fn decode(frame: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(frame)
    }

    /// Serialises the response into a frame.
    ///
    /// # Errors
    ///
    /// Returns the serialiser error if the payload cannot be encoded.
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Converts the response into its result value.
    ///
    /// An absent result becomes JSON `null`.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::Remote`] when the response carries an error object.
    pub fn into_value(self) -> Result<Value, MuxError> {
        match self.error {
            Some(error) => Err(MuxError::Remote(error)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// A push notification published on a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Topic name.
    pub method: String,
    /// Event payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Event {
    /// Builds an event. JSON `null` params are treated as absent.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: (!params.is_null()).then_some(params),
        }
    }

    /// Parses an event frame.
    ///
    /// # Errors
    ///
    /// Returns the parse error when the frame is not an event envelope.
    pub fn decode(frame: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(frame)
    }

    /// Serialises the event into a frame.
    ///
    /// # Errors
    ///
    /// Returns the serialiser error if the payload cannot be encoded.
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Decodes the payload into `T`. Absent params decode from `null`.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::Protocol`] when the payload does not fit `T`.
    pub fn params_into<T: DeserializeOwned>(self) -> Result<T, MuxError> {
        serde_json::from_value(self.params.unwrap_or(Value::Null)).map_err(MuxError::Protocol)
    }
}

/// Routing decision for an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A response for the pending call with this id.
    Response {
        /// Correlation id.
        id: i64,
    },
    /// An event for subscribers of this topic.
    Event {
        /// Topic name.
        topic: String,
    },
    /// A well-formed object that is neither a response nor an event.
    Unroutable,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    method: Option<String>,
}

impl Inbound {
    /// Inspects only the routing fields of a frame.
    ///
    /// # Errors
    ///
    /// Returns the parse error when the frame is not a JSON object with
    /// well-typed `id`/`method` fields.
    pub fn classify(frame: &[u8]) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_slice(frame)?;
        Ok(match (envelope.id, envelope.method) {
            (Some(id), _) => Self::Response { id },
            (None, Some(topic)) => Self::Event { topic },
            (None, None) => Self::Unroutable,
        })
    }
}
