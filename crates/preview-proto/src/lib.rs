//! Wire protocol shared between the preview client and the buffer server.
//! Keeping this in a dedicated crate allows the server side (and any future
//! bindings) to reuse the exact request/response shapes without pulling in
//! the client runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for the server-side source buffer being previewed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BufferId(String);

/// Server-issued token marking the last content version seen by a client.
///
/// Opaque: clients compare markers for equality only and never interpret
/// or order them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionMarker(String);

/// One-time credential allowing a client to reclaim a buffer after the
/// server lost its session state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevivalToken(String);

macro_rules! opaque_string {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_string!(BufferId);
opaque_string!(VersionMarker);
opaque_string!(RevivalToken);

/// Body POSTed to the query endpoint on every poll.
///
/// `timestamp` is `null` on the very first poll of a session ("never
/// synced"); afterwards it echoes the marker from the last applied update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub buffer_id: BufferId,
    pub timestamp: Option<VersionMarker>,
}

/// Query endpoint response, discriminated by the `status` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryResponse {
    /// Content has not advanced past the client's marker.
    Unchanged,
    /// Fresh content; the client must adopt `timestamp` after applying it.
    Ok {
        filename: String,
        dirname: String,
        html_part: String,
        timestamp: VersionMarker,
        revivable_key: Option<RevivalToken>,
    },
    /// The server no longer recognizes this session.
    Disconnected,
}

/// Body POSTed to the revival endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviveRequest {
    pub revivable_key: RevivalToken,
}

/// Revival endpoint response.
///
/// Deliberately a struct rather than a tagged enum: the server may answer
/// with any status string on rejection, and only the exact `"OK"` +
/// `buffer_id` combination counts as acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviveResponse {
    pub status: String,
    #[serde(default)]
    pub buffer_id: Option<BufferId>,
}

pub const STATUS_OK: &str = "OK";

impl ReviveResponse {
    pub fn ok(buffer_id: BufferId) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            buffer_id: Some(buffer_id),
        }
    }

    pub fn rejected(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            buffer_id: None,
        }
    }

    /// The freshly issued identity, present only on acceptance.
    pub fn accepted(&self) -> Option<&BufferId> {
        if self.status == STATUS_OK {
            self.buffer_id.as_ref()
        } else {
            None
        }
    }
}
