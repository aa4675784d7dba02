//! Wire model: the envelope tagged union and call identifiers.
//!
//! Every transport message carries exactly one UTF-8 JSON object, one of four
//! shapes distinguished by the `type` field:
//!
//! ```json
//! {"type":"call","id":"7","name":"add","args":[2,3]}
//! {"type":"return","id":"7","ret":5}
//! {"type":"error","id":"7","error":{"kind":"handler_error","message":"..."}}
//! {"type":"close"}
//! ```
//!
//! Call ids are decimal strings from a per-peer monotonic counter. The two
//! directions are independent id namespaces, so both peers may emit id `"1"`
//! without colliding.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation id of one in-flight call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// The id as it appears on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        CallId(s.to_owned())
    }
}

impl From<String> for CallId {
    fn from(s: String) -> Self {
        CallId(s)
    }
}

/// Monotonic id source for outbound calls. One per peer, owned by the driver.
#[derive(Debug, Default)]
pub struct CallIdGenerator {
    next: u64,
}

impl CallIdGenerator {
    /// Allocate the next id. Never repeats within a session.
    pub fn next_id(&mut self) -> CallId {
        self.next += 1;
        CallId(self.next.to_string())
    }
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// Invoke a named function on the remote peer.
    Call {
        /// Correlation id chosen by the caller.
        id: CallId,
        /// Registered function name, case-sensitive.
        name: String,
        /// Positional arguments.
        args: Vec<Value>,
    },
    /// Successful completion of a previously received call.
    Return {
        /// Id of the call being answered.
        id: CallId,
        /// Handler result, `null` when the handler produced no value.
        ret: Value,
    },
    /// Failed completion of a previously received call.
    Error {
        /// Id of the call being answered.
        id: CallId,
        /// Description of the failure, shipped verbatim to the caller.
        error: Value,
    },
    /// Graceful shutdown announcement. No reply is expected.
    Close,
}

impl Envelope {
    /// Serialize to the single-line JSON text form.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse one wire message.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_encodes_with_fixed_field_names() {
        let env = Envelope::Call {
            id: "7".into(),
            name: "add".to_owned(),
            args: vec![json!(2), json!(3)],
        };
        assert_eq!(
            env.encode().unwrap(),
            r#"{"type":"call","id":"7","name":"add","args":[2,3]}"#
        );
    }

    #[test]
    fn return_round_trips() {
        let text = r#"{"type":"return","id":"7","ret":5}"#;
        let env = Envelope::decode(text).unwrap();
        assert_eq!(
            env,
            Envelope::Return {
                id: "7".into(),
                ret: json!(5)
            }
        );
        assert_eq!(env.encode().unwrap(), text);
    }

    #[test]
    fn error_carries_arbitrary_payload() {
        let env = Envelope::decode(r#"{"type":"error","id":"3","error":{"code":12}}"#).unwrap();
        assert_eq!(
            env,
            Envelope::Error {
                id: "3".into(),
                error: json!({"code": 12})
            }
        );
    }

    #[test]
    fn close_has_no_fields() {
        assert_eq!(Envelope::Close.encode().unwrap(), r#"{"type":"close"}"#);
        assert_eq!(Envelope::decode(r#"{"type":"close"}"#).unwrap(), Envelope::Close);
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(Envelope::decode(r#"{"type":"ping"}"#).is_err());
        assert!(Envelope::decode("not json at all").is_err());
    }

    #[test]
    fn generator_is_monotonic_and_unique() {
        let mut ids = CallIdGenerator::default();
        let a = ids.next_id();
        let b = ids.next_id();
        assert_eq!(a.as_str(), "1");
        assert_eq!(b.as_str(), "2");
        assert_ne!(a, b);
    }
}
