use serde::{Deserialize, Serialize};

/// Snippet index reserved for requests that expect no finish message.
pub const NO_RESPONSE_SNIPPET_IDX: u32 = 0xFFFF_FFFF;

pub const CLIENT_VERSION: u32 = 1;

/// Datagrams exchanged with the authoritative server.
///
/// The variant index written by bincode doubles as the message type tag.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect { client_version: u32 },
    Disconnect,
    FinishSpSnippet(FinishSpSnippet),

    Connected { client_id: u32 },
    Disconnected { reason: String },
    SpSnippet(SpSnippet),
}

/// A single "execute this method" request sent by the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SpSnippet {
    pub class: String,
    pub function: String,
    pub self_id: Option<u32>,
    pub arguments: Vec<WireValue>,
    pub snippet_idx: u32,
}

impl SpSnippet {
    pub fn new(class: &str, function: &str, arguments: Vec<WireValue>, snippet_idx: u32) -> Self {
        Self {
            class: class.to_string(),
            function: function.to_string(),
            self_id: None,
            arguments,
            snippet_idx,
        }
    }

    pub fn with_self_id(mut self, self_id: u32) -> Self {
        self.self_id = Some(self_id);
        self
    }

    pub fn expects_response(&self) -> bool {
        self.snippet_idx != NO_RESPONSE_SNIPPET_IDX
    }
}

/// Argument value as it travels on the wire.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Number(f64),
    String(String),
    Bool(bool),
    Object(ObjectReferenceDescriptor),
}

impl From<f64> for WireValue {
    fn from(value: f64) -> Self {
        WireValue::Number(value)
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        WireValue::String(value.to_string())
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        WireValue::Bool(value)
    }
}

/// Reference to a server-side object together with the class it should be cast to.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ObjectReferenceDescriptor {
    pub form_id: u32,
    pub type_name: String,
}

impl ObjectReferenceDescriptor {
    pub fn new(form_id: u32, type_name: &str) -> Self {
        Self {
            form_id,
            type_name: type_name.to_string(),
        }
    }
}

/// Correlated answer to an [`SpSnippet`]. A `None` return value covers both void and null.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FinishSpSnippet {
    pub snippet_idx: u32,
    pub return_value: Option<ReturnValue>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ReturnValue {
    Number(f64),
    String(String),
    Bool(bool),
}

/// Delivery guarantee requested for an outbound packet.
///
/// Finish messages are the only traffic the dispatcher produces and they are
/// always sent reliably, so no other channel exists.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Reliability {
    Reliable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_snippet_builder() {
        let snippet = SpSnippet::new("Debug", "Notification", vec!["hi".into()], 7);
        assert_eq!(snippet.class, "Debug");
        assert_eq!(snippet.function, "Notification");
        assert_eq!(snippet.self_id, None);
        assert_eq!(snippet.arguments, vec![WireValue::String("hi".to_string())]);
        assert!(snippet.expects_response());

        let snippet = snippet.with_self_id(0xff000001);
        assert_eq!(snippet.self_id, Some(0xff000001));
    }

    #[test]
    fn test_sentinel_snippet_expects_no_response() {
        let snippet = SpSnippet::new("Game", "GetPlayer", vec![], NO_RESPONSE_SNIPPET_IDX);
        assert!(!snippet.expects_response());
        assert_eq!(NO_RESPONSE_SNIPPET_IDX, 0xFFFFFFFF);
    }

    #[test]
    fn test_packet_serialization_snippet() {
        let snippet = SpSnippet::new(
            "ObjectReference",
            "SetDisplayName",
            vec![
                "item %original_name% found".into(),
                WireValue::Object(ObjectReferenceDescriptor::new(0xff00000a, "Form")),
                WireValue::Number(2.5),
                true.into(),
                WireValue::Null,
            ],
            12,
        )
        .with_self_id(0xff000001);

        let serialized = bincode::serialize(&Packet::SpSnippet(snippet.clone())).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::SpSnippet(decoded) => {
                assert_eq!(decoded, snippet);
                match &decoded.arguments[2] {
                    WireValue::Number(n) => assert_approx_eq!(*n, 2.5),
                    other => panic!("Unexpected argument {:?}", other),
                }
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_finish_without_value() {
        let packet = Packet::FinishSpSnippet(FinishSpSnippet {
            snippet_idx: 3,
            return_value: None,
        });

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::FinishSpSnippet(finish) => {
                assert_eq!(finish.snippet_idx, 3);
                assert!(finish.return_value.is_none());
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_message_tags_are_distinct() {
        let connect = bincode::serialize(&Packet::Connect { client_version: 1 }).unwrap();
        let finish = bincode::serialize(&Packet::FinishSpSnippet(FinishSpSnippet {
            snippet_idx: 1,
            return_value: Some(ReturnValue::Bool(true)),
        }))
        .unwrap();

        // bincode writes the variant index as a leading u32
        assert_ne!(connect[..4], finish[..4]);
    }

    #[test]
    fn test_reliability_has_single_channel() {
        let encoded = bincode::serialize(&Reliability::Reliable).unwrap();
        assert_eq!(encoded, vec![0, 0, 0, 0]);
        assert!(bincode::deserialize::<Reliability>(&[1, 0, 0, 0]).is_err());
    }
}
