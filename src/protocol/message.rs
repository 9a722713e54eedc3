//! SSH Agent Protocol message types and framing

use crate::error::{Error, Result};
use crate::protocol::blob::BlobParser;
use bytes::{BufMut, Bytes, BytesMut};

/// Maximum message size (256 KiB, same as OpenSSH's AGENT_MAX_LEN)
pub const MAX_MESSAGE_SIZE: u32 = 256 * 1024;

/// SSH Agent message types
///
/// Codes are fixed by the protocol; SSH-1 and SSH-2 requests use distinct
/// codes while SUCCESS/FAILURE are shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    // SSH-1 requests and replies
    Ssh1RequestRsaIdentities = 1,
    Ssh1RsaIdentitiesAnswer = 2,
    Ssh1RsaChallenge = 3,
    Ssh1RsaResponse = 4,
    Ssh1AddRsaIdentity = 7,
    Ssh1RemoveRsaIdentity = 8,
    Ssh1RemoveAllRsaIdentities = 9,
    Ssh1AddRsaIdConstrained = 24,

    // Requests from client
    RequestIdentities = 11,
    SignRequest = 13,
    AddIdentity = 17,
    RemoveIdentity = 18,
    RemoveAllIdentities = 19,
    AddIdConstrained = 25,
    AddSmartcardKey = 20,
    RemoveSmartcardKey = 21,
    Lock = 22,
    Unlock = 23,
    AddSmartcardKeyConstrained = 26,
    Extension = 27,

    // Responses from agent
    Failure = 5,
    Success = 6,
    IdentitiesAnswer = 12,
    SignResponse = 14,
    ExtensionFailure = 28,

    // Unknown message type
    Unknown = 0,
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            1 => MessageType::Ssh1RequestRsaIdentities,
            2 => MessageType::Ssh1RsaIdentitiesAnswer,
            3 => MessageType::Ssh1RsaChallenge,
            4 => MessageType::Ssh1RsaResponse,
            7 => MessageType::Ssh1AddRsaIdentity,
            8 => MessageType::Ssh1RemoveRsaIdentity,
            9 => MessageType::Ssh1RemoveAllRsaIdentities,
            24 => MessageType::Ssh1AddRsaIdConstrained,
            11 => MessageType::RequestIdentities,
            13 => MessageType::SignRequest,
            17 => MessageType::AddIdentity,
            18 => MessageType::RemoveIdentity,
            19 => MessageType::RemoveAllIdentities,
            25 => MessageType::AddIdConstrained,
            20 => MessageType::AddSmartcardKey,
            21 => MessageType::RemoveSmartcardKey,
            22 => MessageType::Lock,
            23 => MessageType::Unlock,
            26 => MessageType::AddSmartcardKeyConstrained,
            27 => MessageType::Extension,
            5 => MessageType::Failure,
            6 => MessageType::Success,
            12 => MessageType::IdentitiesAnswer,
            14 => MessageType::SignResponse,
            28 => MessageType::ExtensionFailure,
            _ => MessageType::Unknown,
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        value as u8
    }
}

impl MessageType {
    /// Get the message type name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Ssh1RequestRsaIdentities => "SSH1_AGENTC_REQUEST_RSA_IDENTITIES",
            MessageType::Ssh1RsaIdentitiesAnswer => "SSH1_AGENT_RSA_IDENTITIES_ANSWER",
            MessageType::Ssh1RsaChallenge => "SSH1_AGENTC_RSA_CHALLENGE",
            MessageType::Ssh1RsaResponse => "SSH1_AGENT_RSA_RESPONSE",
            MessageType::Ssh1AddRsaIdentity => "SSH1_AGENTC_ADD_RSA_IDENTITY",
            MessageType::Ssh1RemoveRsaIdentity => "SSH1_AGENTC_REMOVE_RSA_IDENTITY",
            MessageType::Ssh1RemoveAllRsaIdentities => "SSH1_AGENTC_REMOVE_ALL_RSA_IDENTITIES",
            MessageType::Ssh1AddRsaIdConstrained => "SSH1_AGENTC_ADD_RSA_ID_CONSTRAINED",
            // Client requests (SSH_AGENTC_*)
            MessageType::RequestIdentities => "SSH_AGENTC_REQUEST_IDENTITIES",
            MessageType::SignRequest => "SSH_AGENTC_SIGN_REQUEST",
            MessageType::AddIdentity => "SSH_AGENTC_ADD_IDENTITY",
            MessageType::RemoveIdentity => "SSH_AGENTC_REMOVE_IDENTITY",
            MessageType::RemoveAllIdentities => "SSH_AGENTC_REMOVE_ALL_IDENTITIES",
            MessageType::AddIdConstrained => "SSH_AGENTC_ADD_ID_CONSTRAINED",
            MessageType::AddSmartcardKey => "SSH_AGENTC_ADD_SMARTCARD_KEY",
            MessageType::RemoveSmartcardKey => "SSH_AGENTC_REMOVE_SMARTCARD_KEY",
            MessageType::Lock => "SSH_AGENTC_LOCK",
            MessageType::Unlock => "SSH_AGENTC_UNLOCK",
            MessageType::AddSmartcardKeyConstrained => "SSH_AGENTC_ADD_SMARTCARD_KEY_CONSTRAINED",
            MessageType::Extension => "SSH_AGENTC_EXTENSION",
            // Agent responses (SSH_AGENT_*)
            MessageType::Failure => "SSH_AGENT_FAILURE",
            MessageType::Success => "SSH_AGENT_SUCCESS",
            MessageType::IdentitiesAnswer => "SSH_AGENT_IDENTITIES_ANSWER",
            MessageType::SignResponse => "SSH_AGENT_SIGN_RESPONSE",
            MessageType::ExtensionFailure => "SSH_AGENT_EXTENSION_FAILURE",
            MessageType::Unknown => "UNKNOWN",
        }
    }
}

/// SSH Agent protocol message
#[derive(Debug, Clone)]
pub struct AgentMessage {
    /// Message type
    pub msg_type: MessageType,
    /// Raw message payload (excluding type byte)
    pub payload: Bytes,
}

impl AgentMessage {
    /// Create a new message
    pub fn new(msg_type: MessageType, payload: Bytes) -> Self {
        Self { msg_type, payload }
    }

    /// Create a failure response
    pub fn failure() -> Self {
        Self {
            msg_type: MessageType::Failure,
            payload: Bytes::new(),
        }
    }

    /// Create a success response
    pub fn success() -> Self {
        Self {
            msg_type: MessageType::Success,
            payload: Bytes::new(),
        }
    }

    /// Cursor over the payload
    pub fn parser(&self) -> BlobParser<'_> {
        BlobParser::new(&self.payload)
    }

    /// Fail unless this message has the expected type.
    ///
    /// A FAILURE reply (or any other unexpected type) surfaces as
    /// [`Error::AgentFailure`].
    pub fn expect_type(&self, expected: MessageType) -> Result<()> {
        if self.msg_type == expected {
            return Ok(());
        }
        Err(Error::AgentFailure(format!(
            "expected {}, agent replied {}",
            expected.as_str(),
            self.msg_type.as_str()
        )))
    }

    /// Encode the message to bytes (including length prefix)
    pub fn encode(&self) -> Bytes {
        let total_len = 1 + self.payload.len();
        let mut buf = BytesMut::with_capacity(4 + total_len);
        buf.put_u32(total_len as u32);
        buf.put_u8(self.msg_type.into());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode a complete frame (including length prefix).
    ///
    /// The declared length must match the bytes actually present.
    pub fn from_frame(frame: &[u8]) -> Result<Self> {
        let mut parser = BlobParser::new(frame);
        let header = parser.read_header()?;
        Ok(Self {
            msg_type: header.msg_type,
            payload: Bytes::copy_from_slice(parser.rest()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        let types = [
            MessageType::Ssh1RequestRsaIdentities,
            MessageType::Ssh1RsaChallenge,
            MessageType::Ssh1AddRsaIdConstrained,
            MessageType::RequestIdentities,
            MessageType::SignRequest,
            MessageType::IdentitiesAnswer,
            MessageType::Lock,
            MessageType::Unlock,
            MessageType::Failure,
            MessageType::Success,
        ];

        for mt in types {
            let byte: u8 = mt.into();
            let back: MessageType = byte.into();
            assert_eq!(mt, back);
        }
    }

    #[test]
    fn test_protocol_codes() {
        assert_eq!(u8::from(MessageType::Ssh1RemoveAllRsaIdentities), 9);
        assert_eq!(u8::from(MessageType::Failure), 5);
        assert_eq!(u8::from(MessageType::Success), 6);
        assert_eq!(u8::from(MessageType::RemoveAllIdentities), 19);
        assert_eq!(u8::from(MessageType::Lock), 22);
        assert_eq!(u8::from(MessageType::Unlock), 23);
        assert_eq!(MessageType::from(10), MessageType::Unknown);
    }

    #[test]
    fn test_failure_message() {
        let msg = AgentMessage::failure();
        assert_eq!(msg.msg_type, MessageType::Failure);
        assert!(msg.payload.is_empty());
        assert_eq!(&msg.encode()[..], &[0, 0, 0, 1, 5]);
    }

    #[test]
    fn test_success_message() {
        let msg = AgentMessage::success();
        assert_eq!(msg.msg_type, MessageType::Success);
        assert_eq!(&msg.encode()[..], &[0, 0, 0, 1, 6]);
    }

    #[test]
    fn test_from_frame() {
        let frame = AgentMessage::new(MessageType::Lock, Bytes::from_static(b"\0\0\0\x02pw")).encode();
        let msg = AgentMessage::from_frame(&frame).unwrap();
        assert_eq!(msg.msg_type, MessageType::Lock);
        assert_eq!(&msg.payload[..], b"\0\0\0\x02pw");
    }

    #[test]
    fn test_from_frame_length_mismatch() {
        // Declares 10 bytes but carries only the type byte
        let frame = [0u8, 0, 0, 10, 11];
        let result = AgentMessage::from_frame(&frame);
        assert!(matches!(result, Err(Error::Framing(_))));
    }

    #[test]
    fn test_expect_type() {
        let msg = AgentMessage::failure();
        let err = msg.expect_type(MessageType::Success).unwrap_err();
        assert!(matches!(err, Error::AgentFailure(_)));
        assert!(err.to_string().contains("SSH_AGENT_FAILURE"));
        assert!(AgentMessage::success().expect_type(MessageType::Success).is_ok());
    }
}
