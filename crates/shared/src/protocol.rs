use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{MessageMode, RoomName, SocketId},
    error::ApiError,
};

/// A chat message as it travels between backend, cache and UI.
///
/// `id` is either server-assigned or a client-provisional marker such as
/// `offline-<queue id>`; `created_at` is kept as the raw server string.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, alias = "text")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<MessageMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl MessagePayload {
    pub fn text(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = Some(created_at.into());
        self
    }

    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    pub fn to_receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(receiver.into());
        self.mode = Some(MessageMode::Private);
        self
    }

    pub fn to_group(mut self, group_name: impl Into<String>) -> Self {
        self.group_name = Some(group_name.into());
        self.mode = Some(MessageMode::Group);
        self
    }
}

/// Events emitted by the client. Serialized as
/// `{"type": "<event>", "payload": {..camelCase fields..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientRequest {
    PrivateMessage {
        sender: String,
        receiver: String,
        text: String,
    },
    GroupMessage {
        sender: String,
        group_name: String,
        text: String,
    },
    MediaFile {
        sender: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        receiver: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_name: Option<String>,
        filename: String,
        mimetype: String,
        file_data: String,
        mode: MessageMode,
    },
    CreateGroup {
        group_name: String,
        creator: String,
    },
    JoinGroup {
        group_name: String,
        user: String,
    },
    LeaveGroup {
        group_name: String,
        user: String,
    },
    JoinRoom {
        room: RoomName,
        user: String,
    },
    LeaveRoom {
        room: RoomName,
        user: String,
    },
    Offer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<RoomName>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<SocketId>,
        offer: Value,
    },
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<RoomName>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<SocketId>,
        answer: Value,
    },
    IceCandidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<RoomName>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<SocketId>,
        candidate: Value,
    },
    CallUser {
        caller: String,
        callee: String,
        offer: Value,
    },
    AnswerCall {
        caller: String,
        callee: String,
        answer: Value,
    },
    CallIceCandidate {
        caller: String,
        callee: String,
        candidate: Value,
    },
    RejectCall {
        caller: String,
        callee: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    EndCall {
        caller: String,
        callee: String,
    },
}

impl ClientRequest {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientRequest::PrivateMessage { .. } => "private_message",
            ClientRequest::GroupMessage { .. } => "group_message",
            ClientRequest::MediaFile { .. } => "media_file",
            ClientRequest::CreateGroup { .. } => "create_group",
            ClientRequest::JoinGroup { .. } => "join_group",
            ClientRequest::LeaveGroup { .. } => "leave_group",
            ClientRequest::JoinRoom { .. } => "join_room",
            ClientRequest::LeaveRoom { .. } => "leave_room",
            ClientRequest::Offer { .. } => "offer",
            ClientRequest::Answer { .. } => "answer",
            ClientRequest::IceCandidate { .. } => "ice_candidate",
            ClientRequest::CallUser { .. } => "call_user",
            ClientRequest::AnswerCall { .. } => "answer_call",
            ClientRequest::CallIceCandidate { .. } => "call_ice_candidate",
            ClientRequest::RejectCall { .. } => "reject_call",
            ClientRequest::EndCall { .. } => "end_call",
        }
    }
}

/// Events pushed by the backend on any namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    PrivateMessage(MessagePayload),
    GroupMessage(MessagePayload),
    /// Echo of a message this client sent, carrying the server id.
    MessageSent(MessagePayload),
    GroupCreated {
        group_name: String,
    },
    GroupJoined {
        group_name: String,
        user: String,
    },
    GroupLeft {
        group_name: String,
        user: String,
    },
    UserJoined {
        room: RoomName,
        socket_id: SocketId,
        #[serde(default)]
        user: Option<String>,
    },
    UserLeft {
        room: RoomName,
        socket_id: SocketId,
    },
    Offer {
        from: SocketId,
        offer: Value,
    },
    Answer {
        from: SocketId,
        answer: Value,
    },
    IceCandidate {
        from: SocketId,
        candidate: Value,
    },
    IncomingCall {
        caller: String,
        callee: String,
        offer: Value,
    },
    CallAnswered {
        caller: String,
        callee: String,
        answer: Value,
    },
    CallIceCandidate {
        caller: String,
        callee: String,
        candidate: Value,
    },
    CallRejected {
        caller: String,
        callee: String,
        #[serde(default)]
        reason: Option<String>,
    },
    CallEnded {
        caller: String,
        callee: String,
    },
    Error(ApiError),
}

impl ServerEvent {
    /// The chat message carried by this event, if any.
    pub fn message(&self) -> Option<&MessagePayload> {
        match self {
            ServerEvent::PrivateMessage(message)
            | ServerEvent::GroupMessage(message)
            | ServerEvent::MessageSent(message) => Some(message),
            _ => None,
        }
    }
}
