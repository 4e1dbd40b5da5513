use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use shared::{
    domain::{ChannelKind, MessageMode},
    protocol::ClientRequest,
};

use crate::{
    connectivity::MessageDispatcher,
    error::SessionError,
    offline_queue::QueuedMessage,
    registry::SessionRegistry,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaTarget {
    Private(String),
    Group(String),
}

/// Message and call-signaling operations on a message-carrying channel.
///
/// Every operation emits on the channel's current session and returns; none
/// of them waits for a connection or queues on failure.
#[derive(Clone)]
pub struct ChatChannel {
    registry: Arc<SessionRegistry>,
    channel: ChannelKind,
}

impl ChatChannel {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            channel: ChannelKind::Chat,
        }
    }

    pub fn on(registry: Arc<SessionRegistry>, channel: ChannelKind) -> Result<Self, SessionError> {
        if !channel.carries_messages() {
            return Err(SessionError::WrongChannel {
                channel,
                event: "chat messages",
            });
        }
        Ok(Self { registry, channel })
    }

    pub fn channel(&self) -> ChannelKind {
        self.channel
    }

    pub async fn send_private_message(
        &self,
        sender: &str,
        receiver: &str,
        text: &str,
    ) -> Result<(), SessionError> {
        self.emit(ClientRequest::PrivateMessage {
            sender: sender.into(),
            receiver: receiver.into(),
            text: text.into(),
        })
        .await
    }

    pub async fn send_group_message(
        &self,
        sender: &str,
        group_name: &str,
        text: &str,
    ) -> Result<(), SessionError> {
        self.emit(ClientRequest::GroupMessage {
            sender: sender.into(),
            group_name: group_name.into(),
            text: text.into(),
        })
        .await
    }

    pub async fn send_media_file(
        &self,
        sender: &str,
        target: MediaTarget,
        filename: &str,
        mimetype: &str,
        data: &[u8],
    ) -> Result<(), SessionError> {
        let (receiver, group_name, mode) = match target {
            MediaTarget::Private(receiver) => (Some(receiver), None, MessageMode::Private),
            MediaTarget::Group(group_name) => (None, Some(group_name), MessageMode::Group),
        };
        self.emit(ClientRequest::MediaFile {
            sender: sender.into(),
            receiver,
            group_name,
            filename: filename.into(),
            mimetype: mimetype.into(),
            file_data: STANDARD.encode(data),
            mode,
        })
        .await
    }

    pub async fn create_group(&self, group_name: &str, creator: &str) -> Result<(), SessionError> {
        self.emit(ClientRequest::CreateGroup {
            group_name: group_name.into(),
            creator: creator.into(),
        })
        .await
    }

    pub async fn join_group(&self, group_name: &str, user: &str) -> Result<(), SessionError> {
        self.emit(ClientRequest::JoinGroup {
            group_name: group_name.into(),
            user: user.into(),
        })
        .await
    }

    pub async fn leave_group(&self, group_name: &str, user: &str) -> Result<(), SessionError> {
        self.emit(ClientRequest::LeaveGroup {
            group_name: group_name.into(),
            user: user.into(),
        })
        .await
    }

    pub async fn initiate_call(
        &self,
        caller: &str,
        callee: &str,
        offer: Value,
    ) -> Result<(), SessionError> {
        self.emit(ClientRequest::CallUser {
            caller: caller.into(),
            callee: callee.into(),
            offer,
        })
        .await
    }

    pub async fn answer_call(
        &self,
        caller: &str,
        callee: &str,
        answer: Value,
    ) -> Result<(), SessionError> {
        self.emit(ClientRequest::AnswerCall {
            caller: caller.into(),
            callee: callee.into(),
            answer,
        })
        .await
    }

    pub async fn send_call_ice_candidate(
        &self,
        caller: &str,
        callee: &str,
        candidate: Value,
    ) -> Result<(), SessionError> {
        self.emit(ClientRequest::CallIceCandidate {
            caller: caller.into(),
            callee: callee.into(),
            candidate,
        })
        .await
    }

    pub async fn reject_call(
        &self,
        caller: &str,
        callee: &str,
        reason: Option<&str>,
    ) -> Result<(), SessionError> {
        self.emit(ClientRequest::RejectCall {
            caller: caller.into(),
            callee: callee.into(),
            reason: reason.map(str::to_string),
        })
        .await
    }

    pub async fn end_call(&self, caller: &str, callee: &str) -> Result<(), SessionError> {
        self.emit(ClientRequest::EndCall {
            caller: caller.into(),
            callee: callee.into(),
        })
        .await
    }

    async fn emit(&self, request: ClientRequest) -> Result<(), SessionError> {
        let session = self
            .registry
            .session(self.channel)
            .await
            .ok_or(SessionError::NotConnected(self.channel))?;
        session.emit(&request).await
    }
}

#[async_trait]
impl MessageDispatcher for ChatChannel {
    async fn dispatch(&self, entry: &QueuedMessage) -> Result<(), SessionError> {
        let message = &entry.message;
        match entry.kind {
            MessageMode::Private => {
                let receiver = message.receiver.as_deref().unwrap_or(entry.chat_name.as_str());
                self.send_private_message(&message.sender, receiver, &message.text)
                    .await
            }
            MessageMode::Group => {
                let group_name = message.group_name.as_deref().unwrap_or(entry.chat_name.as_str());
                self.send_group_message(&message.sender, group_name, &message.text)
                    .await
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/chat_tests.rs"]
mod tests;
