use std::sync::Arc;

use serde_json::Value;
use shared::{
    domain::{ChannelKind, RoomName, SocketId},
    protocol::ClientRequest,
};

use crate::{error::SessionError, registry::SessionRegistry};

/// Where a WebRTC signaling payload goes: everyone in a room, or one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalTarget {
    Room(RoomName),
    Peer(SocketId),
}

impl SignalTarget {
    fn split(self) -> (Option<RoomName>, Option<SocketId>) {
        match self {
            SignalTarget::Room(room) => (Some(room), None),
            SignalTarget::Peer(peer) => (None, Some(peer)),
        }
    }
}

/// Relays room membership and SDP/ICE payloads on the `video` channel.
/// Payloads are passed through uninterpreted.
#[derive(Clone)]
pub struct VideoSignaling {
    registry: Arc<SessionRegistry>,
}

impl VideoSignaling {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn join_room(&self, room: RoomName, user: &str) -> Result<(), SessionError> {
        self.emit(ClientRequest::JoinRoom {
            room,
            user: user.into(),
        })
        .await
    }

    pub async fn leave_room(&self, room: RoomName, user: &str) -> Result<(), SessionError> {
        self.emit(ClientRequest::LeaveRoom {
            room,
            user: user.into(),
        })
        .await
    }

    pub async fn send_offer(&self, target: SignalTarget, offer: Value) -> Result<(), SessionError> {
        let (room, target) = target.split();
        self.emit(ClientRequest::Offer {
            room,
            target,
            offer,
        })
        .await
    }

    pub async fn send_answer(
        &self,
        target: SignalTarget,
        answer: Value,
    ) -> Result<(), SessionError> {
        let (room, target) = target.split();
        self.emit(ClientRequest::Answer {
            room,
            target,
            answer,
        })
        .await
    }

    pub async fn send_ice_candidate(
        &self,
        target: SignalTarget,
        candidate: Value,
    ) -> Result<(), SessionError> {
        let (room, target) = target.split();
        self.emit(ClientRequest::IceCandidate {
            room,
            target,
            candidate,
        })
        .await
    }

    async fn emit(&self, request: ClientRequest) -> Result<(), SessionError> {
        let session = self
            .registry
            .session(ChannelKind::Video)
            .await
            .ok_or(SessionError::NotConnected(ChannelKind::Video))?;
        session.emit(&request).await
    }
}

#[cfg(test)]
#[path = "tests/signaling_tests.rs"]
mod tests;
