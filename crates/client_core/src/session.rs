use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::Contact,
    protocol::{OutgoingPacket, SendResponse},
};

/// Transport to the server. Framing, encryption and login live behind it.
#[async_trait]
pub trait NetworkSession: Send + Sync {
    async fn send_and_await(&self, packet: OutgoingPacket) -> Result<SendResponse>;
}

pub struct MissingNetworkSession;

#[async_trait]
impl NetworkSession for MissingNetworkSession {
    async fn send_and_await(&self, packet: OutgoingPacket) -> Result<SendResponse> {
        Err(anyhow!(
            "network session is unavailable for {}",
            packet.target()
        ))
    }
}

/// Brings the local outbound message counter up to date before a send.
#[async_trait]
pub trait SyncBarrier: Send + Sync {
    async fn synchronize(&self, target: &Contact);
}

pub struct NoopSyncBarrier;

#[async_trait]
impl SyncBarrier for NoopSyncBarrier {
    async fn synchronize(&self, _target: &Contact) {}
}
