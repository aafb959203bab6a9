pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod outgoing;
pub mod pipeline;
pub mod protocol;
pub mod receipt;
pub mod send;
pub mod session;

pub use client::{ClientEvent, MessageClient};
pub use codec::{DecodeAttributes, EncodeAttributes, MessageCodec};
pub use config::{load_settings, load_settings_from, ClientSettings};
pub use error::{
    CodecError, CorrelationError, PolicyReason, RegistryError, SendMessageError, TimedOperation,
};
pub use receipt::{DeliveryReceipt, ReceiptCorrelator};
pub use send::{SendComponents, SendMessageHandler, SendStep};
pub use session::{MissingNetworkSession, NetworkSession, NoopSyncBarrier, SyncBarrier};
