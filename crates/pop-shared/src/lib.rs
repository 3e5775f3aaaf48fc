//! # pop-shared
//!
//! Wire protocol and domain types shared by the storage engines and the
//! server: the JSON-RPC envelope, messages and their data header, rumors
//! with their vector timestamps, and the stable error taxonomy.

pub mod constants;
pub mod crypto;
pub mod data;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod rumor;
pub mod types;

pub use data::MessageData;
pub use error::{ErrorCode, PopError};
pub use identity::ServerIdentity;
pub use protocol::{Answer, AnswerError, JsonRpcMessage, Method, Query};
pub use rumor::{Rumor, RumorTimestamp};
pub use types::{ChannelType, Message, WitnessSignature};
