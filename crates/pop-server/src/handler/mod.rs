pub mod answer;
pub mod channel;
pub mod jsonrpc;
pub mod message;
pub mod query;
