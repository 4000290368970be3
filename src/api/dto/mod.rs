pub mod jsonrpc;

pub use jsonrpc::{CallToolParams, ReadResourceParams, RpcError, RpcRequest, RpcResponse};
