pub mod health;
pub mod mcp;
pub mod metadata;
