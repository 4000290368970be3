pub mod identity;
pub mod privilege;

pub use identity::{IdentityHook, IdentityStage};
pub use privilege::PrivilegeHook;
