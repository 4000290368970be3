pub mod capability;
pub mod context;
pub mod hook;

pub use capability::{Capability, CapabilityDescriptor, CapabilityKind, Invocation};
pub use context::{ContextError, RequestContext, USER_ID_KEY};
pub use hook::{Dispatcher, DispatcherBuilder, InvocationHook, Next};
