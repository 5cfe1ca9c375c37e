//! External plugin host integration.

pub mod invoker;
pub mod registry;

pub use invoker::{HostOutput, Invocation, InvocationError, PluginHost, PluginInvoker, ProcessHost};
pub use registry::{
    DirectoryRegistry, MainVariant, PluginHandle, PluginRegistry, StaticRegistry, resolve_existing,
    resolve_main,
};
