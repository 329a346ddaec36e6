//! The tunnel lifecycle manager: argv construction, process supervision,
//! output classification and forwarded-port liveness probing.

pub mod classify;
pub mod command;
pub mod model;
pub mod probe;
pub mod supervisor;

pub use model::{
    ConnectionState, ForwardMapping, HostKeyPolicy, PortStatus, ReconnectPolicy, SshOptions,
    TunnelConfig, TunnelEvent,
};
pub use supervisor::TunnelHandle;
