pub mod agent;
pub mod cache;
pub mod panel;
pub mod service;

pub use agent::{build_agent_script, CACHE_FORMAT_VERSION};
pub use cache::AgentCache;
pub use panel::{HttpPanel, PanelApi};
pub use service::{SaveService, ServiceEvent, ServiceStats};
pub use remote_io::{ExecOutput, RemoteFileStat, RemoteTransport, SftpOptions, SftpTransport, TransportError};
