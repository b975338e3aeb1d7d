pub mod transport;

pub use transport::{
    ExecOutput, RemoteFileStat, RemoteTransport, SftpOptions, SftpTransport, TransportError,
};
