//! The closed set of protocols a connection can speak, relevant because error
//! translation is protocol-sensitive.

use derive_more::Display;

/// Identifies which protocol handler is driving a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Protocol {
    /// SFTP (SSH File Transfer Protocol).
    #[display("sftp")]
    Sftp,
    /// FTP/FTPS.
    #[display("ftp")]
    Ftp,
    /// WebDAV.
    #[display("webdav")]
    WebDav,
    /// The plain HTTP file-browsing surface.
    #[display("http")]
    Http,
    /// HTTP share links.
    #[display("http-share")]
    HttpShare,
    /// The background data-retention sweeper.
    #[display("data-retention")]
    DataRetention,
    /// OIDC-driven web sessions.
    #[display("oidc")]
    Oidc,
    /// Event-action script execution.
    #[display("event-action")]
    EventAction,
}
