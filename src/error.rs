// SPDX-License-Identifier: Apache-2.0

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum ErrorKind {
    InvalidArgument,
    InvalidDhcpMessage,
    InvalidDhcpServerReply,
    NoLease,
    NotSupported,
    /// Transmit failed because the link is gone (ENETDOWN/ENXIO).
    /// Retransmission will retry.
    LinkDown,
    Transport,
    Timeout,
    Bug,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::InvalidArgument => "invalid_argument",
                Self::InvalidDhcpMessage => "invalid_dhcp_message",
                Self::InvalidDhcpServerReply => "invalid_dhcp_server_reply",
                Self::NoLease => "no_lease",
                Self::NotSupported => "not_supported",
                Self::LinkDown => "link_down",
                Self::Transport => "transport",
                Self::Timeout => "timeout",
                Self::Bug => "bug",
            }
        )
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DhcpError {
    kind: ErrorKind,
    msg: String,
}

impl DhcpError {
    pub fn new(kind: ErrorKind, msg: String) -> Self {
        Self { kind, msg }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn msg(&self) -> &str {
        self.msg.as_str()
    }
}

impl std::fmt::Display for DhcpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.msg)
    }
}

impl std::error::Error for DhcpError {}

impl From<std::io::Error> for DhcpError {
    fn from(e: std::io::Error) -> Self {
        match e.raw_os_error() {
            Some(libc::ENETDOWN) | Some(libc::ENXIO) => Self::new(
                ErrorKind::LinkDown,
                format!("Link is down or gone: {e}"),
            ),
            _ => Self::new(ErrorKind::Transport, format!("IO error: {e}")),
        }
    }
}

impl From<nix::Error> for DhcpError {
    fn from(e: nix::Error) -> Self {
        match e {
            nix::errno::Errno::ENETDOWN | nix::errno::Errno::ENXIO => {
                Self::new(
                    ErrorKind::LinkDown,
                    format!("Link is down or gone: {e}"),
                )
            }
            _ => Self::new(ErrorKind::Transport, format!("System error: {e}")),
        }
    }
}

pub(crate) trait ErrorContext<T> {
    fn context(self, message: &str) -> Result<T, DhcpError>;
}

impl<T> ErrorContext<T> for Result<T, DhcpError> {
    fn context(self, message: &str) -> Result<T, DhcpError> {
        self.map_err(|e| {
            DhcpError::new(e.kind, format!("{message}: {}", e.msg))
        })
    }
}
