use std::fmt;
use std::path::PathBuf;

use orion_error::prelude::*;
use tokio::io::{AsyncBufRead, AsyncRead, BufReader};

use crate::error::{RuntimeReason, RuntimeResult};

pub(crate) type LineReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Where the event log is read from.
pub enum InputSource {
    Stdin,
    File(PathBuf),
    /// Any async byte stream, e.g. an in-memory log in tests.
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl InputSource {
    /// `None` or `-` reads stdin; anything else is a file path.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None | Some("-") => Self::Stdin,
            Some(path) => Self::File(PathBuf::from(path)),
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Reader(Box::new(std::io::Cursor::new(bytes.into())))
    }

    /// Open the source. A missing or unreadable file fails here, before any
    /// task is spawned.
    pub(crate) async fn open(self) -> RuntimeResult<LineReader> {
        match self {
            Self::Stdin => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
            Self::Reader(r) => Ok(Box::new(BufReader::new(r))),
            Self::File(path) => {
                let file = tokio::fs::File::open(&path).await.map_err(|e| {
                    StructError::from(RuntimeReason::Input)
                        .with_detail(format!("cannot read {}: {e}", path.display()))
                })?;
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => write!(f, "stdin"),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Reader(_) => write!(f, "<reader>"),
        }
    }
}
