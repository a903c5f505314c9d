//! PC/SC transport for secure elements exposed as smart-card readers.
//!
//! Works wherever a PC/SC daemon runs (macOS, Linux, Windows).
//!
//! # Example
//!
//! ```ignore
//! use hybrid_signer_core::device::{DeviceSession, PcscTransport};
//!
//! let transport = PcscTransport::connect(None)?;
//! let mut session = DeviceSession::new(Box::new(transport));
//! ```

use pcsc::{Card, Context, Disposition, MAX_BUFFER_SIZE, Protocols, Scope, ShareMode};
use tracing::{debug, warn};

use super::Transport;
use crate::error::{Error, Result};

/// A PC/SC transport bound to one reader.
pub struct PcscTransport {
    /// The card handle; `None` once closed.
    card: Option<Card>,

    /// Name of the reader the card sits in.
    reader: String,
}

impl std::fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader", &self.reader)
            .field("open", &self.card.is_some())
            .finish_non_exhaustive()
    }
}

impl PcscTransport {
    /// Connects to the first reader whose name contains `filter`, or the
    /// first reader at all when no filter is given.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceNotFound`] if no matching reader exists
    /// - [`Error::ConnectionFailed`] if the PC/SC context or card connection
    ///   fails
    pub fn connect(filter: Option<&str>) -> Result<Self> {
        let ctx = establish()?;

        let mut readers_buf = vec![0u8; 2048];
        let reader = ctx
            .list_readers(&mut readers_buf)
            .map_err(|e| Error::ConnectionFailed(format!("failed to list readers: {e}")))?
            .find(|reader| filter.is_none_or(|f| reader.to_string_lossy().contains(f)))
            .ok_or(Error::DeviceNotFound)?;

        let card = ctx
            .connect(reader, ShareMode::Exclusive, Protocols::ANY)
            .map_err(|e| Error::ConnectionFailed(format!("failed to connect to card: {e}")))?;

        let reader = reader.to_string_lossy().into_owned();
        debug!(%reader, "connected to secure element");
        Ok(Self {
            card: Some(card),
            reader,
        })
    }

    /// Lists the names of all available readers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFailed`] if the PC/SC context cannot be
    /// established.
    pub fn list_readers() -> Result<Vec<String>> {
        let ctx = establish()?;
        let mut readers_buf = vec![0u8; 2048];
        let readers = ctx
            .list_readers(&mut readers_buf)
            .map_err(|e| Error::ConnectionFailed(format!("failed to list readers: {e}")))?;

        Ok(readers
            .map(|r| r.to_string_lossy().into_owned())
            .collect())
    }

    /// Returns the reader name.
    #[must_use]
    pub fn reader(&self) -> &str {
        &self.reader
    }
}

fn establish() -> Result<Context> {
    Context::establish(Scope::User)
        .map_err(|e| Error::ConnectionFailed(format!("failed to establish PC/SC context: {e}")))
}

impl Transport for PcscTransport {
    fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        let card = self
            .card
            .as_ref()
            .ok_or_else(|| Error::ChannelFailed("card already released".to_string()))?;

        let mut response_buf = [0u8; MAX_BUFFER_SIZE];
        let response = card
            .transmit(command, &mut response_buf)
            .map_err(|e| Error::ChannelFailed(format!("transmit failed: {e}")))?;

        Ok(response.to_vec())
    }

    fn is_connected(&self) -> bool {
        self.card
            .as_ref()
            .is_some_and(|card| card.status2_owned().is_ok())
    }

    fn close(&mut self) {
        if let Some(card) = self.card.take()
            && let Err((_, e)) = card.disconnect(Disposition::LeaveCard)
        {
            warn!(reader = %self.reader, "failed to release card: {e}");
        }
    }
}
