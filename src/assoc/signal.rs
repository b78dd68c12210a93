//! Association teardown signal
//!
//! One signal per UDP association, published when the UDP ASSOCIATE reply
//! is sent and closed when the controlling TCP connection drains. Closing
//! is a one-shot broadcast: every pump holding a clone observes it, and a
//! closed signal stays closed.

use tokio_util::sync::CancellationToken;

/// A closeable, cloneable teardown handle
#[derive(Debug, Clone)]
pub struct AssocSignal {
    token: CancellationToken,
}

impl AssocSignal {
    /// Create an open signal
    pub fn new() -> Self {
        AssocSignal {
            token: CancellationToken::new(),
        }
    }

    /// Close the signal, waking every task waiting in [`closed`](Self::closed)
    pub fn close(&self) {
        self.token.cancel();
    }

    /// Whether the signal has been closed
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once the signal closes; resolves immediately if it already has
    pub async fn closed(&self) {
        self.token.cancelled().await;
    }
}

impl Default for AssocSignal {
    fn default() -> Self {
        Self::new()
    }
}
