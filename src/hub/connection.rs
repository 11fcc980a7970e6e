//! Realtime connection handle held by the hub registry

use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Default outbound queue depth per realtime connection
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// A live realtime connection scoped to one project
///
/// The hub keeps the sending half of the outbound queue; dropping the
/// connection closes the queue, which ends the transport's writer loop.
#[derive(Debug)]
pub struct Connection {
    id: String,
    project_id: Uuid,
    outbound: mpsc::Sender<Arc<str>>,
}

impl Connection {
    /// Create a connection and the receiving end of its outbound queue
    pub fn new(project_id: Uuid, capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: Uuid::new_v4().to_string(),
            project_id,
            outbound,
        };
        (connection, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn project_id(&self) -> Uuid {
        self.project_id
    }

    pub(crate) fn try_send(
        &self,
        frame: Arc<str>,
    ) -> Result<(), mpsc::error::TrySendError<Arc<str>>> {
        self.outbound.try_send(frame)
    }
}
