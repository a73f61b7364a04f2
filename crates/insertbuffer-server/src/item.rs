//! Buffered work items.

use std::borrow::Cow;

use bytes::Bytes;
use insertbuffer_wire::Request;

/// One buffered statement and the database it targets.
///
/// Created once a request is fully decoded and never mutated afterwards.
/// End of stream is not an item: it is signalled by closing the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    database: Bytes,
    statement: Bytes,
}

impl WorkItem {
    /// Creates a work item.
    pub fn new(database: impl Into<Bytes>, statement: impl Into<Bytes>) -> Self {
        Self {
            database: database.into(),
            statement: statement.into(),
        }
    }

    /// Target database name.
    pub fn database(&self) -> &[u8] {
        &self.database
    }

    /// Statement bytes.
    pub fn statement(&self) -> &[u8] {
        &self.statement
    }

    /// Database name for log output.
    pub fn database_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.database)
    }

    /// Statement text for log output.
    pub fn statement_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.statement)
    }
}

impl From<Request> for WorkItem {
    fn from(request: Request) -> Self {
        let (database, statement) = request.into_parts();
        Self {
            database,
            statement,
        }
    }
}
