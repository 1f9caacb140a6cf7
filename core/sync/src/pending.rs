//! Durable log of mutations that could not reach the remote service.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use moviesync_common::{Error, Movie, MovieId, Result};
use moviesync_storage::{LocalStore, PENDING_SLOT};

/// Kind of deferred mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Data carried by a deferred mutation: the full record for create/update,
/// `{id}` for delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationPayload {
    Movie(Movie),
    Id { id: MovieId },
}

impl OperationPayload {
    /// Identifier the payload refers to, if any.
    pub fn movie_id(&self) -> Option<&MovieId> {
        match self {
            OperationPayload::Movie(movie) => movie.id.as_ref(),
            OperationPayload::Id { id } => Some(id),
        }
    }
}

/// A mutation recorded while the service was unreachable.
///
/// Entries carry no identity beyond their position in the log; the same
/// mutation may appear twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub payload: OperationPayload,
    pub recorded_at_millis: i64,
}

impl PendingOperation {
    /// Build an entry stamped with the current time.
    ///
    /// # Errors
    /// - Payload does not fit the kind (create/update need a record,
    ///   delete needs an id)
    pub fn new(kind: OperationKind, payload: OperationPayload) -> Result<Self> {
        let fits = match (&kind, &payload) {
            (OperationKind::Create, OperationPayload::Movie(_)) => true,
            (OperationKind::Update, OperationPayload::Movie(m)) => m.id.is_some(),
            (OperationKind::Delete, p) => p.movie_id().is_some(),
            _ => false,
        };
        if !fits {
            return Err(Error::InvalidInput(format!(
                "Payload does not match a {} operation",
                kind
            )));
        }

        Ok(Self {
            kind,
            payload,
            recorded_at_millis: Utc::now().timestamp_millis(),
        })
    }

    /// Copy with identifiers rewritten through `ids`.
    pub fn remapped(&self, ids: &HashMap<MovieId, MovieId>) -> Self {
        let mut op = self.clone();
        match &mut op.payload {
            OperationPayload::Movie(movie) => {
                if let Some(new_id) = movie.id.as_ref().and_then(|id| ids.get(id)) {
                    movie.id = Some(new_id.clone());
                }
            }
            OperationPayload::Id { id } => {
                if let Some(new_id) = ids.get(id) {
                    *id = new_id.clone();
                }
            }
        }
        op
    }
}

/// Ordered, durable record of deferred mutations.
///
/// Insertion order is replay order. The full log is written to the
/// `pendingOperations` slot after every change.
pub struct PendingOperationLog {
    operations: Vec<PendingOperation>,
    store: Arc<dyn LocalStore>,
}

impl PendingOperationLog {
    /// Create an empty log backed by `store`, without reading it.
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            operations: Vec::new(),
            store,
        }
    }

    /// Create a log and load whatever was persisted.
    pub async fn open(store: Arc<dyn LocalStore>) -> Result<Self> {
        let mut log = Self::new(store);
        log.load_pending_operations().await?;
        Ok(log)
    }

    /// Reconstruct the log from durable storage.
    ///
    /// A slot that cannot be parsed is treated as empty.
    pub async fn load_pending_operations(&mut self) -> Result<()> {
        self.operations = match self.store.read_slot(PENDING_SLOT).await? {
            Some(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Discarding unreadable pending operation log: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        Ok(())
    }

    /// Append an entry and persist the log.
    ///
    /// # Postconditions
    /// - On success the entry is durable
    /// - On failure the log is unchanged
    pub async fn add_pending_operation(
        &mut self,
        kind: OperationKind,
        payload: OperationPayload,
    ) -> Result<()> {
        let operation = PendingOperation::new(kind, payload)?;
        self.operations.push(operation);
        if let Err(e) = self.persist().await {
            self.operations.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Snapshot of all entries in replay order.
    pub fn get_pending_operations(&self) -> &[PendingOperation] {
        &self.operations
    }

    /// Empty the log and persist the empty state.
    ///
    /// If the empty state cannot be written, the log keeps its entries.
    pub async fn clear_pending_operations(&mut self) -> Result<()> {
        self.store.write_slot(PENDING_SLOT, "[]").await?;
        self.operations.clear();
        Ok(())
    }

    /// Whether `id` names a record whose create is still queued.
    ///
    /// Such a record exists only locally; the service knows it under no id
    /// until the create is replayed.
    pub fn awaits_create(&self, id: &MovieId) -> bool {
        self.operations.iter().any(|op| {
            op.kind == OperationKind::Create && op.payload.movie_id() == Some(id)
        })
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    async fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.operations)?;
        self.store.write_slot(PENDING_SLOT, &json).await
    }
}
