//! Undo log for a single submit.

use crate::registry::AppliedBatch;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// One undo step.
#[derive(Debug)]
pub(crate) enum RollbackAction {
    /// Remove a file written by the transaction.
    DeleteFile(PathBuf),
    /// Undo a registry batch and restore the owner's previous description.
    RevertRegistry {
        applied: AppliedBatch,
        owner: String,
        previous_description: Option<String>,
    },
    /// Drop the unit from the active set.
    EvictUnit(String),
    /// Delete the metadata record.
    DeleteRecord(String),
}

/// Ephemeral state of one load; destroyed on commit or rollback.
#[derive(Debug, Default)]
pub(crate) struct LoadTransaction {
    pub(crate) staged_file_path: Option<PathBuf>,
    pub(crate) command_snapshot_before: BTreeSet<String>,
    actions: Vec<RollbackAction>,
}

impl LoadTransaction {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, action: RollbackAction) {
        self.actions.push(action);
    }

    /// Undo steps, most recent first.
    pub(crate) fn into_rollback(self) -> impl Iterator<Item = RollbackAction> {
        self.actions.into_iter().rev()
    }

    /// Discards the undo log.
    pub(crate) fn commit(self) {
        drop(self.actions);
    }
}
