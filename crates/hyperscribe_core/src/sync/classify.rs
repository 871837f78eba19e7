//! Per-note reconciliation decision.
//!
//! "Changed" means a timestamp strictly after the last successful sync. Clock
//! skew between devices can misclassify edits; timestamps are the only
//! signal.

use super::conflict::ConflictKind;

/// What a sync does with one note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Write local to remote.
    Push,
    /// Overwrite local with remote.
    Pull,
    /// Both sides match; nothing to write.
    InSync,
    /// Both sides changed and differ.
    Conflict(ConflictKind),
}

/// Decide what to do with a note.
///
/// # Arguments
/// - `local_modified`: the local note's `modified`.
/// - `remote_modified`: the mirrored copy's `lastModified`, `None` when absent.
/// - `last_sync`: the last successful sync, `None` when never synced.
/// - `contents_equal`: whether both sides hold the same content.
pub fn classify(
    local_modified: i64,
    remote_modified: Option<i64>,
    last_sync: Option<i64>,
    contents_equal: bool,
) -> SyncAction {
    let Some(remote_modified) = remote_modified else {
        return SyncAction::Push;
    };
    let changed = |at: i64| last_sync.map_or(true, |synced| at > synced);

    match (changed(local_modified), changed(remote_modified)) {
        _ if contents_equal => SyncAction::InSync,
        (true, false) => SyncAction::Push,
        (false, true) => SyncAction::Pull,
        (true, true) => SyncAction::Conflict(ConflictKind::from_timestamps(
            local_modified,
            remote_modified,
        )),
        // Neither side moved yet they differ: the last push never landed.
        (false, false) => SyncAction::Push,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: i64 = 1_000;

    #[test]
    fn absent_remote_pushes() {
        assert_eq!(classify(T, None, Some(T), false), SyncAction::Push);
        assert_eq!(classify(T, None, None, false), SyncAction::Push);
    }

    #[test]
    fn only_local_changed_pushes() {
        assert_eq!(classify(T + 1, Some(T), Some(T), false), SyncAction::Push);
        assert_eq!(classify(T + 1, Some(T - 50), Some(T), false), SyncAction::Push);
    }

    #[test]
    fn only_remote_changed_pulls() {
        assert_eq!(classify(T, Some(T + 1), Some(T), false), SyncAction::Pull);
        assert_eq!(classify(T - 3, Some(T + 9), Some(T), false), SyncAction::Pull);
    }

    #[test]
    fn both_changed_with_different_content_conflicts() {
        assert_eq!(
            classify(T + 5, Some(T + 3), Some(T), false),
            SyncAction::Conflict(ConflictKind::LocalNewer)
        );
        assert_eq!(
            classify(T + 2, Some(T + 8), Some(T), false),
            SyncAction::Conflict(ConflictKind::RemoteNewer)
        );
        assert_eq!(
            classify(T + 4, Some(T + 4), Some(T), false),
            SyncAction::Conflict(ConflictKind::Divergent)
        );
    }

    #[test]
    fn equal_content_is_in_sync_regardless_of_timestamps() {
        assert_eq!(classify(T + 5, Some(T + 3), Some(T), true), SyncAction::InSync);
        assert_eq!(classify(T, Some(T), Some(T), true), SyncAction::InSync);
        assert_eq!(classify(T + 1, Some(T), Some(T), true), SyncAction::InSync);
    }

    #[test]
    fn never_synced_treats_both_sides_as_changed() {
        assert!(matches!(
            classify(T, Some(T + 1), None, false),
            SyncAction::Conflict(_)
        ));
        assert_eq!(classify(T, Some(T + 1), None, true), SyncAction::InSync);
    }

    #[test]
    fn unchanged_but_different_repushes_local() {
        assert_eq!(classify(T - 1, Some(T - 2), Some(T), false), SyncAction::Push);
    }
}
