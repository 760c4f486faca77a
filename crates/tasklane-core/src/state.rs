//! Shared state types observed by front ends

/// Progress of the local/cloud synchronization
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    /// No cloud account; data lives on this device only
    #[default]
    Offline,
    Syncing,
    Synced,
    /// The last pass left at least one entity kind unsynchronized
    Error,
}
