//! Note service operations and debounced autosave

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::{EntityService, NoteService};
use crate::error::Result;
use crate::models::{EntityId, Note};

impl EntityService<Note> {
    pub async fn add_note(
        &self,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Note> {
        self.add(Note::new(title, content)).await
    }

    pub async fn edit_note(
        &self,
        id: &EntityId,
        title: impl Into<String> + Send,
        content: impl Into<String> + Send,
    ) -> Result<Note> {
        self.modify(id, |note| note.edit(title, content)).await
    }
}

struct PendingSave {
    version: u64,
    note: Note,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct AutosaveSlot {
    version: u64,
    pending: Option<PendingSave>,
}

/// Coalesces rapid note edits into one save after a quiet period.
///
/// Each [`schedule`](Self::schedule) restarts the delay; only the latest
/// edit is written. Must be used from within a tokio runtime.
pub struct NoteAutosave {
    service: Arc<NoteService>,
    delay: Duration,
    slot: Arc<Mutex<AutosaveSlot>>,
}

impl NoteAutosave {
    pub fn new(service: Arc<NoteService>, delay: Duration) -> Self {
        Self {
            service,
            delay,
            slot: Arc::new(Mutex::new(AutosaveSlot::default())),
        }
    }

    /// Save `note` once no further edit arrives within the delay
    pub fn schedule(&self, note: Note) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.pending.take() {
            previous.handle.abort();
        }
        slot.version += 1;
        let version = slot.version;

        let service = Arc::clone(&self.service);
        let shared = Arc::clone(&self.slot);
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let note = {
                let mut slot = shared.lock().unwrap_or_else(PoisonError::into_inner);
                match slot.pending.take() {
                    Some(pending) if pending.version == version => pending.note,
                    other => {
                        // A newer edit took over while we slept.
                        slot.pending = other;
                        return;
                    }
                }
            };

            match service.update(note).await {
                Ok(note) => tracing::debug!("Auto-saved note: {}", note.id),
                Err(error) => tracing::error!("Failed to auto-save note: {}", error),
            }
        });

        slot.pending = Some(PendingSave {
            version,
            note,
            handle,
        });
    }

    /// Save the pending edit now. Returns the saved note, if there was one.
    pub async fn flush(&self) -> Result<Option<Note>> {
        let Some(pending) = self.take_pending() else {
            return Ok(None);
        };
        pending.handle.abort();
        self.service.update(pending.note).await.map(Some)
    }

    /// Drop the pending edit without saving. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        match self.take_pending() {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .is_some()
    }

    fn take_pending(&self) -> Option<PendingSave> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .take()
    }
}

impl Drop for NoteAutosave {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionState;
    use crate::test_support::memory_factory;
    use pretty_assertions::assert_eq;

    async fn service_with_note() -> (Arc<NoteService>, Note) {
        let service = Arc::new(NoteService::new(memory_factory(&SessionState::new())));
        service.initialize().await.unwrap();
        let note = service.add_note("Journal", "").await.unwrap();
        (service, note)
    }

    #[tokio::test]
    async fn edit_note_persists_and_stamps() {
        let (service, note) = service_with_note().await;
        let edited = service.edit_note(&note.id, "Journal", "Day one").await.unwrap();
        assert_eq!(edited.content, "Day one");
        assert!(edited.updated_at >= note.updated_at);
        assert_eq!(service.get(&note.id), Some(edited));
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_coalesce_into_one_save() {
        let (service, mut note) = service_with_note().await;
        let autosave = NoteAutosave::new(Arc::clone(&service), Duration::from_millis(1500));
        let mut rx = service.subscribe();
        rx.borrow_and_update();

        for text in ["D", "Da", "Day"] {
            note.set_content(text);
            autosave.schedule(note.clone());
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        assert!(autosave.is_pending());
        assert!(!rx.has_changed().unwrap());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!autosave.is_pending());
        assert_eq!(service.get(&note.id).unwrap().content, "Day");
    }

    #[tokio::test(start_paused = true)]
    async fn flush_saves_immediately_and_cancel_discards() {
        let (service, mut note) = service_with_note().await;
        let autosave = NoteAutosave::new(Arc::clone(&service), Duration::from_secs(2));

        note.set_content("flushed");
        autosave.schedule(note.clone());
        let saved = autosave.flush().await.unwrap().unwrap();
        assert_eq!(saved.content, "flushed");
        assert!(autosave.flush().await.unwrap().is_none());

        note.set_content("discarded");
        autosave.schedule(note.clone());
        assert!(autosave.cancel());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(service.get(&note.id).unwrap().content, "flushed");
    }
}
