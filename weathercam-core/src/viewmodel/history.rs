use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::CapturedImageRecord;
use crate::repository::ImageRepository;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum HistoryState {
    #[default]
    Idle,
    Loading,
    /// Most recent first.
    Loaded(Vec<CapturedImageRecord>),
    Error(String),
}

/// State holder for the history screen.
///
/// Follows the store for as long as it lives; dropping it closes the
/// subscription.
#[derive(Debug)]
pub struct HistoryViewModel {
    images: ImageRepository,
    state: Arc<watch::Sender<HistoryState>>,
    error_message: watch::Sender<Option<String>>,
    listener: JoinHandle<()>,
}

impl HistoryViewModel {
    /// Must be called from within a Tokio runtime.
    pub fn new(images: ImageRepository) -> Self {
        let state = Arc::new(watch::Sender::new(HistoryState::Idle));
        let listener = tokio::spawn(follow(images.images(), Arc::clone(&state)));

        Self {
            images,
            state,
            error_message: watch::Sender::new(None),
            listener,
        }
    }

    pub fn state(&self) -> watch::Receiver<HistoryState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> HistoryState {
        self.state.borrow().clone()
    }

    pub fn error_message(&self) -> watch::Receiver<Option<String>> {
        self.error_message.subscribe()
    }

    pub fn current_error_message(&self) -> Option<String> {
        self.error_message.borrow().clone()
    }

    /// Delete the record. The list updates through the store subscription.
    pub async fn delete_image(&self, id: i64) {
        match self.images.delete_image(id).await {
            Ok(true) => tracing::info!(id, "deleted image record"),
            Ok(false) => tracing::debug!(id, "image record already gone"),
            Err(e) => {
                tracing::warn!(id, "failed to delete image: {e}");
                self.error_message
                    .send_replace(Some(format!("Failed to delete image: {e}")));
            }
        }
    }

    pub fn clear_error_message(&self) {
        self.error_message.send_replace(None);
    }

    pub fn close(self) {
        drop(self);
    }
}

impl Drop for HistoryViewModel {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn follow(
    mut images: watch::Receiver<Vec<CapturedImageRecord>>,
    state: Arc<watch::Sender<HistoryState>>,
) {
    state.send_replace(HistoryState::Loading);

    loop {
        let list = images.borrow_and_update().clone();
        state.send_replace(HistoryState::Loaded(list));

        if images.changed().await.is_err() {
            tracing::debug!("image store closed, history subscription ended");
            state.send_replace(HistoryState::Error("Image history is no longer available.".into()));
            break;
        }
    }
}
