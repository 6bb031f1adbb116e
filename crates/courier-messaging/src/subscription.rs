use std::sync::Mutex;

use tokio::task::JoinHandle;

/// Handle to a live message subscription. `unsubscribe` stops the forwarding
/// task; calling it again (or dropping the handle afterwards) is a no-op.
pub struct Subscription {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self {
            task: Mutex::new(Some(task)),
        }
    }

    pub fn unsubscribe(&self) {
        if let Ok(mut guard) = self.task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
