//! Fans a new template out to every live session without head-of-line
//! blocking: each push runs concurrently, bounded only by a permit pool.

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::blockchain::{BlockTemplate, TemplateRefresher};
use crate::stratum::session::SessionRegistry;

const BROADCAST_CONCURRENCY: usize = 16_384;

pub struct JobBroadcaster {
    sessions: Arc<SessionRegistry>,
    refresher: Arc<TemplateRefresher>,
    permits: Arc<Semaphore>,
}

impl JobBroadcaster {
    pub fn new(sessions: Arc<SessionRegistry>, refresher: Arc<TemplateRefresher>) -> Self {
        Self {
            sessions,
            refresher,
            permits: Arc::new(Semaphore::new(BROADCAST_CONCURRENCY)),
        }
    }

    /// Pushes the given template to every live session concurrently; sessions
    /// whose push fails are dropped from the registry.
    pub async fn broadcast(&self, template: &BlockTemplate) {
        let sessions = self.sessions.iter_buffered();
        let mut handles = Vec::with_capacity(sessions.len());
        for session in sessions {
            let permits = self.permits.clone();
            let template = template.clone();
            let sessions_registry = self.sessions.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permits
                    .acquire()
                    .await
                    .expect("broadcast permit semaphore closed unexpectedly");
                if !session.push_job(&template).await {
                    sessions_registry.remove(session.id);
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    pub async fn broadcast_new_jobs(&self) {
        if let Some(template) = self.refresher.current_template() {
            self.broadcast(&template).await;
        }
    }

    /// Called by the share validator immediately after a block is accepted:
    /// forces an out-of-schedule refresh and broadcasts the result.
    pub async fn refresh_and_broadcast(&self) {
        self.refresher.refresh_now(self).await;
    }
}
