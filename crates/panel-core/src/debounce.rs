//! Cancel-and-replace bookkeeping for webhook-triggered runs.
//!
//! For actions that disallow parallel execution the debouncer remembers, per
//! webhook secret, the cancellation token of the newest run. Starting a new
//! run cancels the previous one inside the same critical section that
//! registers the new one, so the old process is always signalled before the
//! caller spawns the new process.
//!
//! The table only tracks tokens for lookup; each run owns its own token and
//! decides what to do when it fires.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::action::Action;

/// One in-flight webhook run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    id: Uuid,
    action: String,
    /// Secret this run is tracked under; `None` for parallel actions.
    tracked: Option<String>,
    token: CancellationToken,
}

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn is_tracked(&self) -> bool {
        self.tracked.is_some()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug)]
struct Entry {
    id: Uuid,
    token: CancellationToken,
}

#[derive(Debug)]
pub struct Debouncer {
    root: CancellationToken,
    running: Mutex<HashMap<String, Entry>>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}

impl Debouncer {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new run of `action` triggered through `secret`.
    ///
    /// When the action disallows parallel execution, any run still tracked
    /// under `secret` is cancelled before this returns.
    pub fn begin(&self, secret: &str, action: &Action) -> RunHandle {
        let id = Uuid::new_v4();
        let token = self.root.child_token();

        if action.allow_parallel_execution {
            debug!(action = %action.identity(), run = %id, "parallel webhook run, not tracked");
            return RunHandle {
                id,
                action: action.identity().to_string(),
                tracked: None,
                token,
            };
        }

        let previous = self.table().insert(
            secret.to_string(),
            Entry {
                id,
                token: token.clone(),
            },
        );
        if let Some(prev) = previous {
            prev.token.cancel();
            info!(
                action = %action.identity(),
                cancelled = %prev.id,
                run = %id,
                "superseding previous webhook run"
            );
        }

        RunHandle {
            id,
            action: action.identity().to_string(),
            tracked: Some(secret.to_string()),
            token,
        }
    }

    /// Forget `handle` once its run is over.
    ///
    /// The entry is removed only if it still belongs to this run; a newer
    /// run's entry is left in place.
    pub fn finish(&self, handle: &RunHandle) {
        let Some(secret) = handle.tracked.as_deref() else {
            return;
        };
        let mut table = self.table();
        if table.get(secret).is_some_and(|e| e.id == handle.id) {
            table.remove(secret);
        }
    }

    /// Run id currently tracked for `secret`.
    pub fn active(&self, secret: &str) -> Option<Uuid> {
        self.table().get(secret).map(|e| e.id)
    }

    /// Number of tracked runs.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Cancel every run started through this debouncer, tracked or not.
    pub fn shutdown(&self) {
        self.root.cancel();
        self.table().clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::exec::{execute_cancelable, RunStatus};
    use std::time::Duration;

    fn action(parallel: bool, command: &str) -> Action {
        Action::new(
            "hooks",
            "deploy",
            ActionKind::Inline {
                command: command.into(),
            },
        )
        .with_webhook("abc123")
        .with_parallel_execution(parallel)
    }

    #[test]
    fn second_trigger_cancels_first() {
        let debouncer = Debouncer::new();
        let action = action(false, "true");

        let first = debouncer.begin("abc123", &action);
        assert!(first.is_tracked());
        assert!(!first.is_cancelled());

        let second = debouncer.begin("abc123", &action);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(debouncer.active("abc123"), Some(second.id()));
        assert_eq!(debouncer.len(), 1);
    }

    #[test]
    fn stale_finish_does_not_clear_newer_run() {
        let debouncer = Debouncer::new();
        let action = action(false, "true");

        let first = debouncer.begin("abc123", &action);
        let second = debouncer.begin("abc123", &action);

        debouncer.finish(&first);
        assert_eq!(debouncer.active("abc123"), Some(second.id()));

        debouncer.finish(&second);
        assert_eq!(debouncer.active("abc123"), None);
        assert!(debouncer.is_empty());
    }

    #[test]
    fn parallel_runs_are_untracked_and_never_cancelled() {
        let debouncer = Debouncer::new();
        let action = action(true, "true");

        let handles: Vec<_> = (0..5).map(|_| debouncer.begin("abc123", &action)).collect();
        assert!(debouncer.is_empty());
        for handle in &handles {
            assert!(!handle.is_tracked());
            assert!(!handle.is_cancelled());
            debouncer.finish(handle);
        }
    }

    #[test]
    fn secrets_are_independent() {
        let debouncer = Debouncer::new();
        let action = action(false, "true");

        let a = debouncer.begin("one", &action);
        let b = debouncer.begin("two", &action);
        assert!(!a.is_cancelled());
        assert!(!b.is_cancelled());
        assert_eq!(debouncer.len(), 2);
    }

    #[test]
    fn shutdown_cancels_everything() {
        let debouncer = Debouncer::new();
        let tracked = debouncer.begin("abc123", &action(false, "true"));
        let parallel = debouncer.begin("other", &action(true, "true"));

        debouncer.shutdown();
        assert!(tracked.is_cancelled());
        assert!(parallel.is_cancelled());
        assert!(debouncer.is_empty());
    }

    #[tokio::test]
    async fn superseded_process_is_killed() {
        let debouncer = Arc::new(Debouncer::new());
        let action = Arc::new(action(false, "sleep 30"));

        let first = debouncer.begin("abc123", &action);
        let first_run = {
            let action = Arc::clone(&action);
            let debouncer = Arc::clone(&debouncer);
            tokio::spawn(async move {
                let mut sink = tokio::io::sink();
                let status = execute_cancelable(&action, &mut sink, first.token()).await;
                debouncer.finish(&first);
                status
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = debouncer.begin("abc123", &action);
        let status = tokio::time::timeout(Duration::from_secs(5), first_run)
            .await
            .expect("first run should stop after being superseded")
            .unwrap()
            .unwrap();
        assert_eq!(status, RunStatus::Cancelled);
        // The first run's cleanup must not have removed the second run.
        assert_eq!(debouncer.active("abc123"), Some(second.id()));
        second.token().cancel();
    }

    #[tokio::test]
    async fn parallel_processes_all_complete() {
        let debouncer = Arc::new(Debouncer::new());
        let action = Arc::new(action(true, "sleep 0.2; echo ran"));

        let mut runs = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let handle = debouncer.begin("abc123", &action);
            let action = Arc::clone(&action);
            let debouncer = Arc::clone(&debouncer);
            runs.spawn(async move {
                let mut out = Vec::new();
                let status = execute_cancelable(&action, &mut out, handle.token()).await;
                debouncer.finish(&handle);
                (status, out)
            });
        }

        let mut completed = 0;
        while let Some(joined) = runs.join_next().await {
            let (status, out) = joined.unwrap();
            assert_eq!(status.unwrap(), RunStatus::Exited { code: Some(0) });
            assert_eq!(String::from_utf8(out).unwrap(), "ran\n");
            completed += 1;
        }
        assert_eq!(completed, 4);
    }
}
