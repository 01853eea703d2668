use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;
use log::info;
use tokio::sync::oneshot;

use crate::config::RetryPolicy;
use crate::error::{Error, StoreInitError};
use crate::store::StoreBundle;

mod initializer;

pub use initializer::{DirStoreOpener, StoreOpener};

use initializer::initialize;

type BundleWaiter = oneshot::Sender<Result<StoreBundle, Error>>;

/// Process-wide readiness of the store bundle. The only mutable global in
/// the core; owned exclusively by the gate.
enum ReadinessState {
    Uninitialized,
    Initializing {
        attempt: u32,
        waiters: Vec<BundleWaiter>,
    },
    Ready(StoreBundle),
    Failed {
        error: Arc<StoreInitError>,
        attempts: u32,
    },
}

/// How a `with_store` caller proceeds after the state check.
enum Admission {
    Run(StoreBundle),
    Wait(oneshot::Receiver<Result<StoreBundle, Error>>),
    Drive,
}

/// Serialization point in front of the stores: no caller can observe a
/// missing or half-initialized bundle, and a permanent failure turns into
/// fast typed errors instead of fresh open attempts on every event.
#[derive(Clone)]
pub struct ReadinessGate {
    state: Arc<Mutex<ReadinessState>>,
    opener: Arc<dyn StoreOpener>,
    retry: RetryPolicy,
}

impl ReadinessGate {
    pub fn new(retry: RetryPolicy, opener: Arc<dyn StoreOpener>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ReadinessState::Uninitialized)),
            opener,
            retry,
        }
    }

    /// Runs `op` against the bundle once it is ready.
    ///
    /// The first caller to find the gate uninitialized drives the open-retry
    /// sequence itself; callers arriving while that is in flight queue on a
    /// oneshot and are serviced in submission order when it settles. After a
    /// permanent failure every call fails immediately with the original
    /// cause until [`ReadinessGate::force_reinitialize`].
    pub async fn with_store<F, Fut, T>(&self, op: F) -> Result<T, Error>
    where
        F: FnOnce(StoreBundle) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let admission = {
            let mut state = self.lock_state();
            match &mut *state {
                ReadinessState::Ready(bundle) => Admission::Run(bundle.clone()),
                ReadinessState::Failed { error, .. } => {
                    return Err(Error::StoreUnavailable {
                        cause: Arc::clone(error),
                    });
                }
                ReadinessState::Initializing { waiters, .. } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Admission::Wait(rx)
                }
                ReadinessState::Uninitialized => {
                    *state = ReadinessState::Initializing {
                        attempt: 0,
                        waiters: Vec::new(),
                    };
                    Admission::Drive
                }
            }
        };

        match admission {
            Admission::Run(bundle) => op(bundle).await,
            Admission::Wait(rx) => {
                let bundle = rx
                    .await
                    .map_err(|_| Error::Other(anyhow!("store initialization was abandoned")))??;
                op(bundle).await
            }
            Admission::Drive => {
                let bundle = self.drive_initialization().await?;
                op(bundle).await
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.lock_state(), ReadinessState::Ready(_))
    }

    /// The cause of a permanent failure, if the gate is in that state.
    pub fn failure(&self) -> Option<Arc<StoreInitError>> {
        match &*self.lock_state() {
            ReadinessState::Failed { error, .. } => Some(Arc::clone(error)),
            _ => None,
        }
    }

    /// Manual retry affordance: clears a permanent failure so the next access
    /// attempts initialization again. Any other state is left alone.
    pub fn force_reinitialize(&self) -> bool {
        let mut state = self.lock_state();
        match &*state {
            ReadinessState::Failed { attempts, .. } => {
                info!("clearing failed store state after {attempts} attempt(s)");
                *state = ReadinessState::Uninitialized;
                true
            }
            _ => false,
        }
    }

    /// Runs the initializer, settles the state, and wakes queued waiters in
    /// the order they arrived.
    async fn drive_initialization(&self) -> Result<StoreBundle, Error> {
        let state = Arc::clone(&self.state);
        let outcome = initialize(&self.retry, &self.opener, move |attempt| {
            let mut guard = match state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let ReadinessState::Initializing { attempt: current, .. } = &mut *guard {
                *current = attempt;
            }
        })
        .await;

        match outcome {
            Ok(bundle) => {
                let waiters = {
                    let mut state = self.lock_state();
                    // Recheck after the suspension: only an in-flight
                    // initialization may settle to Ready.
                    let waiters = match &mut *state {
                        ReadinessState::Initializing { waiters, .. } => std::mem::take(waiters),
                        _ => Vec::new(),
                    };
                    *state = ReadinessState::Ready(bundle.clone());
                    waiters
                };
                for waiter in waiters {
                    let _ = waiter.send(Ok(bundle.clone()));
                }
                Ok(bundle)
            }
            Err(init_error) => {
                let error = Arc::new(init_error);
                let waiters = {
                    let mut state = self.lock_state();
                    let waiters = match &mut *state {
                        ReadinessState::Initializing { waiters, .. } => std::mem::take(waiters),
                        _ => Vec::new(),
                    };
                    *state = ReadinessState::Failed {
                        error: Arc::clone(&error),
                        attempts: error.attempts,
                    };
                    waiters
                };
                for waiter in waiters {
                    let _ = waiter.send(Err(Error::StoreUnavailable {
                        cause: Arc::clone(&error),
                    }));
                }
                Err(Error::StoreUnavailable { cause: error })
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ReadinessState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreOpenError;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    struct ScriptedOpener {
        data_dir: PathBuf,
        fail_first: u32,
        calls: AtomicU32,
    }

    impl ScriptedOpener {
        fn new(dir: &TempDir, fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                data_dir: dir.path().to_path_buf(),
                fail_first,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl StoreOpener for ScriptedOpener {
        fn open_bundle(&self) -> Result<StoreBundle, StoreOpenError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(StoreOpenError::Worker("scripted failure".into()));
            }
            StoreBundle::open(&self.data_dir)
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 4,
            attempt_timeout_ms: 2_000,
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_initialization() {
        let dir = TempDir::new().expect("temp dir");
        let opener = ScriptedOpener::new(&dir, 2);
        let gate = ReadinessGate::new(fast_policy(3), opener.clone() as Arc<dyn StoreOpener>);

        let service_order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for caller in 0..5usize {
            let gate = gate.clone();
            let service_order = Arc::clone(&service_order);
            handles.push(tokio::spawn(async move {
                gate.with_store(move |_bundle| async move {
                    service_order.lock().unwrap().push(caller);
                    Ok(caller)
                })
                .await
            }));
        }

        for (caller, handle) in handles.into_iter().enumerate() {
            let result = handle.await.expect("task joins").expect("bundle delivered");
            assert_eq!(result, caller);
        }

        // One retry sequence total: two scripted failures plus the success.
        assert_eq!(opener.calls(), 3);
        assert_eq!(*service_order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert!(gate.is_ready());
    }

    #[tokio::test]
    async fn permanent_failure_fails_fast_until_reinitialized() {
        let dir = TempDir::new().expect("temp dir");
        // Fails twice, which exhausts a budget of 2; the third call would
        // succeed but must not happen on its own.
        let opener = ScriptedOpener::new(&dir, 2);
        let gate = ReadinessGate::new(fast_policy(2), opener.clone() as Arc<dyn StoreOpener>);

        let err = gate
            .with_store(|_bundle| async move { Ok(()) })
            .await
            .expect_err("initialization exhausts its budget");
        match &err {
            Error::StoreUnavailable { cause } => assert_eq!(cause.attempts, 2),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(opener.calls(), 2);
        assert!(gate.failure().is_some());

        // Failed state short-circuits: no new open attempts.
        let err = gate
            .with_store(|_bundle| async move { Ok(()) })
            .await
            .expect_err("gate stays failed");
        assert!(matches!(err, Error::StoreUnavailable { .. }));
        assert_eq!(opener.calls(), 2);

        assert!(gate.force_reinitialize());
        assert!(!gate.force_reinitialize());

        gate.with_store(|_bundle| async move { Ok(()) })
            .await
            .expect("reinitialization succeeds");
        assert_eq!(opener.calls(), 3);
        assert!(gate.is_ready());
    }

    #[tokio::test]
    async fn ready_gate_runs_operations_immediately() {
        let dir = TempDir::new().expect("temp dir");
        let opener = ScriptedOpener::new(&dir, 0);
        let gate = ReadinessGate::new(fast_policy(3), opener.clone() as Arc<dyn StoreOpener>);

        gate.with_store(|_bundle| async move { Ok(()) })
            .await
            .expect("first call initializes");
        gate.with_store(|_bundle| async move { Ok(()) })
            .await
            .expect("second call reuses the bundle");

        assert_eq!(opener.calls(), 1);
    }
}
