use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};
use tokio::time;

use crate::config::RetryPolicy;
use crate::error::{StoreInitError, StoreOpenError};
use crate::store::StoreBundle;

/// Seam between the retry loop and the actual store opening, so failure
/// sequences can be scripted in tests.
pub trait StoreOpener: Send + Sync + 'static {
    fn open_bundle(&self) -> Result<StoreBundle, StoreOpenError>;
}

/// Opens the three stores under a data directory.
pub struct DirStoreOpener {
    data_dir: PathBuf,
}

impl DirStoreOpener {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }
}

impl StoreOpener for DirStoreOpener {
    fn open_bundle(&self) -> Result<StoreBundle, StoreOpenError> {
        StoreBundle::open(&self.data_dir)
    }
}

/// Runs the bounded open-retry loop. `on_attempt` fires with the zero-based
/// attempt index before each try, so the gate can expose progress.
///
/// Transient failures back off exponentially; a schema failure is terminal on
/// the spot. Either way exhaustion comes back as data, never a panic.
pub(crate) async fn initialize(
    policy: &RetryPolicy,
    opener: &Arc<dyn StoreOpener>,
    mut on_attempt: impl FnMut(u32),
) -> Result<StoreBundle, StoreInitError> {
    let budget = policy.max_retries.max(1);
    let mut attempts: u32 = 0;

    loop {
        on_attempt(attempts);
        attempts += 1;

        let open_task = {
            let opener = Arc::clone(opener);
            tokio::task::spawn_blocking(move || opener.open_bundle())
        };

        let outcome = match time::timeout(policy.attempt_timeout(), open_task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(StoreOpenError::Worker(join_err.to_string())),
            Err(_) => Err(StoreOpenError::Timeout(policy.attempt_timeout())),
        };

        match outcome {
            Ok(bundle) => {
                if attempts > 1 {
                    info!("stores opened after {attempts} attempts");
                }
                return Ok(bundle);
            }
            Err(err) if !err.is_transient() => {
                warn!("store open failed with a non-retryable error: {err}");
                return Err(StoreInitError {
                    attempts,
                    last_error: err,
                });
            }
            Err(err) => {
                if attempts >= budget {
                    return Err(StoreInitError {
                        attempts,
                        last_error: err,
                    });
                }

                let delay = policy.backoff_delay(attempts - 1);
                warn!("store open attempt {attempts} failed: {err}; retrying in {delay:?}");
                time::sleep(delay).await;
            }
        }
    }
}
