//! Governor - 同時実行数の上限
//!
//! One permit covers one whole pipeline run, from sandbox creation until
//! the outcome is resolved. The permit is released on drop, so every exit
//! path (including errors and panics) gives it back.
//!
//! # 学習ポイント
//! - `tokio::sync::Semaphore` の owned permit を RAII guard で包む
//! - `active` は観測用のカウンタ (上限の判定は semaphore だけが行う)
//! - `close()` 後の acquire は待たずにエラーになる
//!
//! # 使用例
//! ```ignore
//! let governor = Governor::new(3)?;
//! let _permit = governor.acquire().await?;
//! // sandbox → launch → resolve
//! // _permit の drop で枠が空く
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::domain::SandrunError;

#[derive(Debug, thiserror::Error)]
#[error("max jobs must be at least 1")]
pub struct InvalidLimit;

/// Counting semaphore shared by all runners of a worker.
///
/// Clones share the same slots; `limit` never changes after `new`.
#[derive(Debug, Clone)]
pub struct Governor {
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    limit: usize,
}

/// Proof that a run may proceed. Dropping it frees the slot.
#[derive(Debug)]
pub struct RunPermit {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Governor {
    /// `limit` 個の枠を持つ governor を作る。0 は設定ミスとして拒否。
    pub fn new(limit: usize) -> Result<Self, InvalidLimit> {
        if limit == 0 {
            return Err(InvalidLimit);
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            active: Arc::new(AtomicUsize::new(0)),
            limit,
        })
    }

    /// Wait for a free slot.
    ///
    /// # Returns
    /// 枠を保持する [`RunPermit`]。drop するまで他の run は入れない。
    ///
    /// # Errors
    /// `close()` 済みなら [`SandrunError::GovernorClosed`]。
    pub async fn acquire(&self) -> Result<RunPermit, SandrunError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| SandrunError::GovernorClosed)?;
        // permit を取れた後でだけ数える
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(RunPermit {
            _permit: permit,
            active: Arc::clone(&self.active),
        })
    }

    /// Runs currently holding a permit.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Configured number of slots (`max_jobs`).
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Refuse new permits; waiters fail with `GovernorClosed`.
    pub fn close(&self) {
        self.semaphore.close();
    }
}
