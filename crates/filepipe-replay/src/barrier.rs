// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reference-counted barrier over a one-shot semaphore.
//!
//! `barrier()` hands out a waiter and a cloneable guard. The semaphore is
//! posted exactly once, when the last guard clone drops; the waiter acquires
//! the permit exactly once. This gives "post when all holders are gone"
//! semantics without counting callers.

use std::sync::Arc;

use tokio::sync::Semaphore;

pub fn barrier() -> (Barrier, BarrierGuard) {
    let sem = Arc::new(Semaphore::new(0));
    let guard = BarrierGuard { inner: Arc::new(GuardInner { sem: sem.clone() }) };
    (Barrier { sem }, guard)
}

/// Waiter half; cloneable, but the permit is consumed by the first waiter.
#[derive(Debug, Clone)]
pub struct Barrier {
    sem: Arc<Semaphore>,
}

impl Barrier {
    /// Resolve once every [`BarrierGuard`] clone has been dropped.
    pub async fn wait(&self) {
        if let Ok(permit) = self.sem.acquire().await {
            permit.forget();
        }
    }
}

/// Guard half; each clone counts as one holder.
#[derive(Debug, Clone)]
pub struct BarrierGuard {
    #[allow(dead_code)]
    inner: Arc<GuardInner>,
}

#[derive(Debug)]
struct GuardInner {
    sem: Arc<Semaphore>,
}

impl Drop for GuardInner {
    fn drop(&mut self) {
        self.sem.add_permits(1);
    }
}
