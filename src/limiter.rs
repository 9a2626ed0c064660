//! Weighted admission control for image downloads
//!
//! The [`WeightedLimiter`] caps the total cost of downloads in flight, where a
//! deal's cost is the number of image URLs it carries rather than one unit per
//! deal. All clones share the same capacity pool.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Global limiter shared across every download task
///
/// Built on a FIFO-fair [`Semaphore`]: a large request queued first is served
/// before smaller requests that arrive after it, so heavy deals do not starve.
///
/// # Edge cases
///
/// - A weight of zero is granted immediately and holds nothing.
/// - A weight larger than the total capacity is clamped to the capacity, so the
///   request runs alone once every other holder has released.
/// - A capacity of zero is raised to one, so a non-empty request still waits
///   for exclusive access instead of bypassing the pool.
#[derive(Clone, Debug)]
pub struct WeightedLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl WeightedLimiter {
    /// Create a limiter with `capacity` units in the pool
    ///
    /// # Examples
    ///
    /// ```
    /// use deal_harvester::limiter::WeightedLimiter;
    ///
    /// let limiter = WeightedLimiter::new(1000);
    /// assert_eq!(limiter.available(), 1000);
    /// ```
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, u32::MAX as usize);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Total units in the pool
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Units not currently held by anyone
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Units currently held
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    /// Wait until `weight` units are free and take them.
    ///
    /// The units go back to the pool when the returned [`WeightPermit`] is
    /// dropped, on every exit path of the holder.
    pub async fn acquire(&self, weight: usize) -> WeightPermit {
        let granted = weight.min(self.capacity);
        if granted == 0 {
            return WeightPermit::empty();
        }

        // capacity is clamped to u32::MAX in new(), so this never saturates
        let units = u32::try_from(granted).unwrap_or(u32::MAX);
        match Arc::clone(&self.semaphore).acquire_many_owned(units).await {
            Ok(permit) => {
                if granted < weight {
                    tracing::debug!(
                        requested = weight,
                        granted = granted,
                        capacity = self.capacity,
                        "Download weight exceeds capacity, clamped"
                    );
                }
                WeightPermit {
                    permit: Some(permit),
                    weight: granted,
                }
            }
            Err(e) => {
                // The semaphore is owned here and never closed
                tracing::warn!(error = %e, "Limiter closed, admitting without capacity");
                WeightPermit::empty()
            }
        }
    }
}

/// Units held from a [`WeightedLimiter`], returned to the pool on drop
#[derive(Debug)]
#[must_use = "dropping the permit releases its capacity immediately"]
pub struct WeightPermit {
    permit: Option<OwnedSemaphorePermit>,
    weight: usize,
}

impl WeightPermit {
    fn empty() -> Self {
        Self {
            permit: None,
            weight: 0,
        }
    }

    /// Units held by this permit
    pub fn weight(&self) -> usize {
        self.weight
    }

    /// Return the units to the pool now rather than at end of scope
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for WeightPermit {
    fn drop(&mut self) {
        if self.permit.take().is_some() {
            tracing::trace!(weight = self.weight, "Released download capacity");
        }
    }
}
