// SPDX-License-Identifier: CEPL-1.0
use ash::prelude::VkResult;
use ash::vk;
use tracing::debug;

use crate::error::{PresentError, PresentResult};
use crate::gpu::Gpu;

/// Per-frame synchronization objects. One slot is used per acquire/present
/// cycle; the ring index moves on after every present.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FrameSyncSlot {
    /// Signaled by the acquire. Waited and reset before the image is handed out.
    pub image_ready: vk::Fence,
    /// Signaled when the present-transition submit completes.
    pub submit_done: vk::Fence,
    /// Signaled by the transition submit, waited by the present.
    pub present_transition: vk::Semaphore,
}

/// Fixed ring of `N` preallocated slots, N = frames in flight.
///
/// Fence invariant kept by the frame controller: every fence is either
/// signaled or has GPU work pending that will signal it, except an
/// `image_ready` fence that was reset after its wait. That is why teardown
/// only waits on `submit_done`.
pub(crate) struct SyncPool {
    slots: Vec<FrameSyncSlot>,
}

impl SyncPool {
    /// Fences start signaled so the first use of each slot does not block;
    /// semaphores start unsignaled.
    pub fn create<G: Gpu>(gpu: &G, frame_count: usize) -> PresentResult<Self> {
        if frame_count == 0 {
            return Err(PresentError::Config(
                "sync pool needs at least one slot".into(),
            ));
        }

        let mut pool = SyncPool {
            slots: Vec::with_capacity(frame_count),
        };
        for _ in 0..frame_count {
            match Self::create_slot(gpu) {
                Ok(slot) => pool.slots.push(slot),
                Err(e) => {
                    // Nothing was submitted yet, the created objects are idle.
                    pool.destroy(gpu);
                    return Err(PresentError::SyncCreation(e));
                }
            }
        }
        debug!("sync pool ready: {} slots", frame_count);
        Ok(pool)
    }

    fn create_slot<G: Gpu>(gpu: &G) -> VkResult<FrameSyncSlot> {
        let image_ready = gpu.create_fence(true)?;
        let submit_done = match gpu.create_fence(true) {
            Ok(f) => f,
            Err(e) => {
                gpu.destroy_fence(image_ready);
                return Err(e);
            }
        };
        let present_transition = match gpu.create_semaphore() {
            Ok(s) => s,
            Err(e) => {
                gpu.destroy_fence(submit_done);
                gpu.destroy_fence(image_ready);
                return Err(e);
            }
        };
        Ok(FrameSyncSlot {
            image_ready,
            submit_done,
            present_transition,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> FrameSyncSlot {
        self.slots[index]
    }

    /// Blocks until no submit referencing any slot is outstanding.
    pub fn wait_idle<G: Gpu>(&self, gpu: &G) -> VkResult<()> {
        let fences: Vec<_> = self.slots.iter().map(|s| s.submit_done).collect();
        gpu.wait_for_fences(&fences)
    }

    /// Destroys every slot. The caller must have made the device idle first.
    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        for s in self.slots.drain(..) {
            gpu.destroy_fence(s.image_ready);
            gpu.destroy_fence(s.submit_done);
            gpu.destroy_semaphore(s.present_transition);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeGpu;

    #[test]
    fn slots_start_with_signaled_fences() {
        let gpu = FakeGpu::new();
        let mut pool = SyncPool::create(&gpu, 3).unwrap();
        assert_eq!(pool.len(), 3);
        for i in 0..3 {
            let s = pool.slot(i);
            assert!(gpu.is_signaled(s.image_ready));
            assert!(gpu.is_signaled(s.submit_done));
            assert!(!gpu.semaphore_signaled(s.present_transition));
        }
        // Fresh pool: waiting is immediate.
        pool.wait_idle(&gpu).unwrap();
        pool.destroy(&gpu);
        assert_eq!(gpu.live_objects(), 0);
    }

    #[test]
    fn zero_slots_rejected() {
        let gpu = FakeGpu::new();
        assert!(matches!(
            SyncPool::create(&gpu, 0),
            Err(PresentError::Config(_))
        ));
    }

    #[test]
    fn partial_creation_is_rolled_back() {
        let gpu = FakeGpu::new();
        // Slot 0 = 3 objects, slot 1 fails on its semaphore.
        gpu.fail_creation_after(5, vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        let err = SyncPool::create(&gpu, 3).err().unwrap();
        assert!(matches!(
            err,
            PresentError::SyncCreation(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
        ));
        assert_eq!(gpu.live_objects(), 0);
    }

    #[test]
    fn destroy_is_idempotent() {
        let gpu = FakeGpu::new();
        let mut pool = SyncPool::create(&gpu, 1).unwrap();
        pool.destroy(&gpu);
        pool.destroy(&gpu);
        assert_eq!(pool.len(), 0);
        assert_eq!(gpu.live_objects(), 0);
    }
}
