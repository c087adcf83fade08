// SPDX-License-Identifier: CEPL-1.0
//! Scripted in-memory device for tests. Signals fences and semaphores the
//! moment work is "submitted" and panics on any misuse a real driver would
//! reject or hang on.
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use ash::prelude::VkResult;
use ash::vk;
use ash::vk::Handle;

use crate::gpu::{Gpu, SwapchainPlan};

/// Default surface: free extent, 2..=8 images.
pub(crate) fn surface_caps() -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        min_image_count: 2,
        max_image_count: 8,
        current_extent: vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        },
        min_image_extent: vk::Extent2D {
            width: 1,
            height: 1,
        },
        max_image_extent: vk::Extent2D {
            width: 16384,
            height: 16384,
        },
        max_image_array_layers: 1,
        supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
        current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
        supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
        supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::TRANSFER_DST,
        ..Default::default()
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum AcquireScript {
    Ok,
    Suboptimal,
    Err(vk::Result),
}

#[derive(Default)]
struct FenceState {
    signaled: bool,
    /// Submitted to and not waited on since.
    in_flight: bool,
}

#[derive(Default)]
struct State {
    next_handle: u64,
    caps: vk::SurfaceCapabilitiesKHR,
    formats: Vec<vk::SurfaceFormatKHR>,
    modes: Vec<vk::PresentModeKHR>,

    fences: HashMap<u64, FenceState>,
    semaphores: HashMap<u64, bool>,
    pools: HashSet<u64>,
    buffers: HashMap<u64, u64>,
    recorded: HashMap<u64, u64>,
    swapchains: HashMap<u64, Vec<vk::Image>>,
    current_swapchain: Option<u64>,
    next_image: u32,

    acquire_script: VecDeque<AcquireScript>,
    present_script: VecDeque<VkResult<bool>>,
    fail_after: Option<(u32, vk::Result)>,
    fail_swapchain: Option<vk::Result>,
    fail_submit: Option<vk::Result>,

    plans: Vec<SwapchainPlan>,
    submits: usize,
    presents: Vec<u32>,
    acquires: usize,
    wait_idles: usize,
}

impl State {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        0x1000 + self.next_handle
    }

    /// Counts one tracked creation and returns the scripted failure, if due.
    fn creation(&mut self) -> VkResult<()> {
        match self.fail_after.take() {
            Some((0, e)) => Err(e),
            Some((n, e)) => {
                self.fail_after = Some((n - 1, e));
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn fence(&mut self, fence: vk::Fence) -> &mut FenceState {
        match self.fences.get_mut(&fence.as_raw()) {
            Some(f) => f,
            None => panic!("unknown fence 0x{:x}", fence.as_raw()),
        }
    }
}

/// Cloning (or [`FakeGpu::probe`]) shares the same device state, so a test
/// can keep observing after the owner is dropped.
#[derive(Clone)]
pub(crate) struct FakeGpu {
    state: Rc<RefCell<State>>,
}

impl FakeGpu {
    pub fn new() -> Self {
        let state = State {
            caps: surface_caps(),
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            modes: vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
            ..Default::default()
        };
        FakeGpu {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn probe(&self) -> FakeGpu {
        self.clone()
    }

    // --- setup ---

    pub fn set_current_extent(&self, width: u32, height: u32) {
        self.state.borrow_mut().caps.current_extent = vk::Extent2D { width, height };
    }

    pub fn set_formats(&self, formats: Vec<vk::SurfaceFormatKHR>) {
        self.state.borrow_mut().formats = formats;
    }

    pub fn set_present_modes(&self, modes: Vec<vk::PresentModeKHR>) {
        self.state.borrow_mut().modes = modes;
    }

    /// The next `n` fence/semaphore/pool/allocation calls succeed, the one
    /// after fails with `err`. Swapchains are not counted.
    pub fn fail_creation_after(&self, n: u32, err: vk::Result) {
        self.state.borrow_mut().fail_after = Some((n, err));
    }

    pub fn fail_next_swapchain(&self, err: vk::Result) {
        self.state.borrow_mut().fail_swapchain = Some(err);
    }

    pub fn fail_next_submit(&self, err: vk::Result) {
        self.state.borrow_mut().fail_submit = Some(err);
    }

    pub fn script_acquire(&self, steps: impl IntoIterator<Item = AcquireScript>) {
        self.state.borrow_mut().acquire_script.extend(steps);
    }

    pub fn script_present(&self, steps: impl IntoIterator<Item = VkResult<bool>>) {
        self.state.borrow_mut().present_script.extend(steps);
    }

    // --- observation ---

    pub fn is_signaled(&self, fence: vk::Fence) -> bool {
        self.state.borrow_mut().fence(fence).signaled
    }

    pub fn semaphore_signaled(&self, semaphore: vk::Semaphore) -> bool {
        self.state.borrow().semaphores[&semaphore.as_raw()]
    }

    pub fn live_objects(&self) -> usize {
        let s = self.state.borrow();
        s.fences.len() + s.semaphores.len() + s.pools.len() + s.buffers.len()
    }

    pub fn live_swapchains(&self) -> usize {
        self.state.borrow().swapchains.len()
    }

    pub fn swapchains_created(&self) -> usize {
        self.state.borrow().plans.len()
    }

    pub fn plans(&self) -> Vec<SwapchainPlan> {
        self.state.borrow().plans.clone()
    }

    pub fn current_images(&self) -> Vec<vk::Image> {
        let s = self.state.borrow();
        s.current_swapchain
            .and_then(|sc| s.swapchains.get(&sc).cloned())
            .unwrap_or_default()
    }

    pub fn recorded_image(&self, cmd: vk::CommandBuffer) -> Option<vk::Image> {
        self.state
            .borrow()
            .recorded
            .get(&cmd.as_raw())
            .map(|&raw| vk::Image::from_raw(raw))
    }

    pub fn submit_count(&self) -> usize {
        self.state.borrow().submits
    }

    pub fn present_count(&self) -> usize {
        self.state.borrow().presents.len()
    }

    pub fn presented_indices(&self) -> Vec<u32> {
        self.state.borrow().presents.clone()
    }

    pub fn acquire_count(&self) -> usize {
        self.state.borrow().acquires
    }

    pub fn wait_idle_count(&self) -> usize {
        self.state.borrow().wait_idles
    }
}

impl Gpu for FakeGpu {
    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        Ok(self.state.borrow().caps)
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.state.borrow().formats.clone())
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.state.borrow().modes.clone())
    }

    fn create_swapchain(&self, plan: &SwapchainPlan) -> VkResult<vk::SwapchainKHR> {
        let mut s = self.state.borrow_mut();
        if let Some(e) = s.fail_swapchain.take() {
            return Err(e);
        }
        assert!(
            s.swapchains.is_empty(),
            "surface already has a live swapchain"
        );
        let raw = s.handle();
        let images: Vec<vk::Image> = (0..plan.min_image_count)
            .map(|_| vk::Image::from_raw(s.handle()))
            .collect();
        s.swapchains.insert(raw, images);
        s.current_swapchain = Some(raw);
        s.next_image = 0;
        s.plans.push(*plan);
        Ok(vk::SwapchainKHR::from_raw(raw))
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        Ok(self.state.borrow().swapchains[&swapchain.as_raw()].clone())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut s = self.state.borrow_mut();
        assert!(
            s.swapchains.remove(&swapchain.as_raw()).is_some(),
            "double destroy of swapchain"
        );
        if s.current_swapchain == Some(swapchain.as_raw()) {
            s.current_swapchain = None;
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Fence,
    ) -> VkResult<(u32, bool)> {
        let mut s = self.state.borrow_mut();
        let count = match s.swapchains.get(&swapchain.as_raw()) {
            Some(images) => images.len() as u32,
            None => panic!("acquire on a dead swapchain"),
        };
        assert!(!s.fence(signal).signaled, "acquire with a signaled fence");
        s.acquires += 1;
        let step = s.acquire_script.pop_front().unwrap_or(AcquireScript::Ok);
        let suboptimal = match step {
            AcquireScript::Ok => false,
            AcquireScript::Suboptimal => true,
            AcquireScript::Err(e) => return Err(e),
        };
        let index = s.next_image % count;
        s.next_image += 1;
        s.fence(signal).signaled = true;
        Ok((index, suboptimal))
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut s = self.state.borrow_mut();
        assert!(
            s.swapchains.contains_key(&swapchain.as_raw()),
            "present on a dead swapchain"
        );
        match s.semaphores.get_mut(&wait.as_raw()) {
            Some(signaled) if *signaled => *signaled = false,
            Some(_) => panic!("present waits on a semaphore nothing will signal"),
            None => panic!("present waits on an unknown semaphore"),
        }
        let result = s.present_script.pop_front().unwrap_or(Ok(false));
        if result.is_ok() {
            s.presents.push(image_index);
        }
        result
    }

    fn create_command_pool(&self) -> VkResult<vk::CommandPool> {
        let mut s = self.state.borrow_mut();
        s.creation()?;
        let raw = s.handle();
        s.pools.insert(raw);
        Ok(vk::CommandPool::from_raw(raw))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut s = self.state.borrow_mut();
        assert!(
            !s.buffers.values().any(|&p| p == pool.as_raw()),
            "pool destroyed with command buffers still allocated"
        );
        assert!(s.pools.remove(&pool.as_raw()), "double destroy of pool");
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut s = self.state.borrow_mut();
        s.creation()?;
        assert!(s.pools.contains(&pool.as_raw()), "allocate from unknown pool");
        Ok((0..count)
            .map(|_| {
                let raw = s.handle();
                s.buffers.insert(raw, pool.as_raw());
                vk::CommandBuffer::from_raw(raw)
            })
            .collect())
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut s = self.state.borrow_mut();
        for cmd in buffers {
            assert_eq!(
                s.buffers.remove(&cmd.as_raw()),
                Some(pool.as_raw()),
                "freeing a command buffer not owned by this pool"
            );
            s.recorded.remove(&cmd.as_raw());
        }
    }

    fn record_present_transition(&self, cmd: vk::CommandBuffer, image: vk::Image) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        assert!(s.buffers.contains_key(&cmd.as_raw()), "recording into unknown buffer");
        s.recorded.insert(cmd.as_raw(), image.as_raw());
        Ok(())
    }

    fn queue_submit(
        &self,
        cmd: vk::CommandBuffer,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        if let Some(e) = s.fail_submit.take() {
            return Err(e);
        }
        assert!(s.recorded.contains_key(&cmd.as_raw()), "submit of an unrecorded buffer");
        {
            let f = s.fence(fence);
            assert!(!f.signaled, "submit with a signaled fence");
            assert!(!f.in_flight, "fence reused without waiting on its last submit");
            f.signaled = true;
            f.in_flight = true;
        }
        match s.semaphores.get_mut(&signal.as_raw()) {
            Some(signaled) => {
                assert!(!*signaled, "submit signals an already signaled semaphore");
                *signaled = true;
            }
            None => panic!("submit signals an unknown semaphore"),
        }
        s.submits += 1;
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut s = self.state.borrow_mut();
        s.creation()?;
        let raw = s.handle();
        s.fences.insert(
            raw,
            FenceState {
                signaled,
                in_flight: false,
            },
        );
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let removed = self.state.borrow_mut().fences.remove(&fence.as_raw());
        assert!(removed.is_some(), "double destroy of fence");
    }

    fn fence_signaled(&self, fence: vk::Fence) -> VkResult<bool> {
        Ok(self.state.borrow_mut().fence(fence).signaled)
    }

    fn wait_for_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        for &fence in fences {
            let f = s.fence(fence);
            assert!(f.signaled, "waiting on a fence nothing will signal: deadlock");
            f.in_flight = false;
        }
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        let f = s.fence(fence);
        assert!(!f.in_flight, "reset of a fence with an unwaited submit");
        f.signaled = false;
        Ok(())
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut s = self.state.borrow_mut();
        s.creation()?;
        let raw = s.handle();
        s.semaphores.insert(raw, false);
        Ok(vk::Semaphore::from_raw(raw))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let removed = self.state.borrow_mut().semaphores.remove(&semaphore.as_raw());
        assert!(removed.is_some(), "double destroy of semaphore");
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.wait_idles += 1;
        // Everything "completes" instantly; an idle device has no unwaited submits.
        for f in s.fences.values_mut() {
            f.in_flight = false;
        }
        Ok(())
    }
}
