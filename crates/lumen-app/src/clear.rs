// SPDX-License-Identifier: CEPL-1.0
//! Stand-in renderer: fills each acquired image with a solid colour and leaves
//! it in COLOR_ATTACHMENT_OPTIMAL, the layout the presenter expects back.
use anyhow::{Context, Result};
use ash::vk;
use lumen_present_vk::RendererHandles;

pub struct ClearRenderer {
    device: ash::Device,
    queue: vk::Queue,
    pool: vk::CommandPool,
    cmd: vk::CommandBuffer,
    done: vk::Fence,
    /// Without TRANSFER_DST on the swapchain the image is only transitioned.
    can_clear: bool,
}

impl Drop for ClearRenderer {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_fence(self.done, None);
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}

fn barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access_mask: vk::AccessFlags,
    dst_access_mask: vk::AccessFlags,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
        src_access_mask,
        dst_access_mask,
        old_layout,
        new_layout,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: COLOR_RANGE,
        ..Default::default()
    }
}

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

impl ClearRenderer {
    pub fn new(handles: &RendererHandles, usage: vk::ImageUsageFlags) -> Result<Self> {
        let device = handles.device.clone();
        unsafe {
            let pool = device
                .create_command_pool(
                    &vk::CommandPoolCreateInfo {
                        s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
                        flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
                        queue_family_index: handles.queue_family_index,
                        ..Default::default()
                    },
                    None,
                )
                .context("create_command_pool")?;

            let alloc = vk::CommandBufferAllocateInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
                command_pool: pool,
                level: vk::CommandBufferLevel::PRIMARY,
                command_buffer_count: 1,
                ..Default::default()
            };
            let cmd = match device.allocate_command_buffers(&alloc) {
                Ok(v) => v[0],
                Err(e) => {
                    device.destroy_command_pool(pool, None);
                    return Err(e).context("allocate_command_buffers");
                }
            };
            let done = match device.create_fence(
                &vk::FenceCreateInfo {
                    s_type: vk::StructureType::FENCE_CREATE_INFO,
                    ..Default::default()
                },
                None,
            ) {
                Ok(f) => f,
                Err(e) => {
                    device.destroy_command_pool(pool, None);
                    return Err(e).context("create_fence");
                }
            };

            Ok(ClearRenderer {
                device,
                queue: handles.queue,
                pool,
                cmd,
                done,
                can_clear: usage.contains(vk::ImageUsageFlags::TRANSFER_DST),
            })
        }
    }

    /// Records, submits and waits. The image must be the one just acquired.
    pub fn draw(&mut self, image: vk::Image, color: [f32; 4]) -> Result<()> {
        let d = &self.device;
        unsafe {
            d.reset_command_buffer(self.cmd, vk::CommandBufferResetFlags::empty())?;
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            d.begin_command_buffer(self.cmd, &begin)?;

            if self.can_clear {
                let to_dst = barrier(
                    image,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::AccessFlags::empty(),
                    vk::AccessFlags::TRANSFER_WRITE,
                );
                d.cmd_pipeline_barrier(
                    self.cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    std::slice::from_ref(&to_dst),
                );
                let clear = vk::ClearColorValue { float32: color };
                d.cmd_clear_color_image(
                    self.cmd,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &clear,
                    std::slice::from_ref(&COLOR_RANGE),
                );
                let to_attachment = barrier(
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    vk::AccessFlags::TRANSFER_WRITE,
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                );
                d.cmd_pipeline_barrier(
                    self.cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    std::slice::from_ref(&to_attachment),
                );
            } else {
                let to_attachment = barrier(
                    image,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    vk::AccessFlags::empty(),
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                );
                d.cmd_pipeline_barrier(
                    self.cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    std::slice::from_ref(&to_attachment),
                );
            }
            d.end_command_buffer(self.cmd)?;

            let submit = vk::SubmitInfo {
                s_type: vk::StructureType::SUBMIT_INFO,
                command_buffer_count: 1,
                p_command_buffers: &self.cmd,
                ..Default::default()
            };
            d.queue_submit(self.queue, std::slice::from_ref(&submit), self.done)
                .context("queue_submit(clear)")?;
            d.wait_for_fences(&[self.done], true, u64::MAX)
                .context("wait_for_fences(clear)")?;
            d.reset_fences(&[self.done])?;
        }
        Ok(())
    }
}

/// Slow hue drift around `base` so a stalled presenter is obvious on screen.
pub fn pulse(base: [f32; 4], seconds: f32) -> [f32; 4] {
    let t = seconds * 0.5;
    let wave = |phase: f32| 0.5 + 0.5 * (t + phase).sin();
    [
        (base[0] + 0.4 * wave(0.0)).min(1.0),
        (base[1] + 0.4 * wave(2.094)).min(1.0),
        (base[2] + 0.4 * wave(4.189)).min(1.0),
        base[3],
    ]
}
