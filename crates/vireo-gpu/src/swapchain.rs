//! Swapchain management.
//!
//! A [`Swapchain`] owns its window's surface, the swapchain object with one
//! view per image, and a ring of "image available" semaphores indexed by its
//! own frame counter. Suboptimal and out-of-date results are handled here by
//! recreating; every other failure is returned to the caller.

use crate::context::GpuContext;
use crate::error::{GpuError, Result, VkResultExt};
use crate::sync::{self, FrameCounter};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use vireo_core::constants::MAX_FRAMES_IN_FLIGHT;

/// Lifecycle state of a swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwapchainStatus {
    /// Nothing created yet.
    #[default]
    Uninitialized,
    /// Images can be acquired.
    Ready,
    /// Must be recreated before the next acquire.
    NeedsRecreate,
}

/// Result of an image acquire, after error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired(u32),
    /// An image was acquired but the swapchain no longer matches the surface.
    Suboptimal,
    /// No image was acquired.
    OutOfDate,
}

/// Map a raw acquire result, keeping only unrecoverable errors as errors.
pub fn classify_acquire(result: ash::prelude::VkResult<(u32, bool)>) -> Result<AcquireOutcome> {
    match result {
        Ok((index, false)) => Ok(AcquireOutcome::Acquired(index)),
        Ok((_, true)) => Ok(AcquireOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(e).check("acquire next image"),
    }
}

/// Map the overall result of a batched present.
///
/// Suboptimal and out-of-date are handled per swapchain, so only other
/// failures are errors.
pub fn classify_present(result: ash::prelude::VkResult<bool>) -> Result<()> {
    match result {
        Ok(_) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(()),
        Err(e) => Err(e).check("queue present"),
    }
}

/// Whether a per-swapchain present result asks for a recreate.
pub fn present_needs_recreate(result: vk::Result) -> bool {
    matches!(
        result,
        vk::Result::SUBOPTIMAL_KHR | vk::Result::ERROR_OUT_OF_DATE_KHR
    )
}

/// Frame bookkeeping of a swapchain, kept apart from the Vulkan objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapchainState {
    pub status: SwapchainStatus,
    pub frame: FrameCounter,
    /// Only meaningful between a successful acquire and the next present.
    pub image_index: u32,
}

impl SwapchainState {
    /// Record an acquire. Returns whether the frame can be drawn.
    ///
    /// The image index is left untouched unless an image was acquired.
    pub fn apply_acquire(&mut self, outcome: AcquireOutcome) -> bool {
        match outcome {
            AcquireOutcome::Acquired(index) => {
                self.image_index = index;
                true
            }
            AcquireOutcome::Suboptimal | AcquireOutcome::OutOfDate => {
                self.status = SwapchainStatus::NeedsRecreate;
                false
            }
        }
    }

    /// Record this swapchain's present result and move to the next frame.
    pub fn apply_present(&mut self, result: vk::Result) {
        if present_needs_recreate(result) {
            self.status = SwapchainStatus::NeedsRecreate;
        }
        self.frame.advance();
    }
}

/// Swapchain wrapper bound to one window surface.
pub struct Swapchain {
    device: Arc<ash::Device>,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,

    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,

    desired_extent: vk::Extent2D,
    vsync: bool,

    image_available: [vk::Semaphore; MAX_FRAMES_IN_FLIGHT],
    state: SwapchainState,
}

impl Swapchain {
    /// Create a surface for `window` and a swapchain of `width` x `height` pixels.
    ///
    /// The swapchain borrows the context's instance; drop it before the context.
    pub fn new<W>(gpu: &GpuContext, window: &W, width: u32, height: u32, vsync: bool) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?
            .as_raw();

        let surface_loader = ash::khr::surface::Instance::new(gpu.entry(), gpu.instance());
        let swapchain_loader = ash::khr::swapchain::Device::new(gpu.instance(), gpu.device());

        let surface = unsafe {
            ash_window::create_surface(gpu.entry(), gpu.instance(), display, window_handle, None)
        }
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let physical_device = gpu.physical_device().handle;

        let supported = unsafe {
            surface_loader.get_physical_device_surface_support(
                physical_device,
                gpu.graphics_queue_family(),
                surface,
            )
        };
        if !matches!(supported, Ok(true)) {
            unsafe { surface_loader.destroy_surface(surface, None) };
            return Err(GpuError::SurfaceCreation(
                "graphics queue cannot present to this surface".to_string(),
            ));
        }

        let image_available = match unsafe { sync::create_semaphore_ring(gpu.device()) } {
            Ok(ring) => ring,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        let mut swapchain = Self {
            device: gpu.device_arc(),
            surface_loader,
            swapchain_loader,
            physical_device,
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            surface_format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
            desired_extent: vk::Extent2D { width, height },
            vsync,
            image_available,
            state: SwapchainState::default(),
        };

        // On failure the partially built swapchain cleans up through Drop
        swapchain.create()?;
        Ok(swapchain)
    }

    /// Build the swapchain object and its image views from the current
    /// surface capabilities.
    fn create(&mut self) -> Result<()> {
        let (capabilities, formats, present_modes) = unsafe {
            (
                self.surface_loader
                    .get_physical_device_surface_capabilities(self.physical_device, self.surface)
                    .check("query surface capabilities")?,
                self.surface_loader
                    .get_physical_device_surface_formats(self.physical_device, self.surface)
                    .check("query surface formats")?,
                self.surface_loader
                    .get_physical_device_surface_present_modes(self.physical_device, self.surface)
                    .check("query present modes")?,
            )
        };

        let extent = calculate_extent(
            &capabilities,
            self.desired_extent.width,
            self.desired_extent.height,
        );
        if extent.width == 0 || extent.height == 0 {
            tracing::debug!("Surface has zero area, postponing swapchain creation");
            self.state.status = SwapchainStatus::NeedsRecreate;
            return Ok(());
        }

        let surface_format = select_surface_format(&formats).ok_or_else(|| {
            GpuError::SurfaceCreation("surface reports no formats".to_string())
        })?;
        let present_mode = select_present_mode(&present_modes, self.vsync);
        let image_count = choose_image_count(&capabilities);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(self.swapchain);

        // SAFETY: Create info references a valid surface and the retired swapchain
        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
            .check("create swapchain")?;

        if self.swapchain != vk::SwapchainKHR::null() {
            // SAFETY: Retired by the create call above; the device is idle
            unsafe { self.swapchain_loader.destroy_swapchain(self.swapchain, None) };
        }
        self.swapchain = swapchain;

        self.images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
            .check("get swapchain images")?;

        self.image_views = Vec::with_capacity(self.images.len());
        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );
            let view = unsafe { self.device.create_image_view(&view_info, None) }
                .check("create swapchain image view")?;
            self.image_views.push(view);
        }

        if surface_format.format != self.surface_format.format
            && self.state.status != SwapchainStatus::Uninitialized
        {
            tracing::debug!(
                "Swapchain format changed from {:?} to {:?}",
                self.surface_format.format,
                surface_format.format
            );
        }

        self.surface_format = surface_format;
        self.present_mode = present_mode;
        self.extent = extent;
        self.state.status = SwapchainStatus::Ready;

        tracing::debug!(
            "Swapchain created: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            self.images.len(),
            surface_format.format,
            present_mode
        );

        Ok(())
    }

    fn destroy_image_views(&mut self) {
        for view in self.image_views.drain(..) {
            // SAFETY: The device is idle, so no framebuffer use is pending
            unsafe { self.device.destroy_image_view(view, None) };
        }
        self.images.clear();
    }

    /// Recreate the swapchain and its views. The surface and semaphores persist.
    pub fn recreate(&mut self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.check("wait for device idle")?;
        self.destroy_image_views();
        self.create()
    }

    /// Wait for the current frame slot and acquire the next image.
    ///
    /// Returns `false` when the swapchain had to be recreated instead; the
    /// caller then skips drawing and rebuilds its pipelines. The previous
    /// image index is kept in that case.
    pub fn next(&mut self, gpu: &GpuContext) -> Result<bool> {
        let slot = self.state.frame.slot();
        let fence = gpu.frame_fence(slot);

        unsafe { sync::wait_for_fence(gpu.device(), fence, slot, gpu.fence_timeout())? };

        if self.state.status != SwapchainStatus::Ready {
            self.recreate()?;
            return Ok(false);
        }

        let semaphore = self.image_available[slot];
        // SAFETY: Swapchain and semaphore are valid; the semaphore is unsignaled
        let outcome = classify_acquire(unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        })?;

        if !self.state.apply_acquire(outcome) {
            tracing::trace!("Acquire returned {outcome:?}, recreating swapchain");
            if outcome == AcquireOutcome::Suboptimal {
                // The semaphore will be signaled; consume it so the slot can be reused
                let stages = [vk::PipelineStageFlags::ALL_COMMANDS];
                let waits = [semaphore];
                let submit = vk::SubmitInfo::default()
                    .wait_semaphores(&waits)
                    .wait_dst_stage_mask(&stages);
                // SAFETY: No command buffers are referenced
                unsafe {
                    gpu.device()
                        .queue_submit(gpu.graphics_queue(), &[submit], vk::Fence::null())
                }
                .check("drain image semaphore")?;
            }
            self.recreate()?;
            return Ok(false);
        }

        // SAFETY: The wait above guarantees the fence is signaled and unused
        unsafe { sync::reset_fence(gpu.device(), fence)? };
        Ok(true)
    }

    /// Present the acquired image of every swapchain in one call.
    ///
    /// Swapchains whose present comes back suboptimal or out of date are
    /// flagged for recreation. Every swapchain's frame counter advances,
    /// whatever the result.
    pub fn present(gpu: &GpuContext, swapchains: &mut [&mut Self]) -> Result<()> {
        let Some(first) = swapchains.first() else {
            return Ok(());
        };
        let loader = first.swapchain_loader.clone();

        let handles: Vec<vk::SwapchainKHR> = swapchains.iter().map(|s| s.swapchain).collect();
        let indices: Vec<u32> = swapchains.iter().map(|s| s.state.image_index).collect();
        let waits: Vec<vk::Semaphore> = swapchains
            .iter()
            .map(|s| gpu.queue_finished(s.frame_slot()))
            .collect();
        let mut results = vec![vk::Result::SUCCESS; swapchains.len()];

        let overall = {
            let present_info = vk::PresentInfoKHR::default()
                .wait_semaphores(&waits)
                .swapchains(&handles)
                .image_indices(&indices)
                .results(&mut results);
            // SAFETY: Every swapchain holds an image acquired this frame
            unsafe { loader.queue_present(gpu.graphics_queue(), &present_info) }
        };

        for (swapchain, &result) in swapchains.iter_mut().zip(&results) {
            if present_needs_recreate(result) {
                tracing::trace!("Present returned {result:?}, swapchain flagged for recreate");
            }
            swapchain.state.apply_present(result);
        }

        classify_present(overall)
    }

    /// Change the size used when the surface leaves the extent to us.
    pub fn set_desired_extent(&mut self, width: u32, height: u32) {
        self.desired_extent = vk::Extent2D { width, height };
    }

    /// Force a recreate at the next acquire.
    pub fn mark_needs_recreate(&mut self) {
        self.state.status = SwapchainStatus::NeedsRecreate;
    }

    /// Get the raw swapchain handle.
    pub const fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub const fn status(&self) -> SwapchainStatus {
        self.state.status
    }

    pub const fn state(&self) -> &SwapchainState {
        &self.state
    }

    /// Color format of the images.
    pub const fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    pub const fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Index of the image acquired by the last successful [`Self::next`].
    pub const fn image_index(&self) -> u32 {
        self.state.image_index
    }

    /// Current in-flight slot.
    pub const fn frame_slot(&self) -> usize {
        self.state.frame.slot()
    }

    /// Semaphore the current slot's acquire signals.
    pub const fn image_available_semaphore(&self) -> vk::Semaphore {
        self.image_available[self.state.frame.slot()]
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        // SAFETY: After the idle wait nothing references these objects
        unsafe {
            let _ = self.device.device_wait_idle();
            self.destroy_image_views();
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            for &semaphore in &self.image_available {
                self.device.destroy_semaphore(semaphore, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Select the surface format: sRGB BGRA if offered, else the first one.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// Select the present mode: MAILBOX without vsync when supported, else FIFO.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        // FIFO is always supported
        vk::PresentModeKHR::FIFO
    }
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One more image than the minimum, capped by the maximum (0 means unbounded).
pub const fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn undefined_extent_caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        }
    }

    #[test]
    fn fifo_when_mailbox_is_missing() {
        let modes = [vk::PresentModeKHR::FIFO];
        assert_eq!(select_present_mode(&modes, false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn mailbox_only_without_vsync() {
        let modes = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(select_present_mode(&modes, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(select_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn srgb_format_preferred() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let pick = |formats: &[vk::SurfaceFormatKHR]| select_surface_format(formats).map(|f| f.format);
        assert_eq!(pick(&[unorm, srgb]), Some(srgb.format));
        assert_eq!(pick(&[unorm]), Some(unorm.format));
        assert_eq!(pick(&[]), None);
    }

    #[test]
    fn undefined_extent_uses_window_size() {
        let caps = undefined_extent_caps();
        assert_eq!(
            calculate_extent(&caps, 800, 600),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
        assert_eq!(
            calculate_extent(&caps, 4000, 0),
            vk::Extent2D {
                width: 1920,
                height: 1
            }
        );
    }

    #[test]
    fn defined_extent_wins() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
            ..undefined_extent_caps()
        };
        assert_eq!(calculate_extent(&caps, 800, 600).width, 640);
    }

    #[test]
    fn image_count_is_capped() {
        let mut caps = undefined_extent_caps();
        assert_eq!(choose_image_count(&caps), 3);
        caps.min_image_count = 3;
        assert_eq!(choose_image_count(&caps), 3);
        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps), 4);
    }

    #[test]
    fn acquire_classification() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            AcquireOutcome::Acquired(2)
        );
        assert_eq!(
            classify_acquire(Ok((2, true))).unwrap(),
            AcquireOutcome::Suboptimal
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate
        );
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(GpuError::DeviceLost(_))
        ));
    }

    #[test]
    fn present_classification() {
        assert!(classify_present(Ok(false)).is_ok());
        assert!(classify_present(Ok(true)).is_ok());
        assert!(classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).is_ok());
        assert!(matches!(
            classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Err(GpuError::VulkanCall {
                result: vk::Result::ERROR_SURFACE_LOST_KHR,
                ..
            })
        ));
        assert!(matches!(
            classify_present(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(GpuError::DeviceLost(_))
        ));
    }

    #[test]
    fn not_ready_keeps_image_index() {
        let mut state = SwapchainState {
            status: SwapchainStatus::Ready,
            ..Default::default()
        };
        assert!(state.apply_acquire(AcquireOutcome::Acquired(1)));
        assert_eq!(state.image_index, 1);

        assert!(!state.apply_acquire(AcquireOutcome::OutOfDate));
        assert_eq!(state.image_index, 1);
        assert_eq!(state.status, SwapchainStatus::NeedsRecreate);

        assert!(!state.apply_acquire(AcquireOutcome::Suboptimal));
        assert_eq!(state.image_index, 1);
    }

    #[test]
    fn present_advances_every_swapchain() {
        let mut states = [SwapchainState::default(); 3];
        let results = [
            vk::Result::SUCCESS,
            vk::Result::SUBOPTIMAL_KHR,
            vk::Result::ERROR_OUT_OF_DATE_KHR,
        ];
        for (state, &result) in states.iter_mut().zip(&results) {
            state.apply_present(result);
        }

        for state in &states {
            assert_eq!(state.frame.frame(), 1);
            assert_eq!(state.frame.slot(), 1);
        }
        assert_ne!(states[0].status, SwapchainStatus::NeedsRecreate);
        assert_eq!(states[1].status, SwapchainStatus::NeedsRecreate);
        assert_eq!(states[2].status, SwapchainStatus::NeedsRecreate);
    }

    #[test]
    fn slot_wraps_after_ring() {
        let mut state = SwapchainState::default();
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            state.apply_present(vk::Result::SUCCESS);
        }
        assert_eq!(state.frame.slot(), 0);
    }
}
