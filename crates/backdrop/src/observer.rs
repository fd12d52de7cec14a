use winit::dpi::PhysicalSize;

use crate::backend::Host;

pub const MIN_CONTENT_SIZE: PhysicalSize<u32> = PhysicalSize::new(500, 500);

/// Polls a host for content-size changes and clamps them to a minimum.
#[derive(Debug, Clone)]
pub struct ResizeObserver {
    min: PhysicalSize<u32>,
    last: Option<PhysicalSize<u32>>,
}

impl ResizeObserver {
    pub fn new(min: PhysicalSize<u32>) -> Self {
        Self { min, last: None }
    }

    pub fn min_size(&self) -> PhysicalSize<u32> {
        self.min
    }

    pub fn last(&self) -> Option<PhysicalSize<u32>> {
        self.last
    }

    pub fn clamp(&self, size: PhysicalSize<u32>) -> PhysicalSize<u32> {
        PhysicalSize::new(
            size.width.max(self.min.width),
            size.height.max(self.min.height),
        )
    }

    /// Reads and records the clamped host size unconditionally.
    pub fn observe<H: Host + ?Sized>(&mut self, host: &H) -> PhysicalSize<u32> {
        let size = self.clamp(host.content_size());
        self.last = Some(size);
        size
    }

    /// Returns the clamped host size if it differs from the last one seen.
    pub fn poll<H: Host + ?Sized>(&mut self, host: &H) -> Option<PhysicalSize<u32>> {
        let size = self.clamp(host.content_size());
        if self.last == Some(size) {
            return None;
        }
        self.last = Some(size);
        Some(size)
    }
}

impl Default for ResizeObserver {
    fn default() -> Self {
        Self::new(MIN_CONTENT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeHost;

    #[test]
    fn tiny_hosts_are_clamped_to_minimum() {
        let host = FakeHost::new(10, 10);
        let mut observer = ResizeObserver::default();
        assert_eq!(observer.observe(&host), PhysicalSize::new(500, 500));

        host.set_size(1920, 300);
        assert_eq!(observer.poll(&host), Some(PhysicalSize::new(1920, 500)));
    }

    #[test]
    fn poll_reports_only_changes() {
        let host = FakeHost::new(800, 600);
        let mut observer = ResizeObserver::default();
        assert_eq!(observer.poll(&host), Some(PhysicalSize::new(800, 600)));
        assert_eq!(observer.poll(&host), None);

        // Both sizes clamp to the same value.
        host.set_size(400, 400);
        assert_eq!(observer.poll(&host), Some(PhysicalSize::new(500, 500)));
        host.set_size(300, 200);
        assert_eq!(observer.poll(&host), None);
    }
}
