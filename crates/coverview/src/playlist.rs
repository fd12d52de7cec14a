use std::time::{Duration, Instant};

use backdropconfig::ResolvedImage;

/// Cycles through resolved images on a fixed interval.
#[derive(Debug)]
pub struct Playlist {
    images: Vec<ResolvedImage>,
    interval: Duration,
    index: Option<usize>,
    next_switch: Option<Instant>,
}

impl Playlist {
    pub fn new(images: Vec<ResolvedImage>, interval: Duration) -> Self {
        Self {
            images,
            interval,
            index: None,
            next_switch: None,
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn current(&self) -> Option<&ResolvedImage> {
        self.index.and_then(|index| self.images.get(index))
    }

    /// Makes the next [`Playlist::advance`] start at `handle` if it is listed.
    pub fn resume_from(&mut self, handle: &str) -> bool {
        let len = self.images.len();
        match self.images.iter().position(|image| image.handle == handle) {
            Some(position) => {
                self.index = Some((position + len - 1) % len);
                true
            }
            None => false,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_switch
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next_switch.is_some_and(|deadline| now >= deadline)
    }

    /// Moves to the next image for which `skip` is false and schedules the
    /// following switch. Returns `None` when every image is skipped.
    pub fn advance<F>(&mut self, now: Instant, mut skip: F) -> Option<ResolvedImage>
    where
        F: FnMut(&str) -> bool,
    {
        let len = self.images.len();
        if len == 0 {
            return None;
        }
        let start = self.index.map_or(0, |index| (index + 1) % len);
        self.next_switch = (len > 1).then(|| now + self.interval);
        for offset in 0..len {
            let candidate = (start + offset) % len;
            if !skip(&self.images[candidate].handle) {
                self.index = Some(candidate);
                return Some(self.images[candidate].clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(handle: &str) -> ResolvedImage {
        ResolvedImage {
            handle: handle.to_string(),
            hue_shift: 0.0,
            blur: 40.0,
            rotation_speed: 1.0,
        }
    }

    fn playlist(handles: &[&str]) -> Playlist {
        Playlist::new(
            handles.iter().map(|handle| image(handle)).collect(),
            Duration::from_secs(10),
        )
    }

    fn handle(image: Option<ResolvedImage>) -> Option<String> {
        image.map(|image| image.handle)
    }

    #[test]
    fn cycles_in_order_and_wraps() {
        let mut list = playlist(&["a", "b", "c"]);
        let now = Instant::now();
        assert!(!list.is_due(now));
        assert_eq!(handle(list.advance(now, |_| false)).as_deref(), Some("a"));
        assert_eq!(handle(list.advance(now, |_| false)).as_deref(), Some("b"));
        assert_eq!(handle(list.advance(now, |_| false)).as_deref(), Some("c"));
        assert_eq!(handle(list.advance(now, |_| false)).as_deref(), Some("a"));
        assert_eq!(list.current().map(|image| image.handle.as_str()), Some("a"));
    }

    #[test]
    fn schedules_next_switch_after_interval() {
        let mut list = playlist(&["a", "b"]);
        let now = Instant::now();
        list.advance(now, |_| false);
        assert_eq!(list.next_deadline(), Some(now + Duration::from_secs(10)));
        assert!(!list.is_due(now + Duration::from_secs(9)));
        assert!(list.is_due(now + Duration::from_secs(10)));
    }

    #[test]
    fn single_image_never_schedules_a_switch() {
        let mut list = playlist(&["only"]);
        let now = Instant::now();
        assert_eq!(handle(list.advance(now, |_| false)).as_deref(), Some("only"));
        assert_eq!(list.next_deadline(), None);
    }

    #[test]
    fn skips_failed_images() {
        let mut list = playlist(&["a", "b", "c"]);
        let now = Instant::now();
        assert_eq!(handle(list.advance(now, |h| h == "a")).as_deref(), Some("b"));
        assert_eq!(handle(list.advance(now, |h| h != "a")).as_deref(), Some("a"));
        assert_eq!(list.advance(now, |_| true), None);
        assert_eq!(list.current().map(|image| image.handle.as_str()), Some("a"));
    }

    #[test]
    fn resumes_from_remembered_image() {
        let mut list = playlist(&["a", "b", "c"]);
        assert!(list.resume_from("c"));
        assert_eq!(handle(list.advance(Instant::now(), |_| false)).as_deref(), Some("c"));
        assert!(!list.resume_from("missing"));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn empty_playlist_yields_nothing() {
        let mut list = playlist(&[]);
        assert_eq!(list.advance(Instant::now(), |_| false), None);
        assert_eq!(list.next_deadline(), None);
    }
}
