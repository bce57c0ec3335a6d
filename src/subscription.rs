//! Subscription - polls the images of one stream round-robin.

use tracing::debug;

use crate::image::Image;
use crate::logbuffer::Header;

/// A set of images for one stream id.
#[derive(Debug)]
pub struct Subscription {
    stream_id: i32,
    images: Vec<Image>,
    round_robin_index: usize,
    closed: bool,
}

impl Subscription {
    /// Empty subscription for `stream_id`.
    pub fn new(stream_id: i32) -> Self {
        Self {
            stream_id,
            images: Vec::new(),
            round_robin_index: 0,
            closed: false,
        }
    }

    /// Add an image. Images of other streams, or added after close, are dropped.
    pub fn add_image(&mut self, image: Image) {
        if self.closed || image.stream_id() != self.stream_id {
            debug!(
                stream_id = self.stream_id,
                image_stream_id = image.stream_id(),
                "image rejected"
            );
            return;
        }
        self.images.push(image);
    }

    /// Remove and return the image of `session_id`.
    pub fn remove_image(&mut self, session_id: i32) -> Option<Image> {
        let index = self
            .images
            .iter()
            .position(|image| image.session_id() == session_id)?;
        Some(self.images.remove(index))
    }

    /// Poll every image, starting with the next one in turn, until
    /// `fragment_limit` fragments were consumed in total.
    pub fn poll<F>(&mut self, mut handler: F, fragment_limit: usize) -> usize
    where
        F: FnMut(&[u8], &Header),
    {
        if self.closed || self.images.is_empty() {
            return 0;
        }

        let length = self.images.len();
        let start = self.round_robin_index % length;
        self.round_robin_index = (start + 1) % length;

        let mut fragments = 0;
        for i in 0..length {
            if fragments >= fragment_limit {
                break;
            }
            let image = &mut self.images[(start + i) % length];
            fragments += image.poll(&mut handler, fragment_limit - fragments);
        }
        fragments
    }

    #[inline]
    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }

    /// Number of images.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Image by session id.
    pub fn image_by_session_id(&mut self, session_id: i32) -> Option<&mut Image> {
        self.images
            .iter_mut()
            .find(|image| image.session_id() == session_id)
    }

    /// All images.
    pub fn images(&self) -> &[Image] {
        &self.images
    }

    /// Whether any image is still open.
    pub fn is_connected(&self) -> bool {
        !self.closed && self.images.iter().any(|image| !image.is_closed())
    }

    /// Close every image; later polls return 0.
    pub fn close(&mut self) {
        if !self.closed {
            for image in &mut self.images {
                image.close();
            }
            self.images.clear();
            self.closed = true;
            debug!(stream_id = self.stream_id, "subscription closed");
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::Publication;

    #[test]
    fn test_round_robin_over_images() {
        let config = TransportConfig::default();
        let first = Publication::new(&config, 1, 5).unwrap();
        let second = Publication::new(&config, 2, 5).unwrap();

        let mut subscription = Subscription::new(5);
        subscription.add_image(first.image());
        subscription.add_image(second.image());
        assert_eq!(subscription.image_count(), 2);

        for _ in 0..3 {
            first.offer(b"f");
            second.offer(b"s");
        }

        let mut sessions = Vec::new();
        let fragments = subscription.poll(|_, header| sessions.push(header.session_id()), 4);
        assert_eq!(fragments, 4);
        assert_eq!(sessions, vec![1, 1, 1, 2]);

        let mut sessions = Vec::new();
        subscription.poll(|_, header| sessions.push(header.session_id()), 4);
        assert_eq!(sessions, vec![2, 2]);
    }

    #[test]
    fn test_rejects_other_stream() {
        let publication = Publication::new(&TransportConfig::default(), 1, 9).unwrap();
        let mut subscription = Subscription::new(5);
        subscription.add_image(publication.image());
        assert_eq!(subscription.image_count(), 0);
        assert!(!publication.is_connected());
    }

    #[test]
    fn test_close_deregisters() {
        let publication = Publication::new(&TransportConfig::default(), 1, 5).unwrap();
        let mut subscription = Subscription::new(5);
        subscription.add_image(publication.image());
        assert!(subscription.is_connected());
        assert!(publication.is_connected());

        publication.offer(b"x");
        subscription.close();
        assert!(!publication.is_connected());
        assert_eq!(subscription.poll(|_, _| panic!("closed"), 10), 0);
        assert!(!subscription.is_connected());
    }
}
