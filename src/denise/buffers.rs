use crate::consts::PIXEL_BUFFER_LEN;

/// The three per-line buffers. Index `i` refers to the same horizontal position
/// in all of them.
pub struct LineBuffers {
    /// Raw bitplane indices as produced by the shift registers.
    pub raw: Vec<u8>,
    /// Color register indices handed to the color stage.
    pub color: Vec<u8>,
    /// Depth tag of the layer owning each pixel.
    pub depth: Vec<u16>,
}

impl LineBuffers {
    #[must_use]
    pub fn new() -> Self {
        Self {
            raw: vec![0; PIXEL_BUFFER_LEN],
            color: vec![0; PIXEL_BUFFER_LEN],
            depth: vec![0; PIXEL_BUFFER_LEN],
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn clear(&mut self) {
        self.raw.fill(0);
        self.color.fill(0);
        self.depth.fill(0);
    }

    /// Moves the color indices computed past `line_end` to the start of the
    /// buffer and zeroes their old location.
    pub fn wrap_tail(&mut self, line_end: usize) {
        let len = self.color.len();
        if line_end >= len {
            return;
        }
        self.color.copy_within(line_end..len, 0);
        self.color[line_end..].fill(0);
    }
}

impl Default for LineBuffers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::HPIXELS;

    #[test]
    fn all_buffers_share_one_length() {
        let b = LineBuffers::new();
        assert_eq!(b.raw.len(), b.color.len());
        assert_eq!(b.raw.len(), b.depth.len());
        assert_eq!(b.len(), PIXEL_BUFFER_LEN);
    }

    #[test]
    fn wrap_tail_moves_prefetched_pixels_to_line_start() {
        let mut b = LineBuffers::new();
        b.color[0] = 9;
        b.color[HPIXELS] = 3;
        b.color[HPIXELS + 1] = 4;

        b.wrap_tail(HPIXELS);

        assert_eq!(&b.color[0..3], &[3, 4, 0]);
        assert!(b.color[HPIXELS..].iter().all(|&c| c == 0));
    }
}
