use ndarray::ArrayView3;

/// A single video/image frame: contiguous pixel bytes in row-major order.
///
/// Frames are RGB (`channels == 3`) everywhere past the I/O boundary.
/// The pipeline takes a frame by value, annotates it in place and hands
/// it back, so no pixel copy is made per processing step.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// A uniformly filled RGB frame.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], index: usize) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(data, width, height, 3, index)
    }

    pub fn from_rgb_image(image: image::RgbImage, index: usize) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, 3, index)
    }

    /// Copies the pixels into an `image::RgbImage`.
    ///
    /// Returns `None` unless the frame has exactly three channels.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        if self.channels != 3 {
            return None;
        }
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    /// `(width, height)` as signed pixel coordinates.
    pub fn bounds(&self) -> (i32, i32) {
        (self.width as i32, self.height as i32)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies out the `w` x `h` rectangle at `(x, y)`.
    ///
    /// The rectangle is intersected with the frame first; a rectangle that
    /// lies completely outside yields an empty (0x0) frame.
    pub fn crop(&self, x: i32, y: i32, w: i32, h: i32) -> Frame {
        let x0 = x.clamp(0, self.width as i32) as usize;
        let y0 = y.clamp(0, self.height as i32) as usize;
        let x1 = (x.saturating_add(w)).clamp(0, self.width as i32) as usize;
        let y1 = (y.saturating_add(h)).clamp(0, self.height as i32) as usize;
        if x1 <= x0 || y1 <= y0 {
            return Frame::new(Vec::new(), 0, 0, self.channels, self.index);
        }

        let c = self.channels as usize;
        let stride = self.width as usize * c;
        let row_len = (x1 - x0) * c;
        let mut data = Vec::with_capacity(row_len * (y1 - y0));
        for row in y0..y1 {
            let start = row * stride + x0 * c;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }
        Frame::new(
            data,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
            self.channels,
            self.index,
        )
    }

    /// BT.601 luma, one byte per pixel.
    pub fn to_grayscale(&self) -> Vec<u8> {
        if self.channels < 3 {
            return self
                .data
                .chunks_exact(self.channels.max(1) as usize)
                .map(|px| px[0])
                .collect();
        }
        let view = self.as_ndarray();
        let mut gray = Vec::with_capacity(self.width as usize * self.height as usize);
        for row in view.outer_iter() {
            for px in row.outer_iter() {
                let luma = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                gray.push(luma.round().min(255.0) as u8);
            }
        }
        gray
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
