use crate::shared::frame::Frame;
use crate::video::domain::frame_source::{FrameSource, SourceInfo};

/// Decodes frames from any libavformat input via ffmpeg-next.
///
/// `input` is a file path or URL, or a capture device name when an input
/// `format` such as `v4l2` or `avfoundation` is given. Every decoded frame
/// is converted to RGB24 and, when a target size is set, scaled to it.
pub struct FfmpegFrameSource {
    input: String,
    format: Option<String>,
    size: Option<(u32, u32)>,
    decoding: Option<Decoding>,
}

// Safety: FfmpegFrameSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegFrameSource {}

struct Decoding {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

impl FfmpegFrameSource {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            format: None,
            size: None,
            decoding: None,
        }
    }

    /// Opens `device` through the named ffmpeg input device format.
    pub fn device(format: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            format: Some(format.into()),
            ..Self::new(device)
        }
    }

    /// Scales every frame to `width` x `height`.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    fn open_input(&self) -> Result<ffmpeg_next::format::context::Input, Box<dyn std::error::Error>> {
        let Some(format_name) = self.format.as_deref() else {
            return Ok(ffmpeg_next::format::input(&self.input)?);
        };

        ffmpeg_next::device::register_all();
        let format = ffmpeg_next::device::input::video()
            .find(|f| f.name() == format_name)
            .ok_or_else(|| format!("unknown capture format: {format_name}"))?;

        let mut options = ffmpeg_next::Dictionary::new();
        if let Some((w, h)) = self.size {
            options.set("video_size", &format!("{w}x{h}"));
        }

        let ctx = ffmpeg_next::format::open_with(
            &self.input,
            &ffmpeg_next::format::format::Format::Input(format),
            options,
        )?;
        match ctx {
            ffmpeg_next::format::context::Context::Input(ictx) => Ok(ictx),
            ffmpeg_next::format::context::Context::Output(_) => {
                Err(format!("{} is not an input", self.input).into())
            }
        }
    }
}

impl FrameSource for FfmpegFrameSource {
    fn open(&mut self) -> Result<SourceInfo, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        self.close();

        let ictx = self.open_input()?;
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;

        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let frames = stream.frames();
        let total_frames = (frames > 0).then_some(frames as usize);

        let (width, height) = self.size.unwrap_or((decoder.width(), decoder.height()));
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        let info = SourceInfo {
            width,
            height,
            fps,
            total_frames,
            description: format!(
                "{} ({})",
                self.input,
                decoder
                    .codec()
                    .map(|c| c.name().to_string())
                    .unwrap_or_default()
            ),
        };

        self.decoding = Some(Decoding {
            ictx,
            decoder,
            scaler,
            stream_index,
            width,
            height,
            frame_index: 0,
            flushing: false,
            done: false,
        });

        Ok(info)
    }

    fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let decoding = self
            .decoding
            .as_mut()
            .ok_or("FfmpegFrameSource: not opened")?;
        decoding.next_frame()
    }

    fn close(&mut self) {
        self.decoding = None;
    }
}

impl Decoding {
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if self.done {
            return Ok(None);
        }

        if let Some(frame) = self.try_receive()? {
            return Ok(Some(frame));
        }

        if self.flushing {
            self.done = true;
            return Ok(None);
        }

        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                if let Some(frame) = self.try_receive()? {
                    return Ok(Some(frame));
                }
                self.done = true;
                return Ok(None);
            };

            if stream.index() != self.stream_index {
                continue;
            }

            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
        }
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler.run(&decoded, &mut rgb_frame)?;

        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping the per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    /// Encodes `num_frames` solid-gray MPEG-4 frames whose brightness
    /// steps by 40 per frame.
    fn create_test_video(path: &Path, num_frames: usize, width: u32, height: u32, fps: i32) {
        ffmpeg_next::init().unwrap();

        let mut octx = ffmpeg_next::format::output(path).unwrap();
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
        let mut ost = octx.add_stream(Some(codec)).unwrap();

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();
        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let mut encoder = encoder_ctx
            .open_with(ffmpeg_next::Dictionary::new())
            .unwrap();
        ost.set_parameters(&encoder);
        octx.write_header().unwrap();
        let ost_time_base = octx.stream(0).unwrap().time_base();

        let mut scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .unwrap();

        for i in 0..num_frames {
            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
            );
            let stride = rgb_frame.stride(0);
            let data = rgb_frame.data_mut(0);
            let value = ((i * 40) % 256) as u8;
            for row in 0..height as usize {
                let start = row * stride;
                data[start..start + width as usize * 3].fill(value);
            }

            let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
            scaler.run(&rgb_frame, &mut yuv_frame).unwrap();
            yuv_frame.set_pts(Some(i as i64));
            encoder.send_frame(&yuv_frame).unwrap();

            let mut encoded = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut encoded).is_ok() {
                encoded.set_stream(0);
                encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
                encoded.write_interleaved(&mut octx).unwrap();
            }
        }

        encoder.send_eof().unwrap();
        let mut encoded = ffmpeg_next::Packet::empty();
        while encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
            encoded.write_interleaved(&mut octx).unwrap();
        }
        octx.write_trailer().unwrap();
    }

    fn test_video(dir: &Path, frames: usize) -> PathBuf {
        let path = dir.join("test.mp4");
        create_test_video(&path, frames, 160, 120, 30);
        path
    }

    fn source_for(path: &Path) -> FfmpegFrameSource {
        FfmpegFrameSource::new(path.to_string_lossy())
    }

    fn read_all(source: &mut FfmpegFrameSource) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = source.read().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_open_reports_source_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video(dir.path(), 5);

        let info = source_for(&path).open().unwrap();
        assert_eq!((info.width, info.height), (160, 120));
        assert!(info.fps > 0.0);
        assert!(info.description.contains("test.mp4"));
    }

    #[test]
    fn test_open_nonexistent_fails() {
        let mut source = FfmpegFrameSource::new("/nonexistent/test.mp4");
        assert!(source.open().is_err());
    }

    #[test]
    fn test_open_unknown_device_format_fails() {
        let mut source = FfmpegFrameSource::device("no-such-format", "0");
        assert!(source.open().is_err());
    }

    #[test]
    fn test_reads_every_frame_then_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video(dir.path(), 5);

        let mut source = source_for(&path);
        source.open().unwrap();
        let frames = read_all(&mut source);
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index(), i);
            assert_eq!(frame.channels(), 3);
            assert_eq!(frame.data().len(), 160 * 120 * 3);
        }
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn test_frames_are_scaled_to_requested_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video(dir.path(), 2);

        let mut source = source_for(&path).with_size(80, 60);
        let info = source.open().unwrap();
        assert_eq!((info.width, info.height), (80, 60));

        let frame = source.read().unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (80, 60));
        assert_eq!(frame.data().len(), 80 * 60 * 3);
    }

    #[test]
    fn test_read_without_open_fails() {
        let mut source = FfmpegFrameSource::new("unused.mp4");
        assert!(source.read().is_err());
    }

    #[test]
    fn test_close_is_idempotent_and_stops_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video(dir.path(), 1);

        let mut source = source_for(&path);
        source.open().unwrap();
        source.close();
        source.close();
        assert!(source.read().is_err());
    }
}
