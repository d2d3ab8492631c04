use ardubridge_core::driver::{DriverError, DriverParams, VideoDriver};
use ardubridge_core::frame::{Frame, PixelFormat, convert_to_xrgb8888};
use ardubridge_core::registry::DriverSpec;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{BlendMode, Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};

use crate::overlay::{self, FpsCounter};
use crate::sdl;

/// Alpha-less texture formats: cores leave the X byte of XRGB8888 undefined.
fn texture_format(format: PixelFormat) -> PixelFormatEnum {
    match format {
        PixelFormat::Rgb1555 => PixelFormatEnum::RGB555,
        PixelFormat::Xrgb8888 => PixelFormatEnum::RGB888,
        PixelFormat::Rgb565 => PixelFormatEnum::RGB565,
    }
}

fn backend(what: &str, e: impl std::fmt::Display) -> DriverError {
    DriverError::Backend(format!("{what}: {e}"))
}

/// Window with a streaming texture scaled to fill it.
pub struct SdlVideo {
    lease: sdl::Lease,
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    fps: Option<FpsCounter>,
    scratch: Vec<u8>,
}

impl SdlVideo {
    /// Open a window `scale` times the core's base resolution.
    pub fn new(params: &DriverParams<'_>) -> Result<Self, DriverError> {
        let lease = sdl::Lease::acquire()?;
        let video = lease
            .sdl()
            .video()
            .map_err(|e| DriverError::Unavailable(format!("SDL video: {e}")))?;

        let opts = &params.options.video;
        let geometry = params.av.geometry;
        let scale = opts.scale.max(1);
        let width = geometry.base_width.max(1) * scale;
        let height = (width as f32 / geometry.aspect_ratio()).round().max(1.0) as u32;

        let window = video
            .window(&opts.title, width, height)
            .position_centered()
            .resizable()
            .build()
            .map_err(|e| DriverError::Unavailable(format!("window: {e}")))?;

        let canvas = window
            .into_canvas()
            .accelerated()
            .build()
            .map_err(|e| DriverError::Unavailable(format!("renderer: {e}")))?;

        let texture_creator = canvas.texture_creator();
        log::info!("SDL window {width}x{height} (scale {scale})");

        Ok(Self {
            lease,
            canvas,
            texture_creator,
            fps: opts.show_fps.then(FpsCounter::new),
            scratch: Vec::new(),
        })
    }

    fn upload(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
        pitch: usize,
        data: &[u8],
    ) -> Result<(), DriverError> {
        let mut texture = self
            .texture_creator
            .create_texture_streaming(texture_format(format), width, height)
            .map_err(|e| backend("texture", e))?;
        texture.set_blend_mode(BlendMode::None);
        texture
            .update(None, data, pitch)
            .map_err(|e| backend("texture update", e))?;

        self.canvas.clear();
        self.canvas
            .copy(&texture, None, None)
            .map_err(|e| backend("copy", e))?;
        self.canvas.present();
        Ok(())
    }
}

impl VideoDriver for SdlVideo {
    fn accepts(&self, _format: PixelFormat) -> bool {
        true
    }

    fn present(&mut self, frame: &Frame<'_>) -> Result<(), DriverError> {
        sdl::with_events(|events| events.pump_events())?;

        if let Some(fps) = self.fps.as_mut() {
            let text = fps.tick().to_string();
            let mut buffer = std::mem::take(&mut self.scratch);
            convert_to_xrgb8888(frame, &mut buffer);
            overlay::draw_text(&mut buffer, frame.width as usize, &text);
            let result = self.upload(
                PixelFormat::Xrgb8888,
                frame.width,
                frame.height,
                frame.width as usize * 4,
                &buffer,
            );
            self.scratch = buffer;
            return result;
        }

        // Texture updates want whole rows, including the last row's padding.
        let full = frame.pitch * frame.height as usize;
        if frame.data.len() >= full {
            return self.upload(
                frame.format,
                frame.width,
                frame.height,
                frame.pitch,
                &frame.data[..full],
            );
        }
        let mut buffer = std::mem::take(&mut self.scratch);
        buffer.clear();
        buffer.extend_from_slice(frame.data);
        buffer.resize(full, 0);
        let result = self.upload(frame.format, frame.width, frame.height, frame.pitch, &buffer);
        self.scratch = buffer;
        result
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        self.canvas.window_mut().hide();
        self.lease.release();
        Ok(())
    }
}

fn create(params: &DriverParams<'_>) -> Result<Box<dyn VideoDriver>, DriverError> {
    Ok(Box::new(SdlVideo::new(params)?))
}

inventory::submit! {
    DriverSpec::video("sdl", "SDL2 window", create)
}
