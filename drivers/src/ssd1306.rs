//! SSD1306 monochrome OLED panel on a Linux i2c-dev bus.
//!
//! Frames are thresholded to one bit per pixel and packed into the
//! controller's page layout (eight vertical pixels per byte, LSB on top).
//! The I2C transfer runs on a writer thread fed through a one-slot mailbox:
//! `present` only packs and hands over, and a frame arriving while the
//! previous one is still being written is dropped.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::path::Path;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use ardubridge_core::driver::{DriverError, DriverParams, VideoDriver};
use ardubridge_core::frame::{Frame, PixelFormat, luma};
use ardubridge_core::options::PanelOptions;
use ardubridge_core::registry::DriverSpec;

/// `I2C_SLAVE` from `linux/i2c-dev.h`.
const I2C_SLAVE: libc::c_ulong = 0x0703;

/// Control byte: the rest of the transfer is commands.
const CONTROL_COMMAND: u8 = 0x00;
/// Control byte: the rest of the transfer is display RAM data.
const CONTROL_DATA: u8 = 0x40;
/// Display RAM bytes per I2C transfer.
const DATA_CHUNK: usize = 32;

const DISPLAY_OFF: u8 = 0xAE;
const DISPLAY_ON: u8 = 0xAF;

/// Byte sink for one panel.
pub trait PanelBus: Send + 'static {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// `/dev/i2c-N` bound to one slave address.
pub struct I2cDev {
    file: File,
}

impl I2cDev {
    pub fn open(path: &Path, address: u16) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        // SAFETY: I2C_SLAVE takes the address as an integer argument and
        // only touches the descriptor's bus state.
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE as _, address as libc::c_ulong) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { file })
    }
}

impl PanelBus for I2cDev {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }
}

/// Controller protocol over a [`PanelBus`].
pub struct Panel<B> {
    bus: B,
    width: u32,
    height: u32,
}

impl<B: PanelBus> Panel<B> {
    pub fn new(bus: B, width: u32, height: u32) -> Self {
        Self { bus, width, height }
    }

    fn command(&mut self, cmds: &[u8]) -> io::Result<()> {
        let mut buf = Vec::with_capacity(cmds.len() + 1);
        buf.push(CONTROL_COMMAND);
        buf.extend_from_slice(cmds);
        self.bus.write(&buf)
    }

    /// Power-on sequence for the internal charge pump configuration.
    pub fn init(&mut self, contrast: u8, flip: bool) -> io::Result<()> {
        let com_pins = if self.height == 64 { 0x12 } else { 0x02 };
        let (segment_remap, com_scan) = if flip { (0xA0, 0xC0) } else { (0xA1, 0xC8) };
        self.command(&[
            DISPLAY_OFF,
            0xD5, 0x80, // clock divide
            0xA8, (self.height - 1) as u8, // multiplex
            0xD3, 0x00, // display offset
            0x40, // start line 0
            0x8D, 0x14, // charge pump on
            0x20, 0x00, // horizontal addressing
            segment_remap,
            com_scan,
            0xDA, com_pins,
            0x81, contrast,
            0xD9, 0xF1, // pre-charge
            0xDB, 0x40, // VCOMH deselect
            0xA4, // follow RAM
            0xA6, // normal polarity
            DISPLAY_ON,
        ])
    }

    /// Write a full page-packed frame buffer.
    pub fn flush(&mut self, pages: &[u8]) -> io::Result<()> {
        let last_page = (self.height / 8 - 1) as u8;
        self.command(&[0x21, 0x00, (self.width - 1) as u8, 0x22, 0x00, last_page])?;
        let mut buf = Vec::with_capacity(DATA_CHUNK + 1);
        for chunk in pages.chunks(DATA_CHUNK) {
            buf.clear();
            buf.push(CONTROL_DATA);
            buf.extend_from_slice(chunk);
            self.bus.write(&buf)?;
        }
        Ok(())
    }

    pub fn power_off(&mut self) -> io::Result<()> {
        self.command(&[DISPLAY_OFF])
    }
}

/// Threshold `frame` into page layout for a `width` x `height` panel,
/// scaling with nearest-neighbour sampling.
pub fn pack_pages(frame: &Frame<'_>, opts: &PanelOptions, out: &mut Vec<u8>) {
    let (w, h) = (opts.width as usize, opts.height as usize);
    out.clear();
    out.resize(w * h / 8, 0);
    if frame.width == 0 || frame.height == 0 {
        return;
    }

    for page in 0..h / 8 {
        for x in 0..w {
            let sx = (x * frame.width as usize / w) as u32;
            let mut byte = 0u8;
            for bit in 0..8 {
                let y = page * 8 + bit;
                let sy = (y * frame.height as usize / h) as u32;
                let (r, g, b) = frame.rgb(sx, sy);
                if (luma(r, g, b) > opts.threshold) != opts.invert {
                    byte |= 1 << bit;
                }
            }
            out[page * w + x] = byte;
        }
    }
}

type WriteError = Arc<Mutex<Option<String>>>;

/// Panel video driver.
pub struct Ssd1306 {
    opts: PanelOptions,
    mailbox: Option<SyncSender<Vec<u8>>>,
    writer: Option<JoinHandle<()>>,
    error: WriteError,
    packed: Vec<u8>,
    last_sent: Vec<u8>,
    dropped: u64,
}

impl Ssd1306 {
    pub fn new(params: &DriverParams<'_>) -> Result<Self, DriverError> {
        let opts = &params.options.panel;
        let bus = I2cDev::open(&opts.device, opts.address).map_err(|e| {
            DriverError::Unavailable(format!(
                "{} at {:#04x}: {e}",
                opts.device.display(),
                opts.address
            ))
        })?;
        Self::with_bus(bus, opts.clone())
    }

    /// Drive a panel on an already opened bus.
    pub fn with_bus(bus: impl PanelBus, opts: PanelOptions) -> Result<Self, DriverError> {
        if opts.width == 0 || opts.width > 128 || opts.height % 8 != 0 || opts.height == 0 {
            return Err(DriverError::Unsupported(format!(
                "panel size {}x{}",
                opts.width, opts.height
            )));
        }

        let mut panel = Panel::new(bus, opts.width, opts.height);
        panel.init(opts.contrast, opts.flip)?;
        log::info!(
            "SSD1306 {}x{} on {} (threshold {})",
            opts.width,
            opts.height,
            opts.device.display(),
            opts.threshold
        );

        let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(1);
        let error: WriteError = Arc::new(Mutex::new(None));
        let writer_error = Arc::clone(&error);
        let writer = thread::Builder::new()
            .name("ssd1306-writer".into())
            .spawn(move || {
                for pages in rx {
                    if let Err(e) = panel.flush(&pages) {
                        log::error!("panel write failed: {e}");
                        let mut slot = writer_error.lock().unwrap_or_else(PoisonError::into_inner);
                        *slot = Some(e.to_string());
                        return;
                    }
                }
                if let Err(e) = panel.power_off() {
                    log::warn!("panel power off failed: {e}");
                }
            })?;

        Ok(Self {
            opts,
            mailbox: Some(tx),
            writer: Some(writer),
            error,
            packed: Vec::new(),
            last_sent: Vec::new(),
            dropped: 0,
        })
    }

    fn take_error(&self) -> Option<String> {
        self.error.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl VideoDriver for Ssd1306 {
    fn accepts(&self, _format: PixelFormat) -> bool {
        true
    }

    fn present(&mut self, frame: &Frame<'_>) -> Result<(), DriverError> {
        if let Some(e) = self.take_error() {
            return Err(DriverError::Io(io::Error::other(e)));
        }
        pack_pages(frame, &self.opts, &mut self.packed);
        if self.packed == self.last_sent {
            return Ok(());
        }
        let Some(mailbox) = &self.mailbox else {
            return Err(DriverError::Backend("panel writer stopped".into()));
        };
        match mailbox.try_send(self.packed.clone()) {
            Ok(()) => {
                self.last_sent.clone_from(&self.packed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(DriverError::Backend("panel writer stopped".into()))
            }
        }
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        self.mailbox = None;
        if let Some(writer) = self.writer.take()
            && writer.join().is_err()
        {
            return Err(DriverError::Panicked("panel writer".into()));
        }
        log::debug!("SSD1306 closed ({} frames skipped while busy)", self.dropped);
        match self.take_error() {
            Some(e) => Err(DriverError::Io(io::Error::other(e))),
            None => Ok(()),
        }
    }
}

fn create(params: &DriverParams<'_>) -> Result<Box<dyn VideoDriver>, DriverError> {
    Ok(Box::new(Ssd1306::new(params)?))
}

inventory::submit! {
    DriverSpec::video("ssd1306", "SSD1306 OLED over Linux i2c-dev", create)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct MockBus(Arc<Mutex<Vec<Vec<u8>>>>);

    impl PanelBus for MockBus {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.0.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }
    }

    fn xrgb(width: u32, height: u32, lit: &[(u32, u32)]) -> Vec<u8> {
        let mut data = vec![0u8; (width * height * 4) as usize];
        for &(x, y) in lit {
            let o = ((y * width + x) * 4) as usize;
            data[o..o + 4].copy_from_slice(&0xFFFF_FFFFu32.to_ne_bytes());
        }
        data
    }

    #[test]
    fn pixels_pack_into_pages_lsb_on_top() {
        let data = xrgb(128, 64, &[(0, 0), (1, 9), (127, 63)]);
        let frame = Frame::new(&data, 128, 64, 128 * 4, PixelFormat::Xrgb8888).unwrap();
        let mut out = Vec::new();
        pack_pages(&frame, &PanelOptions::default(), &mut out);

        assert_eq!(out.len(), 1024);
        assert_eq!(out[0], 0b0000_0001);
        assert_eq!(out[128 + 1], 0b0000_0010);
        assert_eq!(out[7 * 128 + 127], 0b1000_0000);
        assert_eq!(out.iter().filter(|b| **b != 0).count(), 3);
    }

    #[test]
    fn invert_flips_every_bit() {
        let data = xrgb(128, 64, &[]);
        let frame = Frame::new(&data, 128, 64, 128 * 4, PixelFormat::Xrgb8888).unwrap();
        let opts = PanelOptions {
            invert: true,
            ..PanelOptions::default()
        };
        let mut out = Vec::new();
        pack_pages(&frame, &opts, &mut out);
        assert!(out.iter().all(|b| *b == 0xFF));
    }

    #[test]
    fn half_size_frames_are_scaled_up() {
        let data = xrgb(64, 32, &[(0, 0)]);
        let frame = Frame::new(&data, 64, 32, 64 * 4, PixelFormat::Xrgb8888).unwrap();
        let mut out = Vec::new();
        pack_pages(&frame, &PanelOptions::default(), &mut out);
        // One source pixel covers a 2x2 block.
        assert_eq!(out[0], 0b0000_0011);
        assert_eq!(out[1], 0b0000_0011);
        assert_eq!(out[2], 0);
    }

    #[test]
    fn init_and_flush_use_control_bytes() {
        let bus = MockBus::default();
        let mut panel = Panel::new(bus.clone(), 128, 64);
        panel.init(0x7F, false).unwrap();
        panel.flush(&[0xAA; 1024]).unwrap();

        let writes = bus.0.lock().unwrap();
        assert_eq!(writes[0][0], CONTROL_COMMAND);
        assert_eq!(writes[0][1], DISPLAY_OFF);
        assert_eq!(*writes[0].last().unwrap(), DISPLAY_ON);
        assert!(writes[0].windows(2).any(|w| w == [0x81, 0x7F]));
        assert_eq!(writes[1], vec![CONTROL_COMMAND, 0x21, 0, 127, 0x22, 0, 7]);
        assert_eq!(writes.len(), 2 + 1024 / DATA_CHUNK);
        assert!(writes[2..].iter().all(|w| w[0] == CONTROL_DATA && w.len() == DATA_CHUNK + 1));
    }

    #[test]
    fn driver_writes_changed_frames_and_powers_off() {
        let bus = MockBus::default();
        let mut video = Ssd1306::with_bus(bus.clone(), PanelOptions::default()).unwrap();

        let data = xrgb(128, 64, &[(5, 5)]);
        let frame = Frame::new(&data, 128, 64, 128 * 4, PixelFormat::Xrgb8888).unwrap();
        video.present(&frame).unwrap();
        video.shutdown().unwrap();

        let writes = bus.0.lock().unwrap();
        assert_eq!(writes.last().unwrap(), &vec![CONTROL_COMMAND, DISPLAY_OFF]);
        let data_writes = writes.iter().filter(|w| w[0] == CONTROL_DATA).count();
        assert_eq!(data_writes, 1024 / DATA_CHUNK);
    }

    #[test]
    fn odd_panel_sizes_are_rejected() {
        let opts = PanelOptions {
            height: 60,
            ..PanelOptions::default()
        };
        assert!(matches!(
            Ssd1306::with_bus(MockBus::default(), opts),
            Err(DriverError::Unsupported(_))
        ));
    }
}
