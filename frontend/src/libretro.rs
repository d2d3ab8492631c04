//! A libretro core loaded from a shared library.
//!
//! libretro callbacks carry no user data pointer, so the [`Host`] a core
//! should talk to is installed in a thread-local slot for the duration of
//! each call into the core. The `extern "C"` trampolines below look it up
//! there and never unwind into the core.

use std::cell::Cell;
use std::ffi::{CStr, CString, c_char, c_uint, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, Ordering};
use std::{mem, slice};

use ardubridge_core::emulator::{AvInfo, Core, CoreError, Geometry, Host, SystemInfo};
use ardubridge_core::error::LoadError;
use ardubridge_core::frame::Frame;
use ardubridge_core::rom::RomImage;
use libloading::Library;
use libretro_sys as sys;

/// Set on commands from the experimental range; ignored when matching.
const ENVIRONMENT_EXPERIMENTAL: c_uint = 0x10000;

/// `RETRO_HW_FRAME_BUFFER_VALID`: the frame lives in a GPU buffer.
const HW_FRAME_BUFFER_VALID: usize = usize::MAX;

/// libretro cores keep global state, so only one may be open at a time.
static CORE_OPEN: AtomicBool = AtomicBool::new(false);

type EnvironmentCb = unsafe extern "C" fn(c_uint, *mut c_void) -> bool;
type VideoRefreshCb = unsafe extern "C" fn(*const c_void, c_uint, c_uint, usize);
type AudioSampleCb = unsafe extern "C" fn(i16, i16);
type AudioSampleBatchCb = unsafe extern "C" fn(*const i16, usize) -> usize;
type InputPollCb = unsafe extern "C" fn();
type InputStateCb = unsafe extern "C" fn(c_uint, c_uint, c_uint, c_uint) -> i16;

#[derive(Clone, Copy)]
struct Api {
    api_version: unsafe extern "C" fn() -> c_uint,
    get_system_info: unsafe extern "C" fn(*mut sys::SystemInfo),
    get_system_av_info: unsafe extern "C" fn(*mut sys::SystemAvInfo),
    set_environment: unsafe extern "C" fn(EnvironmentCb),
    set_video_refresh: unsafe extern "C" fn(VideoRefreshCb),
    set_audio_sample: unsafe extern "C" fn(AudioSampleCb),
    set_audio_sample_batch: unsafe extern "C" fn(AudioSampleBatchCb),
    set_input_poll: unsafe extern "C" fn(InputPollCb),
    set_input_state: unsafe extern "C" fn(InputStateCb),
    set_controller_port_device: unsafe extern "C" fn(c_uint, c_uint),
    init: unsafe extern "C" fn(),
    deinit: unsafe extern "C" fn(),
    load_game: unsafe extern "C" fn(*const sys::GameInfo) -> bool,
    unload_game: unsafe extern "C" fn(),
    run: unsafe extern "C" fn(),
    get_memory_data: unsafe extern "C" fn(c_uint) -> *mut c_void,
    get_memory_size: unsafe extern "C" fn(c_uint) -> usize,
}

/// Copy one function pointer out of `lib`.
///
/// # Safety
/// `T` must be the symbol's real function type.
unsafe fn symbol<T: Copy>(lib: &Library, name: &'static str) -> Result<T, CoreError> {
    // SAFETY: forwarded to the caller.
    unsafe { lib.get::<T>(name.as_bytes()) }
        .map(|s| *s)
        .map_err(|_| CoreError::MissingSymbol(name))
}

impl Api {
    /// # Safety
    /// `lib` must be a libretro core.
    unsafe fn load(lib: &Library) -> Result<Self, CoreError> {
        // SAFETY: the types mirror libretro.h.
        unsafe {
            Ok(Self {
                api_version: symbol(lib, "retro_api_version")?,
                get_system_info: symbol(lib, "retro_get_system_info")?,
                get_system_av_info: symbol(lib, "retro_get_system_av_info")?,
                set_environment: symbol(lib, "retro_set_environment")?,
                set_video_refresh: symbol(lib, "retro_set_video_refresh")?,
                set_audio_sample: symbol(lib, "retro_set_audio_sample")?,
                set_audio_sample_batch: symbol(lib, "retro_set_audio_sample_batch")?,
                set_input_poll: symbol(lib, "retro_set_input_poll")?,
                set_input_state: symbol(lib, "retro_set_input_state")?,
                set_controller_port_device: symbol(lib, "retro_set_controller_port_device")?,
                init: symbol(lib, "retro_init")?,
                deinit: symbol(lib, "retro_deinit")?,
                load_game: symbol(lib, "retro_load_game")?,
                unload_game: symbol(lib, "retro_unload_game")?,
                run: symbol(lib, "retro_run")?,
                get_memory_data: symbol(lib, "retro_get_memory_data")?,
                get_memory_size: symbol(lib, "retro_get_memory_size")?,
            })
        }
    }
}

#[cfg(target_os = "linux")]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{self, RTLD_LOCAL, RTLD_NOW};
    // Cores that register thread-local destructors crash at exit if they are
    // unmapped first.
    // SAFETY: running the core's initializers is what loading it means.
    let lib = unsafe { unix::Library::open(Some(path), RTLD_NOW | RTLD_LOCAL | libc::RTLD_NODELETE)? };
    Ok(lib.into())
}

#[cfg(not(target_os = "linux"))]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    // SAFETY: as above.
    unsafe { Library::new(path) }
}

/// Owned copy of a C string the core handed out; empty when null.
///
/// # Safety
/// `s` must be null or point to a NUL-terminated string.
unsafe fn lossy(s: *const c_char) -> String {
    if s.is_null() {
        return String::new();
    }
    // SAFETY: non-null and NUL-terminated per the caller.
    unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned()
}

/// A loaded libretro core.
pub struct LibretroCore {
    api: Api,
    info: SystemInfo,
    path: PathBuf,
    /// Keeps `retro_game_info::path` alive while the game is loaded.
    game_path: Option<CString>,
    /// Extracted games for cores that read files themselves.
    scratch: Option<tempfile::TempDir>,
    initialized: bool,
    game_loaded: bool,
    // Dropped last so no function pointer outlives the mapping.
    _lib: Library,
}

impl LibretroCore {
    /// Open the core at `path` and check its API version.
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        if !path.is_file() {
            return Err(LoadError::CoreNotFound(path.to_path_buf()));
        }
        if CORE_OPEN.swap(true, Ordering::SeqCst) {
            return Err(CoreError::AlreadyLoaded.into());
        }
        Self::open_exclusive(path).map_err(|e| {
            CORE_OPEN.store(false, Ordering::SeqCst);
            e.into()
        })
    }

    fn open_exclusive(path: &Path) -> Result<Self, CoreError> {
        let lib = open_library(path).map_err(|e| CoreError::Library(e.to_string()))?;
        // SAFETY: a library exporting the libretro entry points is a core.
        let api = unsafe { Api::load(&lib)? };

        // SAFETY: both may be called before `retro_init`.
        let found = unsafe { (api.api_version)() };
        if found != sys::API_VERSION {
            return Err(CoreError::ApiVersion {
                expected: sys::API_VERSION,
                found,
            });
        }
        let mut raw: sys::SystemInfo = unsafe { mem::zeroed() };
        unsafe { (api.get_system_info)(&mut raw) };

        // SAFETY: the core's strings are static for its lifetime.
        let info = unsafe {
            SystemInfo {
                library_name: lossy(raw.library_name),
                library_version: lossy(raw.library_version),
                valid_extensions: lossy(raw.valid_extensions)
                    .split('|')
                    .filter(|e| !e.is_empty())
                    .map(str::to_ascii_lowercase)
                    .collect(),
                need_fullpath: raw.need_fullpath,
                block_extract: raw.block_extract,
            }
        };
        log::debug!(
            "opened {} ({} {}, extensions {:?})",
            path.display(),
            info.library_name,
            info.library_version,
            info.valid_extensions
        );

        Ok(Self {
            api,
            info,
            path: path.to_path_buf(),
            game_path: None,
            scratch: None,
            initialized: false,
            game_loaded: false,
            _lib: lib,
        })
    }

    fn register_callbacks(&self) {
        // SAFETY: the trampolines match the setter signatures.
        unsafe {
            (self.api.set_video_refresh)(video_refresh);
            (self.api.set_audio_sample)(audio_sample);
            (self.api.set_audio_sample_batch)(audio_sample_batch);
            (self.api.set_input_poll)(input_poll);
            (self.api.set_input_state)(input_state);
        }
    }

    /// The path handed to the core, extracting archived games first when
    /// the core insists on reading files.
    fn game_path(&mut self, rom: &RomImage) -> Result<CString, CoreError> {
        let path = if self.info.need_fullpath {
            let dir = match self.scratch.take() {
                Some(dir) => dir,
                None => tempfile::Builder::new().prefix("ardubridge").tempdir()?,
            };
            let extracted = rom.materialize(dir.path());
            self.scratch = Some(dir);
            extracted?
        } else {
            rom.path().to_path_buf()
        };
        CString::new(path.to_string_lossy().into_owned())
            .map_err(|_| CoreError::GameRejected(rom.path().to_path_buf()))
    }
}

impl Core for LibretroCore {
    fn system_info(&self) -> &SystemInfo {
        &self.info
    }

    fn load_game(&mut self, host: &mut dyn Host, rom: &RomImage) -> Result<AvInfo, CoreError> {
        if self.game_loaded {
            return Err(CoreError::AlreadyLoaded);
        }
        let game_path = self.game_path(rom)?;
        let _host = HostGuard::install(host);

        if !self.initialized {
            // SAFETY: libretro requires the environment before `retro_init`.
            unsafe {
                (self.api.set_environment)(environment);
                (self.api.init)();
            }
            self.initialized = true;
        }
        self.register_callbacks();

        let (data, size) = if self.info.need_fullpath {
            (ptr::null(), 0)
        } else {
            (rom.data().as_ptr().cast(), rom.data().len())
        };
        let game = sys::GameInfo {
            path: game_path.as_ptr(),
            data,
            size,
            meta: ptr::null(),
        };
        // SAFETY: `game` and the buffers it points into outlive the call.
        if !unsafe { (self.api.load_game)(&game) } {
            return Err(CoreError::GameRejected(rom.path().to_path_buf()));
        }
        self.game_path = Some(game_path);
        self.game_loaded = true;

        let mut av: sys::SystemAvInfo = unsafe { mem::zeroed() };
        // SAFETY: a game is loaded.
        unsafe {
            (self.api.get_system_av_info)(&mut av);
            (self.api.set_controller_port_device)(0, sys::DEVICE_JOYPAD);
        }
        Ok(AvInfo {
            geometry: Geometry {
                base_width: av.geometry.base_width,
                base_height: av.geometry.base_height,
                max_width: av.geometry.max_width,
                max_height: av.geometry.max_height,
                aspect_ratio: av.geometry.aspect_ratio,
            },
            fps: av.timing.fps,
            sample_rate: av.timing.sample_rate,
        })
    }

    fn run(&mut self, host: &mut dyn Host) {
        if !self.game_loaded {
            return;
        }
        let _host = HostGuard::install(host);
        // SAFETY: a game is loaded and the host is installed.
        unsafe { (self.api.run)() };
    }

    fn save_ram(&mut self) -> Option<&mut [u8]> {
        if !self.game_loaded {
            return None;
        }
        // SAFETY: the core owns the region until the game is unloaded, which
        // needs `&mut self`.
        unsafe {
            let size = (self.api.get_memory_size)(sys::MEMORY_SAVE_RAM);
            let data = (self.api.get_memory_data)(sys::MEMORY_SAVE_RAM).cast::<u8>();
            if data.is_null() || size == 0 {
                return None;
            }
            Some(slice::from_raw_parts_mut(data, size))
        }
    }

    fn unload(&mut self) -> Result<(), CoreError> {
        if !self.initialized {
            return Err(CoreError::NotLoaded);
        }
        // SAFETY: each runs at most once per successful load/init.
        unsafe {
            if self.game_loaded {
                (self.api.unload_game)();
            }
            (self.api.deinit)();
        }
        self.game_loaded = false;
        self.initialized = false;
        self.game_path = None;
        log::debug!("unloaded {}", self.path.display());
        Ok(())
    }
}

impl Drop for LibretroCore {
    fn drop(&mut self) {
        if self.initialized {
            let _ = self.unload();
        }
        CORE_OPEN.store(false, Ordering::SeqCst);
    }
}

thread_local! {
    static HOST: Cell<Option<NonNull<dyn Host>>> = const { Cell::new(None) };
}

/// Installs a host for the trampolines until dropped.
struct HostGuard {
    previous: Option<NonNull<dyn Host>>,
}

impl HostGuard {
    fn install(host: &mut dyn Host) -> Self {
        let ptr = NonNull::from(host);
        // SAFETY: only the lifetime is erased; the guard uninstalls the
        // pointer before the borrow it came from ends.
        let ptr: NonNull<dyn Host + 'static> = unsafe { mem::transmute(ptr) };
        Self {
            previous: HOST.with(|slot| slot.replace(Some(ptr))),
        }
    }
}

impl Drop for HostGuard {
    fn drop(&mut self) {
        HOST.with(|slot| slot.set(self.previous));
    }
}

/// Run `f` against the installed host, or return `fallback` when there is
/// none or `f` panics.
fn with_host<R>(fallback: R, f: impl FnOnce(&mut dyn Host) -> R) -> R {
    // Taken out while in use so a re-entrant callback finds no host.
    let Some(mut ptr) = HOST.with(Cell::take) else {
        log::debug!("core callback outside of a core call");
        return fallback;
    };
    // SAFETY: installed by a live `HostGuard` on this thread.
    let result = panic::catch_unwind(AssertUnwindSafe(|| f(unsafe { ptr.as_mut() })));
    HOST.with(|slot| slot.set(Some(ptr)));
    result.unwrap_or_else(|_| {
        log::error!("host callback panicked");
        fallback
    })
}

/// Split a `retro_variable` definition, `"Description; a|b|c"`, into its
/// description and choices. The first choice is the default.
pub fn parse_variable_definition(value: &str) -> Option<(&str, Vec<&str>)> {
    let (description, choices) = value.split_once("; ")?;
    let choices: Vec<&str> = choices.split('|').filter(|c| !c.is_empty()).collect();
    if choices.is_empty() {
        return None;
    }
    Some((description, choices))
}

/// Write `dir` into the `const char **` the core passed.
unsafe fn put_dir(data: *mut c_void, dir: Option<&CStr>) -> bool {
    // SAFETY: the caller checked `data` is non-null.
    unsafe { *data.cast::<*const c_char>() = dir.map_or(ptr::null(), CStr::as_ptr) };
    dir.is_some()
}

unsafe fn define_variables(host: &mut dyn Host, mut var: *const sys::Variable) {
    // SAFETY: the array ends with an entry whose key is null.
    unsafe {
        while !(*var).key.is_null() {
            let key = CStr::from_ptr((*var).key).to_string_lossy();
            let value = lossy((*var).value);
            match parse_variable_definition(&value) {
                Some((_, choices)) => host.define_variable(&key, choices[0]),
                None => log::warn!("core option {key}: malformed definition {value:?}"),
            }
            var = var.add(1);
        }
    }
}

unsafe extern "C" fn environment(cmd: c_uint, data: *mut c_void) -> bool {
    let cmd = cmd & !ENVIRONMENT_EXPERIMENTAL;
    if data.is_null() && cmd != sys::ENVIRONMENT_SHUTDOWN {
        return false;
    }
    with_host(false, |host| {
        // SAFETY: for each command, `data` points to what libretro.h says.
        unsafe {
            match cmd {
                sys::ENVIRONMENT_GET_CAN_DUPE => {
                    *data.cast::<bool>() = true;
                    true
                }
                sys::ENVIRONMENT_SET_PIXEL_FORMAT => host.set_pixel_format(*data.cast::<c_uint>()),
                sys::ENVIRONMENT_GET_SYSTEM_DIRECTORY => put_dir(data, host.system_directory()),
                sys::ENVIRONMENT_GET_SAVE_DIRECTORY => put_dir(data, host.save_directory()),
                sys::ENVIRONMENT_SET_VARIABLES => {
                    define_variables(host, data.cast());
                    true
                }
                sys::ENVIRONMENT_GET_VARIABLE => {
                    let var = &mut *data.cast::<sys::Variable>();
                    if var.key.is_null() {
                        return false;
                    }
                    let key = CStr::from_ptr(var.key).to_string_lossy();
                    match host.variable(&key) {
                        Some(value) => {
                            var.value = value.as_ptr();
                            true
                        }
                        None => {
                            var.value = ptr::null();
                            false
                        }
                    }
                }
                sys::ENVIRONMENT_GET_VARIABLE_UPDATE => {
                    *data.cast::<bool>() = false;
                    true
                }
                sys::ENVIRONMENT_SET_MESSAGE => {
                    let msg = &*data.cast::<sys::Message>();
                    host.message(&lossy(msg.msg), msg.frames);
                    true
                }
                sys::ENVIRONMENT_SHUTDOWN => {
                    host.request_shutdown();
                    true
                }
                sys::ENVIRONMENT_SET_INPUT_DESCRIPTORS
                | sys::ENVIRONMENT_SET_CONTROLLER_INFO
                | sys::ENVIRONMENT_SET_PERFORMANCE_LEVEL => true,
                _ => {
                    log::trace!("unhandled environment command {cmd}");
                    false
                }
            }
        }
    })
}

unsafe extern "C" fn video_refresh(data: *const c_void, width: c_uint, height: c_uint, pitch: usize) {
    with_host((), |host| {
        if data.is_null() || data as usize == HW_FRAME_BUFFER_VALID {
            host.video_refresh(None);
            return;
        }
        let format = host.pixel_format();
        let len = Frame::required_len(width, height, pitch, format);
        // SAFETY: the core hands over `pitch * (height - 1)` bytes plus one
        // row in its current pixel format.
        let bytes = unsafe { slice::from_raw_parts(data.cast::<u8>(), len) };
        match Frame::new(bytes, width, height, pitch, format) {
            Some(frame) => host.video_refresh(Some(&frame)),
            None => log::warn!("core sent a malformed {width}x{height} frame (pitch {pitch})"),
        }
    })
}

unsafe extern "C" fn audio_sample(left: i16, right: i16) {
    with_host((), |host| host.audio_sample(left, right))
}

unsafe extern "C" fn audio_sample_batch(data: *const i16, frames: usize) -> usize {
    if data.is_null() || frames == 0 {
        return 0;
    }
    with_host(0, |host| {
        // SAFETY: `frames` interleaved stereo frames.
        let samples = unsafe { slice::from_raw_parts(data, frames * 2) };
        host.audio_sample_batch(samples)
    })
}

unsafe extern "C" fn input_poll() {
    with_host((), |host| host.input_poll())
}

unsafe extern "C" fn input_state(port: c_uint, device: c_uint, index: c_uint, id: c_uint) -> i16 {
    with_host(0, |host| host.input_state(port, device, index, id))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;

    use ardubridge_core::frame::PixelFormat;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        format: u32,
        shutdown: bool,
        frames: Vec<Option<(u32, u32)>>,
        samples: Vec<i16>,
        vars: BTreeMap<String, CString>,
        messages: Vec<String>,
        system_dir: Option<CString>,
    }

    impl Host for Recorder {
        fn pixel_format(&self) -> PixelFormat {
            PixelFormat::from_raw(self.format).unwrap()
        }

        fn set_pixel_format(&mut self, raw: u32) -> bool {
            if PixelFormat::from_raw(raw).is_none() {
                return false;
            }
            self.format = raw;
            true
        }

        fn request_shutdown(&mut self) {
            self.shutdown = true;
        }

        fn video_refresh(&mut self, frame: Option<&Frame<'_>>) {
            self.frames.push(frame.map(|f| (f.width, f.height)));
        }

        fn audio_sample(&mut self, left: i16, right: i16) {
            self.samples.extend([left, right]);
        }

        fn audio_sample_batch(&mut self, samples: &[i16]) -> usize {
            self.samples.extend_from_slice(samples);
            samples.len() / 2
        }

        fn input_poll(&mut self) {}

        fn input_state(&mut self, port: u32, _device: u32, _index: u32, id: u32) -> i16 {
            (port * 100 + id) as i16
        }

        fn define_variable(&mut self, key: &str, default: &str) {
            self.vars.insert(key.into(), CString::new(default).unwrap());
        }

        fn variable(&mut self, key: &str) -> Option<&CStr> {
            self.vars.get(key).map(CString::as_c_str)
        }

        fn system_directory(&self) -> Option<&CStr> {
            self.system_dir.as_deref()
        }

        fn save_directory(&self) -> Option<&CStr> {
            None
        }

        fn message(&mut self, text: &str, _frames: u32) {
            self.messages.push(text.into());
        }
    }

    #[test]
    fn variable_definitions_split_description_and_choices() {
        assert_eq!(
            parse_variable_definition("Display palette; default|grey|amber"),
            Some(("Display palette", vec!["default", "grey", "amber"]))
        );
        assert_eq!(parse_variable_definition("no choices"), None);
        assert_eq!(parse_variable_definition("Empty; "), None);
    }

    #[test]
    fn environment_sets_and_reads_options() {
        let mut host = Recorder::default();
        let _guard = HostGuard::install(&mut host);

        let defs = [
            sys::Variable {
                key: c"arduous_palette".as_ptr(),
                value: c"Palette; green|white".as_ptr(),
            },
            sys::Variable {
                key: ptr::null(),
                value: ptr::null(),
            },
        ];
        let mut query = sys::Variable {
            key: c"arduous_palette".as_ptr(),
            value: ptr::null(),
        };
        let mut missing = sys::Variable {
            key: c"unknown".as_ptr(),
            value: ptr::null(),
        };
        unsafe {
            assert!(environment(sys::ENVIRONMENT_SET_VARIABLES, defs.as_ptr() as *mut c_void));
            assert!(environment(
                sys::ENVIRONMENT_GET_VARIABLE,
                (&raw mut query).cast()
            ));
            assert_eq!(CStr::from_ptr(query.value), c"green");
            assert!(!environment(
                sys::ENVIRONMENT_GET_VARIABLE,
                (&raw mut missing).cast()
            ));
        }
    }

    #[test]
    fn environment_forwards_format_and_shutdown() {
        let mut host = Recorder::default();
        {
            let _guard = HostGuard::install(&mut host);
            let mut rgb565: c_uint = 2;
            let mut bogus: c_uint = 9;
            let mut dupe = false;
            unsafe {
                assert!(environment(sys::ENVIRONMENT_SET_PIXEL_FORMAT, (&raw mut rgb565).cast()));
                assert!(!environment(sys::ENVIRONMENT_SET_PIXEL_FORMAT, (&raw mut bogus).cast()));
                assert!(environment(sys::ENVIRONMENT_GET_CAN_DUPE, (&raw mut dupe).cast()));
                assert!(environment(sys::ENVIRONMENT_SHUTDOWN, ptr::null_mut()));
                assert!(!environment(0x7FFF, (&raw mut dupe).cast()));
            }
            assert!(dupe);
        }
        assert_eq!(host.format, 2);
        assert!(host.shutdown);
    }

    #[test]
    fn directories_are_null_when_unset() {
        let mut host = Recorder {
            system_dir: Some(CString::new("/bios").unwrap()),
            ..Recorder::default()
        };
        let _guard = HostGuard::install(&mut host);
        let mut system: *const c_char = ptr::null();
        let mut save: *const c_char = c"stale".as_ptr();
        unsafe {
            assert!(environment(
                sys::ENVIRONMENT_GET_SYSTEM_DIRECTORY,
                (&raw mut system).cast()
            ));
            assert_eq!(CStr::from_ptr(system), c"/bios");
            assert!(!environment(
                sys::ENVIRONMENT_GET_SAVE_DIRECTORY,
                (&raw mut save).cast()
            ));
        }
        assert!(save.is_null());
    }

    #[test]
    fn video_and_audio_reach_the_host() {
        let mut host = Recorder::default();
        {
            let _guard = HostGuard::install(&mut host);
            let pixels = vec![0u8; 4 * 2 * 3];
            let samples = [1i16, 2, 3, 4];
            unsafe {
                video_refresh(pixels.as_ptr().cast(), 4, 3, 8);
                video_refresh(ptr::null(), 4, 3, 8);
                audio_sample(9, 10);
                assert_eq!(audio_sample_batch(samples.as_ptr(), 2), 2);
                assert_eq!(input_state(1, sys::DEVICE_JOYPAD, 0, 4), 104);
            }
        }
        assert_eq!(host.frames, vec![Some((4, 3)), None]);
        assert_eq!(host.samples, vec![9, 10, 1, 2, 3, 4]);
    }

    #[test]
    fn callbacks_without_a_host_are_inert() {
        let mut dupe = false;
        unsafe {
            assert!(!environment(sys::ENVIRONMENT_GET_CAN_DUPE, (&raw mut dupe).cast()));
            assert_eq!(input_state(0, sys::DEVICE_JOYPAD, 0, 0), 0);
        }
        assert!(!dupe);
    }

    #[test]
    fn missing_and_invalid_cores_fail_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("arduous_libretro.so");
        assert!(matches!(
            LibretroCore::open(&missing),
            Err(LoadError::CoreNotFound(_))
        ));

        fs::write(&missing, b"not a shared object").unwrap();
        assert!(matches!(
            LibretroCore::open(&missing),
            Err(LoadError::Core(CoreError::Library(_)))
        ));
        assert!(!CORE_OPEN.load(Ordering::SeqCst));
    }
}
