mod common;

use ardubridge_core::driver::{
    AudioDriver, DriverError, DriverKind, DriverParams, InputDriver, VideoDriver,
};
use ardubridge_core::emulator::AvInfo;
use ardubridge_core::options::DriverOptions;
use ardubridge_core::registry::{self, DriverFactory, DriverSpec};

use common::{Counters, FakeAudio, FakeInput, FakeVideo};

static VIDEO: Counters = Counters::new();
static AUDIO: Counters = Counters::new();
static INPUT: Counters = Counters::new();

fn fake_video(_: &DriverParams<'_>) -> Result<Box<dyn VideoDriver>, DriverError> {
    Ok(Box::new(FakeVideo::new(&VIDEO)))
}

fn fake_audio(_: &DriverParams<'_>) -> Result<Box<dyn AudioDriver>, DriverError> {
    Ok(Box::new(FakeAudio::new(&AUDIO)))
}

fn fake_input(_: &DriverParams<'_>) -> Result<Box<dyn InputDriver>, DriverError> {
    Ok(Box::new(FakeInput::new(&INPUT)))
}

inventory::submit! { DriverSpec::video("fake", "test video", fake_video) }
inventory::submit! { DriverSpec::audio("fake", "test audio", fake_audio) }
inventory::submit! { DriverSpec::input("fake", "test input", fake_input) }

// Same (kind, name) as above: ignored, the table keeps one entry.
inventory::submit! { DriverSpec::video("fake", "duplicate", fake_video) }

fn params_fixture() -> (AvInfo, DriverOptions) {
    let av = AvInfo {
        fps: 60.0,
        sample_rate: 44_100.0,
        ..AvInfo::default()
    };
    (av, DriverOptions::default())
}

#[test]
fn test_every_registered_driver_is_constructible() {
    let (av, options) = params_fixture();
    let params = DriverParams {
        av: &av,
        options: &options,
    };

    for spec in registry::all() {
        let resolved = registry::resolve(spec.kind(), spec.name).unwrap();
        assert!(std::ptr::eq(resolved, *spec));
        match resolved.factory {
            DriverFactory::Video(create) => create(&params).unwrap().shutdown().unwrap(),
            DriverFactory::Audio(create) => create(&params).unwrap().shutdown().unwrap(),
            DriverFactory::Input(create) => create(&params).unwrap().shutdown().unwrap(),
        }
    }
}

#[test]
fn test_unregistered_names_fail_per_kind() {
    for kind in DriverKind::ALL {
        let err = registry::resolve(kind, "pygame").unwrap_err();
        assert_eq!(err.kind, kind);
        assert_eq!(err.name, "pygame");
        assert_eq!(err.available, registry::names(kind));
    }
}

#[test]
fn test_duplicate_registration_is_ignored() {
    let count = registry::all()
        .iter()
        .filter(|s| s.kind() == DriverKind::Video && s.name == "fake")
        .count();
    assert_eq!(count, 1);
}

#[test]
fn test_names_are_listed_per_kind() {
    for kind in DriverKind::ALL {
        let names = registry::names(kind);
        assert!(names.contains(&"headless"));
        assert!(names.contains(&"fake"));
    }
}
