//! Driver registry for configuration-time driver selection.
//!
//! Each driver self-registers via [`inventory::submit!`] with a
//! [`DriverSpec`] holding its configuration name and a factory. The table
//! is assembled once, on first use, and is read-only afterwards, so every
//! session sees the same set of drivers.

use std::collections::HashSet;
use std::sync::OnceLock;

use crate::driver::{AudioDriver, DriverError, DriverKind, DriverParams, InputDriver, VideoDriver};
use crate::error::UnknownDriverError;

pub type VideoFactory = fn(&DriverParams<'_>) -> Result<Box<dyn VideoDriver>, DriverError>;
pub type AudioFactory = fn(&DriverParams<'_>) -> Result<Box<dyn AudioDriver>, DriverError>;
pub type InputFactory = fn(&DriverParams<'_>) -> Result<Box<dyn InputDriver>, DriverError>;

/// Constructor for one driver; the variant fixes the capability kind.
#[derive(Clone, Copy, Debug)]
pub enum DriverFactory {
    Video(VideoFactory),
    Audio(AudioFactory),
    Input(InputFactory),
}

/// Describes a selectable driver.
#[derive(Debug)]
pub struct DriverSpec {
    /// Configuration name (e.g., "sdl", "headless").
    pub name: &'static str,
    /// One-line summary for `--list-drivers`.
    pub description: &'static str,
    pub factory: DriverFactory,
}

impl DriverSpec {
    pub const fn video(name: &'static str, description: &'static str, f: VideoFactory) -> Self {
        Self {
            name,
            description,
            factory: DriverFactory::Video(f),
        }
    }

    pub const fn audio(name: &'static str, description: &'static str, f: AudioFactory) -> Self {
        Self {
            name,
            description,
            factory: DriverFactory::Audio(f),
        }
    }

    pub const fn input(name: &'static str, description: &'static str, f: InputFactory) -> Self {
        Self {
            name,
            description,
            factory: DriverFactory::Input(f),
        }
    }

    pub fn kind(&self) -> DriverKind {
        match self.factory {
            DriverFactory::Video(_) => DriverKind::Video,
            DriverFactory::Audio(_) => DriverKind::Audio,
            DriverFactory::Input(_) => DriverKind::Input,
        }
    }
}

inventory::collect!(DriverSpec);

static TABLE: OnceLock<Vec<&'static DriverSpec>> = OnceLock::new();

fn table() -> &'static [&'static DriverSpec] {
    TABLE.get_or_init(|| {
        let mut seen = HashSet::new();
        let mut entries: Vec<&'static DriverSpec> = Vec::new();
        for spec in inventory::iter::<DriverSpec> {
            if seen.insert((spec.kind(), spec.name)) {
                entries.push(spec);
            } else {
                log::warn!(
                    "ignoring duplicate registration of {} driver `{}`",
                    spec.kind(),
                    spec.name
                );
            }
        }
        entries.sort_by_key(|e| (e.kind(), e.name));
        entries
    })
}

/// All registered drivers, sorted by kind and name.
pub fn all() -> &'static [&'static DriverSpec] {
    table()
}

/// Names registered for `kind`, sorted.
pub fn names(kind: DriverKind) -> Vec<&'static str> {
    table()
        .iter()
        .filter(|e| e.kind() == kind)
        .map(|e| e.name)
        .collect()
}

/// Look up the driver registered as `name` for `kind`.
pub fn resolve(kind: DriverKind, name: &str) -> Result<&'static DriverSpec, UnknownDriverError> {
    table()
        .iter()
        .copied()
        .find(|e| e.kind() == kind && e.name == name)
        .ok_or_else(|| UnknownDriverError {
            kind,
            name: name.to_string(),
            available: names(kind),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_is_registered_for_every_kind() {
        for kind in DriverKind::ALL {
            let spec = resolve(kind, "headless").unwrap();
            assert_eq!(spec.kind(), kind);
        }
    }

    #[test]
    fn lookup_is_per_kind() {
        let err = resolve(DriverKind::Video, "no-such-driver").unwrap_err();
        assert_eq!(err.kind, DriverKind::Video);
        assert!(err.available.contains(&"headless"));
        assert!(err.to_string().contains("no-such-driver"));
    }

    #[test]
    fn table_is_sorted() {
        let keys: Vec<_> = all().iter().map(|e| (e.kind(), e.name)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
