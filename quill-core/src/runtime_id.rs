//! Host platform tags used to pick platform-specific runtime assets.

use std::fmt;

/// Runtime identifier of the host operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeId {
    Windows,
    MacOs,
    Linux,
}

impl RuntimeId {
    /// The runtime identifier of the process this code runs in.
    ///
    /// Every target that is neither Windows nor macOS is treated as part of
    /// the Linux family.
    pub fn current() -> RuntimeId {
        if cfg!(target_os = "windows") {
            RuntimeId::Windows
        } else if cfg!(target_os = "macos") {
            RuntimeId::MacOs
        } else {
            RuntimeId::Linux
        }
    }

    /// Tag as written in `runtimeTargets` entries of the dependency manifest.
    pub fn tag(self) -> &'static str {
        match self {
            RuntimeId::Windows => "win",
            RuntimeId::MacOs => "osx",
            RuntimeId::Linux => "linux",
        }
    }

    pub fn from_tag(tag: &str) -> Option<RuntimeId> {
        match tag {
            "win" => Some(RuntimeId::Windows),
            "osx" => Some(RuntimeId::MacOs),
            "linux" => Some(RuntimeId::Linux),
            _ => None,
        }
    }

    /// Whether a manifest tag names this platform.
    pub fn matches(self, tag: &str) -> bool {
        tag == self.tag()
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for id in [RuntimeId::Windows, RuntimeId::MacOs, RuntimeId::Linux] {
            assert_eq!(RuntimeId::from_tag(id.tag()), Some(id));
        }
        assert_eq!(RuntimeId::from_tag("freebsd"), None);
    }

    #[test]
    fn matches_exact_tag_only() {
        assert!(RuntimeId::Linux.matches("linux"));
        assert!(!RuntimeId::Linux.matches("linux-x64"));
        assert!(!RuntimeId::Linux.matches("win"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_hosts_are_not_classified_as_windows() {
        assert_eq!(RuntimeId::current(), RuntimeId::Linux);
    }
}
