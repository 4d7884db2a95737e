//! Script text and the per-request context handed to the compiler.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ScriptError;

/// Profile used when the caller does not name one.
pub const DEFAULT_PROFILE: &str = "debug";

/// Character encoding the script text was stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceEncoding {
    #[default]
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
}

impl SourceEncoding {
    pub fn name(self) -> &'static str {
        match self {
            SourceEncoding::Utf8 => "utf-8",
            SourceEncoding::Utf8Bom => "utf-8-bom",
            SourceEncoding::Utf16Le => "utf-16le",
            SourceEncoding::Utf16Be => "utf-16be",
        }
    }
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Source text plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    text: String,
    encoding: SourceEncoding,
    path: Option<PathBuf>,
}

impl ScriptSource {
    pub fn new(text: impl Into<String>) -> Self {
        ScriptSource {
            text: text.into(),
            encoding: SourceEncoding::Utf8,
            path: None,
        }
    }

    /// Decode raw file contents, detecting the encoding from a byte order
    /// mark. Bytes without a BOM are read as UTF-8.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ScriptError> {
        let (text, encoding) = match bytes {
            [0xEF, 0xBB, 0xBF, rest @ ..] => (decode_utf8(rest)?, SourceEncoding::Utf8Bom),
            [0xFF, 0xFE, rest @ ..] => (
                decode_utf16(rest, u16::from_le_bytes)?,
                SourceEncoding::Utf16Le,
            ),
            [0xFE, 0xFF, rest @ ..] => (
                decode_utf16(rest, u16::from_be_bytes)?,
                SourceEncoding::Utf16Be,
            ),
            _ => (decode_utf8(bytes)?, SourceEncoding::Utf8),
        };
        Ok(ScriptSource {
            text,
            encoding,
            path: None,
        })
    }

    /// Read and decode a script file, recording its path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|error| {
            ScriptError::Argument(format!("failed to read {}: {error}", path.display()))
        })?;
        Ok(ScriptSource::from_bytes(&bytes)?.with_path(path))
    }

    pub fn with_encoding(mut self, encoding: SourceEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn encoding(&self) -> SourceEncoding {
        self.encoding
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn decode_utf8(bytes: &[u8]) -> Result<String, ScriptError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|error| ScriptError::Argument(format!("script is not valid utf-8: {error}")))
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String, ScriptError> {
    if bytes.len() % 2 != 0 {
        return Err(ScriptError::Argument(
            "utf-16 script has an odd number of bytes".to_string(),
        ));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units)
        .map_err(|error| ScriptError::Argument(format!("script is not valid utf-16: {error}")))
}

/// Everything one compilation request needs to know about its script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptContext {
    working_directory: PathBuf,
    profile: String,
    debug: bool,
    source: ScriptSource,
}

impl ScriptContext {
    pub fn new(source: ScriptSource, working_directory: impl Into<PathBuf>) -> Self {
        ScriptContext {
            working_directory: working_directory.into(),
            profile: DEFAULT_PROFILE.to_string(),
            debug: false,
            source,
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn source(&self) -> &ScriptSource {
        &self.source
    }

    /// Reject contexts the pipeline cannot start from.
    pub fn validate(&self) -> Result<(), ScriptError> {
        if self.working_directory.as_os_str().is_empty() {
            return Err(ScriptError::Argument(
                "working directory must not be empty".to_string(),
            ));
        }
        if self.profile.trim().is_empty() {
            return Err(ScriptError::Argument(
                "configuration profile must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_utf8() {
        let source = ScriptSource::from_bytes(b"1+1").expect("decode");
        assert_eq!(source.text(), "1+1");
        assert_eq!(source.encoding(), SourceEncoding::Utf8);
    }

    #[test]
    fn detects_utf8_bom() {
        let source = ScriptSource::from_bytes(b"\xEF\xBB\xBF2*3").expect("decode");
        assert_eq!(source.text(), "2*3");
        assert_eq!(source.encoding(), SourceEncoding::Utf8Bom);
    }

    #[test]
    fn detects_utf16_little_endian() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "x + 1".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let source = ScriptSource::from_bytes(&bytes).expect("decode");
        assert_eq!(source.text(), "x + 1");
        assert_eq!(source.encoding(), SourceEncoding::Utf16Le);
    }

    #[test]
    fn rejects_truncated_utf16() {
        let err = ScriptSource::from_bytes(&[0xFE, 0xFF, 0x00]).unwrap_err();
        assert!(matches!(err, ScriptError::Argument(_)));
    }

    #[test]
    fn context_defaults() {
        let context = ScriptContext::new(ScriptSource::new("1"), "/tmp");
        assert_eq!(context.profile(), DEFAULT_PROFILE);
        assert!(!context.debug());
        assert!(context.validate().is_ok());
    }

    #[test]
    fn rejects_empty_working_directory_and_profile() {
        let context = ScriptContext::new(ScriptSource::new("1"), "");
        assert!(matches!(context.validate(), Err(ScriptError::Argument(_))));

        let context = ScriptContext::new(ScriptSource::new("1"), "/tmp").with_profile(" ");
        assert!(matches!(context.validate(), Err(ScriptError::Argument(_))));
    }
}
