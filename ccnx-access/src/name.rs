//! Content names: ordered, typed segments. Base names per file, chunk names per request.

use std::fmt;

use serde::{Deserialize, Serialize};

/// URI schemes accepted by [`Name::parse_uri`].
const SCHEMES: [&str; 2] = ["ccnx:", "lci:"];

/// Segment label. `Name` is a plain path component, `Chunk` carries a big-endian chunk number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentType {
    Name,
    Chunk,
    /// Application-defined label (`App:<n>=` in URI form).
    App(u16),
}

/// One name segment: label plus raw value bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameSegment {
    kind: SegmentType,
    value: Vec<u8>,
}

impl NameSegment {
    pub fn new(kind: SegmentType, value: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Plain name segment.
    pub fn name(value: impl Into<Vec<u8>>) -> Self {
        Self::new(SegmentType::Name, value)
    }

    /// Chunk-number segment.
    pub fn chunk(number: u64) -> Self {
        Self::new(SegmentType::Chunk, encode_chunk_number(number))
    }

    pub fn kind(&self) -> SegmentType {
        self.kind
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Value read as a big-endian unsigned number. None if empty or wider than 8 bytes.
    pub fn as_number(&self) -> Option<u64> {
        decode_chunk_number(&self.value)
    }
}

/// Encode a chunk number big-endian with leading zero bytes stripped. Zero encodes as `[0]`.
pub fn encode_chunk_number(number: u64) -> Vec<u8> {
    let bytes = number.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    bytes[skip..].to_vec()
}

/// Inverse of [`encode_chunk_number`]; also accepts non-minimal encodings up to 8 bytes.
pub fn decode_chunk_number(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

/// Hierarchical content name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name {
    segments: Vec<NameSegment>,
}

impl Name {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<NameSegment>) -> Self {
        Self { segments }
    }

    pub fn push(&mut self, segment: NameSegment) {
        self.segments.push(segment);
    }

    pub fn segments(&self) -> &[NameSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Chunk number from the last chunk segment, if any.
    pub fn chunk_number(&self) -> Option<u64> {
        self.segments
            .iter()
            .rev()
            .find(|s| s.kind == SegmentType::Chunk)
            .and_then(NameSegment::as_number)
    }

    /// True if every segment of `prefix` matches the start of this name.
    pub fn starts_with(&self, prefix: &Name) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Parse `ccnx:/a/b/Chunk=3` style URIs. Empty path components are skipped.
    pub fn parse_uri(uri: &str) -> Result<Self, NameError> {
        let rest = SCHEMES
            .iter()
            .find_map(|scheme| {
                uri.get(..scheme.len())
                    .filter(|head| head.eq_ignore_ascii_case(scheme))
                    .map(|_| &uri[scheme.len()..])
            })
            .ok_or(NameError::MissingScheme)?;
        if !rest.starts_with('/') {
            return Err(NameError::NotAbsolute);
        }
        let segments = rest
            .split('/')
            .filter(|s| !s.is_empty())
            .map(parse_segment)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }
}

fn parse_segment(text: &str) -> Result<NameSegment, NameError> {
    let Some((label, value)) = text.split_once('=') else {
        return Ok(NameSegment::name(unescape(text)?));
    };
    if label.eq_ignore_ascii_case("Name") {
        return Ok(NameSegment::name(unescape(value)?));
    }
    if label.eq_ignore_ascii_case("Chunk") {
        let n = value
            .parse::<u64>()
            .map_err(|_| NameError::BadNumber(value.to_string()))?;
        return Ok(NameSegment::chunk(n));
    }
    if let Some(app) = label.strip_prefix("App:") {
        let n = app
            .parse::<u16>()
            .map_err(|_| NameError::BadLabel(label.to_string()))?;
        return Ok(NameSegment::new(SegmentType::App(n), unescape(value)?));
    }
    // Unlabelled segment that happens to contain '='.
    Ok(NameSegment::name(unescape(text)?))
}

fn unescape(text: &str) -> Result<Vec<u8>, NameError> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = text
                .get(i + 1..i + 3)
                .ok_or_else(|| NameError::BadEscape(text.to_string()))?;
            let b = u8::from_str_radix(hex, 16)
                .map_err(|_| NameError::BadEscape(text.to_string()))?;
            out.push(b);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &[u8]) -> fmt::Result {
    for &b in value {
        if b.is_ascii_graphic() && !matches!(b, b'/' | b'%' | b'=') {
            write!(f, "{}", b as char)?;
        } else {
            write!(f, "%{:02X}", b)?;
        }
    }
    Ok(())
}

impl fmt::Display for NameSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SegmentType::Name => write_escaped(f, &self.value),
            SegmentType::Chunk => match self.as_number() {
                Some(n) => write!(f, "Chunk={}", n),
                None => {
                    write!(f, "Chunk=")?;
                    write_escaped(f, &self.value)
                }
            },
            SegmentType::App(n) => {
                write!(f, "App:{}=", n)?;
                write_escaped(f, &self.value)
            }
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ccnx:")?;
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for s in &self.segments {
            write!(f, "/{}", s)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NameError {
    #[error("name must start with ccnx: or lci:")]
    MissingScheme,
    #[error("name path must be absolute")]
    NotAbsolute,
    #[error("bad segment label: {0}")]
    BadLabel(String),
    #[error("bad chunk number: {0}")]
    BadNumber(String),
    #[error("bad percent escape in: {0}")]
    BadEscape(String),
}

/// Base name for a file: `prefix`, then `command`, then one segment per non-empty
/// component of `path`. No memoization; the stream session caches the result.
pub fn build_base_name(prefix: &Name, command: &str, path: &str) -> Name {
    let mut name = prefix.clone();
    name.push(NameSegment::name(command));
    for component in path.split('/').filter(|c| !c.is_empty()) {
        log::trace!("base name segment = {}", component);
        name.push(NameSegment::name(component));
    }
    name
}

/// Fresh name for one chunk: copy of `base` + chunk segment + `trailer` segments.
pub fn build_chunk_name(base: &Name, chunk: u64, trailer: &[NameSegment]) -> Name {
    let mut segments = Vec::with_capacity(base.len() + 1 + trailer.len());
    segments.extend_from_slice(base.segments());
    segments.push(NameSegment::chunk(chunk));
    segments.extend_from_slice(trailer);
    Name::from_segments(segments)
}
