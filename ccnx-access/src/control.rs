//! Capability queries from the media host.

/// Queries a host may send. The integer codes used over the C ABI are this crate's own
/// numbering, listed in `from_code`; a plugin shim maps its host's queries onto them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlQuery {
    CanSeek,
    CanFastSeek,
    CanPause,
    CanControlPace,
    GetPtsDelay,
    SetPauseState(bool),
    GetTitleInfo,
    GetMeta,
    GetContentType,
    SetTitle,
    SetSeekpoint,
    SetPrivateIdState,
    SetPrivateIdCa,
    GetPrivateIdState,
    /// Query code this core does not know.
    Other(i32),
}

impl ControlQuery {
    /// Decode a C ABI query code (0..=13, see the match below). `arg` is the boolean
    /// argument of set-pause. Codes outside the table become `Other`.
    pub fn from_code(code: i32, arg: bool) -> Self {
        match code {
            0 => ControlQuery::CanSeek,
            1 => ControlQuery::CanFastSeek,
            2 => ControlQuery::CanPause,
            3 => ControlQuery::CanControlPace,
            4 => ControlQuery::GetPtsDelay,
            5 => ControlQuery::GetTitleInfo,
            6 => ControlQuery::GetMeta,
            7 => ControlQuery::GetContentType,
            8 => ControlQuery::SetPauseState(arg),
            9 => ControlQuery::SetTitle,
            10 => ControlQuery::SetSeekpoint,
            11 => ControlQuery::SetPrivateIdState,
            12 => ControlQuery::SetPrivateIdCa,
            13 => ControlQuery::GetPrivateIdState,
            other => ControlQuery::Other(other),
        }
    }
}

/// Answer to a supported query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAnswer {
    Bool(bool),
    /// Playback latency in microseconds.
    Delay(i64),
    /// Command accepted, nothing to report.
    Done,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("query not supported: {0:?}")]
    Unsupported(ControlQuery),
}

/// Settings the answers depend on; read once at open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub seekable: bool,
    pub network_caching_ms: u64,
}

/// Answer a query from the session's capabilities.
pub fn answer(caps: &Capabilities, query: ControlQuery) -> Result<ControlAnswer, ControlError> {
    match query {
        ControlQuery::CanSeek | ControlQuery::CanFastSeek => Ok(ControlAnswer::Bool(caps.seekable)),
        ControlQuery::CanPause | ControlQuery::CanControlPace => Ok(ControlAnswer::Bool(true)),
        ControlQuery::GetPtsDelay => {
            let ms = i64::try_from(caps.network_caching_ms).unwrap_or(i64::MAX);
            Ok(ControlAnswer::Delay(ms.saturating_mul(1000)))
        }
        ControlQuery::SetPauseState(_) => Ok(ControlAnswer::Done),
        ControlQuery::Other(code) => {
            log::warn!("unimplemented control query {}", code);
            Err(ControlError::Unsupported(query))
        }
        _ => Err(ControlError::Unsupported(query)),
    }
}
