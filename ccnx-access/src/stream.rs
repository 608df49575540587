//! Stream cursor controller: one pull -> one chunk Interest -> at most one block.
//!
//! The session owns the portal, the cached base name, the read position, the EOF
//! flag and the chunk size learned from responses. Chunk size is per session.

use std::net::TcpStream;

use crate::chunk::{chunk_index_for, extract_block, ChunkSize};
use crate::config::{AccessConfig, ConfigError};
use crate::control::{self, Capabilities, ControlAnswer, ControlError, ControlQuery};
use crate::exchange::fetch_chunk;
use crate::name::{build_base_name, build_chunk_name, Name, NameSegment};
use crate::portal::{FramedPortal, Portal, PortalError, PortalFactory, Timeout};

/// Where the cursor is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No base name built yet.
    Idle,
    Streaming,
    /// Final chunk consumed; cleared by seek.
    Eof,
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("could not create portal: {0}")]
    Portal(#[from] PortalError),
}

/// State of one open stream.
pub struct StreamSession<P: Portal> {
    portal: P,
    location: String,
    prefix: Name,
    command: String,
    trailer: Vec<NameSegment>,
    timeout: Timeout,
    caps: Capabilities,
    base_name: Option<Name>,
    base_name_builds: u32,
    position: u64,
    eof: bool,
    chunk_size: ChunkSize,
}

impl<P: Portal> StreamSession<P> {
    /// Open a stream for `location` (file path, e.g. "a/b/movie.mpg") over `portal`.
    /// Config is read once here.
    pub fn open(portal: P, location: &str, config: &AccessConfig) -> Result<Self, OpenError> {
        let prefix = config.prefix_name().map_err(ConfigError::from)?;
        let chunk_size = config.chunk_size()?;
        log::info!("open [{}]", location);
        Ok(Self {
            portal,
            location: location.to_string(),
            prefix,
            command: config.command.clone(),
            trailer: config.trailer(),
            timeout: config.timeout(),
            caps: config.capabilities(),
            base_name: None,
            base_name_builds: 0,
            position: 0,
            eof: false,
            chunk_size,
        })
    }

    /// Fetch the chunk holding the current position and return the bytes from the
    /// position to the end of that chunk. None: nothing this cycle (error, past the
    /// payload end, or EOF); the host pulls again.
    pub fn pull(&mut self) -> Option<Vec<u8>> {
        if self.eof {
            log::debug!("pull at EOF, pos {}", self.position);
            return None;
        }
        let position = self.position;
        let chunk_size = self.chunk_size;
        let chunk = chunk_index_for(position, chunk_size);

        let builds = &mut self.base_name_builds;
        let base = self.base_name.get_or_insert_with(|| {
            *builds += 1;
            let base = build_base_name(&self.prefix, &self.command, &self.location);
            log::info!("base name = {}", base);
            base
        });
        let name = build_chunk_name(base, chunk, &self.trailer);

        log::debug!("asking portal for pos [{}], chunk [{}]", position, chunk);
        let object = match fetch_chunk(&mut self.portal, name, self.timeout) {
            Ok(object) => object,
            Err(e) => {
                log::error!("pull at pos [{}], chunk [{}]: {}", position, chunk, e);
                return None;
            }
        };

        // The exchange only hands back objects carrying the requested chunk segment.
        let received = object.chunk_number().unwrap_or(chunk);
        let extracted = extract_block(&object.payload, chunk_size, position);
        if let Some(block) = &extracted.block {
            self.position = self.position.saturating_add(block.len() as u64);
            log::debug!("adding {} bytes from chunk {}", block.len(), received);
        }

        let final_chunk = object.final_chunk_number();
        if received >= final_chunk {
            self.eof = true;
            log::info!("EOF at chunk {} (pos {})", received, self.position);
        } else {
            self.eof = false;
            match ChunkSize::new(extracted.payload_size as u64) {
                Some(learned) => {
                    if learned != self.chunk_size {
                        log::debug!("chunk size {} -> {}", self.chunk_size, learned);
                    }
                    self.chunk_size = learned;
                }
                None => log::warn!("empty payload in non-final chunk {}", received),
            }
        }
        extracted.block
    }

    /// Move the cursor. No I/O; the next pull addresses from the new position.
    pub fn seek(&mut self, position: u64) {
        self.position = position;
        self.eof = false;
        log::info!("seek to pos [{}]", position);
    }

    pub fn control(&self, query: ControlQuery) -> Result<ControlAnswer, ControlError> {
        control::answer(&self.caps, query)
    }

    /// Tear down: the base name and the portal are released here.
    pub fn close(self) {
        log::info!(
            "close [{}] at pos {} (base name built {} time(s))",
            self.location,
            self.position,
            self.base_name_builds
        );
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn chunk_size(&self) -> ChunkSize {
        self.chunk_size
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn base_name(&self) -> Option<&Name> {
        self.base_name.as_ref()
    }

    pub fn base_name_builds(&self) -> u32 {
        self.base_name_builds
    }

    pub fn state(&self) -> CursorState {
        if self.eof {
            CursorState::Eof
        } else if self.base_name.is_none() {
            CursorState::Idle
        } else {
            CursorState::Streaming
        }
    }
}

/// Open a stream over a TCP portal to the configured forwarder.
pub fn open_tcp(
    location: &str,
    config: &AccessConfig,
) -> Result<StreamSession<FramedPortal<TcpStream>>, OpenError> {
    config.validate()?;
    let factory = PortalFactory::new(config.credentials.clone())?;
    let portal = factory.connect(config.forwarder.as_str())?;
    StreamSession::open(portal, location, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::testing::ScriptedPortal;
    use crate::protocol::{ContentObject, Interest, Message, ReturnCode};

    const PATH: &str = "a/b/movie.mpg";

    fn base() -> Name {
        Name::parse_uri("ccnx:/ccnx/tutorial/fetch/a/b/movie.mpg").unwrap()
    }

    fn object(chunk: u64, final_chunk: u64, len: usize) -> Message {
        Message::ContentObject(ContentObject {
            name: build_chunk_name(&base(), chunk, &[]),
            final_chunk: Some(final_chunk),
            payload: (0..len).map(|i| i as u8).collect(),
        })
    }

    fn session(replies: Vec<Message>) -> StreamSession<ScriptedPortal> {
        let mut portal = ScriptedPortal::default();
        for r in replies {
            portal.reply(r);
        }
        StreamSession::open(portal, PATH, &AccessConfig::default()).unwrap()
    }

    fn sent_chunks(s: &StreamSession<ScriptedPortal>) -> Vec<u64> {
        s.portal
            .sent
            .iter()
            .map(|i| i.name.chunk_number().unwrap())
            .collect()
    }

    #[test]
    fn first_pull_end_to_end() {
        let mut s = session(vec![object(0, 9, 1200)]);
        assert_eq!(s.state(), CursorState::Idle);
        let block = s.pull().unwrap();
        assert_eq!(block.len(), 1200);
        assert_eq!(s.position(), 1200);
        assert_eq!(s.state(), CursorState::Streaming);
        assert_eq!(s.chunk_size().get(), 1200);
        assert_eq!(
            s.portal.sent[0].name.to_string(),
            "ccnx:/ccnx/tutorial/fetch/a/b/movie.mpg/Chunk=0/F50/L4"
        );
    }

    #[test]
    fn learns_chunk_size_for_next_pull() {
        let mut s = session(vec![object(0, 9, 1000), object(1, 9, 1000)]);
        assert_eq!(s.pull().unwrap().len(), 1000);
        assert_eq!(s.chunk_size().get(), 1000);
        assert_eq!(s.pull().unwrap().len(), 1000);
        assert_eq!(s.position(), 2000);
        assert_eq!(sent_chunks(&s), vec![0, 1]);
    }

    #[test]
    fn mid_chunk_position_after_seek() {
        let mut s = session(vec![object(2, 9, 1200)]);
        s.seek(2500);
        let block = s.pull().unwrap();
        assert_eq!(block.len(), 1100);
        assert_eq!(block[0], 100u8);
        assert_eq!(s.position(), 3600);
        assert_eq!(sent_chunks(&s), vec![2]);
    }

    #[test]
    fn final_chunk_sets_eof_and_stays() {
        let mut s = session(vec![object(9, 9, 300)]);
        s.seek(9 * 1200);
        assert_eq!(s.pull().unwrap().len(), 300);
        assert!(s.is_eof());
        assert_eq!(s.state(), CursorState::Eof);
        // Final chunk does not teach a chunk size.
        assert_eq!(s.chunk_size().get(), 1200);

        assert_eq!(s.pull(), None);
        assert_eq!(s.pull(), None);
        assert!(s.is_eof());
        assert_eq!(s.portal.sent.len(), 1);
    }

    #[test]
    fn seek_clears_eof_without_io() {
        let mut s = session(vec![object(0, 0, 10)]);
        assert_eq!(s.pull().unwrap().len(), 10);
        assert!(s.is_eof());
        s.seek(0);
        assert!(!s.is_eof());
        assert_eq!(s.position(), 0);
        assert_eq!(s.state(), CursorState::Streaming);
        assert_eq!(s.portal.sent.len(), 1);
        assert_eq!(s.portal.receives, 1);
    }

    #[test]
    fn position_past_short_final_chunk_yields_nothing() {
        let mut s = session(vec![object(9, 9, 300)]);
        s.seek(9 * 1200 + 500);
        assert_eq!(s.pull(), None);
        assert!(s.is_eof());
        assert_eq!(s.position(), 9 * 1200 + 500);
    }

    #[test]
    fn send_failure_yields_nothing_and_next_pull_retries() {
        let mut s = session(vec![object(0, 9, 1200)]);
        s.portal.fail_sends = true;
        assert_eq!(s.pull(), None);
        assert_eq!(s.position(), 0);
        assert!(!s.is_eof());
        s.portal.fail_sends = false;
        assert_eq!(s.pull().unwrap().len(), 1200);
        assert_eq!(sent_chunks(&s), vec![0]);
    }

    #[test]
    fn unexpected_or_missing_reply_yields_nothing() {
        let mut s = session(vec![Message::InterestReturn {
            interest: Interest::new(build_chunk_name(&base(), 0, &AccessConfig::default().trailer())),
            code: ReturnCode::NoRoute,
        }]);
        assert_eq!(s.pull(), None);
        assert_eq!(s.pull(), None); // portal has nothing left
        assert_eq!(s.position(), 0);
        assert!(!s.is_eof());
        assert_eq!(s.portal.sent.len(), 2);
    }

    #[test]
    fn base_name_built_once() {
        let replies = (0..5).map(|c| object(c, 9, 1200)).collect();
        let mut s = session(replies);
        for _ in 0..5 {
            assert!(s.pull().is_some());
        }
        s.seek(0);
        assert_eq!(s.base_name_builds(), 1);
        assert_eq!(s.base_name(), Some(&base()));
        assert_eq!(sent_chunks(&s), vec![0, 1, 2, 3, 4]);
        for interest in &s.portal.sent {
            assert!(interest.name.starts_with(&base()));
        }
    }

    #[test]
    fn chunk_size_is_per_session() {
        let mut a = session(vec![object(0, 9, 1000)]);
        let b = session(vec![]);
        a.pull().unwrap();
        assert_eq!(a.chunk_size().get(), 1000);
        assert_eq!(b.chunk_size().get(), 1200);
    }

    #[test]
    fn empty_non_final_payload_keeps_chunk_size() {
        let mut s = session(vec![object(0, 9, 0)]);
        assert_eq!(s.pull(), None);
        assert_eq!(s.chunk_size().get(), 1200);
        assert!(!s.is_eof());
    }

    #[test]
    fn stale_chunk_size_self_corrects() {
        // Learned 1000, then a seek lands in content served in 1200-byte chunks.
        let mut s = session(vec![object(0, 9, 1000), object(2, 9, 1200), object(2, 9, 1200)]);
        s.pull().unwrap();
        s.seek(2400);
        // Addressed with stale size: chunk 2, offset 400.
        assert_eq!(s.pull().unwrap().len(), 800);
        assert_eq!(s.chunk_size().get(), 1200);
        assert_eq!(s.position(), 3200);
        // Next pull addresses with the corrected size.
        assert_eq!(s.pull().unwrap().len(), 400);
        assert_eq!(sent_chunks(&s), vec![0, 2, 2]);
    }

    #[test]
    fn control_uses_config_read_at_open() {
        let config = AccessConfig {
            seekable: false,
            ..AccessConfig::default()
        };
        let s = StreamSession::open(ScriptedPortal::default(), PATH, &config).unwrap();
        assert_eq!(s.control(ControlQuery::CanSeek), Ok(ControlAnswer::Bool(false)));
        assert_eq!(s.control(ControlQuery::CanPause), Ok(ControlAnswer::Bool(true)));
        assert!(s.control(ControlQuery::GetMeta).is_err());
    }

    #[test]
    fn open_rejects_zero_chunk_size() {
        let config = AccessConfig {
            initial_chunk_size: 0,
            ..AccessConfig::default()
        };
        let r = StreamSession::open(ScriptedPortal::default(), PATH, &config);
        assert!(matches!(r, Err(OpenError::Config(ConfigError::ZeroChunkSize))));
    }

    #[test]
    fn custom_trailer_segments() {
        let config = AccessConfig {
            trailer_segments: vec!["F30".into()],
            ..AccessConfig::default()
        };
        let mut portal = ScriptedPortal::default();
        portal.reply(object(0, 9, 1200));
        let mut s = StreamSession::open(portal, PATH, &config).unwrap();
        s.pull().unwrap();
        assert_eq!(
            s.portal.sent[0].name.to_string(),
            "ccnx:/ccnx/tutorial/fetch/a/b/movie.mpg/Chunk=0/F30"
        );
        s.close();
    }
    #[test]
    fn reply_for_other_chunk_is_not_delivered() {
        // A late reply for chunk 3 is queued ahead of the answer for chunk 0.
        let mut s = session(vec![object(3, 9, 1200), object(0, 9, 1200)]);
        let block = s.pull().unwrap();
        assert_eq!(block[..4], [0, 1, 2, 3]);
        assert_eq!(s.position(), 1200);
        assert_eq!(s.portal.receives, 2);
    }

    #[test]
    fn only_other_chunks_yield_nothing() {
        let mut s = session(vec![object(4, 9, 1200)]);
        assert_eq!(s.pull(), None);
        assert_eq!(s.position(), 0);
        assert_eq!(s.chunk_size().get(), 1200);
    }

    #[test]
    fn position_saturates_at_end_of_range() {
        let start = u64::MAX - 10;
        let chunk = chunk_index_for(start, ChunkSize::default());
        let mut s = session(vec![object(chunk, chunk + 1, 1200)]);
        s.seek(start);
        let block = s.pull().unwrap();
        assert_eq!(block.len(), 1200 - (start % 1200) as usize);
        assert_eq!(s.position(), u64::MAX);
    }
}
