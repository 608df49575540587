//! C ABI for linking ccnx-access as a static library into a native media player plugin.
//! The plugin's open/block/seek/control/close callbacks forward to these.

use std::ffi::c_void;
use std::os::raw::c_int;
use std::slice;

use crate::config::{self, AccessConfig};
use crate::control::{ControlAnswer, ControlQuery};
use crate::portal::{Portal, PortalFactory};
use crate::protocol::PROTOCOL_VERSION;
use crate::stream::StreamSession;

type DynPortal = Box<dyn Portal + Send>;

/// Session plus bytes of the last block the host buffer could not take.
struct Handle {
    session: StreamSession<DynPortal>,
    pending: Vec<u8>,
    pending_off: usize,
}

impl Handle {
    fn new(session: StreamSession<DynPortal>) -> Self {
        Self {
            session,
            pending: Vec::new(),
            pending_off: 0,
        }
    }

    fn pending_len(&self) -> usize {
        self.pending.len() - self.pending_off
    }

    /// Copy up to `out.len()` bytes: leftovers first, else one fresh block. 0 = nothing this cycle.
    fn pull_into(&mut self, out: &mut [u8]) -> usize {
        if self.pending_len() == 0 {
            match self.session.pull() {
                Some(block) => {
                    self.pending = block;
                    self.pending_off = 0;
                }
                None => return 0,
            }
        }
        let n = self.pending_len().min(out.len());
        out[..n].copy_from_slice(&self.pending[self.pending_off..self.pending_off + n]);
        self.pending_off += n;
        if self.pending_len() == 0 {
            self.pending.clear();
            self.pending_off = 0;
        }
        n
    }

    fn seek(&mut self, position: u64) {
        self.pending.clear();
        self.pending_off = 0;
        self.session.seek(position);
    }

    /// Position as seen by the host: bytes still pending have not been delivered.
    fn position(&self) -> u64 {
        self.session.position() - self.pending_len() as u64
    }

    fn eof(&self) -> bool {
        self.session.is_eof() && self.pending_len() == 0
    }
}

fn into_raw(handle: Handle) -> *mut c_void {
    Box::into_raw(Box::new(handle)) as *mut c_void
}

/// Returns the protocol version. Keeps a C symbol exported from the staticlib.
#[no_mangle]
pub extern "C" fn ccnx_access_version() -> u8 {
    PROTOCOL_VERSION
}

/// Open a stream for `location` (UTF-8 file path, e.g. "a/b/movie.mpg").
/// `forwarder` may be null to use the configured forwarder. Returns an opaque handle or null.
#[no_mangle]
pub extern "C" fn ccnx_access_open(
    location: *const u8,
    location_len: usize,
    forwarder: *const u8,
    forwarder_len: usize,
) -> *mut c_void {
    if location.is_null() {
        return std::ptr::null_mut();
    }
    let location_slice = unsafe { slice::from_raw_parts(location, location_len) };
    let Ok(location) = std::str::from_utf8(location_slice) else {
        log::error!("open failed: location is not UTF-8");
        return std::ptr::null_mut();
    };
    let mut cfg = config::load();
    if !forwarder.is_null() {
        let fwd = unsafe { slice::from_raw_parts(forwarder, forwarder_len) };
        match std::str::from_utf8(fwd) {
            Ok(s) => cfg.forwarder = s.to_string(),
            Err(_) => {
                log::error!("open failed: forwarder is not UTF-8");
                return std::ptr::null_mut();
            }
        }
    }
    match open_with(location, &cfg) {
        Some(handle) => into_raw(handle),
        None => std::ptr::null_mut(),
    }
}

fn open_with(location: &str, cfg: &AccessConfig) -> Option<Handle> {
    let factory = match PortalFactory::new(cfg.credentials.clone()) {
        Ok(f) => f,
        Err(e) => {
            log::error!("open failed. Could not create portal factory: {}", e);
            return None;
        }
    };
    let portal = match factory.connect(cfg.forwarder.as_str()) {
        Ok(p) => p,
        Err(e) => {
            log::error!("open failed. Could not create portal to {}: {}", cfg.forwarder, e);
            return None;
        }
    };
    match StreamSession::open(Box::new(portal) as DynPortal, location, cfg) {
        Ok(session) => Some(Handle::new(session)),
        Err(e) => {
            log::error!("open failed: {}", e);
            None
        }
    }
}

/// Close a stream. No-op if h is null.
#[no_mangle]
pub extern "C" fn ccnx_access_close(h: *mut c_void) {
    if h.is_null() {
        return;
    }
    let handle = unsafe { Box::from_raw(h as *mut Handle) };
    handle.session.close();
}

/// Pull the next bytes into out_buf. Returns bytes written, 0 when there is nothing this
/// cycle (check ccnx_access_eof), or -1 on bad arguments.
#[no_mangle]
pub extern "C" fn ccnx_access_pull(h: *mut c_void, out_buf: *mut u8, out_buf_len: usize) -> c_int {
    if h.is_null() || out_buf.is_null() || out_buf_len == 0 {
        return -1;
    }
    let handle = unsafe { &mut *(h as *mut Handle) };
    let out_len = out_buf_len.min(c_int::MAX as usize);
    let out = unsafe { slice::from_raw_parts_mut(out_buf, out_len) };
    handle.pull_into(out) as c_int
}

/// Buffer size that takes a whole block without leftovers (current learned chunk size).
#[no_mangle]
pub extern "C" fn ccnx_access_block_size_hint(h: *mut c_void) -> u64 {
    if h.is_null() {
        return 0;
    }
    let handle = unsafe { &*(h as *const Handle) };
    handle.session.chunk_size().get()
}

/// Seek to an absolute byte position. Always succeeds (0) for a valid handle.
#[no_mangle]
pub extern "C" fn ccnx_access_seek(h: *mut c_void, position: u64) -> c_int {
    if h.is_null() {
        return -1;
    }
    let handle = unsafe { &mut *(h as *mut Handle) };
    handle.seek(position);
    0
}

/// Current byte position delivered to the host.
#[no_mangle]
pub extern "C" fn ccnx_access_position(h: *mut c_void) -> u64 {
    if h.is_null() {
        return 0;
    }
    let handle = unsafe { &*(h as *const Handle) };
    handle.position()
}

/// 1 at end of stream, 0 otherwise, -1 if h is null.
#[no_mangle]
pub extern "C" fn ccnx_access_eof(h: *mut c_void) -> c_int {
    if h.is_null() {
        return -1;
    }
    let handle = unsafe { &*(h as *const Handle) };
    handle.eof() as c_int
}

/// Boolean control query, `query` coded as in `ControlQuery::from_code` (0 can-seek,
/// 2 can-pause, 8 set-pause...). `arg` is the set-pause state.
/// Returns 0 and fills out_value, or -1 if unsupported.
#[no_mangle]
pub extern "C" fn ccnx_access_control_bool(
    h: *mut c_void,
    query: c_int,
    arg: bool,
    out_value: *mut bool,
) -> c_int {
    if h.is_null() {
        return -1;
    }
    let handle = unsafe { &*(h as *const Handle) };
    match handle.session.control(ControlQuery::from_code(query, arg)) {
        Ok(ControlAnswer::Bool(b)) => {
            if !out_value.is_null() {
                unsafe { *out_value = b };
            }
            0
        }
        Ok(ControlAnswer::Done) => 0,
        _ => -1,
    }
}

/// Integer control query (code 4: playback latency in microseconds). Returns 0 or -1 if unsupported.
#[no_mangle]
pub extern "C" fn ccnx_access_control_i64(h: *mut c_void, query: c_int, out_value: *mut i64) -> c_int {
    if h.is_null() || out_value.is_null() {
        return -1;
    }
    let handle = unsafe { &*(h as *const Handle) };
    match handle.session.control(ControlQuery::from_code(query, false)) {
        Ok(ControlAnswer::Delay(d)) => {
            unsafe { *out_value = d };
            0
        }
        _ => -1,
    }
}
