//! One blocking Interest/Content Object exchange per chunk.

use crate::name::Name;
use crate::portal::{Portal, PortalError, Timeout};
use crate::protocol::{ContentObject, Interest, Message, Response};

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("error writing to portal: {0}")]
    Send(#[source] PortalError),
    #[error("no message from portal: {0}")]
    NoResponse(#[source] PortalError),
    #[error("unexpected message from portal (packet type {0})")]
    UnexpectedMessage(u8),
}

/// Send an Interest for `name` and wait for the matching reply under `timeout`.
///
/// Replies to other Interests (late answers to an exchange that timed out) are
/// dropped and receiving continues. Anything else that is not a content object
/// is an error; no retry is attempted.
pub fn fetch_chunk<P: Portal + ?Sized>(
    portal: &mut P,
    name: Name,
    timeout: Timeout,
) -> Result<ContentObject, ExchangeError> {
    let interest = Interest::new(name);
    portal.send(&interest, timeout).map_err(ExchangeError::Send)?;
    loop {
        let reply = portal.receive(timeout).map_err(ExchangeError::NoResponse)?;
        match reply.into_response() {
            Response::ContentObject(co) if answers(&interest.name, &co.name) => return Ok(co),
            Response::ContentObject(co) => {
                log::debug!("dropping content object {} (waiting for {})", co.name, interest.name);
            }
            Response::Other(Message::InterestReturn { interest: returned, .. })
                if returned.name != interest.name =>
            {
                log::debug!("dropping interest return for {}", returned.name);
            }
            Response::Other(msg) => return Err(ExchangeError::UnexpectedMessage(msg.packet_type())),
        }
    }
}

/// True if `reply` names the object `interest` asked for. Servers may drop the
/// trailer segments, so the reply only has to be a prefix that keeps the chunk segment.
fn answers(interest: &Name, reply: &Name) -> bool {
    interest.starts_with(reply)
        && reply.chunk_number().is_some()
        && reply.chunk_number() == interest.chunk_number()
}
