use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::io;

use crate::chunk::ChunkData;
use crate::iter::Iter;

/// An out-of-band command an iteratee can send upstream.
///
/// Commands travel outward through the enclosing enumerators until one of
/// them has a registered handler for the command's type, or the top level
/// answers with the no-handler reply. The response type is recovered by
/// runtime type tag on the way back down.
pub trait CtlCommand: Any {
    type Response: Any;

    /// Whether a handled command invalidates input the handling
    /// enumerator is holding (seeking does; queries do not).
    fn flushes_input(&self) -> bool {
        false
    }
}

/// Reply to a control request. `None` means no enumerator handled the
/// request, or the handler could not satisfy it.
pub type CtlResponse = Option<Box<dyn Any>>;

/// A type-erased control request in flight.
pub struct CtlReq {
    payload: Box<dyn Any>,
    tag: TypeId,
    name: &'static str,
    flush: bool,
}

impl CtlReq {
    pub fn new<R: CtlCommand>(command: R) -> Self {
        let flush = command.flushes_input();
        CtlReq {
            payload: Box::new(command),
            tag: TypeId::of::<R>(),
            name: type_name::<R>(),
            flush,
        }
    }

    pub fn tag(&self) -> TypeId {
        self.tag
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn flushes_input(&self) -> bool {
        self.flush
    }

    /// Recovers the concrete command, or gives the request back untouched.
    pub fn downcast<R: CtlCommand>(self) -> Result<R, CtlReq> {
        if self.tag == TypeId::of::<R>() {
            let payload = self
                .payload
                .downcast::<R>()
                .expect("control request tag and payload disagree");
            Ok(*payload)
        } else {
            Err(self)
        }
    }
}

impl fmt::Debug for CtlReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CtlReq")
            .field("name", &self.name)
            .field("flush", &self.flush)
            .finish()
    }
}

/// Suspends the iteratee on a control request until some enclosing
/// enumerator replies. The result is `None` when nobody handled it.
///
/// ```rust
/// use rill::{ctl, from_chunk, Source, TellReq};
///
/// // No enumerator in this pipeline understands `TellReq`, so the
/// // iteratee receives the no-handler reply and carries on.
/// let probe = ctl(TellReq).and_then(|pos: Option<u64>| {
///     assert!(pos.is_none());
///     rill::take(2)
/// });
/// let out = from_chunk(b"hi".to_vec()).run(probe).unwrap();
/// assert_eq!(out, b"hi".to_vec());
/// ```
pub fn ctl<T: ChunkData, R: CtlCommand>(command: R) -> Iter<T, Option<R::Response>> {
    Iter::Ctl(
        CtlReq::new(command),
        Box::new(|reply: CtlResponse| {
            Iter::done(reply.and_then(|boxed| boxed.downcast::<R::Response>().ok().map(|b| *b)))
        }),
    )
}

/// A per-enumerator table of control handlers, consulted in registration
/// order by type tag. Requests with no matching entry propagate outward.
#[derive(Default)]
pub struct CtlHandlers {
    entries: Vec<(TypeId, Box<dyn FnMut(CtlReq) -> CtlResponse>)>,
}

impl CtlHandlers {
    pub fn new() -> Self {
        CtlHandlers::default()
    }

    /// Registers a handler for one command type. The handler returns
    /// `None` when it cannot satisfy the request.
    pub fn on<R, F>(mut self, mut handler: F) -> Self
    where
        R: CtlCommand,
        F: FnMut(R) -> Option<R::Response> + 'static,
    {
        self.entries.push((
            TypeId::of::<R>(),
            Box::new(move |req: CtlReq| match req.downcast::<R>() {
                Ok(command) => handler(command).map(|resp| Box::new(resp) as Box<dyn Any>),
                Err(_) => None,
            }),
        ));
        self
    }

    /// Runs the first matching handler, or gives the request back for
    /// outward propagation.
    pub fn dispatch(&mut self, req: CtlReq) -> Result<CtlResponse, CtlReq> {
        match self
            .entries
            .iter_mut()
            .find(|(tag, _)| *tag == req.tag())
        {
            Some((_, handler)) => Ok(handler(req)),
            None => Err(req),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CtlHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CtlHandlers({} entries)", self.entries.len())
    }
}

/// Reposition the stream. Handling this invalidates buffered input, so it
/// is marked as flushing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekReq(pub io::SeekFrom);

impl CtlCommand for SeekReq {
    type Response = u64;

    fn flushes_input(&self) -> bool {
        true
    }
}

/// Ask for the current stream position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TellReq;

impl CtlCommand for TellReq {
    type Response = u64;
}

/// Ask for the total stream size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeReq;

impl CtlCommand for SizeReq {
    type Response = u64;
}

/// Ask for the file descriptor of the socket backing the stream, if any.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetSocketReq;

#[cfg(unix)]
impl CtlCommand for GetSocketReq {
    type Response = std::os::fd::RawFd;
}
