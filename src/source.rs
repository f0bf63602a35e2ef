use std::io;
use std::marker::PhantomData;

use crate::cat::Cat;
use crate::catch::{CatchHandler, SourceCatch};
use crate::chunk::{Chunk, ChunkData};
use crate::codec::{Codec, CodecOutput};
use crate::ctl::CtlHandlers;
use crate::error::IterError;
use crate::fuse::FusedSource;
use crate::iter::Iter;
use crate::stage::Stage;

/// An outer enumerator: a pure data source that drives a consumer.
///
/// `feed` pushes chunks into the consumer until the consumer stops
/// wanting input or the source runs out of data. Every implementation is
/// bound by the same discipline:
///
///   * never feed the end-of-stream chunk — a consumer left wanting
///     input can be handed to another source afterwards
///     (concatenation depends on this);
///   * stop as soon as the consumer is not in the `Next` state;
///   * translate an end-of-file from the producing action into quiet
///     termination, and any other failure into
///     [`Iter::SourceFail`] carrying the consumer untouched;
///   * answer control requests from the handler table, replying
///     "no handler" to unregistered ones — an outer enumerator is the
///     outermost hop a request can reach;
///   * release whatever was acquired, on every termination path.
///
/// ```rust
/// use rill::{from_chunk, take, Source};
///
/// let combined = from_chunk(b"ab".to_vec()).cat(from_chunk(b"cd".to_vec()));
/// assert_eq!(combined.run(take(3)).unwrap(), b"abc".to_vec());
/// ```
pub trait Source<T: ChunkData>: Sized {
    /// Feeds this source's data to `iter`, returning the consumer's new
    /// state.
    fn feed<A: 'static>(self, iter: Iter<T, A>) -> Iter<T, A>;

    /// Sequential concatenation: this source first, then `other` if the
    /// consumer still wants input.
    fn cat<S: Source<T>>(self, other: S) -> Cat<Self, S> {
        Cat::new(self, other)
    }

    /// Fuses a transforming stage onto this source, yielding a source of
    /// the stage's output type. The fused source owns the combined
    /// failures of both halves.
    fn fuse<O: ChunkData, G: Stage<T, O>>(self, stage: G) -> FusedSource<Self, G, T> {
        FusedSource::new(self, stage)
    }

    /// Catches failures of this source itself. Consumer failures and
    /// failures of stages fused on afterwards pass through untouched.
    fn catch<H: CatchHandler<T>>(self, handler: H) -> SourceCatch<Self, H> {
        SourceCatch::own(self, handler)
    }

    /// Like [`catch`](Source::catch), but additionally sees failures of
    /// stages fused onto this source later, on the same side of
    /// [`run`](Source::run).
    fn catch_fused<H: CatchHandler<T>>(self, handler: H) -> SourceCatch<Self, H> {
        SourceCatch::fused(self, handler)
    }

    /// Feeds everything to `iter` and runs it to its value.
    ///
    /// Enumerator failures already present on the consumer side are
    /// re-classified into plain consumer failures first, so catch
    /// combinators wrapped around this source only ever see their own.
    fn run<A: 'static>(self, iter: Iter<T, A>) -> Result<A, IterError> {
        self.feed(iter.seal()).run()
    }
}

/// A source feeding one chunk per item of an iterator.
pub struct IterSource<I>(I);

/// A pure in-memory source producing a single chunk.
pub fn from_chunk<T: ChunkData>(payload: T) -> IterSource<std::option::IntoIter<T>> {
    IterSource(Some(payload).into_iter())
}

/// A pure in-memory source producing one chunk per item, in order.
pub fn from_chunks<T, I>(chunks: I) -> IterSource<I::IntoIter>
where
    T: ChunkData,
    I: IntoIterator<Item = T>,
{
    IterSource(chunks.into_iter())
}

impl<T, I> Source<T> for IterSource<I>
where
    T: ChunkData,
    I: Iterator<Item = T>,
{
    fn feed<A: 'static>(mut self, mut iter: Iter<T, A>) -> Iter<T, A> {
        loop {
            iter = match iter {
                Iter::Ctl(_, k) => k(None),
                other => other,
            };
            if !iter.wants_input() {
                return iter;
            }
            match self.0.next() {
                Some(payload) => iter = iter.step(Chunk::new(payload)),
                None => return iter,
            }
        }
    }
}

/// The generic codec-driven source: cranks the codec for one unit of
/// output at a time and feeds it onward.
pub struct CodecSource<O: ChunkData> {
    codec: Codec<(), O>,
    handlers: CtlHandlers,
}

impl<O: ChunkData> CodecSource<O> {
    pub fn new(codec: Codec<(), O>) -> Self {
        CodecSource {
            codec,
            handlers: CtlHandlers::new(),
        }
    }

    /// Registers control handlers this source answers for downstream
    /// consumers.
    pub fn with_ctl(mut self, handlers: CtlHandlers) -> Self {
        self.handlers = handlers;
        self
    }
}

/// A source from a plain producing function; shorthand for a
/// [`Codec::pull`] codec.
pub fn from_fn<O, F>(f: F) -> CodecSource<O>
where
    O: ChunkData,
    F: FnMut() -> io::Result<Option<O>> + 'static,
{
    CodecSource::new(Codec::pull(f))
}

impl<O: ChunkData> Source<O> for CodecSource<O> {
    fn feed<A: 'static>(self, iter: Iter<O, A>) -> Iter<O, A> {
        let CodecSource {
            mut codec,
            mut handlers,
        } = self;
        let mut iter = iter;
        loop {
            iter = match iter {
                Iter::Ctl(req, k) => match handlers.dispatch(req) {
                    Ok(reply) => k(reply),
                    Err(_) => k(None),
                },
                other => other,
            };
            if !iter.wants_input() {
                return iter;
            }
            match crank(codec) {
                Ok(CodecOutput::More(out, next)) => {
                    iter = iter.step(Chunk::new(out));
                    codec = *next;
                }
                Ok(CodecOutput::Last(out)) => {
                    iter = iter.step(Chunk::new(out));
                    codec = Codec::new(Iter::done(CodecOutput::Stop));
                }
                Ok(CodecOutput::Stop) => return iter,
                Err(err) if err.is_eof() => return iter,
                Err(err) => return Iter::SourceFail(err, Box::new(iter)),
            }
        }
    }
}

/// Drives a source codec to its next output unit. Source codecs have no
/// upstream data, so they are stepped with end-of-stream chunks; their
/// work happens in the effects of their continuations.
fn crank<O: 'static>(codec: Codec<(), O>) -> Result<CodecOutput<(), O>, IterError> {
    let mut state = codec.into_inner();
    loop {
        match state {
            Iter::Done(out, _) => return Ok(out),
            Iter::Next(_) => state = state.step(Chunk::eof()),
            Iter::Fail(err) | Iter::SourceFail(err, _) | Iter::StageFail(err, _) => {
                return Err(err)
            }
            Iter::Ctl(_, k) => state = k(None),
        }
    }
}

/// A source that brackets its production between acquiring and releasing
/// a resource. `release` runs exactly once, whatever happens: a release
/// failure becomes the termination failure unless production already
/// failed, in which case the production failure wins.
pub struct BracketSource<R, Acq, Rel, Prod> {
    acquire: Acq,
    release: Rel,
    produce: Prod,
    _phantom: PhantomData<fn() -> R>,
}

/// Builds a bracketed source from an acquiring action, a releasing
/// action, and a chunk-producing function over the resource.
///
/// ```rust
/// use rill::{bracket, fold_chunks, Source};
///
/// let lines = vec![b"one".to_vec(), b"two".to_vec()].into_iter();
/// let source = bracket(
///     move || Ok(lines),
///     |_lines| Ok(()),
///     |lines: &mut std::vec::IntoIter<Vec<u8>>| Ok(lines.next()),
/// );
/// let all = source
///     .run(fold_chunks(Vec::new(), |acc: Vec<u8>, c: Vec<u8>| {
///         acc.into_iter().chain(c).collect()
///     }))
///     .unwrap();
/// assert_eq!(all, b"onetwo".to_vec());
/// ```
pub fn bracket<R, Acq, Rel, Prod>(
    acquire: Acq,
    release: Rel,
    produce: Prod,
) -> BracketSource<R, Acq, Rel, Prod> {
    BracketSource {
        acquire,
        release,
        produce,
        _phantom: PhantomData,
    }
}

impl<T, R, Acq, Rel, Prod> Source<T> for BracketSource<R, Acq, Rel, Prod>
where
    T: ChunkData,
    Acq: FnOnce() -> io::Result<R>,
    Rel: FnOnce(R) -> io::Result<()>,
    Prod: FnMut(&mut R) -> io::Result<Option<T>>,
{
    fn feed<A: 'static>(self, iter: Iter<T, A>) -> Iter<T, A> {
        let BracketSource {
            acquire,
            release,
            mut produce,
            ..
        } = self;
        let mut iter = iter;
        let mut resource = match acquire() {
            Ok(resource) => resource,
            Err(err) => return Iter::SourceFail(IterError::from_io(err), Box::new(iter)),
        };
        let mut failure = None;
        loop {
            iter = match iter {
                Iter::Ctl(_, k) => k(None),
                other => other,
            };
            if !iter.wants_input() {
                break;
            }
            match produce(&mut resource) {
                Ok(Some(payload)) => iter = iter.step(Chunk::new(payload)),
                Ok(None) => break,
                Err(err) => {
                    let err = IterError::from_io(err);
                    if !err.is_eof() {
                        failure = Some(err);
                    }
                    break;
                }
            }
        }
        match (failure, release(resource)) {
            (Some(err), _) => Iter::SourceFail(err, Box::new(iter)),
            (None, Err(err)) => Iter::SourceFail(IterError::from_io(err), Box::new(iter)),
            (None, Ok(())) => iter,
        }
    }
}
