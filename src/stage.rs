use crate::cat::Cat;
use crate::catch::{CatchHandler, StageCatch};
use crate::chunk::{Chunk, ChunkData};
use crate::codec::{Codec, CodecOutput};
use crate::ctl::CtlHandlers;
use crate::fuse::FusedStage;
use crate::iter::Iter;

/// An inner enumerator: a transformer that consumes upstream chunks of
/// `I` and feeds transcoded chunks of `O` to a downstream consumer.
///
/// A stage is itself a consumer over the upstream type — `feed` returns
/// `Iter<I, Iter<O, A>>`, an iteratee whose *result* is the downstream
/// consumer's state. When the stage ends (upstream exhausted, codec
/// finished, or downstream settled) the downstream consumer can be popped
/// out and handed to another enumerator; the stage never feeds it the
/// end-of-stream chunk.
///
/// ```rust
/// use rill::{from_chunk, take, CodecStage, Source, Stage};
///
/// let upper = CodecStage::map(|payload: Vec<u8>| {
///     payload.iter().map(u8::to_ascii_uppercase).collect::<Vec<u8>>()
/// });
/// let out = from_chunk(b"abc".to_vec()).fuse(upper).run(take(3)).unwrap();
/// assert_eq!(out, b"ABC".to_vec());
/// ```
pub trait Stage<I: ChunkData, O: ChunkData>: Sized {
    /// Wraps a downstream consumer, yielding the stage as a consumer of
    /// the upstream type whose result is the downstream state.
    fn feed<A: 'static>(self, iter: Iter<O, A>) -> Iter<I, Iter<O, A>>;

    /// Fuses two stages into one transforming `I` all the way to `O2`.
    fn fuse<O2: ChunkData, G: Stage<O, O2>>(self, next: G) -> FusedStage<Self, G, O> {
        FusedStage::new(self, next)
    }

    /// Sequential concatenation: this stage transcodes first; when it
    /// ends, `other` picks up the same downstream consumer.
    fn cat<G: Stage<I, O>>(self, other: G) -> Cat<Self, G> {
        Cat::new(self, other)
    }

    /// Fuses the stage into a consumer, yielding a consumer of the
    /// upstream type: when the stage ends, the downstream consumer is run
    /// to its value.
    fn apply<A: 'static>(self, iter: Iter<O, A>) -> Iter<I, A> {
        self.feed(iter).and_then(|inner| match inner.finish() {
            Ok(a) => Iter::done(a),
            Err(err) => Iter::fail_with(err),
        })
    }

    /// Catches enumerator failures surfacing at this stage's level,
    /// sparing plain consumer failures.
    fn catch<H: CatchHandler<I>>(self, handler: H) -> StageCatch<Self, H> {
        StageCatch::new(self, handler)
    }
}

/// The generic codec-driven stage: consumes upstream input to drive the
/// codec and feeds each produced unit downstream.
///
/// When the upstream stream ends, the codec still receives the
/// end-of-stream step so it can flush; the downstream consumer does not.
/// An end-of-file failure from the codec is quiet termination; any other
/// failure becomes [`Iter::StageFail`] carrying the downstream consumer.
pub struct CodecStage<I: ChunkData, O: ChunkData> {
    codec: Codec<I, O>,
    handlers: CtlHandlers,
}

impl<I: ChunkData, O: ChunkData> CodecStage<I, O> {
    pub fn new(codec: Codec<I, O>) -> Self {
        CodecStage {
            codec,
            handlers: CtlHandlers::new(),
        }
    }

    /// A stage that maps each arriving payload through a function;
    /// shorthand for a [`Codec::map`] codec.
    pub fn map<F>(f: F) -> Self
    where
        F: FnMut(I) -> O + 'static,
    {
        CodecStage::new(Codec::map(f))
    }

    /// Registers control handlers this stage answers for downstream
    /// consumers. Requests it does not understand travel onward to the
    /// next enumerator out.
    pub fn with_ctl(mut self, handlers: CtlHandlers) -> Self {
        self.handlers = handlers;
        self
    }
}

impl<I: ChunkData, O: ChunkData> Stage<I, O> for CodecStage<I, O> {
    fn feed<A: 'static>(self, iter: Iter<O, A>) -> Iter<I, Iter<O, A>> {
        drive(self.codec.into_inner(), self.handlers, iter)
    }
}

/// The stage loop: resolve downstream control requests, stop if the
/// downstream settled, otherwise advance the codec by one unit and feed
/// its output onward. Suspends at the upstream level whenever the codec
/// needs input.
fn drive<I, O, A>(
    mut codec: Iter<I, CodecOutput<I, O>>,
    mut handlers: CtlHandlers,
    mut iter: Iter<O, A>,
) -> Iter<I, Iter<O, A>>
where
    I: ChunkData,
    O: ChunkData,
    A: 'static,
{
    loop {
        match iter {
            Iter::Ctl(req, k) => {
                match handlers.dispatch(req) {
                    Ok(reply) => iter = k(reply),
                    Err(req) => {
                        return Iter::Ctl(
                            req,
                            Box::new(move |reply| drive(codec, handlers, k(reply))),
                        );
                    }
                }
                continue;
            }
            _ => {}
        }
        if !iter.wants_input() {
            return Iter::done(iter);
        }
        match codec {
            Iter::Done(out, rest) => match out {
                CodecOutput::More(o, next) => {
                    iter = iter.step(Chunk::new(o));
                    codec = if rest.is_identity() {
                        next.into_inner()
                    } else {
                        next.into_inner().step(rest)
                    };
                }
                CodecOutput::Last(o) => {
                    iter = iter.step(Chunk::new(o));
                    return finish(iter, rest, handlers);
                }
                CodecOutput::Stop => return finish(iter, rest, handlers),
            },
            Iter::Next(f) => {
                return Iter::next(move |input: Chunk<I>| {
                    drive(Iter::Next(f).step(input), handlers, iter)
                });
            }
            Iter::Fail(err) | Iter::SourceFail(err, _) | Iter::StageFail(err, _) => {
                return if err.is_eof() {
                    Iter::done(iter)
                } else {
                    Iter::StageFail(err, iter)
                };
            }
            Iter::Ctl(req, k) => match handlers.dispatch(req) {
                Ok(reply) => codec = k(reply),
                Err(req) => {
                    return Iter::Ctl(
                        req,
                        Box::new(move |reply| drive(k(reply), handlers, iter)),
                    );
                }
            },
        }
    }
}

/// Ends the stage: resolves trailing downstream control requests, then
/// settles with the downstream consumer as the result and the unconsumed
/// upstream input as residual.
fn finish<I, O, A>(
    iter: Iter<O, A>,
    rest: Chunk<I>,
    mut handlers: CtlHandlers,
) -> Iter<I, Iter<O, A>>
where
    I: ChunkData,
    O: ChunkData,
    A: 'static,
{
    match iter {
        Iter::Ctl(req, k) => match handlers.dispatch(req) {
            Ok(reply) => finish(k(reply), rest, handlers),
            Err(req) => Iter::Ctl(
                req,
                Box::new(move |reply| finish(k(reply), rest, handlers)),
            ),
        },
        settled => Iter::done_with(settled, rest),
    }
}
