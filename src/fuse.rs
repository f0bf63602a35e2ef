use std::marker::PhantomData;

use crate::chunk::{Chunk, ChunkData};
use crate::iter::Iter;
use crate::source::Source;
use crate::stage::Stage;

/// A source fused with a transforming stage, built with [`Source::fuse`].
/// Acts as a source of the stage's output type and owns the combined
/// failures of both halves.
pub struct FusedSource<S, G, T> {
    source: S,
    stage: G,
    _marker: PhantomData<T>,
}

impl<S, G, T> FusedSource<S, G, T> {
    pub(crate) fn new(source: S, stage: G) -> Self {
        FusedSource {
            source,
            stage,
            _marker: PhantomData,
        }
    }
}

impl<T, O, S, G> Source<O> for FusedSource<S, G, T>
where
    T: ChunkData,
    O: ChunkData,
    S: Source<T>,
    G: Stage<T, O>,
{
    fn feed<A: 'static>(self, iter: Iter<O, A>) -> Iter<O, A> {
        pop(self.source.feed(self.stage.feed(iter)))
    }
}

/// Two stages fused into one, built with [`Stage::fuse`].
pub struct FusedStage<G1, G2, O> {
    first: G1,
    second: G2,
    _marker: PhantomData<O>,
}

impl<G1, G2, O> FusedStage<G1, G2, O> {
    pub(crate) fn new(first: G1, second: G2) -> Self {
        FusedStage {
            first,
            second,
            _marker: PhantomData,
        }
    }
}

impl<I, O, O2, G1, G2> Stage<I, O2> for FusedStage<G1, G2, O>
where
    I: ChunkData,
    O: ChunkData,
    O2: ChunkData,
    G1: Stage<I, O>,
    G2: Stage<O, O2>,
{
    fn feed<A: 'static>(self, iter: Iter<O2, A>) -> Iter<I, Iter<O2, A>> {
        self.first.feed(self.second.feed(iter)).map(pop)
    }
}

/// Resolves a finished outer level and extracts the downstream consumer.
///
/// The outer iteratee (a stage wrapped around the consumer) is run to
/// completion with end-of-stream chunks — the stage flushes and hands the
/// downstream consumer back unfed, so the consumer itself never sees that
/// end of stream. Stage failures are rewritten into source failures at
/// the resolved level: after fusion the combined enumerator owns them.
/// Control requests at the dissolving level get the no-handler reply.
pub(crate) fn pop<T, O, A>(outer: Iter<T, Iter<O, A>>) -> Iter<O, A>
where
    T: ChunkData,
    O: ChunkData,
    A: 'static,
{
    let mut outer = outer;
    loop {
        match outer {
            Iter::Done(inner, _) => return inner,
            Iter::Next(_) => outer = outer.step(Chunk::eof()),
            Iter::Fail(err) => return Iter::Fail(err),
            Iter::SourceFail(err, wrapped) => {
                return Iter::SourceFail(err, Box::new(pop(*wrapped)))
            }
            Iter::StageFail(err, inner) => return Iter::SourceFail(err, Box::new(inner)),
            Iter::Ctl(_, k) => outer = k(None),
        }
    }
}
