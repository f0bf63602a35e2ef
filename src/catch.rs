use crate::chunk::{Chunk, ChunkData};
use crate::error::IterError;
use crate::iter::Iter;
use crate::source::Source;
use crate::stage::Stage;

/// Wraps a consumer so that, when it settles into any failure state, the
/// handler runs with a copy of the error and the complete failing state.
///
/// The state lets a handler tell the failure flavours apart: for a
/// [`Iter::SourceFail`] it can recover the still-live consumer with
/// [`resume`] and hand it to a fresh source; for a plain
/// [`Iter::Fail`] there is nothing to resume and it can substitute a
/// replacement or give the state back unchanged to re-raise.
pub fn catch_iter<T, A, H>(iter: Iter<T, A>, handler: H) -> Iter<T, A>
where
    T: ChunkData,
    A: 'static,
    H: FnOnce(IterError, Iter<T, A>) -> Iter<T, A> + 'static,
{
    match iter {
        Iter::Next(f) => Iter::next(move |input| catch_iter(Iter::Next(f).step(input), handler)),
        Iter::Fail(err) => {
            let e = err.clone();
            handler(e, Iter::Fail(err))
        }
        Iter::SourceFail(err, inner) => {
            let e = err.clone();
            handler(e, Iter::SourceFail(err, inner))
        }
        Iter::StageFail(err, a) => {
            let e = err.clone();
            handler(e, Iter::StageFail(err, a))
        }
        Iter::Ctl(req, k) => Iter::Ctl(req, Box::new(move |reply| catch_iter(k(reply), handler))),
        done => done,
    }
}

/// Like [`catch_iter`], but every chunk fed to the consumer is also saved;
/// on failure the handler's replacement starts over on the fully rewound
/// input. Memory grows with the input consumed before the failure.
pub fn catch_backtrack<T, A, H>(iter: Iter<T, A>, handler: H) -> Iter<T, A>
where
    T: ChunkData,
    A: 'static,
    H: FnOnce(IterError) -> Iter<T, A> + 'static,
{
    saving(iter, Chunk::empty(), handler)
}

fn saving<T, A, H>(iter: Iter<T, A>, saved: Chunk<T>, handler: H) -> Iter<T, A>
where
    T: ChunkData,
    A: 'static,
    H: FnOnce(IterError) -> Iter<T, A> + 'static,
{
    match iter {
        Iter::Next(f) => Iter::next(move |input: Chunk<T>| {
            let saved = saved.append(input.clone());
            saving(Iter::Next(f).step(input), saved, handler)
        }),
        Iter::Fail(err) | Iter::SourceFail(err, _) | Iter::StageFail(err, _) => {
            let replacement = handler(err);
            if saved.is_identity() {
                replacement
            } else {
                replacement.step(saved)
            }
        }
        Iter::Ctl(req, k) => {
            Iter::Ctl(req, Box::new(move |reply| saving(k(reply), saved, handler)))
        }
        done => done,
    }
}

/// Rewrites the error inside whichever failure state the consumer settles
/// into, leaving everything else alone. This is how expected-token sets
/// accumulate across parser alternatives.
pub fn map_fail<T, A, F>(iter: Iter<T, A>, f: F) -> Iter<T, A>
where
    T: ChunkData,
    A: 'static,
    F: FnOnce(IterError) -> IterError + 'static,
{
    match iter {
        Iter::Next(g) => Iter::next(move |input| map_fail(Iter::Next(g).step(input), f)),
        Iter::Fail(err) => Iter::Fail(f(err)),
        Iter::SourceFail(err, inner) => Iter::SourceFail(f(err), inner),
        Iter::StageFail(err, a) => Iter::StageFail(f(err), a),
        Iter::Ctl(req, k) => Iter::Ctl(req, Box::new(move |reply| map_fail(k(reply), f))),
        done => done,
    }
}

/// Continues a consumer past an enumerator failure: the live consumer
/// inside a [`Iter::SourceFail`] is unwrapped, a salvaged
/// [`Iter::StageFail`] result becomes a finished consumer, and any other
/// state is returned unchanged.
pub fn resume<T: ChunkData, A: 'static>(iter: Iter<T, A>) -> Iter<T, A> {
    match iter {
        Iter::SourceFail(_, inner) => *inner,
        Iter::StageFail(_, a) => Iter::done(a),
        other => other,
    }
}

/// [`resume`], but first reports the failure being skipped to the
/// diagnostic sink, prefixed with the program identifier.
pub fn resume_verbose<T: ChunkData, A: 'static>(iter: Iter<T, A>) -> Iter<T, A> {
    if let Iter::SourceFail(err, _) | Iter::StageFail(err, _) = &iter {
        let program = std::env::args()
            .next()
            .unwrap_or_else(|| String::from("<unknown>"));
        tracing::warn!("{program}: continuing after enumerator failure: {err}");
    }
    resume(iter)
}

/// Recovery logic attached to an enumerator by [`Source::catch`],
/// [`Source::catch_fused`], or [`Stage::catch`].
///
/// The handler must work for any result type the enumerator is applied
/// at, which is why this is a trait rather than a closure. [`Resume`] and
/// [`ResumeVerbose`] cover the common case of skipping the failure.
pub trait CatchHandler<T: ChunkData> {
    fn handle<A: 'static>(self, err: IterError, state: Iter<T, A>) -> Iter<T, A>;
}

/// Drops the enumerator failure and continues with the surviving
/// consumer.
pub struct Resume;

impl<T: ChunkData> CatchHandler<T> for Resume {
    fn handle<A: 'static>(self, _err: IterError, state: Iter<T, A>) -> Iter<T, A> {
        resume(state)
    }
}

/// Reports the enumerator failure to the diagnostic sink, then continues
/// with the surviving consumer.
pub struct ResumeVerbose;

impl<T: ChunkData> CatchHandler<T> for ResumeVerbose {
    fn handle<A: 'static>(self, _err: IterError, state: Iter<T, A>) -> Iter<T, A> {
        resume_verbose(state)
    }
}

/// A source wrapped with a failure handler; see [`Source::catch`] and
/// [`Source::catch_fused`].
pub struct SourceCatch<S, H> {
    source: S,
    handler: H,
    fused: bool,
}

impl<S, H> SourceCatch<S, H> {
    pub(crate) fn own(source: S, handler: H) -> Self {
        SourceCatch {
            source,
            handler,
            fused: false,
        }
    }

    pub(crate) fn fused(source: S, handler: H) -> Self {
        SourceCatch {
            source,
            handler,
            fused: true,
        }
    }
}

impl<T, S, H> Source<T> for SourceCatch<S, H>
where
    T: ChunkData,
    S: Source<T>,
    H: CatchHandler<T>,
{
    fn feed<A: 'static>(self, iter: Iter<T, A>) -> Iter<T, A> {
        let SourceCatch {
            source,
            handler,
            fused,
        } = self;
        match source.feed(iter) {
            Iter::SourceFail(err, inner) => {
                let e = err.clone();
                handler.handle(e, Iter::SourceFail(err, inner))
            }
            Iter::StageFail(err, a) if fused => {
                let e = err.clone();
                handler.handle(e, Iter::StageFail(err, a))
            }
            other => other,
        }
    }
}

/// A stage wrapped with a failure handler; see [`Stage::catch`]. The
/// watch persists across the stage's suspensions, so failures surfacing
/// while later input flows through are still seen.
pub struct StageCatch<G, H> {
    stage: G,
    handler: H,
}

impl<G, H> StageCatch<G, H> {
    pub(crate) fn new(stage: G, handler: H) -> Self {
        StageCatch { stage, handler }
    }
}

impl<I, O, G, H> Stage<I, O> for StageCatch<G, H>
where
    I: ChunkData,
    O: ChunkData,
    G: Stage<I, O>,
    H: CatchHandler<I> + 'static,
{
    fn feed<A: 'static>(self, iter: Iter<O, A>) -> Iter<I, Iter<O, A>> {
        watch(self.stage.feed(iter), self.handler)
    }
}

fn watch<T, A, H>(iter: Iter<T, A>, handler: H) -> Iter<T, A>
where
    T: ChunkData,
    A: 'static,
    H: CatchHandler<T> + 'static,
{
    match iter {
        Iter::Next(f) => Iter::next(move |input| watch(Iter::Next(f).step(input), handler)),
        Iter::SourceFail(err, inner) => {
            let e = err.clone();
            handler.handle(e, Iter::SourceFail(err, inner))
        }
        Iter::StageFail(err, a) => {
            let e = err.clone();
            handler.handle(e, Iter::StageFail(err, a))
        }
        Iter::Ctl(req, k) => Iter::Ctl(req, Box::new(move |reply| watch(k(reply), handler))),
        other => other,
    }
}
