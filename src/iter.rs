use std::fmt;
use std::io;

use crate::chunk::{Chunk, ChunkData};
use crate::ctl::{CtlReq, CtlResponse};
use crate::error::IterError;

/// A chunk-driven consumer: the basic unit every pipeline is built from.
///
/// An `Iter` is a value, not an object with interior state. It advances
/// only by being *stepped*: [`step`](Iter::step) consumes the old state
/// and a chunk of input and produces the new state. Whoever holds the
/// value decides when to step it — there is no scheduler. A consumer
/// suspends by being in the [`Next`](Iter::Next) state and resumes when
/// its holder supplies the next chunk.
///
/// The states:
///
///   * `Next(f)` — needs input; `f` maps the next chunk to the new state.
///   * `Done(a, residual)` — finished with result `a`, holding input it
///     did not consume. The residual flows into whatever consumer runs
///     next ([`and_then`](Iter::and_then)).
///   * `Fail(e)` — the consumer itself failed. Terminal under `step`.
///   * `SourceFail(e, inner)` — an enumerator feeding this consumer
///     failed; `inner` is the consumer, untouched and still live. A catch
///     handler can [`resume`](crate::resume) it against a fresh source.
///   * `StageFail(e, a)` — a transforming enumerator failed after the
///     value it was producing had already been salvaged.
///   * `Ctl(req, k)` — suspended on an out-of-band control request
///     travelling outward; `k` consumes the reply.
///
/// Sequential composition threads residual input through automatically:
///
/// ```rust
/// use rill::{from_chunk, take, Source};
///
/// let first_then_rest = take::<Vec<u8>>(3)
///     .and_then(|head| take(1).map(move |next| (head, next)));
/// let (head, next) = from_chunk(b"abcd".to_vec()).run(first_then_rest).unwrap();
/// assert_eq!(head, b"abc".to_vec());
/// assert_eq!(next, b"d".to_vec());
/// ```
pub enum Iter<T: ChunkData, A> {
    /// Needs input.
    Next(Box<dyn FnOnce(Chunk<T>) -> Iter<T, A>>),
    /// Finished, with unconsumed residual input.
    Done(A, Chunk<T>),
    /// The consumer failed.
    Fail(IterError),
    /// An enumerator feeding the consumer failed; the consumer is live.
    SourceFail(IterError, Box<Iter<T, A>>),
    /// A transforming enumerator failed; the produced value survived.
    StageFail(IterError, A),
    /// Suspended on a control request travelling outward.
    Ctl(CtlReq, Box<dyn FnOnce(CtlResponse) -> Iter<T, A>>),
}

impl<T: ChunkData, A: 'static> Iter<T, A> {
    /// A finished consumer with no residual input.
    pub fn done(a: A) -> Self {
        Iter::Done(a, Chunk::empty())
    }

    /// A finished consumer holding unconsumed input.
    pub fn done_with(a: A, residual: Chunk<T>) -> Self {
        Iter::Done(a, residual)
    }

    /// A consumer that needs input, built from a continuation.
    pub fn next(f: impl FnOnce(Chunk<T>) -> Iter<T, A> + 'static) -> Self {
        Iter::Next(Box::new(f))
    }

    /// A generic failure.
    pub fn fail(msg: impl Into<String>) -> Self {
        Iter::Fail(IterError::Message(msg.into()))
    }

    pub fn fail_with(err: IterError) -> Self {
        Iter::Fail(err)
    }

    /// Lifts a host effect into a consumer. The effect runs when the
    /// consumer is first stepped; the chunk it was stepped with becomes
    /// the residual. End-of-file errors are classified as
    /// [`IterError::Eof`] so parse combinators treat a truncated source
    /// and exhausted input uniformly; other errors become
    /// [`IterError::Io`].
    pub fn io(f: impl FnOnce() -> io::Result<A> + 'static) -> Self {
        Iter::next(move |input| match f() {
            Ok(a) => Iter::Done(a, input),
            Err(err) => Iter::Fail(IterError::from_io(err)),
        })
    }

    /// Whether the consumer is waiting for input.
    pub fn wants_input(&self) -> bool {
        matches!(self, Iter::Next(_))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Iter::Done(..))
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Iter::Fail(_) | Iter::SourceFail(..) | Iter::StageFail(..)
        )
    }

    /// Feeds one chunk, producing the new state.
    ///
    /// The end-of-stream discipline is enforced here, on behalf of every
    /// driver: a continuation that still wants input after the
    /// end-of-stream chunk becomes an [`IterError::Eof`] failure; a
    /// result produced at end of stream has the flag propagated into its
    /// residual; a result produced mid-stream may not invent the flag. A
    /// finished consumer absorbs stepped chunks into its residual;
    /// failures are untouched; a consumer suspended on a control request
    /// sees the chunk after the reply arrives.
    pub fn step(self, input: Chunk<T>) -> Self {
        match self {
            Iter::Next(f) => {
                let at_end = input.is_eof();
                let stepped = f(input);
                if at_end {
                    stepped.close()
                } else {
                    stepped.check_open()
                }
            }
            Iter::Done(a, residual) => Iter::Done(a, residual.append(input)),
            Iter::Ctl(req, k) => Iter::Ctl(req, Box::new(move |reply| k(reply).step(input))),
            settled => settled,
        }
    }

    /// Post-step normalisation once the end-of-stream chunk has gone in.
    fn close(self) -> Self {
        match self {
            Iter::Next(_) => Iter::Fail(IterError::Eof(None)),
            Iter::Done(a, residual) => Iter::Done(a, residual.with_eof()),
            Iter::Ctl(req, k) => Iter::Ctl(req, Box::new(move |reply| k(reply).close())),
            settled => settled,
        }
    }

    /// Post-step normalisation while the stream is still open.
    fn check_open(self) -> Self {
        match self {
            Iter::Done(a, residual) if residual.is_eof() => {
                debug_assert!(false, "consumer invented an end-of-stream residual");
                Iter::Done(a, residual.without_eof())
            }
            other => other,
        }
    }

    /// Sequences another consumer after this one. The first consumer's
    /// residual input is fed straight into the second, so no data is lost
    /// or reordered at the seam. Failures short-circuit.
    pub fn and_then<B, F>(self, f: F) -> Iter<T, B>
    where
        B: 'static,
        F: FnOnce(A) -> Iter<T, B> + 'static,
    {
        match self {
            Iter::Done(a, residual) => {
                if residual.is_identity() {
                    f(a)
                } else {
                    f(a).step(residual)
                }
            }
            Iter::Next(g) => Iter::next(move |input| Iter::Next(g).step(input).and_then(f)),
            Iter::Fail(err) => Iter::Fail(err),
            Iter::SourceFail(err, inner) => {
                Iter::SourceFail(err, Box::new(inner.and_then(f)))
            }
            // The salvaged value re-enters composition as a live wrapped
            // consumer; the failure stays attached so `resume` still works.
            Iter::StageFail(err, a) => Iter::SourceFail(err, Box::new(f(a))),
            Iter::Ctl(req, k) => {
                Iter::Ctl(req, Box::new(move |reply| k(reply).and_then(f)))
            }
        }
    }

    /// Transforms the result, leaving the state shape alone.
    pub fn map<B, F>(self, f: F) -> Iter<T, B>
    where
        B: 'static,
        F: FnOnce(A) -> B + 'static,
    {
        match self {
            Iter::Done(a, residual) => Iter::Done(f(a), residual),
            Iter::Next(g) => Iter::next(move |input| Iter::Next(g).step(input).map(f)),
            Iter::Fail(err) => Iter::Fail(err),
            Iter::SourceFail(err, inner) => Iter::SourceFail(err, Box::new(inner.map(f))),
            Iter::StageFail(err, a) => Iter::StageFail(err, f(a)),
            Iter::Ctl(req, k) => Iter::Ctl(req, Box::new(move |reply| k(reply).map(f))),
        }
    }

    /// Re-classifies enumerator failures into plain consumer failures.
    ///
    /// [`Source::run`](crate::Source::run) applies this to the consumer
    /// side before feeding, so enumerator-catching combinators wrapped
    /// around the source never mistake a failure that travelled in with
    /// the consumer for one of their own.
    pub fn seal(self) -> Self {
        match self {
            Iter::Next(f) => Iter::next(move |input| Iter::Next(f).step(input).seal()),
            Iter::SourceFail(err, _) => Iter::Fail(err),
            Iter::StageFail(err, _) => Iter::Fail(err),
            Iter::Ctl(req, k) => Iter::Ctl(req, Box::new(move |reply| k(reply).seal())),
            other => other,
        }
    }

    /// Runs the consumer to its value: feeds end-of-stream chunks until
    /// it settles and answers stray control requests with the no-handler
    /// reply. Failures come back as errors, with the end-of-input
    /// classification kept intact.
    pub fn finish(self) -> Result<A, IterError> {
        let mut iter = self;
        loop {
            match iter {
                Iter::Done(a, _) => return Ok(a),
                Iter::Next(_) => iter = iter.step(Chunk::eof()),
                Iter::Fail(err) => return Err(err),
                Iter::SourceFail(err, _) => return Err(err),
                Iter::StageFail(err, _) => return Err(err),
                Iter::Ctl(_, k) => iter = k(None),
            }
        }
    }

    /// Like [`finish`](Iter::finish), but unwraps the end-of-input
    /// classification so callers at the host boundary see the I/O error
    /// that actually occurred.
    pub fn run(self) -> Result<A, IterError> {
        self.finish().map_err(IterError::into_host)
    }
}

impl<T, A> fmt::Debug for Iter<T, A>
where
    T: ChunkData + fmt::Debug,
    A: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Iter::Next(_) => f.write_str("Iter::Next(..)"),
            Iter::Done(a, residual) => f
                .debug_tuple("Iter::Done")
                .field(a)
                .field(residual)
                .finish(),
            Iter::Fail(err) => f.debug_tuple("Iter::Fail").field(err).finish(),
            Iter::SourceFail(err, inner) => f
                .debug_tuple("Iter::SourceFail")
                .field(err)
                .field(inner)
                .finish(),
            Iter::StageFail(err, a) => {
                f.debug_tuple("Iter::StageFail").field(err).field(a).finish()
            }
            Iter::Ctl(req, _) => f.debug_tuple("Iter::Ctl").field(req).finish(),
        }
    }
}
