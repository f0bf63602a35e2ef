use either::Either;

use crate::catch::map_fail;
use crate::chunk::{Chunk, ChunkData};
use crate::error::IterError;
use crate::iter::Iter;

/// Feeds the consumer while keeping a copy of every chunk delivered.
/// Settles with the consumer's final state and the monoidal
/// concatenation of everything it was fed, however the input was
/// partitioned.
pub fn copy_input<T, A>(iter: Iter<T, A>) -> Iter<T, (Iter<T, A>, Chunk<T>)>
where
    T: ChunkData,
    A: 'static,
{
    copying(iter, Chunk::empty())
}

fn copying<T, A>(iter: Iter<T, A>, saved: Chunk<T>) -> Iter<T, (Iter<T, A>, Chunk<T>)>
where
    T: ChunkData,
    A: 'static,
{
    match iter {
        Iter::Next(f) => Iter::next(move |input: Chunk<T>| {
            let saved = saved.append(input.clone());
            copying(Iter::Next(f).step(input), saved)
        }),
        Iter::Ctl(req, k) => Iter::Ctl(req, Box::new(move |reply| copying(k(reply), saved))),
        settled => Iter::done((settled, saved)),
    }
}

/// Runs the consumer, reifying any failure as `Left((error, failing
/// state))` instead of propagating it. The failing state can be examined
/// or re-raised by the caller; matching on the error decides which.
pub fn try_iter<T, A>(iter: Iter<T, A>) -> Iter<T, Either<(IterError, Iter<T, A>), A>>
where
    T: ChunkData,
    A: 'static,
{
    match iter {
        Iter::Next(f) => Iter::next(move |input| try_iter(Iter::Next(f).step(input))),
        Iter::Done(a, residual) => Iter::Done(Either::Right(a), residual),
        Iter::Fail(err) => {
            let e = err.clone();
            Iter::done(Either::Left((e, Iter::Fail(err))))
        }
        Iter::SourceFail(err, inner) => {
            let e = err.clone();
            Iter::done(Either::Left((e, Iter::SourceFail(err, inner))))
        }
        Iter::StageFail(err, a) => {
            let e = err.clone();
            Iter::done(Either::Left((e, Iter::StageFail(err, a))))
        }
        Iter::Ctl(req, k) => Iter::Ctl(req, Box::new(move |reply| try_iter(k(reply)))),
    }
}

/// Speculative execution with input rewind: runs the consumer saving its
/// input; a parse-family failure settles as `Left(error)` with the saved
/// input rewound into the stream as residual, so whatever runs next sees
/// the input from the beginning. Non-parse failures re-raise. The failing
/// state is not returned — after backtracking there is nothing to resume.
///
/// Memory grows with the input consumed up to the commit point; that is
/// the price of the rewind. [`multi_parse`] avoids it by running both
/// alternatives as the input streams past.
pub fn try_backtrack<T, A>(iter: Iter<T, A>) -> Iter<T, Either<IterError, A>>
where
    T: ChunkData,
    A: 'static,
{
    copy_input(iter).and_then(|(state, saved)| match state {
        Iter::Done(a, residual) => Iter::done_with(Either::Right(a), residual),
        Iter::Fail(err) if err.is_parse() => Iter::done_with(Either::Left(err), saved),
        Iter::SourceFail(err, _) if err.is_parse() => {
            Iter::done_with(Either::Left(err), saved)
        }
        Iter::StageFail(err, _) if err.is_parse() => {
            Iter::done_with(Either::Left(err), saved)
        }
        other => other.map(Either::Right),
    })
}

/// Tries a parser; on success continues with `ok` and the input exactly
/// where the parser left it, on a parse failure runs `fallback` on the
/// fully rewound input. If the fallback itself fails with an
/// expected-token error, its token set is merged with the first
/// failure's, so diagnostics name every alternative that was tried.
pub fn if_parse<T, A, B, K>(iter: Iter<T, A>, ok: K, fallback: Iter<T, B>) -> Iter<T, B>
where
    T: ChunkData,
    A: 'static,
    B: 'static,
    K: FnOnce(A) -> Iter<T, B> + 'static,
{
    try_backtrack(iter).and_then(move |result| match result {
        Either::Right(a) => ok(a),
        Either::Left(err) => {
            map_fail(fallback, move |second| IterError::merge_expected(err, second))
        }
    })
}

/// The alternative combinator: `first`, or on a parse failure `second`
/// from the same starting point.
pub fn or_parse<T, A>(first: Iter<T, A>, second: Iter<T, A>) -> Iter<T, A>
where
    T: ChunkData,
    A: 'static,
{
    if_parse(first, Iter::done, second)
}

/// Runs two parsers lock-step over the same input, committing to `first`
/// the moment it settles with anything but a parse failure, and falling
/// back to `second` otherwise.
///
/// No input is buffered: each chunk is handed to both parsers as it
/// arrives, so memory stays bounded as long as `second` consumes its
/// input as it goes. Because `second` is fed speculatively — including on
/// runs where `first` wins — it must be free of observable effects.
///
/// ```rust
/// use rill::{exact, fold_chunks, from_chunks, multi_parse, Source};
///
/// let all = fold_chunks(Vec::new(), |acc: Vec<u8>, c: Vec<u8>| {
///     acc.into_iter().chain(c).collect()
/// });
/// let parser = multi_parse(exact(b"abc".to_vec()).map(|()| b"match".to_vec()), all);
/// let chunks = vec![b"a".to_vec(), b"b".to_vec(), b"x".to_vec()];
/// assert_eq!(from_chunks(chunks).run(parser).unwrap(), b"abx".to_vec());
/// ```
pub fn multi_parse<T, A>(first: Iter<T, A>, second: Iter<T, A>) -> Iter<T, A>
where
    T: ChunkData,
    A: 'static,
{
    match first {
        Iter::Next(f) => Iter::next(move |input: Chunk<T>| {
            multi_parse(Iter::Next(f).step(input.clone()), second.step(input))
        }),
        Iter::Fail(err) if err.is_parse() => second,
        Iter::SourceFail(err, _) if err.is_parse() => second,
        Iter::StageFail(err, _) if err.is_parse() => second,
        Iter::Ctl(req, k) => Iter::Ctl(req, Box::new(move |reply| multi_parse(k(reply), second))),
        committed => committed,
    }
}
