use std::fmt;

use crate::chunk::{Chunk, ChunkData, ChunkSlice};
use crate::error::IterError;
use crate::iter::Iter;

/// Consumes and discards everything until the end of the stream.
pub fn null<T: ChunkData>() -> Iter<T, ()> {
    Iter::next(|input: Chunk<T>| {
        if input.is_eof() {
            Iter::done_with((), Chunk::eof())
        } else {
            null()
        }
    })
}

/// The first non-empty payload that arrives. Fails with
/// [`IterError::Eof`] if the stream ends first.
pub fn data<T: ChunkData>() -> Iter<T, T> {
    Iter::next(|input: Chunk<T>| {
        let at_end = input.is_eof();
        let payload = input.into_data();
        if !payload.is_null() {
            let residual = if at_end { Chunk::eof() } else { Chunk::empty() };
            Iter::done_with(payload, residual)
        } else if at_end {
            Iter::fail_with(IterError::Eof(None))
        } else {
            data()
        }
    })
}

/// Up to `n` elements of input, leaving the remainder as residual for
/// whatever consumer runs next. Yields fewer than `n` only if the stream
/// ends first.
///
/// ```rust
/// use rill::{from_chunk, take, Source};
///
/// let head = from_chunk(b"abcd".to_vec()).run(take(3)).unwrap();
/// assert_eq!(head, b"abc".to_vec());
/// ```
pub fn take<T: ChunkSlice>(n: usize) -> Iter<T, T> {
    if n == 0 {
        return Iter::done(T::default());
    }
    take_more(T::default(), n)
}

fn take_more<T: ChunkSlice>(acc: T, want: usize) -> Iter<T, T> {
    Iter::next(move |input: Chunk<T>| {
        let at_end = input.is_eof();
        let payload = input.into_data();
        let have = payload.len();
        if have >= want {
            let (head, rest) = payload.split_at(want);
            let residual = if at_end {
                Chunk::new(rest).with_eof()
            } else {
                Chunk::new(rest)
            };
            Iter::done_with(acc.append(head), residual)
        } else if at_end {
            Iter::done_with(acc.append(payload), Chunk::eof())
        } else {
            take_more(acc.append(payload), want - have)
        }
    })
}

/// Matches a literal prefix of the input, or fails with
/// [`IterError::Expected`] naming the pattern. A stream that ends before
/// the whole pattern arrived fails with [`IterError::Eof`]. Both are
/// parse failures, so `exact` composes with the backtracking combinators.
///
/// ```rust
/// use rill::{exact, from_chunk, if_parse, take, Iter, Source};
///
/// let word = if_parse(
///     exact(b"foo".to_vec()),
///     |()| Iter::done("prefixed"),
///     take(3).map(|_| "other"),
/// );
/// assert_eq!(from_chunk(b"bar".to_vec()).run(word).unwrap(), "other");
/// ```
pub fn exact<T>(pattern: T) -> Iter<T, ()>
where
    T: ChunkSlice + PartialEq + fmt::Debug,
{
    if pattern.is_empty() {
        return Iter::done(());
    }
    matching(pattern.clone(), pattern)
}

fn matching<T>(pattern: T, rest: T) -> Iter<T, ()>
where
    T: ChunkSlice + PartialEq + fmt::Debug,
{
    Iter::next(move |input: Chunk<T>| {
        let at_end = input.is_eof();
        let payload = input.into_data();
        if payload.is_null() {
            return if at_end {
                Iter::fail_with(IterError::Eof(None))
            } else {
                matching(pattern, rest)
            };
        }
        let step = rest.len().min(payload.len());
        let (want, rest) = rest.split_at(step);
        let (got, payload) = payload.split_at(step);
        if want != got {
            return Iter::fail_with(IterError::expected(
                format!("{got:?}"),
                vec![format!("{pattern:?}")],
            ));
        }
        if rest.is_empty() {
            let residual = if at_end {
                Chunk::new(payload).with_eof()
            } else {
                Chunk::new(payload)
            };
            Iter::done_with((), residual)
        } else if at_end {
            Iter::fail_with(IterError::Eof(None))
        } else {
            matching(pattern, rest)
        }
    })
}

/// Left-folds every arriving payload into an accumulator until the end of
/// the stream.
pub fn fold_chunks<T, S, F>(state: S, mut f: F) -> Iter<T, S>
where
    T: ChunkData,
    S: 'static,
    F: FnMut(S, T) -> S + 'static,
{
    Iter::next(move |input: Chunk<T>| {
        let at_end = input.is_eof();
        let payload = input.into_data();
        let state = if payload.is_null() {
            state
        } else {
            f(state, payload)
        };
        if at_end {
            Iter::done_with(state, Chunk::eof())
        } else {
            fold_chunks(state, f)
        }
    })
}
