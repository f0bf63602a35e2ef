use std::io;

use crate::chunk::{Chunk, ChunkData};
use crate::error::IterError;
use crate::iter::Iter;

/// What a codec step produced.
pub enum CodecOutput<I: ChunkData, O> {
    /// One unit of output, with the codec ready to produce more.
    More(O, Box<Codec<I, O>>),
    /// One final unit of output; the codec must not be driven again.
    Last(O),
    /// The codec terminated without a final unit.
    Stop,
}

/// A stateful translator packaged for building enumerators.
///
/// A codec is itself a consumer: it reads chunks of `I` and settles with
/// a [`CodecOutput`] carrying one unit of `O` (and, in the `More` case,
/// its own successor). The enumerator builders take care of driving it,
/// giving it a final end-of-stream step so it can flush, stopping when
/// the downstream consumer finishes, and translating its failures.
///
/// Codecs for *sources* read no real input: their input type is `()` and
/// their work happens in effects, so [`Codec::pull`] builds one from a
/// plain producing function.
pub struct Codec<I: ChunkData, O>(Iter<I, CodecOutput<I, O>>);

impl<I: ChunkData, O: 'static> Codec<I, O> {
    /// Wraps a consumer that settles with a [`CodecOutput`].
    pub fn new(iter: Iter<I, CodecOutput<I, O>>) -> Self {
        Codec(iter)
    }

    pub fn into_inner(self) -> Iter<I, CodecOutput<I, O>> {
        self.0
    }
}

impl<O: 'static> Codec<(), O> {
    /// A source codec from a producing function: each call yields one
    /// unit of output, `None` when the source is exhausted. End-of-file
    /// errors from the function are an exhausted source, not a failure.
    pub fn pull<F>(mut f: F) -> Codec<(), O>
    where
        F: FnMut() -> io::Result<Option<O>> + 'static,
    {
        Codec(Iter::next(move |input: Chunk<()>| match f() {
            Ok(Some(out)) => {
                Iter::Done(CodecOutput::More(out, Box::new(Codec::pull(f))), input)
            }
            Ok(None) => Iter::Done(CodecOutput::Stop, input),
            Err(err) => Iter::Fail(IterError::from_io(err)),
        }))
    }
}

impl<I: ChunkData, O: 'static> Codec<I, O> {
    /// A transcoding codec that maps each arriving payload to one unit of
    /// output. Null mid-stream chunks are skipped; data arriving together
    /// with end-of-stream becomes the final unit.
    pub fn map<F>(mut f: F) -> Codec<I, O>
    where
        F: FnMut(I) -> O + 'static,
    {
        Codec(Iter::next(move |input: Chunk<I>| {
            let at_end = input.is_eof();
            let data = input.into_data();
            match (data.is_null(), at_end) {
                (true, true) => Iter::done(CodecOutput::Stop),
                (true, false) => Codec::map(f).into_inner(),
                (false, true) => {
                    Iter::done_with(CodecOutput::Last(f(data)), Chunk::eof())
                }
                (false, false) => {
                    Iter::done(CodecOutput::More(f(data), Box::new(Codec::map(f))))
                }
            }
        }))
    }
}
