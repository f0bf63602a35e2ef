//! `rill` is a library for processing chunked streams with *iteratees*:
//! consumers that are plain values, advanced one chunk at a time, and
//! composed — with each other and with the enumerators that feed them —
//! into pipelines that run in bounded memory with explicit end-of-stream
//! signalling, structured failure handling, and backtracking parsers.
//!
//! The three shapes:
//!
//!   * [`Iter<T, A>`] — a consumer of chunks of `T` producing an `A`. An
//!     `Iter` is a state machine driven by whoever holds it: feeding it a
//!     [`Chunk`] with [`step`](Iter::step) consumes the old state and
//!     yields the new one. It finishes with a result *and a residual* —
//!     the input it did not consume — which flows into the next consumer
//!     when two are sequenced with [`and_then`](Iter::and_then).
//!   * [`Source<T>`] (an *outer enumerator*) — a producer that feeds
//!     chunks to a consumer until the consumer finishes or the data runs
//!     out. Sources concatenate ([`cat`](Source::cat)) and never feed the
//!     end-of-stream marker, so a consumer left hungry by one source can
//!     be handed to the next.
//!   * [`Stage<I, O>`] (an *inner enumerator*) — a transformer that is
//!     both a consumer of upstream `I` and a producer of transcoded `O`.
//!     Stages fuse onto sources ([`Source::fuse`]), onto each other
//!     ([`Stage::fuse`]), and onto consumers ([`Stage::apply`]), so a
//!     pipeline of any length collapses into a single source driving a
//!     single consumer.
//!
//! Data flows inward, source to stage to consumer. Everything else —
//! end-of-stream, failure, resumption, control requests — flows outward.
//!
//! # A first pipeline
//!
//! ```rust
//! use rill::{from_chunk, take, Source};
//!
//! let greeting = from_chunk(b"hello world".to_vec()).run(take(5)).unwrap();
//! assert_eq!(greeting, b"hello".to_vec());
//! ```
//!
//! Residual input makes sequencing lossless. The second consumer picks
//! up exactly where the first stopped, even mid-chunk:
//!
//! ```rust
//! use rill::{from_chunks, take, Source};
//!
//! let pair = take::<Vec<u8>>(3).and_then(|ab| take(2).map(move |cd| (ab, cd)));
//! let chunks = vec![b"ab".to_vec(), b"cd".to_vec(), b"e".to_vec()];
//! let (ab, cd) = from_chunks(chunks).run(pair).unwrap();
//! assert_eq!(ab, b"abc".to_vec());
//! assert_eq!(cd, b"de".to_vec());
//! ```
//!
//! # Transforming stages
//!
//! A [`Stage`] wraps a consumer and acts as a consumer of the upstream
//! type itself — its result is the downstream consumer's state, so when
//! the stage ends the downstream can be popped out and handed to another
//! enumerator. The codec-driven builders [`CodecSource`] and
//! [`CodecStage`] take care of the enumerator discipline: stopping the
//! moment the downstream finishes, flushing the codec at end of stream,
//! and keeping the end-of-stream marker away from the downstream.
//!
//! ```rust
//! use rill::{from_chunk, take, CodecStage, Source, Stage};
//!
//! let shout = CodecStage::map(|payload: Vec<u8>| {
//!     payload.iter().map(u8::to_ascii_uppercase).collect::<Vec<u8>>()
//! });
//! let out = from_chunk(b"quiet".to_vec()).fuse(shout).run(take(5)).unwrap();
//! assert_eq!(out, b"QUIET".to_vec());
//! ```
//!
//! # Failure, in two flavours
//!
//! A consumer that fails settles into [`Iter::Fail`]. An *enumerator*
//! that fails settles the consumer into [`Iter::SourceFail`] (or
//! [`Iter::StageFail`] for a transformer) — and crucially, the consumer
//! itself survives inside, untouched. A handler installed with
//! [`catch_iter`] or [`Source::catch`] can inspect the failure and
//! [`resume`] the surviving consumer against a fresh source; unhandled
//! failures surface as errors from [`Source::run`]. Failures raised from
//! host I/O keep their identity: [`Iter::io`] classifies end-of-file
//! separately so parsers treat a truncated stream like exhausted input,
//! and [`run`](Iter::run) unwraps that classification again at the host
//! boundary.
//!
//! # Backtracking parsers
//!
//! [`if_parse`] speculatively runs a parser, buffering its input; on a
//! parse failure the fallback starts over on the rewound input, and
//! expected-token failures from the alternatives merge into one
//! diagnostic. [`multi_parse`] avoids the buffering by running both
//! alternatives lock-step over the input as it arrives.
//!
//! ```rust
//! use rill::{exact, from_chunk, if_parse, take, Source};
//!
//! let keyword = if_parse(
//!     exact(b"let ".to_vec()),
//!     |()| take(1).map(|name| (true, name)),
//!     take(1).map(|name| (false, name)),
//! );
//! let (is_let, name) = from_chunk(b"let x".to_vec()).run(keyword).unwrap();
//! assert!(is_let);
//! assert_eq!(name, b"x".to_vec());
//! ```
//!
//! # Control requests
//!
//! A consumer can send a typed, out-of-band command upstream with
//! [`ctl`] — seek, tell, size, or anything implementing [`CtlCommand`].
//! The request travels outward through the enclosing enumerators; each
//! consults its [`CtlHandlers`] table and either answers or passes the
//! request along, and the top level answers "no handler". The consumer
//! blocks (as a state, not a thread) until the reply comes back.
//!
//! # Scheduling, or the absence of one
//!
//! There is no scheduler and no hidden queue. Stepping is synchronous;
//! an `Iter` suspends by *being* in the `Next` state and resumes when its
//! holder feeds it. The only shared mutable state in the crate is opt-in
//! and explicitly owned: the mailbox of a loopback pair ([`iter_loop`]),
//! the mutex guarding a shared consumer ([`shared`]), and the
//! single-shot flag behind a joint finaliser ([`finalize_pair`]).

mod cat;
mod catch;
mod chunk;
mod codec;
mod consumers;
mod ctl;
mod error;
mod finalize;
mod fuse;
mod iter;
mod loopback;
mod parse;
mod source;
mod split;
mod stage;

pub use cat::Cat;
pub use catch::{
    catch_backtrack, catch_iter, map_fail, resume, resume_verbose, CatchHandler, Resume,
    ResumeVerbose, SourceCatch, StageCatch,
};
pub use chunk::{Chunk, ChunkData, ChunkSlice};
pub use codec::{Codec, CodecOutput};
pub use consumers::{data, exact, fold_chunks, null, take};
#[cfg(unix)]
pub use ctl::GetSocketReq;
pub use ctl::{ctl, CtlCommand, CtlHandlers, CtlReq, CtlResponse, SeekReq, SizeReq, TellReq};
pub use error::IterError;
pub use finalize::{finalize_pair, FinalizedSource};
pub use fuse::{FusedSource, FusedStage};
pub use iter::Iter;
pub use loopback::{iter_loop, LoopSource};
pub use parse::{copy_input, if_parse, multi_parse, or_parse, try_backtrack, try_iter};
pub use source::{
    bracket, from_chunk, from_chunks, from_fn, BracketSource, CodecSource, IterSource, Source,
};
pub use split::{shared, SharedIter};
pub use stage::{CodecStage, Stage};

#[cfg(test)]
mod test;
