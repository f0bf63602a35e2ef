use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::chunk::{Chunk, ChunkData};
use crate::iter::Iter;
use crate::source::Source;

/// The queue shared by the two halves of a loopback pair. Operations are
/// serialised by the mutex; the condvar wakes a source blocked on an
/// empty queue.
struct Mailbox<T: ChunkData> {
    queue: Mutex<State<T>>,
    ready: Condvar,
}

struct State<T: ChunkData> {
    chunks: VecDeque<Chunk<T>>,
    closed: bool,
}

fn lock<T: ChunkData>(mailbox: &Mailbox<T>) -> MutexGuard<'_, State<T>> {
    mailbox
        .queue
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A consumer/source pair sharing a mailbox: chunks fed to the consumer
/// in one task come back out of the source, which feeds them to whatever
/// consumer it is driving.
///
/// The source side blocks while the mailbox is empty and the stream is
/// still open, so the pair is meant to bridge two tasks. Feeding the
/// consumer the end-of-stream chunk closes the mailbox; the source
/// terminates after draining what is queued.
pub fn iter_loop<T: ChunkData>() -> (Iter<T, ()>, LoopSource<T>) {
    let mailbox = Arc::new(Mailbox {
        queue: Mutex::new(State {
            chunks: VecDeque::new(),
            closed: false,
        }),
        ready: Condvar::new(),
    });
    (enqueue(mailbox.clone()), LoopSource { mailbox })
}

fn enqueue<T: ChunkData>(mailbox: Arc<Mailbox<T>>) -> Iter<T, ()> {
    Iter::next(move |input: Chunk<T>| {
        let at_end = input.is_eof();
        {
            let mut state = lock(&mailbox);
            state.chunks.push_back(input);
            if at_end {
                state.closed = true;
            }
        }
        mailbox.ready.notify_all();
        if at_end {
            Iter::done_with((), Chunk::eof())
        } else {
            enqueue(mailbox)
        }
    })
}

/// The source half of a loopback pair; see [`iter_loop`].
pub struct LoopSource<T: ChunkData> {
    mailbox: Arc<Mailbox<T>>,
}

impl<T: ChunkData> Source<T> for LoopSource<T> {
    fn feed<A: 'static>(self, mut iter: Iter<T, A>) -> Iter<T, A> {
        loop {
            iter = match iter {
                Iter::Ctl(_, k) => k(None),
                other => other,
            };
            if !iter.wants_input() {
                return iter;
            }
            let next = {
                let mut state = lock(&self.mailbox);
                loop {
                    if let Some(chunk) = state.chunks.pop_front() {
                        break Some(chunk);
                    }
                    if state.closed {
                        break None;
                    }
                    state = self
                        .mailbox
                        .ready
                        .wait(state)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
            };
            match next {
                None => return iter,
                Some(chunk) if chunk.is_eof() => {
                    // The closing chunk may carry trailing data; deliver
                    // that, but never the end-of-stream flag itself.
                    let payload = chunk.into_data();
                    if !payload.is_null() {
                        iter = iter.step(Chunk::new(payload));
                    }
                    return iter;
                }
                Some(chunk) => iter = iter.step(chunk),
            }
        }
    }
}
