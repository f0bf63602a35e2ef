use std::sync::{Arc, Mutex};

use crate::chunk::{Chunk, ChunkData};
use crate::iter::Iter;
use crate::source::Source;

/// Completion gate shared by the two halves of a finalised pair: a
/// countdown and the single-shot action. Taking the action out of the
/// option is what makes running it idempotent.
struct Gate {
    state: Mutex<(u8, Option<Box<dyn FnOnce()>>)>,
}

fn arm(gate: &Gate) {
    let action = {
        let mut guard = gate
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.0 = guard.0.saturating_sub(1);
        if guard.0 == 0 {
            guard.1.take()
        } else {
            None
        }
    };
    if let Some(finalizer) = action {
        finalizer();
    }
}

/// Couples a consumer and a source to a joint finaliser that runs exactly
/// once, when *both* sides have completed: the consumer side by settling
/// or seeing the end of its stream, the source side by returning from its
/// feed — exhausted, stopped, or failed.
pub fn finalize_pair<T, A, S, F>(
    iter: Iter<T, A>,
    source: S,
    finalizer: F,
) -> (Iter<T, A>, FinalizedSource<S>)
where
    T: ChunkData,
    A: 'static,
    S: Source<T>,
    F: FnOnce() + 'static,
{
    let gate = Arc::new(Gate {
        state: Mutex::new((2, Some(Box::new(finalizer)))),
    });
    (watch_side(iter, gate.clone()), FinalizedSource { source, gate })
}

fn watch_side<T: ChunkData, A: 'static>(iter: Iter<T, A>, gate: Arc<Gate>) -> Iter<T, A> {
    match iter {
        Iter::Next(f) => Iter::next(move |input: Chunk<T>| {
            let at_end = input.is_eof();
            let stepped = Iter::Next(f).step(input);
            if at_end || stepped.is_done() || stepped.is_failure() {
                arm(&gate);
                stepped
            } else {
                watch_side(stepped, gate)
            }
        }),
        Iter::Ctl(req, k) => {
            Iter::Ctl(req, Box::new(move |reply| watch_side(k(reply), gate)))
        }
        settled => {
            arm(&gate);
            settled
        }
    }
}

/// The source half of a finalised pair; see [`finalize_pair`].
pub struct FinalizedSource<S> {
    source: S,
    gate: Arc<Gate>,
}

impl<T, S> Source<T> for FinalizedSource<S>
where
    T: ChunkData,
    S: Source<T>,
{
    fn feed<A: 'static>(self, iter: Iter<T, A>) -> Iter<T, A> {
        let fed = self.source.feed(iter);
        arm(&self.gate);
        fed
    }
}
