use std::sync::{Arc, Mutex, MutexGuard};

use crate::chunk::{Chunk, ChunkData};
use crate::error::IterError;
use crate::iter::Iter;

/// A consumer made safe to step from several producers: the state lives
/// behind a mutex and every step is serialised. Obtained from [`shared`].
pub struct SharedIter<T: ChunkData, A> {
    cell: Arc<Mutex<Option<Iter<T, A>>>>,
}

impl<T: ChunkData, A> Clone for SharedIter<T, A> {
    fn clone(&self) -> Self {
        SharedIter {
            cell: self.cell.clone(),
        }
    }
}

fn lock<T: ChunkData, A>(
    cell: &Mutex<Option<Iter<T, A>>>,
) -> MutexGuard<'_, Option<Iter<T, A>>> {
    cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Guards a consumer for concurrent feeding.
///
/// Each [`branch`](SharedIter::branch) is an ordinary consumer a producer
/// can drive; data fed to any branch is forwarded, one serialised step at
/// a time, into the guarded consumer. A branch finishes when the guarded
/// consumer settles or the branch's own stream ends — the branch never
/// forwards its end-of-stream flag, since other producers may still be
/// feeding.
pub fn shared<T: ChunkData, A: 'static>(iter: Iter<T, A>) -> SharedIter<T, A> {
    SharedIter {
        cell: Arc::new(Mutex::new(Some(iter))),
    }
}

impl<T: ChunkData, A: 'static> SharedIter<T, A> {
    /// A consumer that forwards its input into the guarded consumer.
    pub fn branch(&self) -> Iter<T, ()> {
        branch_step(self.cell.clone())
    }

    /// Takes the guarded consumer out and runs it to its value.
    pub fn finish(self) -> Result<A, IterError> {
        match lock(&self.cell).take() {
            Some(iter) => iter.finish(),
            None => Err(IterError::Message(String::from(
                "shared consumer already taken",
            ))),
        }
    }
}

fn branch_step<T: ChunkData, A: 'static>(
    cell: Arc<Mutex<Option<Iter<T, A>>>>,
) -> Iter<T, ()> {
    Iter::next(move |input: Chunk<T>| {
        let at_end = input.is_eof();
        let settled = {
            let mut guard = lock(&cell);
            match guard.take() {
                Some(mut iter) => {
                    // Control requests have no enumerator to travel to
                    // from here; give them the no-handler reply rather
                    // than wedging every producer.
                    loop {
                        match iter {
                            Iter::Ctl(_, k) => iter = k(None),
                            other => {
                                iter = other;
                                break;
                            }
                        }
                    }
                    let payload = if at_end {
                        Chunk::new(input.into_data())
                    } else {
                        input
                    };
                    if iter.wants_input() && !payload.is_identity() {
                        iter = iter.step(payload);
                    }
                    let settled = !iter.wants_input();
                    *guard = Some(iter);
                    settled
                }
                None => true,
            }
        };
        if at_end {
            Iter::done_with((), Chunk::eof())
        } else if settled {
            Iter::done(())
        } else {
            branch_step(cell)
        }
    })
}
