use crate::chunk::ChunkData;
use crate::iter::Iter;
use crate::source::Source;
use crate::stage::Stage;

/// Sequential concatenation of two like enumerators, built with
/// [`Source::cat`] or [`Stage::cat`].
///
/// The first enumerator runs to exhaustion; the second sees the consumer
/// only if it still wants input. Concatenation is associative, and the
/// consumer observes the total input in order.
pub struct Cat<A, B> {
    first: A,
    second: B,
}

impl<A, B> Cat<A, B> {
    pub(crate) fn new(first: A, second: B) -> Self {
        Cat { first, second }
    }
}

impl<T, A, B> Source<T> for Cat<A, B>
where
    T: ChunkData,
    A: Source<T>,
    B: Source<T>,
{
    fn feed<X: 'static>(self, iter: Iter<T, X>) -> Iter<T, X> {
        let fed = self.first.feed(iter);
        if fed.wants_input() {
            self.second.feed(fed)
        } else {
            fed
        }
    }
}

impl<I, O, A, B> Stage<I, O> for Cat<A, B>
where
    I: ChunkData,
    O: ChunkData,
    A: Stage<I, O>,
    B: Stage<I, O> + 'static,
{
    fn feed<X: 'static>(self, iter: Iter<O, X>) -> Iter<I, Iter<O, X>> {
        let Cat { first, second } = self;
        first.feed(iter).and_then(move |downstream| {
            if downstream.wants_input() {
                second.feed(downstream)
            } else {
                Iter::done(downstream)
            }
        })
    }
}
