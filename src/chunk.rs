use bytes::{Bytes, BytesMut};

/// Data that can travel through a pipeline one chunk at a time.
///
/// A chunk payload is a monoid with an emptiness test: `Default::default()`
/// is the identity, `append` is the associative operation, and `is_null`
/// recognises the identity. Payloads are cloned when input has to be
/// replayed (backtracking parsers, speculative execution), so cheap clones
/// matter; `Bytes` is the intended payload for byte streams.
pub trait ChunkData: Clone + Default + 'static {
    /// Concatenates two payloads.
    fn append(self, other: Self) -> Self;

    /// Whether this payload is the monoid identity.
    fn is_null(&self) -> bool;
}

/// Payloads that can be measured and divided, for consumers that take a
/// bounded amount of input and leave the rest for whoever runs next.
pub trait ChunkSlice: ChunkData {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits into the first `at` elements and the remainder. `at` is
    /// clamped to the payload length.
    fn split_at(self, at: usize) -> (Self, Self);
}

impl ChunkData for String {
    fn append(mut self, other: Self) -> Self {
        self.push_str(&other);
        self
    }

    fn is_null(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Clone + 'static> ChunkData for Vec<T> {
    fn append(mut self, mut other: Self) -> Self {
        Vec::append(&mut self, &mut other);
        self
    }

    fn is_null(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Clone + 'static> ChunkSlice for Vec<T> {
    fn len(&self) -> usize {
        self.len()
    }

    fn split_at(mut self, at: usize) -> (Self, Self) {
        let rest = self.split_off(at.min(self.len()));
        (self, rest)
    }
}

impl ChunkData for Bytes {
    fn append(self, other: Self) -> Self {
        if self.is_empty() {
            other
        } else if other.is_empty() {
            self
        } else {
            let mut joined = BytesMut::with_capacity(self.len() + other.len());
            joined.extend_from_slice(&self);
            joined.extend_from_slice(&other);
            joined.freeze()
        }
    }

    fn is_null(&self) -> bool {
        self.is_empty()
    }
}

impl ChunkSlice for Bytes {
    fn len(&self) -> usize {
        Bytes::len(self)
    }

    fn split_at(mut self, at: usize) -> (Self, Self) {
        let rest = self.split_off(at.min(Bytes::len(&self)));
        (self, rest)
    }
}

/// The unit payload carries no data at all. It is the input type of
/// codecs that generate output from an external effect rather than from
/// upstream chunks.
impl ChunkData for () {
    fn append(self, _other: Self) -> Self {}

    fn is_null(&self) -> bool {
        true
    }
}

/// A finite unit of stream data together with an end-of-stream flag.
///
/// The flag is sticky: once a chunk marked end-of-stream exists, nothing
/// may be appended after it. Appending a null chunk to it is a no-op;
/// appending actual data after the end is a bug in whatever produced the
/// data, and panics.
///
/// ```rust
/// use rill::Chunk;
///
/// let c = Chunk::new(String::from("he")).append(Chunk::new(String::from("llo")));
/// assert_eq!(c.data(), "hello");
/// assert!(!c.is_eof());
/// assert!(c.append(Chunk::eof()).is_eof());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk<T: ChunkData> {
    data: T,
    eof: bool,
}

impl<T: ChunkData> Chunk<T> {
    /// A chunk of data with the stream still open.
    pub fn new(data: T) -> Self {
        Chunk { data, eof: false }
    }

    /// The end-of-stream marker: no data, flag set.
    pub fn eof() -> Self {
        Chunk {
            data: T::default(),
            eof: true,
        }
    }

    /// The monoid identity: no data, stream still open.
    pub fn empty() -> Self {
        Chunk::new(T::default())
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Whether the payload is empty (the flag may still be set).
    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// Whether this chunk is the append identity: empty payload, no flag.
    pub fn is_identity(&self) -> bool {
        self.is_null() && !self.eof
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }

    pub(crate) fn with_eof(mut self) -> Self {
        self.eof = true;
        self
    }

    pub(crate) fn without_eof(mut self) -> Self {
        self.eof = false;
        self
    }

    /// Appends `other`. The flag of the result comes from `other` unless
    /// `self` already carries it.
    ///
    /// # Panics
    ///
    /// Panics if `self` is marked end-of-stream and `other` carries data:
    /// data arriving after the end of the stream is a contract violation
    /// by the producer, not a recoverable stream failure.
    pub fn append(self, other: Self) -> Self {
        if self.eof {
            assert!(
                other.is_null(),
                "chunk appended after end of stream"
            );
            return self;
        }
        Chunk {
            data: self.data.append(other.data),
            eof: other.eof,
        }
    }
}

impl<T: ChunkData> Default for Chunk<T> {
    fn default() -> Self {
        Chunk::empty()
    }
}
