use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use rill::*;

fn collect() -> Iter<Vec<u8>, Vec<u8>> {
    fold_chunks(Vec::new(), |acc: Vec<u8>, payload: Vec<u8>| {
        acc.into_iter().chain(payload).collect()
    })
}

/// Bytes up to (not including) the first newline; the rest stays
/// residual.
fn line() -> Iter<Vec<u8>, Vec<u8>> {
    splitter(Vec::new())
}

fn splitter(acc: Vec<u8>) -> Iter<Vec<u8>, Vec<u8>> {
    Iter::next(move |input: Chunk<Vec<u8>>| {
        let at_end = input.is_eof();
        let mut payload = input.into_data();
        match payload.iter().position(|&b| b == b'\n') {
            Some(newline) => {
                let rest = payload.split_off(newline + 1);
                payload.pop();
                let mut acc = acc;
                acc.extend(payload);
                let residual = if at_end {
                    Chunk::new(rest).append(Chunk::eof())
                } else {
                    Chunk::new(rest)
                };
                Iter::done_with(acc, residual)
            }
            None if at_end => Iter::fail_with(IterError::Eof(None)),
            None => {
                let mut acc = acc;
                acc.extend(payload);
                splitter(acc)
            }
        }
    })
}

#[test]
fn line_leaves_the_rest_for_the_next_consumer() {
    let parse = line().and_then(|first| collect().map(move |rest| (first, rest)));
    let (first, rest) = from_chunk(b"hello\nworld".to_vec()).run(parse).unwrap();
    assert_eq!(first, b"hello".to_vec());
    assert_eq!(rest, b"world".to_vec());
}

#[test]
fn concatenated_sources_look_like_one_stream() {
    let source = from_chunk(b"ab".to_vec()).cat(from_chunk(b"cd".to_vec()));
    let taken = take::<Vec<u8>>(3).and_then(|head| collect().map(move |rest| (head, rest)));
    let (head, rest) = source.run(taken).unwrap();
    assert_eq!(head, b"abc".to_vec());
    assert_eq!(rest, b"d".to_vec());
}

#[test]
fn logging_stage_observes_the_stream_without_changing_it() {
    let log: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let seen = log.clone();
    let logger = CodecStage::map(move |payload: Vec<u8>| {
        seen.borrow_mut().extend(payload.iter().copied());
        payload
    });
    from_chunk(b"xxx".to_vec())
        .fuse(logger)
        .run(null())
        .unwrap();
    assert_eq!(*log.borrow(), b"xxx".to_vec());
}

#[test]
fn fallback_parser_sees_the_input_from_the_beginning() {
    let parser = if_parse(
        exact(b"foo".to_vec()),
        |()| Iter::done(b"matched".to_vec()),
        collect(),
    );
    assert_eq!(
        from_chunk(b"bar".to_vec()).run(parser).unwrap(),
        b"bar".to_vec()
    );
}

#[test]
fn speculative_parse_streams_into_the_fallback() {
    let parser = multi_parse(
        exact(b"abc".to_vec()).and_then(|()| Iter::done(b"committed".to_vec())),
        collect(),
    );
    let chunks = vec![b"a".to_vec(), b"b".to_vec(), b"x".to_vec()];
    assert_eq!(from_chunks(chunks).run(parser).unwrap(), b"abx".to_vec());
}

fn failing_after_one_chunk() -> impl Source<Vec<u8>> {
    let mut sent = false;
    from_fn(move || {
        if sent {
            Err(io::Error::new(io::ErrorKind::Other, "wire cut"))
        } else {
            sent = true;
            Ok(Some(b"ab".to_vec()))
        }
    })
}

#[test]
fn resumed_consumer_continues_on_the_next_source() {
    let source = failing_after_one_chunk()
        .catch(Resume)
        .cat(from_chunk(b"cd".to_vec()));
    assert_eq!(source.run(take(4)).unwrap(), b"abcd".to_vec());
}

#[test]
fn unhandled_source_failure_surfaces_at_the_top() {
    let out = failing_after_one_chunk().run(take(4));
    assert!(matches!(out, Err(IterError::Io(_))));
}

#[test]
fn bracket_releases_exactly_once_when_production_fails() {
    let released = Rc::new(RefCell::new(0u32));
    let counter = released.clone();
    let mut calls = 0u32;
    let source = bracket(
        || Ok(()),
        move |()| {
            *counter.borrow_mut() += 1;
            Ok(())
        },
        move |_: &mut ()| {
            calls += 1;
            if calls == 1 {
                Ok(Some(b"ab".to_vec()))
            } else {
                Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
            }
        },
    );
    match source.feed(take::<Vec<u8>>(10)) {
        Iter::SourceFail(err, inner) => {
            assert!(matches!(err, IterError::Io(_)));
            assert!(inner.wants_input());
        }
        other => panic!("expected SourceFail, got {other:?}"),
    }
    assert_eq!(*released.borrow(), 1);
}

#[test]
fn bracket_release_failure_masks_success_only() {
    let source = bracket(
        || Ok(()),
        |()| Err(io::Error::new(io::ErrorKind::Other, "close failed")),
        |_: &mut ()| Ok(Some(b"ab".to_vec())),
    );
    let out = source.run(take(2));
    assert!(matches!(out, Err(IterError::Io(_))));
}
