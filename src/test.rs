use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use rstest::rstest;

use crate::*;

fn collect() -> Iter<Vec<u8>, Vec<u8>> {
    fold_chunks(Vec::new(), |acc: Vec<u8>, payload: Vec<u8>| {
        acc.into_iter().chain(payload).collect()
    })
}

fn run_on<A: 'static>(iter: Iter<Vec<u8>, A>, chunks: Vec<&[u8]>) -> Result<A, IterError> {
    from_chunks(chunks.into_iter().map(<[u8]>::to_vec)).run(iter)
}

#[rstest]
#[case::open_then_open("ab", false, "cd", false, "abcd", false)]
#[case::open_then_eof("ab", false, "", true, "ab", true)]
#[case::identity_on_left("", false, "cd", false, "cd", false)]
#[case::null_after_eof("ab", true, "", false, "ab", true)]
#[case::eof_after_eof("ab", true, "", true, "ab", true)]
fn chunk_append(
    #[case] left: &str,
    #[case] left_eof: bool,
    #[case] right: &str,
    #[case] right_eof: bool,
    #[case] data: &str,
    #[case] eof: bool,
) {
    let mut a = Chunk::new(String::from(left));
    if left_eof {
        a = a.with_eof();
    }
    let mut b = Chunk::new(String::from(right));
    if right_eof {
        b = b.with_eof();
    }
    let joined = a.append(b);
    assert_eq!(joined.data(), data);
    assert_eq!(joined.is_eof(), eof);
}

#[test]
#[should_panic(expected = "chunk appended after end of stream")]
fn chunk_append_data_after_eof_panics() {
    let closed = Chunk::new(String::from("a")).with_eof();
    let _ = closed.append(Chunk::new(String::from("b")));
}

#[test]
fn step_appends_to_finished_consumer() {
    let done = Iter::done_with(7, Chunk::new(String::from("ab")));
    match done.step(Chunk::new(String::from("cd"))) {
        Iter::Done(a, residual) => {
            assert_eq!(a, 7);
            assert_eq!(residual, Chunk::new(String::from("abcd")));
        }
        other => panic!("expected Done, got {other:?}"),
    }
}

#[test]
fn step_is_noop_on_failed_consumer() {
    let failed = Iter::<String, u8>::fail("nope").step(Chunk::new(String::from("x")));
    assert!(failed.is_failure());
}

#[test]
fn eof_step_is_idempotent_on_done() {
    let once = Iter::done_with(7, Chunk::new(String::from("ab"))).step(Chunk::eof());
    let twice = once.step(Chunk::eof());
    match twice {
        Iter::Done(a, residual) => {
            assert_eq!(a, 7);
            assert_eq!(residual.data(), "ab");
            assert!(residual.is_eof());
        }
        other => panic!("expected Done, got {other:?}"),
    }
}

#[test]
fn consumer_still_hungry_after_eof_becomes_eof_failure() {
    let two_steps = Iter::<String, i32>::next(|_| Iter::next(|_| Iter::done(1)));
    match two_steps.step(Chunk::eof()) {
        Iter::Fail(err) => assert!(err.is_eof()),
        other => panic!("expected Fail, got {other:?}"),
    }
}

#[test]
fn bind_left_identity() {
    let k = |n: usize| take::<Vec<u8>>(n);
    let bound = run_on(Iter::done(3usize).and_then(k), vec![b"abcd"]).unwrap();
    let direct = run_on(k(3), vec![b"abcd"]).unwrap();
    assert_eq!(bound, direct);
}

#[test]
fn bind_right_identity() {
    // Observe the residual too, by sequencing another consumer after.
    let observe = |iter: Iter<Vec<u8>, Vec<u8>>| {
        run_on(
            iter.and_then(|a| take(2).map(move |b| (a, b))),
            vec![b"abcde"],
        )
        .unwrap()
    };
    assert_eq!(observe(take(3).and_then(Iter::done)), observe(take(3)));
}

#[test]
fn bind_associativity() {
    let left = take::<Vec<u8>>(1)
        .and_then(|a| take(1).map(move |b| (a, b)))
        .and_then(|(a, b)| take(1).map(move |c| (a, b, c)));
    let right = take::<Vec<u8>>(1)
        .and_then(|a| take(1).and_then(move |b| take(1).map(move |c| (a, b, c))));
    assert_eq!(
        run_on(left, vec![b"abc"]).unwrap(),
        run_on(right, vec![b"abc"]).unwrap()
    );
}

#[test]
fn residual_flows_across_bind_mid_chunk() {
    let pair = take::<Vec<u8>>(3).and_then(|head| take(1).map(move |next| (head, next)));
    let (head, next) = run_on(pair, vec![b"ab", b"cd"]).unwrap();
    assert_eq!(head, b"abc".to_vec());
    assert_eq!(next, b"d".to_vec());
}

#[test]
fn cat_preserves_input_order() {
    let source = from_chunk(b"ab".to_vec()).cat(from_chunk(b"cd".to_vec()));
    assert_eq!(source.run(collect()).unwrap(), b"abcd".to_vec());
}

#[test]
fn cat_is_associative() {
    let ab = || from_chunk(b"ab".to_vec());
    let cd = || from_chunk(b"cd".to_vec());
    let ef = || from_chunk(b"ef".to_vec());
    let left = ab().cat(cd()).cat(ef()).run(collect()).unwrap();
    let right = ab().cat(cd().cat(ef())).run(collect()).unwrap();
    assert_eq!(left, b"abcdef".to_vec());
    assert_eq!(left, right);
}

#[test]
fn take_across_cat_leaves_residual_for_next_consumer() {
    let source = from_chunk(b"ab".to_vec()).cat(from_chunk(b"cd".to_vec()));
    let taken = take::<Vec<u8>>(3).and_then(|head| take(1).map(move |rest| (head, rest)));
    let (head, rest) = source.run(taken).unwrap();
    assert_eq!(head, b"abc".to_vec());
    assert_eq!(rest, b"d".to_vec());
}

fn reverse_stage() -> CodecStage<Vec<u8>, Vec<u8>> {
    CodecStage::map(|payload: Vec<u8>| payload.into_iter().rev().collect())
}

fn upper_stage() -> CodecStage<Vec<u8>, Vec<u8>> {
    CodecStage::map(|payload: Vec<u8>| payload.iter().map(u8::to_ascii_uppercase).collect())
}

#[test]
fn fusion_is_associative() {
    let chunks = || vec![b"ab".to_vec(), b"cd".to_vec()];
    let left = from_chunks(chunks())
        .fuse(reverse_stage())
        .fuse(upper_stage())
        .run(collect())
        .unwrap();
    let right = from_chunks(chunks())
        .fuse(reverse_stage().fuse(upper_stage()))
        .run(collect())
        .unwrap();
    assert_eq!(left, b"BADC".to_vec());
    assert_eq!(left, right);
}

#[test]
fn stage_runs_whole_stream_through() {
    let out = from_chunks(vec![b"ab".to_vec(), b"cd".to_vec()])
        .fuse(reverse_stage())
        .run(collect());
    assert_eq!(out.unwrap(), b"badc".to_vec());
}

/// Emits its first chunk reversed as a final unit, then ends.
fn one_chunk_reverse() -> CodecStage<Vec<u8>, Vec<u8>> {
    CodecStage::new(Codec::new(Iter::next(|input: Chunk<Vec<u8>>| {
        let at_end = input.is_eof();
        let payload: Vec<u8> = input.into_data().into_iter().rev().collect();
        let residual = if at_end { Chunk::eof() } else { Chunk::empty() };
        Iter::done_with(CodecOutput::Last(payload), residual)
    })))
}

#[test]
fn stage_cat_hands_downstream_to_the_second_stage() {
    let staged = one_chunk_reverse().cat(upper_stage());
    let out = from_chunks(vec![b"ab".to_vec(), b"cd".to_vec()])
        .fuse(staged)
        .run(collect())
        .unwrap();
    assert_eq!(out, b"baCD".to_vec());
}

#[test]
fn stage_apply_yields_consumer_of_upstream_type() {
    let upstream: Iter<Vec<u8>, Vec<u8>> = upper_stage().apply(collect());
    let out = run_on(upstream, vec![b"ab", b"cd"]).unwrap();
    assert_eq!(out, b"ABCD".to_vec());
}

#[test]
fn copy_input_sees_everything_delivered() {
    let (state, saved) = run_on(copy_input(take(3)), vec![b"ab", b"cd"]).unwrap();
    assert_eq!(saved.data(), &b"abcd".to_vec());
    match state {
        Iter::Done(head, residual) => {
            assert_eq!(head, b"abc".to_vec());
            assert_eq!(residual.data(), &b"d".to_vec());
        }
        other => panic!("expected Done, got {other:?}"),
    }
}

#[test]
fn try_backtrack_rewinds_everything_on_parse_failure() {
    let scan = try_backtrack(exact(b"abc".to_vec()))
        .and_then(|outcome| collect().map(move |rest| (outcome.is_left(), rest)));
    let (backtracked, rest) = run_on(scan, vec![b"ab", b"xy"]).unwrap();
    assert!(backtracked);
    assert_eq!(rest, b"abxy".to_vec());
}

#[test]
fn try_backtrack_keeps_residual_on_success() {
    let scan = try_backtrack(exact(b"ab".to_vec()))
        .and_then(|outcome| collect().map(move |rest| (outcome.is_right(), rest)));
    let (matched, rest) = run_on(scan, vec![b"ab", b"xy"]).unwrap();
    assert!(matched);
    assert_eq!(rest, b"xy".to_vec());
}

#[test]
fn try_backtrack_reraises_other_failures() {
    let broken: Iter<Vec<u8>, ()> = Iter::next(|_| Iter::fail("not a parse failure"));
    let out = run_on(try_backtrack(broken), vec![b"ab"]);
    assert!(matches!(out, Err(IterError::Message(_))));
}

#[test]
fn or_parse_merges_expected_token_sets() {
    let parser = or_parse(
        exact(b"foo".to_vec()).map(|()| 1),
        exact(b"bar".to_vec()).map(|()| 2),
    );
    match run_on(parser, vec![b"baz"]) {
        Err(IterError::Expected { tokens, .. }) => assert_eq!(tokens.len(), 2),
        other => panic!("expected merged Expected failure, got {other:?}"),
    }
}

#[test]
fn multi_parse_commits_to_first_on_success() {
    let parser = multi_parse(exact(b"ab".to_vec()).map(|()| b"first".to_vec()), collect());
    assert_eq!(run_on(parser, vec![b"a", b"b"]).unwrap(), b"first".to_vec());
}

#[test]
fn multi_parse_falls_back_without_buffering() {
    let parser = multi_parse(
        exact(b"abc".to_vec()).and_then(|()| Iter::done(b"first".to_vec())),
        collect(),
    );
    // The fallback saw every chunk as it arrived, so nothing was replayed.
    assert_eq!(
        run_on(parser, vec![b"a", b"b", b"x"]).unwrap(),
        b"abx".to_vec()
    );
}

#[test]
fn catch_iter_hands_over_error_and_state() {
    let caught = catch_iter(
        exact(b"zz".to_vec()).map(|()| b"matched".to_vec()),
        |err, _state| {
            assert!(matches!(err, IterError::Expected { .. }));
            Iter::done(b"recovered".to_vec())
        },
    );
    assert_eq!(run_on(caught, vec![b"ab"]).unwrap(), b"recovered".to_vec());
}

#[test]
fn catch_backtrack_restarts_replacement_on_saved_input() {
    let caught = catch_backtrack(exact(b"zz".to_vec()).map(|()| Vec::new()), |_err| collect());
    assert_eq!(run_on(caught, vec![b"ab", b"cd"]).unwrap(), b"abcd".to_vec());
}

fn failing_source(payload: &'static [u8]) -> CodecSource<Vec<u8>> {
    let mut sent = false;
    from_fn(move || {
        if sent {
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        } else {
            sent = true;
            Ok(Some(payload.to_vec()))
        }
    })
}

#[test]
fn source_catch_resumes_consumer_for_next_source() {
    struct Remember(Rc<RefCell<Option<String>>>);
    impl CatchHandler<Vec<u8>> for Remember {
        fn handle<A: 'static>(
            self,
            err: IterError,
            state: Iter<Vec<u8>, A>,
        ) -> Iter<Vec<u8>, A> {
            *self.0.borrow_mut() = Some(err.to_string());
            resume(state)
        }
    }

    let seen = Rc::new(RefCell::new(None));
    let source = failing_source(b"ab")
        .catch(Remember(seen.clone()))
        .cat(from_chunk(b"cd".to_vec()));
    assert_eq!(source.run(take(4)).unwrap(), b"abcd".to_vec());
    assert_eq!(seen.borrow().as_deref(), Some("boom"));
}

fn failing_stage() -> CodecStage<Vec<u8>, Vec<u8>> {
    CodecStage::new(Codec::new(Iter::next(|_input| {
        Iter::fail_with(IterError::Io(std::sync::Arc::new(io::Error::new(
            io::ErrorKind::Other,
            "stage broke",
        ))))
    })))
}

#[test]
fn catch_skips_failures_of_stages_fused_on_later() {
    let out = from_chunk(b"ab".to_vec())
        .catch(Resume)
        .fuse(failing_stage())
        .run(take(10));
    assert!(matches!(out, Err(IterError::Io(_))));
}

#[test]
fn catch_fused_sees_failures_of_stages_fused_on_later() {
    let out = from_chunk(b"ab".to_vec())
        .catch_fused(Resume)
        .fuse(failing_stage())
        .run(take(10));
    // The stage died before transcoding anything, so the consumer just
    // sees an empty stream after recovery.
    assert_eq!(out.unwrap(), Vec::<u8>::new());
}

#[test]
fn stage_catch_recovers_its_own_failure() {
    let out = from_chunk(b"ab".to_vec())
        .fuse(failing_stage().catch(Resume))
        .run(take(10));
    assert_eq!(out.unwrap(), Vec::<u8>::new());
}

#[test]
fn run_does_not_let_source_catch_see_consumer_side_failures() {
    let poisoned: Iter<Vec<u8>, Vec<u8>> = Iter::SourceFail(
        IterError::Message(String::from("travelled in with the consumer")),
        Box::new(take(2)),
    );
    // Were the catch to see this failure, `Resume` would recover `take(2)`
    // and the run would succeed with b"ab".
    let out = from_chunk(b"ab".to_vec()).catch(Resume).run(poisoned);
    assert!(matches!(out, Err(IterError::Message(_))));
}

#[test]
fn map_fail_rewrites_settled_error() {
    let relabelled = map_fail(Iter::<Vec<u8>, ()>::fail("inner"), |_| {
        IterError::Parse(String::from("outer"))
    });
    assert!(matches!(run_on(relabelled, vec![]), Err(IterError::Parse(_))));
}

#[test]
fn resume_turns_salvaged_stage_result_into_done() {
    let salvaged: Iter<Vec<u8>, u32> =
        Iter::StageFail(IterError::Message(String::from("late")), 9);
    assert_eq!(resume(salvaged).finish().unwrap(), 9);
}

#[test]
fn ctl_reaches_source_handler_through_a_stage() {
    let handlers = CtlHandlers::new().on(|_: TellReq| Some(42u64));
    let mut sent = false;
    let source = CodecSource::new(Codec::pull(move || {
        if sent {
            Ok(None)
        } else {
            sent = true;
            Ok(Some(b"ab".to_vec()))
        }
    }))
    .with_ctl(handlers);
    let probe = ctl(TellReq).and_then(|pos| take(2).map(move |payload| (pos, payload)));
    let (pos, payload) = source
        .fuse(CodecStage::map(|payload: Vec<u8>| payload))
        .run(probe)
        .unwrap();
    assert_eq!(pos, Some(42));
    assert_eq!(payload, b"ab".to_vec());
}

#[test]
fn ctl_without_handler_gets_no_handler_reply() {
    let probe = ctl(SizeReq).and_then(|size: Option<u64>| {
        assert!(size.is_none());
        null()
    });
    assert!(run_on(probe, vec![b"ab"]).is_ok());
}

#[test]
fn stage_handler_answers_before_propagating() {
    let stage = CodecStage::map(|payload: Vec<u8>| payload)
        .with_ctl(CtlHandlers::new().on(|_: SizeReq| Some(7u64)));
    let probe = ctl(SizeReq).and_then(|size| take(2).map(move |payload| (size, payload)));
    let (size, payload) = from_chunk(b"ab".to_vec()).fuse(stage).run(probe).unwrap();
    assert_eq!(size, Some(7));
    assert_eq!(payload, b"ab".to_vec());
}

#[test]
fn seek_requests_are_marked_flushing() {
    let req = CtlReq::new(SeekReq(io::SeekFrom::Start(4)));
    assert!(req.flushes_input());
    let req = CtlReq::new(TellReq);
    assert!(!req.flushes_input());
}

#[test]
fn loopback_carries_chunks_between_tasks() {
    let (sink, source) = iter_loop::<Vec<u8>>();
    let consumer = std::thread::spawn(move || source.run(collect()).unwrap());
    let sink = sink.step(Chunk::new(b"ab".to_vec()));
    let sink = sink.step(Chunk::new(b"cd".to_vec()));
    let closed = sink.step(Chunk::eof());
    assert!(closed.is_done());
    assert_eq!(consumer.join().unwrap(), b"abcd".to_vec());
}

#[test]
fn shared_consumer_serialises_steps_from_two_branches() {
    let guarded = shared(collect());
    let first = guarded.branch().step(Chunk::new(b"ab".to_vec()));
    assert!(first.wants_input());
    let second = guarded.branch().step(Chunk::new(b"cd".to_vec()));
    assert!(second.wants_input());
    let _ = first.step(Chunk::eof());
    let _ = second.step(Chunk::eof());
    assert_eq!(guarded.finish().unwrap(), b"abcd".to_vec());
}

#[test]
fn finalize_pair_runs_once_after_both_sides_complete() {
    let fired = Rc::new(RefCell::new(0u32));
    let count = fired.clone();
    let (iter, source) = finalize_pair(collect(), from_chunk(b"ab".to_vec()), move || {
        *count.borrow_mut() += 1;
    });
    let fed = source.feed(iter);
    // Only the source side has completed; the consumer is still hungry.
    assert_eq!(*fired.borrow(), 0);
    assert_eq!(fed.finish().unwrap(), b"ab".to_vec());
    assert_eq!(*fired.borrow(), 1);
}

#[test]
fn data_returns_first_nonempty_payload() {
    let out = run_on(data(), vec![b"", b"ab"]).unwrap();
    assert_eq!(out, b"ab".to_vec());
    assert!(matches!(run_on(data(), vec![]), Err(IterError::Io(_) | IterError::Eof(_))));
}

#[test]
fn try_iter_reifies_failure_with_state() {
    let outcome = run_on(try_iter(exact(b"zz".to_vec())), vec![b"ab"]).unwrap();
    match outcome {
        either::Either::Left((err, state)) => {
            assert!(matches!(err, IterError::Expected { .. }));
            assert!(state.is_failure());
        }
        either::Either::Right(()) => panic!("expected the failure reified"),
    }
}

#[test]
fn resume_verbose_reports_and_unwraps() {
    let wrapped: Iter<Vec<u8>, Vec<u8>> = Iter::SourceFail(
        IterError::Message(String::from("flaky source")),
        Box::new(take(2)),
    );
    let resumed = resume_verbose(wrapped);
    assert!(resumed.wants_input());
}

#[test]
fn io_lift_classifies_end_of_file() {
    let starved: Iter<Vec<u8>, ()> =
        Iter::io(|| Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short read")));
    assert!(matches!(starved.finish(), Err(IterError::Eof(Some(_)))));

    let starved: Iter<Vec<u8>, ()> =
        Iter::io(|| Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short read")));
    match run_on(starved, vec![b"ab"]) {
        Err(IterError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
        other => panic!("expected the original I/O error back, got {other:?}"),
    }
}
