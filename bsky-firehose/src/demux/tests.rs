use super::*;
use crate::car::{CarExtractor, ExtractError};
use crate::dispatch::Registration;
use crate::testing::{car, cid_of, dagcbor, post_record, CommitBody, OpBody};
use crate::types::{HandleEvent, TombstoneEvent};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const REPO: &str = "did:plc:abc";
const ROOT: &str = "at://did:plc:xyz/app.bsky.feed.post/3root";

/// Counts extraction calls, delegating to [`CarExtractor`].
#[derive(Default)]
struct Counting {
    calls: AtomicUsize,
}

impl RecordExtractor for Counting {
    async fn extract<T: DeserializeOwned>(
        &self,
        blocks: &[u8],
        cid: &str,
    ) -> core::result::Result<T, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        CarExtractor.extract(blocks, cid).await
    }
}

impl Counting {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

type Log = Arc<Mutex<Vec<String>>>;

/// Callbacks recording every event they see, as `kind:detail`.
fn recording(log: &Log) -> Callbacks {
    let entry = |log: &Log, line: String| log.lock().unwrap().push(line);
    let raw = Arc::clone(log);
    let posts = Arc::clone(log);
    let comments = Arc::clone(log);
    let follows = Arc::clone(log);
    let likes = Arc::clone(log);
    let reposts = Arc::clone(log);
    Callbacks::new()
        .on_raw_operation(Registration::new(move |op: &RepoOperation| {
            entry(&raw, format!("raw:{}:{}", op.action, op.path));
            Ok(())
        }))
        .on_post(Registration::new(move |post: &Post| {
            entry(&posts, format!("post:{}:{}", post.rkey, post.text));
            Ok(())
        }))
        .on_comment(Registration::new(move |comment: &Comment| {
            let line = format!("comment:{}:{}", comment.interaction.subject, comment.reply_to);
            entry(&comments, line);
            Ok(())
        }))
        .on_follow(Registration::new(move |follow: &Follow| {
            entry(&follows, format!("follow:{}", follow.interaction.subject));
            Ok(())
        }))
        .on_like(Registration::new(move |like: &Like| {
            entry(&likes, format!("like:{}", like.uri));
            Ok(())
        }))
        .on_repost(Registration::new(move |repost: &Repost| {
            entry(&reposts, format!("repost:{}", repost.uri));
            Ok(())
        }))
}

fn commit(body: &CommitBody) -> Notification {
    Notification::from_payload("#commit", &dagcbor(body))
        .expect("failed to decode commit")
        .expect("commit must be decoded")
}

async fn demux(
    extractor: &Counting,
    callbacks: &Callbacks,
    notification: Notification,
) -> Result<()> {
    Demultiplexer::new(extractor, callbacks).handle_notification(notification).await
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn create_post() {
    let record = post_record("hello", None);
    let cid = cid_of(&record);
    let body = CommitBody::new(
        REPO,
        vec![OpBody::new("create", "app.bsky.feed.post/3k2x", Some(cid))],
        car(&[record]),
    );
    let posts = Arc::new(Mutex::new(Vec::new()));
    let comments = Arc::new(AtomicUsize::new(0));
    let callbacks = Callbacks::new()
        .on_post(Registration::new({
            let posts = Arc::clone(&posts);
            move |post: &Post| {
                posts.lock().unwrap().push(post.clone());
                Ok(())
            }
        }))
        .on_comment(Registration::new({
            let comments = Arc::clone(&comments);
            move |_: &Comment| {
                comments.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

    let extractor = Counting::default();
    demux(&extractor, &callbacks, commit(&body)).await.expect("failed to demux");

    let posts = posts.lock().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].repo, REPO);
    assert_eq!(posts[0].rkey, "3k2x");
    assert_eq!(posts[0].text, "hello");
    assert_eq!(posts[0].uri(), "at://did:plc:abc/app.bsky.feed.post/3k2x");
    assert_eq!(comments.load(Ordering::SeqCst), 0);
    assert_eq!(extractor.calls(), 1);
}

#[tokio::test]
async fn reply_yields_comment() {
    let record = post_record("nice", Some(ROOT));
    let cid = cid_of(&record);
    let body = CommitBody::new(
        REPO,
        vec![OpBody::new("create", "app.bsky.feed.post/3k2y", Some(cid))],
        car(&[record]),
    );
    let comments = Arc::new(Mutex::new(Vec::new()));
    let log = Log::default();
    let callbacks = recording(&log).on_comment(Registration::new({
        let comments = Arc::clone(&comments);
        move |comment: &Comment| {
            comments.lock().unwrap().push(comment.clone());
            Ok(())
        }
    }));

    demux(&Counting::default(), &callbacks, commit(&body)).await.expect("failed to demux");

    let comment = format!("comment:app.bsky.feed.post/3k2y:{ROOT}");
    assert_eq!(
        entries(&log),
        ["raw:create:app.bsky.feed.post/3k2y", "post:3k2y:nice", comment.as_str()]
    );
    let comments = comments.lock().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].interaction.actor, REPO);
    assert_eq!(comments[0].uri, "at://did:plc:abc/app.bsky.feed.post/3k2y");
    assert_eq!(comments[0].reply_to, ROOT);
    assert_eq!(comments[0].text, "nice");
}

#[tokio::test]
async fn events_in_commit_order() {
    let first = post_record("first", None);
    let reply = post_record("second", Some(ROOT));
    let ops = vec![
        OpBody::new("create", "app.bsky.feed.post/a", Some(cid_of(&first))),
        OpBody::new("create", "app.bsky.graph.follow/f", Some(cid_of(b"follow"))),
        OpBody::new("create", "app.bsky.feed.post/b", Some(cid_of(&reply))),
        OpBody::new("create", "app.bsky.feed.like/l", Some(cid_of(b"like"))),
        OpBody::new("create", "app.bsky.feed.repost/r", Some(cid_of(b"repost"))),
    ];
    let body = CommitBody::new(REPO, ops, car(&[first, reply]));
    let log = Log::default();
    let callbacks = recording(&log);

    demux(&Counting::default(), &callbacks, commit(&body)).await.expect("failed to demux");

    let comment = format!("comment:app.bsky.feed.post/b:{ROOT}");
    assert_eq!(
        entries(&log),
        [
            "raw:create:app.bsky.feed.post/a",
            "post:a:first",
            "raw:create:app.bsky.graph.follow/f",
            "follow:app.bsky.graph.follow/f",
            "raw:create:app.bsky.feed.post/b",
            "post:b:second",
            comment.as_str(),
            "raw:create:app.bsky.feed.like/l",
            "like:at://did:plc:abc/app.bsky.feed.like/l",
            "raw:create:app.bsky.feed.repost/r",
            "repost:at://did:plc:abc/app.bsky.feed.repost/r",
        ]
    );
}

#[tokio::test]
async fn facet_splitting_a_character_keeps_commit() {
    let record = dagcbor(&serde_json::json!({
        "$type": "app.bsky.feed.post",
        "text": "héllo",
        "createdAt": "2024-01-01T00:00:00.000Z",
        "facets": [{
            "index": { "byteStart": 0, "byteEnd": 2 },
            "features": [{ "$type": "app.bsky.richtext.facet#tag", "tag": "h" }],
        }],
    }));
    let ops = vec![
        OpBody::new("create", "app.bsky.feed.post/p", Some(cid_of(&record))),
        OpBody::new("create", "app.bsky.feed.like/l", Some(cid_of(b"like"))),
    ];
    let body = CommitBody::new(REPO, ops, car(&[record]));
    let log = Log::default();
    let facets = Arc::new(Mutex::new(Vec::new()));
    let callbacks = recording(&log).on_post(Registration::new({
        let facets = Arc::clone(&facets);
        move |post: &Post| {
            facets.lock().unwrap().extend(post.facets.iter().map(|f| f.text.clone()));
            Ok(())
        }
    }));

    demux(&Counting::default(), &callbacks, commit(&body)).await.expect("failed to demux");

    assert_eq!(
        entries(&log),
        [
            "raw:create:app.bsky.feed.post/p",
            "post:p:héllo",
            "raw:create:app.bsky.feed.like/l",
            "like:at://did:plc:abc/app.bsky.feed.like/l",
        ]
    );
    assert_eq!(*facets.lock().unwrap(), ["h\u{FFFD}"]);
}

#[tokio::test]
async fn no_extraction_without_post_consumers() {
    let record = post_record("hello", None);
    let ops = vec![
        OpBody::new("create", "app.bsky.feed.post/a", Some(cid_of(&record))),
        OpBody::new("create", "app.bsky.feed.like/l", Some(cid_of(b"like"))),
    ];
    let body = CommitBody::new(REPO, ops, car(&[record]));
    let likes = Arc::new(AtomicUsize::new(0));
    let callbacks = Callbacks::new().on_like(Registration::new({
        let likes = Arc::clone(&likes);
        move |_: &Like| {
            likes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }));

    let extractor = Counting::default();
    demux(&extractor, &callbacks, commit(&body)).await.expect("failed to demux");

    assert_eq!(extractor.calls(), 0);
    assert_eq!(likes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn only_creates_are_materialized() {
    let record = post_record("edited", None);
    let ops = vec![
        OpBody::new("update", "app.bsky.feed.post/a", Some(cid_of(&record))),
        OpBody::new("delete", "app.bsky.feed.post/b", None),
        OpBody::new("delete", "app.bsky.graph.follow/f", None),
        OpBody::new("delete", "app.bsky.feed.like/l", None),
        OpBody::new("delete", "app.bsky.feed.repost/r", None),
    ];
    let body = CommitBody::new(REPO, ops, car(&[record]));
    let log = Log::default();
    let callbacks = recording(&log);

    let extractor = Counting::default();
    demux(&extractor, &callbacks, commit(&body)).await.expect("failed to demux");

    assert_eq!(extractor.calls(), 0);
    assert_eq!(
        entries(&log),
        [
            "raw:update:app.bsky.feed.post/a",
            "raw:delete:app.bsky.feed.post/b",
            "raw:delete:app.bsky.graph.follow/f",
            "raw:delete:app.bsky.feed.like/l",
            "raw:delete:app.bsky.feed.repost/r",
        ]
    );
}

#[tokio::test]
async fn too_big_commit_skips_posts() {
    let record = post_record("large", None);
    let ops = vec![
        OpBody::new("create", "app.bsky.feed.post/a", Some(cid_of(&record))),
        OpBody::new("create", "app.bsky.graph.follow/f", Some(cid_of(b"follow"))),
    ];
    let mut body = CommitBody::new(REPO, ops, Vec::new());
    body.too_big = true;
    let log = Log::default();
    let callbacks = recording(&log);

    let extractor = Counting::default();
    demux(&extractor, &callbacks, commit(&body)).await.expect("failed to demux");

    assert_eq!(extractor.calls(), 0);
    assert_eq!(
        entries(&log),
        [
            "raw:create:app.bsky.feed.post/a",
            "raw:create:app.bsky.graph.follow/f",
            "follow:app.bsky.graph.follow/f",
        ]
    );
}

#[tokio::test]
async fn missing_record_aborts_commit() {
    let record = post_record("present", None);
    let ops = vec![
        OpBody::new("create", "app.bsky.feed.post/gone", Some(cid_of(b"absent"))),
        OpBody::new("create", "app.bsky.graph.follow/f", Some(cid_of(b"follow"))),
    ];
    let body = CommitBody::new(REPO, ops, car(&[record]));
    let log = Log::default();
    let callbacks = recording(&log);

    let err = demux(&Counting::default(), &callbacks, commit(&body)).await.expect_err("must fail");

    match err {
        Error::Conversion { path, source } => {
            assert_eq!(path, "app.bsky.feed.post/gone");
            assert!(matches!(source, ConversionError::Extract(ExtractError::RecordNotFound(_))));
        }
        err => panic!("unexpected error: {err}"),
    }
    assert_eq!(entries(&log), ["raw:create:app.bsky.feed.post/gone"]);
}

#[tokio::test]
async fn handler_error_aborts_commit() {
    let ops = vec![
        OpBody::new("create", "app.bsky.graph.follow/f", Some(cid_of(b"follow"))),
        OpBody::new("create", "app.bsky.feed.like/l", Some(cid_of(b"like"))),
    ];
    let body = CommitBody::new(REPO, ops, Vec::new());
    let likes = Arc::new(AtomicUsize::new(0));
    let callbacks = Callbacks::new()
        .on_follow(Registration::new(|_: &Follow| Err("unwelcome".into())))
        .on_like(Registration::new({
            let likes = Arc::clone(&likes);
            move |_: &Like| {
                likes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

    let err = demux(&Counting::default(), &callbacks, commit(&body)).await.expect_err("must fail");

    assert!(matches!(err, Error::Handler(ref source) if source.to_string() == "unwelcome"));
    assert_eq!(likes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn repeated_operation_derived_once() {
    let record = post_record("once", None);
    let cid = cid_of(&record);
    let ops = vec![
        OpBody::new("create", "app.bsky.feed.post/a", Some(cid)),
        OpBody::new("create", "app.bsky.feed.post/a", Some(cid)),
    ];
    let body = CommitBody::new(REPO, ops, car(&[record]));
    let log = Log::default();
    let callbacks = recording(&log);

    let extractor = Counting::default();
    demux(&extractor, &callbacks, commit(&body)).await.expect("failed to demux");

    assert_eq!(extractor.calls(), 1);
    assert_eq!(
        entries(&log),
        ["raw:create:app.bsky.feed.post/a", "post:a:once", "raw:create:app.bsky.feed.post/a"]
    );
}

#[tokio::test]
async fn unknown_collection_reaches_raw_handlers_only() {
    let ops = vec![
        OpBody::new("create", "app.bsky.actor.profile/self", Some(cid_of(b"profile"))),
        // Collections are compared whole, not by prefix.
        OpBody::new("create", "app.bsky.feed.postgate/p", Some(cid_of(b"postgate"))),
    ];
    let body = CommitBody::new(REPO, ops, Vec::new());
    let log = Log::default();
    let callbacks = recording(&log);

    let extractor = Counting::default();
    demux(&extractor, &callbacks, commit(&body)).await.expect("failed to demux");

    assert_eq!(extractor.calls(), 0);
    assert_eq!(
        entries(&log),
        ["raw:create:app.bsky.actor.profile/self", "raw:create:app.bsky.feed.postgate/p"]
    );
}

#[tokio::test]
async fn passthrough_with_filters() {
    let handles = Arc::new(Mutex::new(Vec::new()));
    let tombstones = Arc::new(AtomicUsize::new(0));
    let callbacks = Callbacks::new()
        .on_handle(
            Registration::new({
                let handles = Arc::clone(&handles);
                move |event: &HandleEvent| {
                    handles.lock().unwrap().push(event.handle.clone());
                    Ok(())
                }
            })
            .filter(|event: &HandleEvent| event.handle.ends_with(".test")),
        )
        .on_tombstone(Registration::new({
            let tombstones = Arc::clone(&tombstones);
            move |_: &TombstoneEvent| {
                tombstones.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));
    let handle = |did: &str, handle: &str| {
        Notification::Handle(HandleEvent {
            did: did.to_owned(),
            handle: handle.to_owned(),
            seq: 1,
            time: String::from("2024-01-01T00:00:00.000Z"),
        })
    };

    let extractor = Counting::default();
    for notification in [
        handle("did:plc:a", "alice.test"),
        handle("did:plc:b", "bob.example"),
        Notification::Tombstone(TombstoneEvent {
            did: String::from("did:plc:c"),
            seq: 2,
            time: String::from("2024-01-01T00:00:00.000Z"),
        }),
    ] {
        demux(&extractor, &callbacks, notification).await.expect("failed to demux");
    }

    assert_eq!(*handles.lock().unwrap(), ["alice.test"]);
    assert_eq!(tombstones.load(Ordering::SeqCst), 1);
}
