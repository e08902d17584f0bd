//! Fixtures shared by the unit tests: CAR archives, records and stream frames.

use ipld_core::cid::multihash::Multihash;
use ipld_core::cid::Cid;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

const DAG_CBOR: u64 = 0x71;
const SHA2_256: u64 = 0x12;

pub(crate) fn dagcbor(value: &impl Serialize) -> Vec<u8> {
    serde_ipld_dagcbor::to_vec(value).expect("failed to encode")
}

/// The CIDv1 (dag-cbor, sha2-256) of an encoded block.
pub(crate) fn cid_of(block: &[u8]) -> Cid {
    let digest = Sha256::digest(block);
    Cid::new_v1(DAG_CBOR, Multihash::<64>::wrap(SHA2_256, &digest).expect("invalid digest"))
}

fn push_varint(out: &mut Vec<u8>, n: usize) {
    let mut buf = unsigned_varint::encode::usize_buffer();
    out.extend_from_slice(unsigned_varint::encode::usize(n, &mut buf));
}

/// Builds a CAR v1 archive holding `blocks` in the given order.
pub(crate) fn car(blocks: &[Vec<u8>]) -> Vec<u8> {
    #[derive(Serialize)]
    struct Header {
        roots: Vec<Cid>,
        version: u64,
    }

    let roots = blocks.first().map(|b| cid_of(b)).into_iter().collect();
    let header = dagcbor(&Header { roots, version: 1 });
    let mut out = Vec::new();
    push_varint(&mut out, header.len());
    out.extend_from_slice(&header);
    for block in blocks {
        let cid = cid_of(block).to_bytes();
        push_varint(&mut out, cid.len() + block.len());
        out.extend_from_slice(&cid);
        out.extend_from_slice(block);
    }
    out
}

/// An encoded `app.bsky.feed.post` record.
pub(crate) fn post_record(text: &str, reply_root: Option<&str>) -> Vec<u8> {
    let mut record = json!({
        "$type": "app.bsky.feed.post",
        "text": text,
        "createdAt": "2024-01-01T00:00:00.000Z",
    });
    if let Some(root) = reply_root {
        let strong_ref = json!({
            "uri": root,
            "cid": "bafyreie5737gdxlw5i64vzichcalba3z2v5n6icifvx5xytvske7mr3hpm",
        });
        record["reply"] = json!({ "root": strong_ref, "parent": strong_ref });
    }
    dagcbor(&record)
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct OpBody {
    pub action: &'static str,
    pub path: String,
    pub cid: Option<Cid>,
}

impl OpBody {
    pub fn new(action: &'static str, path: &str, cid: Option<Cid>) -> Self {
        Self { action, path: path.to_owned(), cid }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommitBody {
    pub repo: String,
    pub seq: i64,
    pub time: String,
    pub ops: Vec<OpBody>,
    #[serde(with = "serde_bytes")]
    pub blocks: Vec<u8>,
    pub too_big: bool,
}

impl CommitBody {
    pub fn new(repo: &str, ops: Vec<OpBody>, blocks: Vec<u8>) -> Self {
        Self {
            repo: repo.to_owned(),
            seq: 1,
            time: String::from("2024-01-01T00:00:00.000Z"),
            ops,
            blocks,
            too_big: false,
        }
    }
}

/// A binary message frame of type `t`.
pub(crate) fn message_frame(t: &str, body: &impl Serialize) -> Vec<u8> {
    let mut frame = dagcbor(&json!({ "op": 1, "t": t }));
    frame.extend(dagcbor(body));
    frame
}

/// A binary error frame.
pub(crate) fn error_frame(error: &str) -> Vec<u8> {
    let mut frame = dagcbor(&json!({ "op": -1 }));
    frame.extend(dagcbor(&json!({ "error": error })));
    frame
}

pub(crate) fn handle_body(did: &str, handle: &str) -> Value {
    json!({ "did": did, "handle": handle, "seq": 1, "time": "2024-01-01T00:00:00.000Z" })
}
