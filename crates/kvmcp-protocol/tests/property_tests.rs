//! Property-based tests for the JSON-RPC envelopes and the frame codec
//!
//! - Request encode/decode preserves every field
//! - Any sequence of encoded requests decodes back in order, however the
//!   byte stream is chunked

use bytes::BytesMut;
use kvmcp_protocol::{Frame, JsonCodec, JsonRpcRequest, RequestId};
use proptest::prelude::*;
use serde_json::{Map, Value, json};
use tokio_util::codec::{Decoder, Encoder};

fn request_id_strategy() -> impl Strategy<Value = RequestId> {
    prop_oneof![
        any::<i64>().prop_map(RequestId::Number),
        "[a-zA-Z0-9_-]{1,24}".prop_map(RequestId::String),
    ]
}

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        ".{0,32}".prop_map(Value::String),
    ]
}

fn params_strategy() -> impl Strategy<Value = Option<Value>> {
    prop::option::of(
        prop::collection::btree_map("[a-z]{1,8}", scalar_strategy(), 0..6).prop_map(|entries| {
            let map: Map<String, Value> = entries.into_iter().collect();
            Value::Object(map)
        }),
    )
}

fn request_strategy() -> impl Strategy<Value = JsonRpcRequest> {
    (
        request_id_strategy(),
        "[a-z]{1,10}(/[a-zA-Z_]{1,12})?",
        params_strategy(),
    )
        .prop_map(|(id, method, params)| JsonRpcRequest::new(id, method, params))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: encoding then decoding a request reproduces it exactly
    #[test]
    fn prop_request_roundtrip(request in request_strategy()) {
        let encoded = serde_json::to_string(&request).unwrap();
        let decoded: JsonRpcRequest = serde_json::from_str(&encoded).unwrap();
        prop_assert_eq!(&decoded.jsonrpc, &request.jsonrpc);
        prop_assert_eq!(&decoded.id, &request.id);
        prop_assert_eq!(&decoded.method, &request.method);
        prop_assert_eq!(&decoded.params, &request.params);
    }

    /// Property: frames survive arbitrary chunking of the byte stream
    #[test]
    fn prop_codec_chunking(
        requests in prop::collection::vec(request_strategy(), 1..8),
        chunk in 1usize..64,
    ) {
        let mut codec = JsonCodec::new();
        let mut wire = BytesMut::new();
        for request in &requests {
            codec.encode(request, &mut wire).unwrap();
        }

        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for piece in wire.chunks(chunk) {
            buf.extend_from_slice(piece);
            while let Some(frame) = codec.decode(&mut buf).unwrap() {
                decoded.push(frame);
            }
        }

        prop_assert_eq!(decoded.len(), requests.len());
        for (frame, request) in decoded.into_iter().zip(&requests) {
            match frame {
                Frame::Message(value) => {
                    let back: JsonRpcRequest = serde_json::from_value(value).unwrap();
                    prop_assert_eq!(&back, request);
                }
                Frame::Malformed(reason) => prop_assert!(false, "unexpected malformed frame: {}", reason),
            }
        }
    }
}
