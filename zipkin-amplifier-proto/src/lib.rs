//! Zipkin v2 protobuf messages.
//!
//! This crate contains the `zipkin.proto3` model as generated by
//! `prost-build`. It is the wire format spoken on `POST /api/v2/spans` with
//! `Content-Type: application/x-protobuf`.
//!
//! ```
//! use prost::Message;
//! use zipkin_amplifier_proto::proto3::{ListOfSpans, Span};
//!
//! let list = ListOfSpans {
//!     spans: vec![Span {
//!         trace_id: vec![0; 16],
//!         id: 1u64.to_be_bytes().to_vec(),
//!         name: "get".into(),
//!         ..Default::default()
//!     }],
//! };
//! let bytes = list.encode_to_vec();
//! assert_eq!(ListOfSpans::decode(bytes.as_slice()).unwrap(), list);
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![allow(clippy::derive_partial_eq_without_eq)]
#![cfg_attr(test, deny(warnings))]

#[doc(hidden)]
mod proto;

pub use proto::zipkin::proto3;
