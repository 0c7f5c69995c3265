//! Generated Protocol Buffers types for the wire envelope (see `proto/cellaserv.proto`).

#![allow(clippy::derive_partial_eq_without_eq)]

include!(concat!(env!("OUT_DIR"), "/broker.rs"));
