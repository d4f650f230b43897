// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn display_is_hash_slash_size() {
    let d = Digest::new("abc123", 42);
    assert_eq!(d.to_string(), "abc123/42");
}

#[test]
fn default_is_empty() {
    let d = Digest::default();
    assert!(d.is_empty());
    assert_eq!(d.size_bytes, 0);
}

#[test]
fn non_empty_after_new() {
    assert!(!Digest::new("d", 1).is_empty());
}

#[test]
fn serde_roundtrip() {
    let d = Digest::new("feed", 9);
    let json = serde_json::to_string(&d).unwrap();
    let back: Digest = serde_json::from_str(&json).unwrap();
    assert_eq!(back, d);
}
