//! Illustrative driver exercising the public API end to end: open a store,
//! add a few streams (one compressed), read them back, force a reopen, and
//! close cleanly. Mirrors the shape of the teacher's Pack/Unpack CLI flow,
//! minus the argument parsing — this file is not wired into the crate's
//! build graph (no `[[bin]]` entry, no `Cargo.toml` of its own).
//!
//! Run by copying it into `src/bin/` of a scratch crate depending on
//! `blobvault`, or pasting its `main` body into a test.

use blobvault::{Store, StoreConfig, StreamInfo};
use std::io::{Cursor, Read};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger_init();

    let working_folder = std::env::temp_dir().join("blobvault-walkthrough");
    let config = StoreConfig::new(&working_folder).with_compression_threshold(64);

    let store = Store::open(config)?;

    let greeting = b"hello from the walkthrough driver".to_vec();
    store.add(
        "greeting",
        Cursor::new(greeting.clone()),
        StreamInfo::new().with_length(greeting.len() as u64),
    )?;

    let large = vec![b'x'; 4096];
    let meta = store.add(
        "large-blob",
        Cursor::new(large.clone()),
        StreamInfo::new().with_compressed(true),
    )?;
    println!(
        "large-blob stored at offset {} as {} bytes (compressed={})",
        meta.offset, meta.length, meta.compressed
    );

    let mut out = Vec::new();
    store.get("greeting")?.read_to_end(&mut out)?;
    assert_eq!(out, greeting);

    let mut out = Vec::new();
    store.get("large-blob")?.read_to_end(&mut out)?;
    assert_eq!(out, large);

    println!("contains(\"greeting\") = {}", store.contains("greeting"));
    println!("contains(\"missing\")  = {}", store.contains("missing"));

    store.close()?;

    // Reopening proves durability: the index header was rewritten at close.
    let store = Store::open(StoreConfig::new(&working_folder))?;
    let mut out = Vec::new();
    store.get("greeting")?.read_to_end(&mut out)?;
    assert_eq!(out, greeting);
    println!("reopen round-trip ok");

    Ok(())
}

fn env_logger_init() {
    let _ = std::env::var("RUST_LOG");
}
