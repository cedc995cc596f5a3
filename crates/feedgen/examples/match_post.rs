//! Example: run the feed matchers against one post and print the verdicts.
//!
//! Input is either a full Jetstream event or a bare `app.bsky.feed.post` record, read from a
//! file or stdin.
//!
//! Usage: cargo run -p feedgen --example match_post -- [--feeds kubecon,english-text] [FILE]

use feedgen::{build_feeds, CheckpointStore, Event, FeedKind, Post, SqliteStore};
use std::io::Read;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args: Vec<String> = std::env::args().collect();
    let mut feeds: Vec<String> = FeedKind::ALL.iter().map(|k| k.name().to_string()).collect();
    let mut path = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--feeds" => {
                i += 1;
                feeds = args
                    .get(i)
                    .map(|s| s.split(',').map(str::to_string).collect())
                    .unwrap_or_default();
            }
            "-h" | "--help" => {
                eprintln!("Usage: match_post [--feeds NAME,NAME] [FILE]");
                return Ok(());
            }
            other => path = Some(other.to_string()),
        }
        i += 1;
    }

    let mut input = String::new();
    match &path {
        Some(p) => input = std::fs::read_to_string(p)?,
        None => {
            std::io::stdin().read_to_string(&mut input)?;
        }
    }

    let value: serde_json::Value = serde_json::from_str(&input)?;
    let (event, post) = if value.get("commit").is_some() {
        let event: Event = serde_json::from_value(value)?;
        let commit = event.post_commit().ok_or("event is not a post create or update")?;
        let post = Post::decode(commit)?;
        (event, post)
    } else {
        let post: Post = serde_json::from_value(value)?;
        let event = Event {
            did: "did:plc:example".into(),
            time_us: 0,
            kind: Default::default(),
            commit: None,
        };
        (event, post)
    };

    let store: Arc<dyn CheckpointStore> = Arc::new(SqliteStore::open_in_memory()?);
    let feeds = build_feeds(&feeds, &store);
    if feeds.is_empty() {
        eprintln!("no known feeds selected");
        std::process::exit(1);
    }
    for feed in &feeds {
        match feed.matcher().matches(&event, &post) {
            Ok(true) => println!("{}: match", feed.name()),
            Ok(false) => println!("{}: no match", feed.name()),
            Err(e) => println!("{}: error: {}", feed.name(), e),
        }
    }
    Ok(())
}
