//! Command grammar.
//!
//! A closed set of command shapes tried in a fixed order. Admin-only shapes
//! are skipped for everyone else, so their syntax falls through to a plain
//! content request.

use crate::broadcast::Partition;
use crate::catalog::ContentKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `/start` or `/info`.
    Start,
    Broadcast { partition: Partition, body: String },
    SendAdvertisement { test_only: bool },
    Content(ContentKind),
}

impl Command {
    pub fn is_admin_only(&self) -> bool {
        matches!(
            self,
            Command::Broadcast { .. } | Command::SendAdvertisement { .. }
        )
    }
}

struct Shape {
    admin_only: bool,
    matcher: fn(&str) -> Option<Command>,
}

const BROADCAST_PREFIXES: [(&str, Partition); 4] = [
    ("!toEveryone!", Partition::All),
    ("!toEveryIt!", Partition::Italian),
    ("!toEveryEs!", Partition::Spanish),
    ("!toEveryEn!", Partition::Other),
];

fn match_start(text: &str) -> Option<Command> {
    is_start_or_info(text).then_some(Command::Start)
}

fn match_broadcast(text: &str) -> Option<Command> {
    BROADCAST_PREFIXES.iter().find_map(|(prefix, partition)| {
        text.strip_prefix(prefix).map(|rest| Command::Broadcast {
            partition: *partition,
            body: rest.trim().to_string(),
        })
    })
}

fn match_advertisement(text: &str) -> Option<Command> {
    match text {
        "/sendadv" => Some(Command::SendAdvertisement { test_only: false }),
        "/testadv" => Some(Command::SendAdvertisement { test_only: true }),
        _ => None,
    }
}

const GRAMMAR: &[Shape] = &[
    Shape {
        admin_only: false,
        matcher: match_start,
    },
    Shape {
        admin_only: true,
        matcher: match_broadcast,
    },
    Shape {
        admin_only: true,
        matcher: match_advertisement,
    },
];

/// `/start` and `/info` bypass the subscription gate.
pub fn is_start_or_info(text: &str) -> bool {
    text.starts_with("/start") || text.starts_with("/info")
}

/// Classify message text. Anything unmatched is a content request.
pub fn parse(text: &str, is_admin: bool) -> Command {
    GRAMMAR
        .iter()
        .filter(|shape| is_admin || !shape.admin_only)
        .find_map(|shape| (shape.matcher)(text))
        .unwrap_or_else(|| Command::Content(ContentKind::from_request(text)))
}
