//! Server state.
//!
//! Everything a request handler needs: the message store, the family
//! roster, the room router, and configuration. Cheap to clone; every field
//! is shared.

use std::path::PathBuf;
use std::sync::Arc;

use crate::directory::Directory;
use crate::push::{LogPushSink, PushSink};
use crate::rooms::RoomRouter;
use crate::store::{MessageStore, Page};

/// Default number of messages per history page.
const DEFAULT_PAGE_SIZE: usize = 50;

/// Hard ceiling on a history page.
const DEFAULT_MAX_PAGE_SIZE: usize = 100;

/// Default window in which a repeated client message id is a duplicate.
const DEFAULT_DEDUPE_WINDOW_SECS: i64 = 30;

/// Default maximum message length, in characters.
const DEFAULT_MAX_BODY_CHARS: usize = 1000;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub port: u16,
    /// Directory holding the SQLite file. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Family roster JSON file.
    pub directory_file: Option<PathBuf>,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub dedupe_window_secs: i64,
    pub max_body_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: None,
            directory_file: None,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            dedupe_window_secs: DEFAULT_DEDUPE_WINDOW_SECS,
            max_body_chars: DEFAULT_MAX_BODY_CHARS,
        }
    }
}

impl ChatConfig {
    pub fn dedupe_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.dedupe_window_secs.max(0))
    }

    /// Resolve optional paging parameters. A missing or zero limit falls
    /// back to the default; anything above the ceiling is clamped.
    pub fn page(&self, limit: Option<usize>, skip: Option<usize>) -> Page {
        let max = self.max_page_size.max(1);
        let limit = match limit {
            Some(0) | None => self.default_page_size,
            Some(n) => n,
        };
        Page {
            limit: limit.clamp(1, max),
            skip: skip.unwrap_or(0),
        }
    }
}

/// Shared server state.
#[derive(Clone)]
pub struct ChatState {
    pub store: MessageStore,

    /// Read-only family roster.
    pub directory: Directory,

    /// Live connections and their room subscriptions.
    pub rooms: RoomRouter,

    /// Direct-message push hook.
    pub push: Arc<dyn PushSink>,

    pub config: ChatConfig,
}

impl ChatState {
    pub fn new(config: ChatConfig, store: MessageStore, directory: Directory) -> Self {
        Self {
            store,
            directory,
            rooms: RoomRouter::new(),
            push: Arc::new(LogPushSink),
            config,
        }
    }

    /// Replace the push sink.
    pub fn with_push(mut self, push: Arc<dyn PushSink>) -> Self {
        self.push = push;
        self
    }
}
