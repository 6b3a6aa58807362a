//! Bounded buffer of console entries relayed from the selected tab

/// Entries kept before the buffer is wiped
pub const MAX_LOG_ENTRIES: usize = 2000;

/// A console message or page error, addressable by its error number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub message: String,
    pub line: u32,
    pub column: u32,
    /// URL path of the script that produced the entry
    pub path: String,
}

/// Recent log entries plus the running error counter.
///
/// The buffer is cleared in bulk rather than evicting one entry at a time,
/// and the counter is reset with it, so error number `n` is always
/// `entries[n]`.
#[derive(Debug, Default)]
pub struct LogBuffer {
    entries: Vec<LogEntry>,
    next_error: usize,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry and return its error number.
    pub fn push(&mut self, entry: LogEntry) -> usize {
        if self.entries.len() >= MAX_LOG_ENTRIES {
            tracing::debug!(count = self.entries.len(), "Log buffer full, clearing");
            self.entries.clear();
            self.next_error = 0;
        }
        self.entries.push(entry);
        let number = self.next_error;
        self.next_error += 1;
        number
    }

    pub fn get(&self, number: usize) -> Option<&LogEntry> {
        self.entries.get(number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
