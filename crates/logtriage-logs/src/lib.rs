//! Log retrieval and text processing: progressive fetching, redaction,
//! line filtering, summarization and search.

pub mod fetcher;
pub mod redaction;
pub mod search;
pub mod summarizer;

pub use fetcher::LogFetcher;
pub use redaction::{compile_pattern, filter_lines, mask_secrets, redact, strip_ansi, REDACTED};
pub use search::{search_lines, DEFAULT_WINDOW_LINES, MAX_SEARCH_MATCHES};
pub use summarizer::{Summarizer, DEFAULT_TOP_ERRORS};
