mod cache;
mod scanner;
mod signature;

pub use cache::PatternCache;
pub use scanner::{DEFAULT_CHUNK_SIZE, PatternScanner};
pub use signature::{ByteSignature, format_hex_bytes, parse_hex_bytes};
