pub mod finder;
pub mod message;
pub mod parser;
pub mod telegram;

pub use finder::{spawn_finder, FinderHandle, FinderStats};
pub use message::Message;
pub use parser::{ArchiveParser, ParseError};
pub use telegram::TelegramHtmlParser;
