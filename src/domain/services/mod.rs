mod feed;
mod message_store;
mod pagination;
mod realtime;
mod scroll_anchor;

pub use feed::*;
pub use message_store::*;
pub use pagination::*;
pub use realtime::*;
pub use scroll_anchor::*;
