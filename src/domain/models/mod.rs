mod author;
mod backend;
mod conversation;
mod error;
mod event;
mod load;
mod merge;
mod message;
mod scroll;
mod slash_commands;

pub use author::*;
pub use backend::*;
pub use conversation::*;
pub use error::*;
pub use event::*;
pub use load::*;
pub use merge::*;
pub use message::*;
pub use scroll::*;
pub use slash_commands::*;
