pub mod limiter;
pub mod retry;
pub mod webdav;

pub use limiter::ConcurrencyLimiter;
pub use webdav::{DavEntry, ListDepth, WebDavClient};
