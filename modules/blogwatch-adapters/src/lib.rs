pub mod adapter;
pub mod feed;
pub mod fetch;
pub mod host_lists;
pub mod html_feed;

pub use adapter::{select_adapter, AdapterContext, AdapterKind};
