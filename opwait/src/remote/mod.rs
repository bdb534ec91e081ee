pub(crate) mod api;
pub mod http;
pub mod mem;

pub use api::ApiClient;
