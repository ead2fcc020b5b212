// Extraction backend implementations
pub mod html;
pub mod http_api;

pub use html::HtmlScrapeBackend;
pub use http_api::HttpApiBackend;
