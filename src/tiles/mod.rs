pub mod cache;
pub mod loader;
pub mod source;

// Re-exports for convenience
pub use cache::ImageCache;
pub use loader::{HttpImageLoader, ImageLoader};
pub use source::{TileSource, UrlTemplate};
