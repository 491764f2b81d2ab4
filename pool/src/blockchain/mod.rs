//! Daemon communication: block templates, upstream health, and the refresh loop.

pub mod refresher;
pub mod template;
pub mod upstream;

pub use refresher::TemplateRefresher;
pub use template::BlockTemplate;
pub use upstream::{Upstream, UpstreamPool};
