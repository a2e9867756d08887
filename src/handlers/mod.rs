//! Leaf request handlers.
pub mod echo;
pub mod health;
pub mod static_files;
pub mod template;

pub use echo::EchoHandler;
pub use health::{HealthChecker, HealthHandler};
pub use static_files::StaticFileHandler;
pub use template::TemplateHandler;
