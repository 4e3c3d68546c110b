pub mod engine;
pub mod fallback;
pub mod inquiry;
pub mod intent;
pub mod replies;

pub use engine::ConversationRouter;
pub use fallback::{ConversationFallback, FallbackHints, GeminiFallback};
pub use intent::classify;
