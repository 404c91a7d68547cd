// ViewerContext middleware and extractor
// Resolves the caller's token once per request; handlers only see the ViewerContext

pub mod viewer_context_extractor;
pub mod viewer_context_middleware;

pub use viewer_context_extractor::Vc;
pub use viewer_context_middleware::*;
