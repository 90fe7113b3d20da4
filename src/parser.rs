//! Parser Collaborator: converts files into declared objects. The actual
//! configuration-format parsing is out of scope for this crate; this module
//! only defines the seam and the blocking/non-blocking split the driver acts on.

use crate::state::{ParsedObjects, ParserResult, SourceSnapshot};
use async_trait::async_trait;

#[async_trait]
pub trait Parser: Send + Sync {
    /// `parseSource(ctx, SourceSnapshot) -> (objects, errs)`.
    async fn parse_source(&self, snapshot: &SourceSnapshot) -> ParserResult;
}

/// A parser that always succeeds with no declared objects — useful as a
/// default/no-op collaborator in tests that don't exercise parsing.
pub struct EmptyParser;

#[async_trait]
impl Parser for EmptyParser {
    async fn parse_source(&self, _snapshot: &SourceSnapshot) -> ParserResult {
        ParserResult {
            objects: ParsedObjects::default(),
            errs: Vec::new(),
            blocking: false,
        }
    }
}
