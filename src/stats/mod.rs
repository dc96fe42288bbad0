/// Statistics pass driver: target collection, authorization and maintenance.
pub mod coordinator;
/// Session-scoped re-entrancy guard and user context.
pub mod guard;
/// Interception-point chaining in front of the host's own handler.
pub mod hook;
/// Ordered, deduplicated relation id set.
pub mod relation_set;
/// Expansion of views into the base relations they read.
pub mod view_resolver;
/// Discovery of every relation a query tree reads.
pub mod walker;
