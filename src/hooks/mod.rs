pub mod envelope;
pub mod flag;

pub use envelope::{has_reserved_prefix, HookEnvelope, RESERVED_PREFIXES};
pub use flag::{FlagContent, FlagStatus};
