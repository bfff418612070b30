// Capability dispatch
// Typed calls over a fixed catalog, plus the free-text directive shim

pub mod call;
pub mod catalog;
pub mod directive;
pub mod dispatcher;
pub mod error;
pub mod transcript;

pub use call::{CapabilityCall, ParamValue, RawInvocation};
pub use catalog::{CapabilitySpec, ParamKind, ParamSpec, CATALOG};
pub use directive::{contains_directive, from_tool_call, parse_text, Line, DIRECTIVE_MARKER};
pub use dispatcher::DecisionDispatcher;
pub use error::DispatchError;
pub use transcript::{Transcript, TranscriptEntry};
