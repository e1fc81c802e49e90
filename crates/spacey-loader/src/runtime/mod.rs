//! Script values and the host execution primitive.
//!
//! The loader treats script execution as an external collaborator. This
//! module defines the values that cross that boundary and the
//! [`ScriptHost`] trait an engine implements.

pub mod function;
pub mod host;
pub mod namespace;
pub mod object;
pub mod value;

pub use function::{Function, NativeFn};
pub use host::{Scope, Script, ScriptHost};
pub use namespace::{Namespace, ES_MODULE_MARKER};
pub use object::{Object, ObjectRef, Property};
pub use value::Value;
