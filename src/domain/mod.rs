pub mod entity;
pub mod events;
pub mod fault;
pub mod hook;
pub mod schema;

pub use entity::{EntityDescriptor, EntityRegistry, IdStrategy};
pub use events::EventName;
pub use fault::{Delay, FaultKind, FaultProfile, FaultResponse};
pub use hook::{Hook, HookTransform, HookValidationError, TransformSpec};
pub use schema::{Field, GenerationDirective, SchemaKind, TypeSchema};
