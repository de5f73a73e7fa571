mod clock;
mod conditions;
mod resource_key;
mod template;

pub use clock::{remaining, Clock, SystemClock};
pub use conditions::Conditions;
pub use resource_key::{ResourceKey, DEFAULT_NAMESPACE_NAME};
pub use template::{component_identity, inject_label, ComponentIdentity, TemplateError};
