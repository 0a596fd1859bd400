pub mod envelope;
pub mod errors;
pub mod ids;
pub mod registry;
pub mod templates;

pub use envelope::{OutboundEnvelope, Payload, Request};
pub use errors::{Result, RouterError};
pub use ids::{ClientId, TabId};
pub use registry::{RegisterResult, Registration, RoleRegistry, RoleTarget};
pub use templates::{RoleTemplate, TemplateProvider, TemplateTable};
