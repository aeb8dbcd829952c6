mod registry;

pub use registry::{slugify, Domain, DomainRegistry, ALLOCATION_TOLERANCE};
