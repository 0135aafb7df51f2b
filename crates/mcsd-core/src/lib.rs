pub mod error;
pub mod fhir;
pub mod id;
pub mod reference;
pub mod resource;
pub mod time;
pub mod ura;

pub use error::{CoreError, Result};
pub use fhir::DirectoryResourceType;
pub use id::{manual_directory_id, namespace_id};
pub use reference::{
    NodeReference, ParsedReference, extract_references, namespace_resource, parse_reference,
    resolve_reference,
};
pub use resource::DomainResource;
pub use time::{FhirDateTime, from_unix_timestamp, now_utc};
pub use ura::{URA_NAMING_SYSTEM, find_ura};
