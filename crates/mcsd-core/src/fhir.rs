//! The tagged sum type over the mCSD resource types this core understands.
//!
//! Per Design Notes §9, deep FHIR resource-hierarchy inheritance is replaced
//! by dispatch over this tag: reference extraction and namespacing (see
//! `resource` and `reference` modules) switch on `DirectoryResourceType`
//! rather than on resource subclassing.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A directory resource type the sync engine and capability mapper deal with.
///
/// This is deliberately narrower than a general FHIR server's resource type
/// set — mCSD directories only ever exchange these seven types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectoryResourceType {
    Organization,
    Endpoint,
    Location,
    HealthcareService,
    Practitioner,
    PractitionerRole,
    OrganizationAffiliation,
}

impl DirectoryResourceType {
    pub const ALL: [DirectoryResourceType; 7] = [
        Self::Organization,
        Self::Endpoint,
        Self::Location,
        Self::HealthcareService,
        Self::Practitioner,
        Self::PractitionerRole,
        Self::OrganizationAffiliation,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "Organization",
            Self::Endpoint => "Endpoint",
            Self::Location => "Location",
            Self::HealthcareService => "HealthcareService",
            Self::Practitioner => "Practitioner",
            Self::PractitionerRole => "PractitionerRole",
            Self::OrganizationAffiliation => "OrganizationAffiliation",
        }
    }
}

impl fmt::Display for DirectoryResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DirectoryResourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Organization" => Ok(Self::Organization),
            "Endpoint" => Ok(Self::Endpoint),
            "Location" => Ok(Self::Location),
            "HealthcareService" => Ok(Self::HealthcareService),
            "Practitioner" => Ok(Self::Practitioner),
            "PractitionerRole" => Ok(Self::PractitionerRole),
            "OrganizationAffiliation" => Ok(Self::OrganizationAffiliation),
            other => Err(CoreError::invalid_reference(
                other,
                "not a recognized mCSD resource type",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        for ty in DirectoryResourceType::ALL {
            let parsed = DirectoryResourceType::from_str(ty.as_str()).unwrap();
            assert_eq!(parsed, ty);
        }
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(DirectoryResourceType::from_str("Patient").is_err());
    }
}
