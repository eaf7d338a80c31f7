use serde::{Deserialize, Serialize};

use super::booking::PackageSnapshot;

/// A vendor listing as supplied by the service catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceListing {
    pub id: String,
    pub vendor_id: String,
    pub company_name: String,
    pub category: String,
    pub availability: ServiceAvailability,
    pub packages: Vec<Package>,
    #[serde(default)]
    pub offerings: Vec<ServiceOffering>,
    pub contact: VendorContact,
}

impl ServiceListing {
    pub fn find_package(&self, name: &str) -> Option<&Package> {
        let name = name.trim();
        self.packages
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn is_bookable(&self) -> bool {
        self.availability == ServiceAvailability::Available
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceAvailability {
    Available,
    Unavailable,
}

impl ServiceAvailability {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAvailability::Available => "Available",
            ServiceAvailability::Unavailable => "Unavailable",
        }
    }

    /// Anything other than an explicit "Available" closes the listing.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("available") {
            ServiceAvailability::Available
        } else {
            ServiceAvailability::Unavailable
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Package {
    pub name: String,
    pub price: i64,
    #[serde(default)]
    pub features: Vec<String>,
}

impl Package {
    pub fn snapshot(&self) -> PackageSnapshot {
        PackageSnapshot {
            name: self.name.clone(),
            price: self.price,
            features: self.features.clone(),
        }
    }
}

/// Listings store offerings either as bare labels or as structured entries;
/// both shapes appear in the same array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ServiceOffering {
    Label(String),
    Detailed {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
}

impl ServiceOffering {
    pub fn name(&self) -> &str {
        match self {
            ServiceOffering::Label(name) => name,
            ServiceOffering::Detailed { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VendorContact {
    pub phone: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_offerings_parse() {
        let json = r#"["Drone shots", {"name": "Album", "description": "40 pages"}, {"name": "Reels"}]"#;
        let offerings: Vec<ServiceOffering> = serde_json::from_str(json).unwrap();
        assert_eq!(offerings.len(), 3);
        assert_eq!(offerings[0], ServiceOffering::Label("Drone shots".to_string()));
        assert_eq!(offerings[1].name(), "Album");
        assert!(matches!(
            &offerings[2],
            ServiceOffering::Detailed { description: None, .. }
        ));
    }

    #[test]
    fn test_availability_parse_is_strict() {
        assert_eq!(ServiceAvailability::parse("Available"), ServiceAvailability::Available);
        assert_eq!(ServiceAvailability::parse(" available "), ServiceAvailability::Available);
        assert_eq!(ServiceAvailability::parse("Booked"), ServiceAvailability::Unavailable);
        assert_eq!(ServiceAvailability::parse(""), ServiceAvailability::Unavailable);
    }
}
