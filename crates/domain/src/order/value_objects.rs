//! Value objects for the order domain.

use serde::{Deserialize, Serialize};

/// Money amount represented in minor units to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in cents (e.g., 2999 = 29.99)
    cents: i64,
}

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    pub fn cents(&self) -> i64 {
        self.cents
    }

    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// How to reach the customer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl CustomerContact {
    /// Splits the full name into (first, last) the way the vendor expects it.
    ///
    /// A single-word name is used for both parts.
    pub fn split_name(&self) -> (String, String) {
        let name = self.name.trim();
        match name.split_once(char::is_whitespace) {
            Some((first, last)) => (first.to_string(), last.trim().to_string()),
            None => (name.to_string(), name.to_string()),
        }
    }
}

/// Physical delivery address.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    /// State or province, where the destination uses one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
}

impl ShippingAddress {
    /// Names of the required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.line1.trim().is_empty() {
            missing.push("line1");
        }
        if self.city.trim().is_empty() {
            missing.push("city");
        }
        if self.postal_code.trim().is_empty() {
            missing.push("postal_code");
        }
        if self.country.trim().is_empty() {
            missing.push("country");
        }
        missing
    }
}

/// Identity and status of an order as known by the print vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorOrderRef {
    pub vendor_order_id: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(2999).to_string(), "29.99");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-150).to_string(), "-1.50");
        assert!(Money::from_cents(1).is_positive());
        assert!(!Money::zero().is_positive());
    }

    #[test]
    fn test_split_name() {
        let contact = CustomerContact {
            name: "Ada  Lovelace King".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
        };
        assert_eq!(
            contact.split_name(),
            ("Ada".to_string(), "Lovelace King".to_string())
        );

        let single = CustomerContact {
            name: "Cher".to_string(),
            ..Default::default()
        };
        assert_eq!(single.split_name(), ("Cher".to_string(), "Cher".to_string()));
    }

    #[test]
    fn test_missing_address_fields() {
        let address = ShippingAddress {
            line1: "1 Main St".to_string(),
            city: " ".to_string(),
            country: "US".to_string(),
            ..Default::default()
        };
        assert_eq!(address.missing_fields(), vec!["city", "postal_code"]);
    }
}
