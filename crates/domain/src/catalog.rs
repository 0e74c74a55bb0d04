//! Static vendor catalog and the vendor product cache entry type.
//!
//! The catalog maps a domain product (type, size, destination region) to the
//! vendor's blueprint, print provider and variant ids. It is configuration,
//! not discovered at runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// What the customer bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    /// Download only; never sent to the print vendor.
    Digital,
    ArtPrint,
    FramedCanvas,
}

impl ProductType {
    /// Returns true if the product has to be produced by the print vendor.
    pub fn requires_physical_fulfillment(&self) -> bool {
        !matches!(self, ProductType::Digital)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Digital => "digital",
            ProductType::ArtPrint => "art_print",
            ProductType::FramedCanvas => "framed_canvas",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProductType::Digital => "Digital Portrait",
            ProductType::ArtPrint => "Fine Art Print",
            ProductType::FramedCanvas => "Framed Canvas",
        }
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProductType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "digital" => Ok(ProductType::Digital),
            "art_print" => Ok(ProductType::ArtPrint),
            "framed_canvas" => Ok(ProductType::FramedCanvas),
            other => Err(DomainError::UnknownValue {
                kind: "product type",
                value: other.to_string(),
            }),
        }
    }
}

/// Vendor fulfillment region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    NorthAmerica,
    Europe,
    Global,
}

/// ISO 3166-1 alpha-2 destinations served by the European print provider.
const EUROPEAN_COUNTRIES: &[&str] = &[
    "DE", "FR", "IT", "ES", "NL", "BE", "AT", "PT", "IE", "FI", "SE", "DK", "NO", "PL", "CZ", "HU",
    "SK", "SI", "HR", "BG", "RO", "LT", "LV", "EE", "MT", "CY", "LU", "GR",
];

impl Region {
    /// Picks the region whose provider ships `product_type` to `country_code`.
    ///
    /// Framed canvas has a single global provider; art prints ship from Europe
    /// for European destinations and from North America everywhere else.
    pub fn for_destination(product_type: ProductType, country_code: &str) -> Region {
        match product_type {
            ProductType::FramedCanvas => Region::Global,
            _ => {
                let code = country_code.trim().to_ascii_uppercase();
                if EUROPEAN_COUNTRIES.contains(&code.as_str()) {
                    Region::Europe
                } else {
                    Region::NorthAmerica
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::NorthAmerica => "north_america",
            Region::Europe => "europe",
            Region::Global => "global",
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Region {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "north_america" => Ok(Region::NorthAmerica),
            "europe" => Ok(Region::Europe),
            "global" => Ok(Region::Global),
            other => Err(DomainError::UnknownValue {
                kind: "region",
                value: other.to_string(),
            }),
        }
    }
}

/// One size offered by a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogVariant {
    pub size: &'static str,
    pub variant_id: u64,
    pub price_cents: i64,
}

/// Vendor blueprint and provider for one (product type, region) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub product_type: ProductType,
    pub region: Region,
    pub blueprint_id: u64,
    pub print_provider_id: u64,
    pub variants: &'static [CatalogVariant],
}

/// A fully resolved catalog row for one size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedVariant {
    pub blueprint_id: u64,
    pub print_provider_id: u64,
    pub variant_id: u64,
    pub price_cents: i64,
}

static CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        product_type: ProductType::ArtPrint,
        region: Region::NorthAmerica,
        blueprint_id: 1191,
        print_provider_id: 1,
        variants: &[
            CatalogVariant { size: "12x18", variant_id: 92396, price_cents: 2999 },
            CatalogVariant { size: "16x20", variant_id: 92400, price_cents: 3999 },
            CatalogVariant { size: "18x24", variant_id: 92402, price_cents: 4999 },
        ],
    },
    CatalogEntry {
        product_type: ProductType::ArtPrint,
        region: Region::Europe,
        blueprint_id: 494,
        print_provider_id: 1,
        variants: &[
            CatalogVariant { size: "12x18", variant_id: 65216, price_cents: 3499 },
            CatalogVariant { size: "16x20", variant_id: 65220, price_cents: 4499 },
            CatalogVariant { size: "18x24", variant_id: 65228, price_cents: 5499 },
        ],
    },
    CatalogEntry {
        product_type: ProductType::FramedCanvas,
        region: Region::Global,
        blueprint_id: 944,
        print_provider_id: 1,
        variants: &[
            CatalogVariant { size: "12x16", variant_id: 111829, price_cents: 7999 },
            CatalogVariant { size: "16x20", variant_id: 111837, price_cents: 9999 },
            CatalogVariant { size: "20x24", variant_id: 111845, price_cents: 12999 },
        ],
    },
];

impl CatalogEntry {
    /// Returns the catalog entry for a product type in a region.
    pub fn find(product_type: ProductType, region: Region) -> Option<&'static CatalogEntry> {
        CATALOG
            .iter()
            .find(|entry| entry.product_type == product_type && entry.region == region)
    }

    /// Sizes sold for a product type in any region.
    pub fn sizes_for(product_type: ProductType) -> Vec<&'static str> {
        let mut sizes: Vec<&'static str> = CATALOG
            .iter()
            .filter(|entry| entry.product_type == product_type)
            .flat_map(|entry| entry.variants.iter().map(|v| v.size))
            .collect();
        sizes.sort_unstable();
        sizes.dedup();
        sizes
    }

    pub fn variant(&self, size: &str) -> Option<&'static CatalogVariant> {
        self.variants.iter().find(|v| v.size == size)
    }
}

/// Cache key for a vendor-side product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VendorProductKey {
    pub product_type: ProductType,
    pub size: String,
    pub region: Region,
}

impl VendorProductKey {
    pub fn new(product_type: ProductType, size: impl Into<String>, region: Region) -> Self {
        Self {
            product_type,
            size: size.into(),
            region,
        }
    }

    /// Resolves the key against the static catalog.
    pub fn resolve(&self) -> Option<ResolvedVariant> {
        let entry = CatalogEntry::find(self.product_type, self.region)?;
        let variant = entry.variant(&self.size)?;
        Some(ResolvedVariant {
            blueprint_id: entry.blueprint_id,
            print_provider_id: entry.print_provider_id,
            variant_id: variant.variant_id,
            price_cents: variant.price_cents,
        })
    }

    /// Stable string form, used as a deduplication key.
    pub fn cache_key(&self) -> String {
        format!("{}:{}:{}", self.product_type, self.size, self.region)
    }
}

impl std::fmt::Display for VendorProductKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// A vendor-side product created once per key and reused for every order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorProduct {
    pub key: VendorProductKey,
    pub vendor_product_id: String,
    pub vendor_variant_id: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_always_resolves_global() {
        assert_eq!(
            Region::for_destination(ProductType::FramedCanvas, "DE"),
            Region::Global
        );
        assert_eq!(
            Region::for_destination(ProductType::FramedCanvas, "US"),
            Region::Global
        );
    }

    #[test]
    fn art_print_region_follows_destination() {
        assert_eq!(
            Region::for_destination(ProductType::ArtPrint, "fr"),
            Region::Europe
        );
        assert_eq!(
            Region::for_destination(ProductType::ArtPrint, "CA"),
            Region::NorthAmerica
        );
        assert_eq!(
            Region::for_destination(ProductType::ArtPrint, "AU"),
            Region::NorthAmerica
        );
    }

    #[test]
    fn resolves_known_variant() {
        let key = VendorProductKey::new(ProductType::ArtPrint, "16x20", Region::NorthAmerica);
        let resolved = key.resolve().unwrap();
        assert_eq!(resolved.blueprint_id, 1191);
        assert_eq!(resolved.print_provider_id, 1);
        assert_eq!(resolved.variant_id, 92400);
        assert_eq!(resolved.price_cents, 3999);
    }

    #[test]
    fn unknown_size_or_region_does_not_resolve() {
        assert!(
            VendorProductKey::new(ProductType::ArtPrint, "12x16", Region::NorthAmerica)
                .resolve()
                .is_none()
        );
        assert!(
            VendorProductKey::new(ProductType::FramedCanvas, "12x16", Region::Europe)
                .resolve()
                .is_none()
        );
        assert!(
            VendorProductKey::new(ProductType::Digital, "12x18", Region::Global)
                .resolve()
                .is_none()
        );
    }

    #[test]
    fn sizes_for_product_type() {
        assert_eq!(
            CatalogEntry::sizes_for(ProductType::FramedCanvas),
            vec!["12x16", "16x20", "20x24"]
        );
        assert!(CatalogEntry::sizes_for(ProductType::Digital).is_empty());
    }

    #[test]
    fn cache_key_is_stable() {
        let key = VendorProductKey::new(ProductType::FramedCanvas, "20x24", Region::Global);
        assert_eq!(key.cache_key(), "framed_canvas:20x24:global");
    }

    #[test]
    fn product_type_roundtrips_through_str() {
        for pt in [
            ProductType::Digital,
            ProductType::ArtPrint,
            ProductType::FramedCanvas,
        ] {
            assert_eq!(pt.as_str().parse::<ProductType>().unwrap(), pt);
        }
        assert!(!ProductType::Digital.requires_physical_fulfillment());
        assert!(ProductType::ArtPrint.requires_physical_fulfillment());
    }
}
