pub mod category;
pub mod product;
pub mod subcategory;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Visibility status shared by categories, subcategories and products.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[strum(ascii_case_insensitive)]
pub enum CatalogStatus {
    #[sea_orm(string_value = "Active")]
    Active,
    #[sea_orm(string_value = "Inactive")]
    Inactive,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(
            CatalogStatus::from_str("active").unwrap(),
            CatalogStatus::Active
        );
        assert_eq!(
            CatalogStatus::from_str("Inactive").unwrap(),
            CatalogStatus::Inactive
        );
        assert!(CatalogStatus::from_str("archived").is_err());
    }

    #[test]
    fn status_serializes_with_display_casing() {
        assert_eq!(CatalogStatus::Active.to_string(), "Active");
        assert_eq!(
            serde_json::to_value(CatalogStatus::Inactive).unwrap(),
            serde_json::json!("Inactive")
        );
    }
}
