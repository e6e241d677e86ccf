use super::CatalogStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The `products` table. Category and subcategory are loose name references.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub product_name: String,
    pub category_name: String,
    pub subcategory_name: String,
    pub image: Option<String>,
    pub status: CatalogStatus,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub id: i32,
    #[schema(example = "Orange juice 1L")]
    pub product_name: String,
    #[schema(example = "Drinks")]
    pub category_name: String,
    #[schema(example = "Juices")]
    pub subcategory_name: String,
    pub image: Option<String>,
    pub status: CatalogStatus,
    pub image_base64: Option<String>,
}

impl ProductView {
    pub fn new(model: Model, image_base64: Option<String>) -> Self {
        Self {
            id: model.id,
            product_name: model.product_name,
            category_name: model.category_name,
            subcategory_name: model.subcategory_name,
            image: model.image,
            status: model.status,
            image_base64,
        }
    }
}
