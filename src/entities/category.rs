use super::CatalogStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "categories")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub category_name: String,
    /// Public path of the image blob, e.g. `images/categories/7.txt`
    pub image: Option<String>,
    pub sequence: String,
    pub status: CatalogStatus,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// A category row merged with its image blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryView {
    #[schema(example = 7)]
    pub id: i32,
    #[schema(example = "Drinks")]
    pub category_name: String,
    #[schema(example = "images/categories/7.txt")]
    pub image: Option<String>,
    #[schema(example = "1")]
    pub sequence: String,
    pub status: CatalogStatus,
    /// Stored base64 text, `null` when no image file exists
    pub image_base64: Option<String>,
}

impl CategoryView {
    pub fn new(model: Model, image_base64: Option<String>) -> Self {
        Self {
            id: model.id,
            category_name: model.category_name,
            image: model.image,
            sequence: model.sequence,
            status: model.status,
            image_base64,
        }
    }
}
