use super::CatalogStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subcategories")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub subcategory_name: String,
    /// Name of the parent category; matched by string, not enforced.
    pub category_name: String,
    pub image: Option<String>,
    pub sequence: String,
    pub status: CatalogStatus,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubcategoryView {
    pub id: i32,
    #[schema(example = "Juices")]
    pub subcategory_name: String,
    #[schema(example = "Drinks")]
    pub category_name: String,
    pub image: Option<String>,
    pub sequence: String,
    pub status: CatalogStatus,
    pub image_base64: Option<String>,
}

impl SubcategoryView {
    pub fn new(model: Model, image_base64: Option<String>) -> Self {
        Self {
            id: model.id,
            subcategory_name: model.subcategory_name,
            category_name: model.category_name,
            image: model.image,
            sequence: model.sequence,
            status: model.status,
            image_base64,
        }
    }
}
