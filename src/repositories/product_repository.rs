use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set, TransactionTrait,
};
use tracing::{info, instrument, warn};

use super::Repository;
use crate::entities::product::{self, ProductView};
use crate::entities::CatalogStatus;
use crate::errors::ServiceError;
use crate::image_store::ImageStore;

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub product_name: String,
    pub category_name: String,
    pub subcategory_name: String,
    pub image_base64: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProductChanges {
    pub product_name: String,
    pub category_name: String,
    pub subcategory_name: String,
    pub status: CatalogStatus,
    pub image_base64: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProductRepository {
    db: Arc<DatabaseConnection>,
    images: ImageStore,
}

impl Repository for ProductRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl ProductRepository {
    pub fn new(db: Arc<DatabaseConnection>, images: ImageStore) -> Self {
        Self { db, images }
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    #[instrument(skip(self, input), fields(product_name = %input.product_name))]
    pub async fn create(&self, input: NewProduct) -> Result<product::Model, ServiceError> {
        let txn = self.get_db().begin().await?;

        let inserted = product::ActiveModel {
            product_name: Set(input.product_name),
            category_name: Set(input.category_name),
            subcategory_name: Set(input.subcategory_name),
            image: Set(None),
            status: Set(CatalogStatus::Active),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let id = inserted.id;
        let (model, staged) = match input.image_base64.as_deref() {
            Some(b64) => {
                let staged = self.images.stage(id, b64).await?;
                let mut active: product::ActiveModel = inserted.into();
                active.image = Set(Some(self.images.public_path(id)));
                (active.update(&txn).await?, Some(staged))
            }
            None => (inserted, None),
        };

        txn.commit().await?;
        if let Some(staged) = staged {
            staged.publish().await?;
        }

        info!(id, "Product created");
        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn get_all(&self) -> Result<Vec<ProductView>, ServiceError> {
        let rows = product::Entity::find()
            .order_by_asc(product::Column::Id)
            .all(self.get_db())
            .await?;

        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            views.push(self.attach_image(row).await?);
        }
        Ok(views)
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: i32) -> Result<Option<ProductView>, ServiceError> {
        match product::Entity::find_by_id(id).one(self.get_db()).await? {
            Some(row) => Ok(Some(self.attach_image(row).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: i32,
        changes: ProductChanges,
    ) -> Result<Option<product::Model>, ServiceError> {
        let txn = self.get_db().begin().await?;

        let Some(existing) = product::Entity::find_by_id(id).one(&txn).await? else {
            return Ok(None);
        };

        let mut active: product::ActiveModel = existing.into();
        active.product_name = Set(changes.product_name);
        active.category_name = Set(changes.category_name);
        active.subcategory_name = Set(changes.subcategory_name);
        active.status = Set(changes.status);

        let staged = match changes.image_base64.as_deref() {
            Some(b64) => {
                let staged = self.images.stage(id, b64).await?;
                active.image = Set(Some(self.images.public_path(id)));
                Some(staged)
            }
            None => None,
        };

        let model = active.update(&txn).await?;
        txn.commit().await?;
        if let Some(staged) = staged {
            staged.publish().await?;
        }

        info!(id, "Product updated");
        Ok(Some(model))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<u64, ServiceError> {
        let result = product::Entity::delete_by_id(id)
            .exec(self.get_db())
            .await?;

        if result.rows_affected > 0 {
            if let Err(e) = self.images.remove(id).await {
                warn!(id, error = %e, "Product row deleted but image file was left behind");
            }
            info!(id, "Product deleted");
        }
        Ok(result.rows_affected)
    }

    async fn attach_image(&self, row: product::Model) -> Result<ProductView, ServiceError> {
        let image_base64 = match row.image {
            Some(_) => self.images.read(row.id).await?,
            None => None,
        };
        Ok(ProductView::new(row, image_base64))
    }
}
