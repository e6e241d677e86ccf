use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set, TransactionTrait,
};
use tracing::{info, instrument, warn};

use super::Repository;
use crate::entities::category::{self, CategoryView};
use crate::entities::CatalogStatus;
use crate::errors::ServiceError;
use crate::image_store::ImageStore;

/// Fields accepted when creating a category
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub category_name: String,
    pub sequence: String,
    pub image_base64: Option<String>,
}

/// Full replacement of a category's scalar columns plus an optional new image
#[derive(Debug, Clone)]
pub struct CategoryChanges {
    pub category_name: String,
    pub sequence: String,
    pub status: CatalogStatus,
    pub image_base64: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CategoryRepository {
    db: Arc<DatabaseConnection>,
    images: ImageStore,
}

impl Repository for CategoryRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl CategoryRepository {
    pub fn new(db: Arc<DatabaseConnection>, images: ImageStore) -> Self {
        Self { db, images }
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    /// Inserts an `Active` category and stores its image under the new row id.
    #[instrument(skip(self, input), fields(category_name = %input.category_name))]
    pub async fn create(&self, input: NewCategory) -> Result<category::Model, ServiceError> {
        let txn = self.get_db().begin().await?;

        let inserted = category::ActiveModel {
            category_name: Set(input.category_name),
            image: Set(None),
            sequence: Set(input.sequence),
            status: Set(CatalogStatus::Active),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let id = inserted.id;
        let (model, staged) = match input.image_base64.as_deref() {
            Some(b64) => {
                let staged = self.images.stage(id, b64).await?;
                let mut active: category::ActiveModel = inserted.into();
                active.image = Set(Some(self.images.public_path(id)));
                (active.update(&txn).await?, Some(staged))
            }
            None => (inserted, None),
        };

        txn.commit().await?;
        if let Some(staged) = staged {
            staged.publish().await?;
        }

        info!(id, "Category created");
        Ok(model)
    }

    /// Every category in id order, each with its image blob attached.
    #[instrument(skip(self))]
    pub async fn get_all(&self) -> Result<Vec<CategoryView>, ServiceError> {
        let rows = category::Entity::find()
            .order_by_asc(category::Column::Id)
            .all(self.get_db())
            .await?;

        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            views.push(self.attach_image(row).await?);
        }
        Ok(views)
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: i32) -> Result<Option<CategoryView>, ServiceError> {
        match category::Entity::find_by_id(id).one(self.get_db()).await? {
            Some(row) => Ok(Some(self.attach_image(row).await?)),
            None => Ok(None),
        }
    }

    /// Rewrites the scalar columns. Without a new image the stored one is kept.
    /// Returns `None` when no category has `id`.
    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: i32,
        changes: CategoryChanges,
    ) -> Result<Option<category::Model>, ServiceError> {
        let txn = self.get_db().begin().await?;

        let Some(existing) = category::Entity::find_by_id(id).one(&txn).await? else {
            return Ok(None);
        };

        let mut active: category::ActiveModel = existing.into();
        active.category_name = Set(changes.category_name);
        active.sequence = Set(changes.sequence);
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

        info!(id, "Category updated");
        Ok(Some(model))
    }

    /// Deletes the row, then the image file. Returns the number of rows removed.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<u64, ServiceError> {
        let result = category::Entity::delete_by_id(id)
            .exec(self.get_db())
            .await?;

        if result.rows_affected > 0 {
            if let Err(e) = self.images.remove(id).await {
                warn!(id, error = %e, "Category row deleted but image file was left behind");
            }
            info!(id, "Category deleted");
        }
        Ok(result.rows_affected)
    }

    async fn attach_image(&self, row: category::Model) -> Result<CategoryView, ServiceError> {
        let image_base64 = match row.image {
            Some(_) => self.images.read(row.id).await?,
            None => None,
        };
        Ok(CategoryView::new(row, image_base64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::test_support::setup;

    fn drinks(image: Option<&str>) -> NewCategory {
        NewCategory {
            category_name: "Drinks".to_string(),
            sequence: "1".to_string(),
            image_base64: image.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn create_assigns_store_id_and_image_path() {
        let (db, images, _dir) = setup().await;
        let repo = CategoryRepository::new(db, images);

        let created = repo.create(drinks(Some("aGVsbG8="))).await.unwrap();

        assert_eq!(created.status, CatalogStatus::Active);
        assert_eq!(created.image, Some(repo.images().public_path(created.id)));

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].image_base64.as_deref(), Some("aGVsbG8="));
    }

    #[tokio::test]
    async fn create_without_image_leaves_columns_empty() {
        let (db, images, _dir) = setup().await;
        let repo = CategoryRepository::new(db, images);

        let created = repo.create(drinks(None)).await.unwrap();
        let view = repo.find_by_id(created.id).await.unwrap().unwrap();

        assert_eq!(view.image, None);
        assert_eq!(view.image_base64, None);
    }

    #[tokio::test]
    async fn update_without_image_keeps_previous_blob() {
        let (db, images, _dir) = setup().await;
        let repo = CategoryRepository::new(db, images);
        let created = repo.create(drinks(Some("b3JpZ2luYWw="))).await.unwrap();

        let updated = repo
            .update(
                created.id,
                CategoryChanges {
                    category_name: "Beverages".to_string(),
                    sequence: "2".to_string(),
                    status: CatalogStatus::Inactive,
                    image_base64: None,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.category_name, "Beverages");
        assert_eq!(updated.image, created.image);

        let view = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(view.status, CatalogStatus::Inactive);
        assert_eq!(view.image_base64.as_deref(), Some("b3JpZ2luYWw="));
    }

    #[tokio::test]
    async fn update_with_image_replaces_blob() {
        let (db, images, _dir) = setup().await;
        let repo = CategoryRepository::new(db, images);
        let created = repo.create(drinks(Some("b2xk"))).await.unwrap();

        repo.update(
            created.id,
            CategoryChanges {
                category_name: "Drinks".to_string(),
                sequence: "1".to_string(),
                status: CatalogStatus::Active,
                image_base64: Some("bmV3".to_string()),
            },
        )
        .await
        .unwrap()
        .unwrap();

        let view = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(view.image_base64.as_deref(), Some("bmV3"));
    }

    #[tokio::test]
    async fn update_unknown_id_returns_none() {
        let (db, images, _dir) = setup().await;
        let repo = CategoryRepository::new(db, images);

        let result = repo
            .update(
                999,
                CategoryChanges {
                    category_name: "Ghost".to_string(),
                    sequence: "0".to_string(),
                    status: CatalogStatus::Active,
                    image_base64: Some("Z2hvc3Q=".to_string()),
                },
            )
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(repo.images().read(999).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_row_and_file() {
        let (db, images, _dir) = setup().await;
        let repo = CategoryRepository::new(db, images);
        let created = repo.create(drinks(Some("Ynll"))).await.unwrap();

        assert_eq!(repo.delete(created.id).await.unwrap(), 1);
        assert!(repo.find_by_id(created.id).await.unwrap().is_none());
        assert_eq!(repo.images().read(created.id).await.unwrap(), None);

        assert_eq!(repo.delete(created.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_image_file_reads_as_null() {
        let (db, images, _dir) = setup().await;
        let repo = CategoryRepository::new(db, images);
        let created = repo.create(drinks(Some("Z29uZQ=="))).await.unwrap();

        repo.images().remove(created.id).await.unwrap();

        let view = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert!(view.image.is_some());
        assert_eq!(view.image_base64, None);
    }
}
