use sea_orm::DatabaseConnection;

pub mod category_repository;
pub mod product_repository;
pub mod subcategory_repository;
pub mod user_repository;

pub use category_repository::{CategoryChanges, CategoryRepository, NewCategory};
pub use product_repository::{NewProduct, ProductChanges, ProductRepository};
pub use subcategory_repository::{NewSubcategory, SubcategoryChanges, SubcategoryRepository};
pub use user_repository::UserRepository;

/// Repository trait for common database operations
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use crate::image_store::ImageStore;
    use sea_orm::DatabaseConnection;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Fresh in-memory database with the full schema plus a throwaway image directory.
    pub async fn setup() -> (Arc<DatabaseConnection>, ImageStore, TempDir) {
        let pool = establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("sqlite pool");
        run_migrations(&pool).await.expect("migrations");

        let dir = TempDir::new().expect("temp dir");
        let images = ImageStore::new(dir.path().join("images"))
            .await
            .expect("image store");
        (Arc::new(pool), images, dir)
    }
}
