use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_users_table::Migration),
            Box::new(m20240101_000002_create_catalog_tables::Migration),
            Box::new(m20240101_000003_create_password_reset_tokens_table::Migration),
        ]
    }
}

mod m20240101_000001_create_users_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Users::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Users::Email)
                                .string_len(255)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Users::PasswordHash).text().not_null())
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Users::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Email,
        PasswordHash,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Categories::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Categories::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Categories::CategoryName)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Categories::Image).string_len(512).null())
                        .col(ColumnDef::new(Categories::Sequence).string_len(64).not_null())
                        .col(
                            ColumnDef::new(Categories::Status)
                                .string_len(16)
                                .not_null()
                                .default("Active"),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Subcategories::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Subcategories::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Subcategories::SubcategoryName)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Subcategories::CategoryName)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Subcategories::Image).string_len(512).null())
                        .col(
                            ColumnDef::new(Subcategories::Sequence)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Subcategories::Status)
                                .string_len(16)
                                .not_null()
                                .default("Active"),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Products::ProductName)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::CategoryName)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::SubcategoryName)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Products::Image).string_len(512).null())
                        .col(
                            ColumnDef::new(Products::Status)
                                .string_len(16)
                                .not_null()
                                .default("Active"),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Subcategories::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Categories::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Categories {
        Table,
        Id,
        CategoryName,
        Image,
        Sequence,
        Status,
    }

    #[derive(DeriveIden)]
    enum Subcategories {
        Table,
        Id,
        SubcategoryName,
        CategoryName,
        Image,
        Sequence,
        Status,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        ProductName,
        CategoryName,
        SubcategoryName,
        Image,
        Status,
    }
}

mod m20240101_000003_create_password_reset_tokens_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_password_reset_tokens_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PasswordResetTokens::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PasswordResetTokens::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PasswordResetTokens::Email)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PasswordResetTokens::TokenHash)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(PasswordResetTokens::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PasswordResetTokens::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PasswordResetTokens::UsedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_password_reset_tokens_email")
                        .table(PasswordResetTokens::Table)
                        .col(PasswordResetTokens::Email)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PasswordResetTokens::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PasswordResetTokens {
        Table,
        Id,
        Email,
        TokenHash,
        ExpiresAt,
        CreatedAt,
        UsedAt,
    }
}
