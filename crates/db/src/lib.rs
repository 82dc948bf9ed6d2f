pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect_with_settings, DbPool};
pub use repositories::{
    ContactRepository, DirectoryRepository, RepositoryError, SqlContactRepository,
    SqlDirectoryRepository, SqlTenantRepository, TenantRepository,
};
