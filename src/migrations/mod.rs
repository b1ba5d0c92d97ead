pub use sea_orm_migration::prelude::*;

mod m20260824_000001_create_servers;
mod m20260824_000002_create_update_history;
mod m20260824_000003_create_alerts;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260824_000001_create_servers::Migration),
            Box::new(m20260824_000002_create_update_history::Migration),
            Box::new(m20260824_000003_create_alerts::Migration),
        ]
    }
}
