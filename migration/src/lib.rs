pub use sea_orm_migration::prelude::*;

mod m20250901_000001_create_booking_core;
mod m20250901_000002_seed_system_wallets;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250901_000001_create_booking_core::Migration),
            Box::new(m20250901_000002_seed_system_wallets::Migration),
        ]
    }
}
