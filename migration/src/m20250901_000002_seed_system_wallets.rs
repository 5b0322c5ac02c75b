use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Wallets {
    Table,
    Kind,
    Balance,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

/// 系统钱包：clearing 接收钱包支付，escrow 托管服务方净额，admin 收取平台佣金。
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let insert = Query::insert()
            .into_table(Wallets::Table)
            .columns([Wallets::Kind, Wallets::Balance, Wallets::UpdatedAt])
            .values_panic(["clearing".into(), 0i64.into(), Expr::current_timestamp().into()])
            .values_panic(["escrow".into(), 0i64.into(), Expr::current_timestamp().into()])
            .values_panic(["admin".into(), 0i64.into(), Expr::current_timestamp().into()])
            .to_owned();
        manager.exec_stmt(insert).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let delete = Query::delete()
            .from_table(Wallets::Table)
            .and_where(Expr::col(Wallets::Kind).is_in(["clearing", "escrow", "admin"]))
            .to_owned();
        manager.exec_stmt(delete).await
    }
}
