use sqlx::PgPool;

use crate::errors::LoadResult;

/// Star schema DDL, applied in order. Every statement is idempotent.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    create table if not exists dim_date (
      date_key integer primary key,
      full_date date not null,
      day smallint not null,
      month smallint not null,
      quarter smallint not null,
      year smallint not null,
      weekday_flag boolean not null
    )
    "#,
    r#"
    create table if not exists dim_channel (
      channel_key integer primary key,
      channel_name text not null,
      fee_percent double precision not null
    )
    "#,
    r#"
    create table if not exists dim_customer (
      customer_key integer primary key,
      customer_id text not null,
      signup_date date not null,
      segment text not null,
      city text,
      state text,
      region text,
      updated_at timestamptz not null default now()
    )
    "#,
    r#"
    create table if not exists fact_transactions (
      transaction_id text primary key,
      date_key integer not null references dim_date (date_key),
      customer_key integer not null,
      channel_key integer not null references dim_channel (channel_key),
      amount double precision not null check (amount > 0),
      status text not null check (status in ('success', 'failed')),
      processing_time double precision not null check (processing_time > 0),
      processing_delay_bucket text not null
        check (processing_delay_bucket in ('fast', 'medium', 'slow')),
      revenue double precision not null,
      loaded_at timestamptz not null default now(),
      updated_at timestamptz
    )
    "#,
    "create index if not exists fact_transactions_date_key_idx on fact_transactions (date_key)",
    "create index if not exists fact_transactions_channel_key_idx on fact_transactions (channel_key)",
    "create index if not exists fact_transactions_customer_key_idx on fact_transactions (customer_key)",
];

/// Create the warehouse tables if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> LoadResult<()> {
    let mut tx = pool.begin().await?;
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}
