use sqlx::{PgConnection, Postgres, QueryBuilder};

use payflow_core::{ChannelDim, CustomerDim, DateDim, TransactionFact};

use crate::adapter::MergeStats;
use crate::errors::LoadResult;

/// Rows per staging insert; keeps the widest table well under the
/// Postgres bind parameter limit.
pub const STAGING_CHUNK_ROWS: usize = 1_000;

pub const STAGE_DATES: &str = r#"
create temp table if not exists staging_dim_date (
  date_key integer not null,
  full_date date not null,
  day smallint not null,
  month smallint not null,
  quarter smallint not null,
  year smallint not null,
  weekday_flag boolean not null
) on commit drop
"#;

pub const MERGE_DATES: &str = r#"
insert into dim_date (date_key, full_date, day, month, quarter, year, weekday_flag)
select date_key, full_date, day, month, quarter, year, weekday_flag
from staging_dim_date
on conflict (date_key) do update set
  full_date = excluded.full_date,
  day = excluded.day,
  month = excluded.month,
  quarter = excluded.quarter,
  year = excluded.year,
  weekday_flag = excluded.weekday_flag
returning (xmax = 0) as inserted
"#;

pub const STAGE_CHANNELS: &str = r#"
create temp table if not exists staging_dim_channel (
  channel_key integer not null,
  channel_name text not null,
  fee_percent double precision not null
) on commit drop
"#;

pub const MERGE_CHANNELS: &str = r#"
insert into dim_channel (channel_key, channel_name, fee_percent)
select channel_key, channel_name, fee_percent
from staging_dim_channel
on conflict (channel_key) do update set
  channel_name = excluded.channel_name,
  fee_percent = excluded.fee_percent
where dim_channel.channel_name is distinct from excluded.channel_name
   or dim_channel.fee_percent is distinct from excluded.fee_percent
returning (xmax = 0) as inserted
"#;

pub const STAGE_CUSTOMERS: &str = r#"
create temp table if not exists staging_dim_customer (
  customer_key integer not null,
  customer_id text not null,
  signup_date date not null,
  segment text not null,
  city text,
  state text,
  region text
) on commit drop
"#;

pub const MERGE_CUSTOMERS: &str = r#"
insert into dim_customer (customer_key, customer_id, signup_date, segment, city, state, region)
select customer_key, customer_id, signup_date, segment, city, state, region
from staging_dim_customer
on conflict (customer_key) do update set
  customer_id = excluded.customer_id,
  signup_date = excluded.signup_date,
  segment = excluded.segment,
  city = excluded.city,
  state = excluded.state,
  region = excluded.region,
  updated_at = now()
where dim_customer.customer_id is distinct from excluded.customer_id
   or dim_customer.signup_date is distinct from excluded.signup_date
   or dim_customer.segment is distinct from excluded.segment
   or dim_customer.city is distinct from excluded.city
   or dim_customer.state is distinct from excluded.state
   or dim_customer.region is distinct from excluded.region
returning (xmax = 0) as inserted
"#;

pub const STAGE_FACTS: &str = r#"
create temp table if not exists staging_fact_transactions (
  transaction_id text not null,
  date_key integer not null,
  customer_key integer not null,
  channel_key integer not null,
  amount double precision not null,
  status text not null,
  processing_time double precision not null,
  processing_delay_bucket text not null,
  revenue double precision not null
) on commit drop
"#;

pub const MERGE_FACTS: &str = r#"
insert into fact_transactions (
  transaction_id, date_key, customer_key, channel_key, amount, status,
  processing_time, processing_delay_bucket, revenue
)
select transaction_id, date_key, customer_key, channel_key, amount, status,
  processing_time, processing_delay_bucket, revenue
from staging_fact_transactions
on conflict (transaction_id) do update set
  amount = excluded.amount,
  status = excluded.status,
  processing_time = excluded.processing_time,
  processing_delay_bucket = excluded.processing_delay_bucket,
  revenue = excluded.revenue,
  updated_at = now()
where fact_transactions.amount is distinct from excluded.amount
   or fact_transactions.status is distinct from excluded.status
   or fact_transactions.processing_time is distinct from excluded.processing_time
   or fact_transactions.processing_delay_bucket is distinct from excluded.processing_delay_bucket
   or fact_transactions.revenue is distinct from excluded.revenue
returning (xmax = 0) as inserted
"#;

async fn prepare_staging(conn: &mut PgConnection, ddl: &str, table: &str) -> LoadResult<()> {
    sqlx::query(ddl).execute(&mut *conn).await?;
    sqlx::query(&format!("delete from {table}"))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn run_merge(conn: &mut PgConnection, merge: &str, staged: usize) -> LoadResult<MergeStats> {
    let written = sqlx::query_scalar::<_, bool>(merge)
        .fetch_all(&mut *conn)
        .await?;
    Ok(MergeStats::from_written(staged, &written))
}

pub async fn merge_dates(conn: &mut PgConnection, rows: &[DateDim]) -> LoadResult<MergeStats> {
    prepare_staging(conn, STAGE_DATES, "staging_dim_date").await?;
    for chunk in rows.chunks(STAGING_CHUNK_ROWS) {
        let mut builder = QueryBuilder::<Postgres>::new(
            "insert into staging_dim_date (date_key, full_date, day, month, quarter, year, weekday_flag) ",
        );
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(row.date_key)
                .push_bind(row.full_date)
                .push_bind(row.day)
                .push_bind(row.month)
                .push_bind(row.quarter)
                .push_bind(row.year)
                .push_bind(row.weekday_flag);
        });
        builder.build().execute(&mut *conn).await?;
    }
    run_merge(conn, MERGE_DATES, rows.len()).await
}

pub async fn merge_channels(
    conn: &mut PgConnection,
    rows: &[ChannelDim],
) -> LoadResult<MergeStats> {
    prepare_staging(conn, STAGE_CHANNELS, "staging_dim_channel").await?;
    for chunk in rows.chunks(STAGING_CHUNK_ROWS) {
        let mut builder = QueryBuilder::<Postgres>::new(
            "insert into staging_dim_channel (channel_key, channel_name, fee_percent) ",
        );
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(row.channel_key)
                .push_bind(row.channel_name.clone())
                .push_bind(row.fee_percent);
        });
        builder.build().execute(&mut *conn).await?;
    }
    run_merge(conn, MERGE_CHANNELS, rows.len()).await
}

pub async fn merge_customers(
    conn: &mut PgConnection,
    rows: &[CustomerDim],
) -> LoadResult<MergeStats> {
    prepare_staging(conn, STAGE_CUSTOMERS, "staging_dim_customer").await?;
    for chunk in rows.chunks(STAGING_CHUNK_ROWS) {
        let mut builder = QueryBuilder::<Postgres>::new(
            "insert into staging_dim_customer (customer_key, customer_id, signup_date, segment, city, state, region) ",
        );
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(row.customer_key)
                .push_bind(row.customer_id.clone())
                .push_bind(row.signup_date)
                .push_bind(row.segment.clone())
                .push_bind(row.city.clone())
                .push_bind(row.state.clone())
                .push_bind(row.region.clone());
        });
        builder.build().execute(&mut *conn).await?;
    }
    run_merge(conn, MERGE_CUSTOMERS, rows.len()).await
}

pub async fn merge_facts(
    conn: &mut PgConnection,
    rows: &[TransactionFact],
) -> LoadResult<MergeStats> {
    prepare_staging(conn, STAGE_FACTS, "staging_fact_transactions").await?;
    for chunk in rows.chunks(STAGING_CHUNK_ROWS) {
        let mut builder = QueryBuilder::<Postgres>::new(
            "insert into staging_fact_transactions (transaction_id, date_key, customer_key, channel_key, amount, status, processing_time, processing_delay_bucket, revenue) ",
        );
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(row.transaction_id.clone())
                .push_bind(row.date_key)
                .push_bind(row.customer_key)
                .push_bind(row.channel_key)
                .push_bind(row.amount)
                .push_bind(row.status.as_str())
                .push_bind(row.processing_time)
                .push_bind(row.processing_delay_bucket.as_str())
                .push_bind(row.revenue);
        });
        builder.build().execute(&mut *conn).await?;
    }
    run_merge(conn, MERGE_FACTS, rows.len()).await
}
