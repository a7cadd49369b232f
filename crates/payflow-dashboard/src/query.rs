use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{Postgres, QueryBuilder};

use payflow_core::date_key;

use crate::errors::{DashboardError, DashboardResult};

/// Optional equality filters. Customer filters exclude facts whose customer
/// has no dimension row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardFilters {
    pub channel: Option<String>,
    pub segment: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub region: Option<String>,
}

/// Filterable attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Channel,
    Segment,
    City,
    State,
    Region,
}

impl FilterField {
    pub fn name(&self) -> &'static str {
        match self {
            FilterField::Channel => "channel",
            FilterField::Segment => "segment",
            FilterField::City => "city",
            FilterField::State => "state",
            FilterField::Region => "region",
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            FilterField::Channel => "c.channel_name",
            FilterField::Segment => "cu.segment",
            FilterField::City => "cu.city",
            FilterField::State => "cu.state",
            FilterField::Region => "cu.region",
        }
    }
}

impl DashboardFilters {
    /// Active filters in a fixed order.
    pub fn active(&self) -> Vec<(FilterField, &str)> {
        [
            (FilterField::Channel, &self.channel),
            (FilterField::Segment, &self.segment),
            (FilterField::City, &self.city),
            (FilterField::State, &self.state),
            (FilterField::Region, &self.region),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.as_deref().map(|value| (field, value)))
        .collect()
    }
}

/// Inclusive date range plus filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub filters: DashboardFilters,
}

impl DashboardQuery {
    pub fn new(start: NaiveDate, end: NaiveDate) -> DashboardResult<Self> {
        if start > end {
            return Err(DashboardError::InvalidQuery(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(Self {
            start,
            end,
            filters: DashboardFilters::default(),
        })
    }

    pub fn with_filters(mut self, filters: DashboardFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Attribute a breakdown groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Channel,
    Segment,
    Region,
    State,
    City,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Channel => "channel",
            Dimension::Segment => "segment",
            Dimension::Region => "region",
            Dimension::State => "state",
            Dimension::City => "city",
        }
    }

    fn label_expr(&self) -> &'static str {
        match self {
            Dimension::Channel => "c.channel_name",
            Dimension::Segment => "coalesce(cu.segment, 'Unknown')",
            Dimension::Region => "coalesce(cu.region, 'Unknown')",
            Dimension::State => "coalesce(cu.state, 'Unknown')",
            Dimension::City => "coalesce(cu.city, 'Unknown')",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = DashboardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "channel" => Ok(Dimension::Channel),
            "segment" => Ok(Dimension::Segment),
            "region" => Ok(Dimension::Region),
            "state" => Ok(Dimension::State),
            "city" => Ok(Dimension::City),
            other => Err(DashboardError::InvalidQuery(format!(
                "unknown breakdown dimension '{other}'"
            ))),
        }
    }
}

/// Label used for facts whose customer has no dimension row.
pub const UNKNOWN_LABEL: &str = "Unknown";

const AGGREGATES: &str = "count(*) as transactions, \
count(*) filter (where f.status = 'failed') as failed, \
coalesce(sum(f.amount) filter (where f.status = 'success'), 0) as gross_volume, \
coalesce(sum(f.revenue) filter (where f.status = 'success'), 0) as fee_revenue, \
coalesce(sum(f.processing_time), 0) as processing_time_sum";

const FROM_JOINS: &str = " from fact_transactions f \
join dim_date d on d.date_key = f.date_key \
join dim_channel c on c.channel_key = f.channel_key \
left join dim_customer cu on cu.customer_key = f.customer_key \
where f.date_key between ";

fn push_predicates(builder: &mut QueryBuilder<'static, Postgres>, query: &DashboardQuery) {
    builder
        .push_bind(date_key(query.start))
        .push(" and ")
        .push_bind(date_key(query.end));
    for (field, value) in query.filters.active() {
        builder
            .push(" and ")
            .push(field.column())
            .push(" = ")
            .push_bind(value.to_string());
    }
}

/// One row per day in range with at least one matching fact.
pub fn daily_series_query(query: &DashboardQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("select d.full_date as day, ");
    builder.push(AGGREGATES).push(FROM_JOINS);
    push_predicates(&mut builder, query);
    builder.push(" group by d.full_date order by d.full_date");
    builder
}

/// One row per distinct value of `dimension`.
pub fn breakdown_query(
    query: &DashboardQuery,
    dimension: Dimension,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("select ");
    builder
        .push(dimension.label_expr())
        .push(" as label, ")
        .push(AGGREGATES)
        .push(FROM_JOINS);
    push_predicates(&mut builder, query);
    builder.push(" group by 1 order by 1");
    builder
}
