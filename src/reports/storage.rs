use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use serde::Serialize;
use uuid::Uuid;

use super::period::{PeriodKey, PeriodKind};
use crate::core::shared::schema::{monthly_reports, quarterly_reports, tickets, weekly_reports};
use crate::tickets::Ticket;

/// Snapshot row shape shared by the three period tables.
#[derive(Debug, Clone, Serialize)]
pub struct SavedReport {
    pub id: Uuid,
    pub period: String,
    pub kind: PeriodKind,
    pub payload: serde_json::Value,
    pub generated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

type SnapshotRow = (Uuid, i32, i32, serde_json::Value, Option<Uuid>, DateTime<Utc>);

fn to_saved(kind: PeriodKind, row: SnapshotRow) -> Option<SavedReport> {
    let (id, year, index, payload, generated_by, created_at) = row;
    let index = u32::try_from(index).ok()?;
    let key = match kind {
        PeriodKind::Week => PeriodKey::week(year, index),
        PeriodKind::Month => PeriodKey::month(year, index),
        PeriodKind::Quarter => PeriodKey::quarter(year, index),
    }?;
    Some(SavedReport {
        id,
        period: key.to_string(),
        kind,
        payload,
        generated_by,
        created_at,
    })
}

/// Tickets created inside `[start, end)`.
pub fn tickets_created_between(
    conn: &mut PgConnection,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> QueryResult<Vec<Ticket>> {
    tickets::table
        .filter(tickets::created_at.ge(start))
        .filter(tickets::created_at.lt(end))
        .select(Ticket::as_select())
        .load(conn)
}

/// Inserts or replaces the snapshot for `key`.
pub fn save_snapshot(
    conn: &mut PgConnection,
    key: &PeriodKey,
    payload: &serde_json::Value,
    generated_by: Uuid,
) -> QueryResult<SavedReport> {
    let (year, index) = (key.year(), key.index() as i32);
    let now = Utc::now();
    let id = Uuid::new_v4();

    let row: SnapshotRow = match key.kind() {
        PeriodKind::Week => diesel::insert_into(weekly_reports::table)
            .values((
                weekly_reports::id.eq(id),
                weekly_reports::year.eq(year),
                weekly_reports::week.eq(index),
                weekly_reports::payload.eq(payload),
                weekly_reports::generated_by.eq(Some(generated_by)),
                weekly_reports::created_at.eq(now),
            ))
            .on_conflict((weekly_reports::year, weekly_reports::week))
            .do_update()
            .set((
                weekly_reports::payload.eq(excluded(weekly_reports::payload)),
                weekly_reports::generated_by.eq(excluded(weekly_reports::generated_by)),
                weekly_reports::created_at.eq(excluded(weekly_reports::created_at)),
            ))
            .returning(weekly_reports::all_columns)
            .get_result(conn)?,
        PeriodKind::Month => diesel::insert_into(monthly_reports::table)
            .values((
                monthly_reports::id.eq(id),
                monthly_reports::year.eq(year),
                monthly_reports::month.eq(index),
                monthly_reports::payload.eq(payload),
                monthly_reports::generated_by.eq(Some(generated_by)),
                monthly_reports::created_at.eq(now),
            ))
            .on_conflict((monthly_reports::year, monthly_reports::month))
            .do_update()
            .set((
                monthly_reports::payload.eq(excluded(monthly_reports::payload)),
                monthly_reports::generated_by.eq(excluded(monthly_reports::generated_by)),
                monthly_reports::created_at.eq(excluded(monthly_reports::created_at)),
            ))
            .returning(monthly_reports::all_columns)
            .get_result(conn)?,
        PeriodKind::Quarter => diesel::insert_into(quarterly_reports::table)
            .values((
                quarterly_reports::id.eq(id),
                quarterly_reports::year.eq(year),
                quarterly_reports::quarter.eq(index),
                quarterly_reports::payload.eq(payload),
                quarterly_reports::generated_by.eq(Some(generated_by)),
                quarterly_reports::created_at.eq(now),
            ))
            .on_conflict((quarterly_reports::year, quarterly_reports::quarter))
            .do_update()
            .set((
                quarterly_reports::payload.eq(excluded(quarterly_reports::payload)),
                quarterly_reports::generated_by.eq(excluded(quarterly_reports::generated_by)),
                quarterly_reports::created_at.eq(excluded(quarterly_reports::created_at)),
            ))
            .returning(quarterly_reports::all_columns)
            .get_result(conn)?,
    };

    to_saved(key.kind(), row).ok_or(diesel::result::Error::NotFound)
}

/// Saved snapshots of one kind, newest period first.
pub fn list_snapshots(conn: &mut PgConnection, kind: PeriodKind) -> QueryResult<Vec<SavedReport>> {
    let rows: Vec<SnapshotRow> = match kind {
        PeriodKind::Week => weekly_reports::table
            .order((weekly_reports::year.desc(), weekly_reports::week.desc()))
            .load(conn)?,
        PeriodKind::Month => monthly_reports::table
            .order((monthly_reports::year.desc(), monthly_reports::month.desc()))
            .load(conn)?,
        PeriodKind::Quarter => quarterly_reports::table
            .order((quarterly_reports::year.desc(), quarterly_reports::quarter.desc()))
            .load(conn)?,
    };
    Ok(rows.into_iter().filter_map(|row| to_saved(kind, row)).collect())
}

pub fn find_snapshot(conn: &mut PgConnection, key: &PeriodKey) -> QueryResult<Option<SavedReport>> {
    let (year, index) = (key.year(), key.index() as i32);
    let row: Option<SnapshotRow> = match key.kind() {
        PeriodKind::Week => weekly_reports::table
            .filter(weekly_reports::year.eq(year))
            .filter(weekly_reports::week.eq(index))
            .first(conn)
            .optional()?,
        PeriodKind::Month => monthly_reports::table
            .filter(monthly_reports::year.eq(year))
            .filter(monthly_reports::month.eq(index))
            .first(conn)
            .optional()?,
        PeriodKind::Quarter => quarterly_reports::table
            .filter(quarterly_reports::year.eq(year))
            .filter(quarterly_reports::quarter.eq(index))
            .first(conn)
            .optional()?,
    };
    Ok(row.and_then(|row| to_saved(key.kind(), row)))
}

pub fn delete_snapshot(conn: &mut PgConnection, key: &PeriodKey) -> QueryResult<usize> {
    let (year, index) = (key.year(), key.index() as i32);
    match key.kind() {
        PeriodKind::Week => diesel::delete(
            weekly_reports::table
                .filter(weekly_reports::year.eq(year))
                .filter(weekly_reports::week.eq(index)),
        )
        .execute(conn),
        PeriodKind::Month => diesel::delete(
            monthly_reports::table
                .filter(monthly_reports::year.eq(year))
                .filter(monthly_reports::month.eq(index)),
        )
        .execute(conn),
        PeriodKind::Quarter => diesel::delete(
            quarterly_reports::table
                .filter(quarterly_reports::year.eq(year))
                .filter(quarterly_reports::quarter.eq(index)),
        )
        .execute(conn),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_map_back_to_period_keys() {
        let row: SnapshotRow = (Uuid::new_v4(), 2020, 53, serde_json::json!({}), None, Utc::now());
        let saved = to_saved(PeriodKind::Week, row).unwrap();
        assert_eq!(saved.period, "2020-W53");

        let bad: SnapshotRow = (Uuid::new_v4(), 2024, 13, serde_json::json!({}), None, Utc::now());
        assert!(to_saved(PeriodKind::Month, bad).is_none());
    }
}
