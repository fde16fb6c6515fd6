//! Rolling upcoming-visits window.

use chrono::{DateTime, Days, NaiveDate, TimeZone};

use crate::config::UPCOMING_WINDOW_DAYS;
use crate::models::{decode_visit_listings, VisitListing, VISIT_DOCTOR, VISIT_PATIENT};
use crate::store::{Collection, DataStore, Query, StoreError};

pub(crate) const VISIT_COLUMNS: &[&str] = &[
    "id",
    "patient_id",
    "doctor_id",
    "visit_date",
    "visit_time",
    "purpose",
    "status",
    "created_by",
    "created_at",
];

/// Visits with their patient's label and doctor's name embedded.
pub(crate) fn visit_listing_query() -> Query {
    Query::new(Collection::Visits)
        .columns(VISIT_COLUMNS)
        .embed(
            VISIT_PATIENT,
            Collection::Patients,
            "patient_id",
            &["full_name", "clinic_file_no"],
        )
        .embed(VISIT_DOCTOR, Collection::Doctors, "doctor_id", &["name"])
}

/// Inclusive calendar range `[today, today + 7]` in the reference's own zone.
pub fn window<Tz: TimeZone>(reference: &DateTime<Tz>) -> Result<(NaiveDate, NaiveDate), StoreError> {
    let start = reference.date_naive();
    let end = start
        .checked_add_days(Days::new(UPCOMING_WINDOW_DAYS))
        .ok_or_else(|| StoreError::InvalidQuery(format!("date out of range: {start}")))?;
    Ok((start, end))
}

/// Visits dated inside the window, by date then time, time-less visits first.
pub async fn upcoming_visits<S: DataStore, Tz: TimeZone>(
    store: &S,
    reference: &DateTime<Tz>,
) -> Result<Vec<VisitListing>, StoreError> {
    let (start, end) = window(reference)?;
    let query = visit_listing_query()
        .gte("visit_date", start.to_string())
        .lte("visit_date", end.to_string())
        .order_asc("visit_date")
        .order_asc_nulls_first("visit_time");

    let mut visits = decode_visit_listings(store.select(&query).await?)?;
    // Stable, and None sorts before Some.
    visits.sort_by_key(|v| (v.visit.visit_date, v.visit.visit_time));

    tracing::debug!(%start, %end, count = visits.len(), "Upcoming visits fetched");
    Ok(visits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MISSING_LABEL;
    use crate::store::testing::{date, memory_store, seed_doctor, seed_patient, seed_visit};
    use chrono::{FixedOffset, NaiveTime, Utc};

    fn reference() -> DateTime<Utc> {
        "2024-01-10T15:30:00Z".parse().unwrap()
    }

    #[test]
    fn window_spans_seven_days_ahead() {
        let (start, end) = window(&reference()).unwrap();
        assert_eq!(start, date("2024-01-10"));
        assert_eq!(end, date("2024-01-17"));
    }

    #[test]
    fn window_uses_callers_calendar() {
        // 23:30 on the 10th in UTC is already the 11th at UTC+2.
        let utc: DateTime<Utc> = "2024-01-10T23:30:00Z".parse().unwrap();
        let local = utc.with_timezone(&FixedOffset::east_opt(2 * 3600).unwrap());
        assert_eq!(window(&utc).unwrap().0, date("2024-01-10"));
        assert_eq!(window(&local).unwrap().0, date("2024-01-11"));
    }

    #[tokio::test]
    async fn boundary_days() {
        let store = memory_store();
        let p = seed_patient(&store, "100", "Alice", None, None).await;
        seed_visit(&store, &p, None, date("2024-01-09"), None).await;
        let first = seed_visit(&store, &p, None, date("2024-01-10"), None).await;
        let last = seed_visit(&store, &p, None, date("2024-01-17"), None).await;
        seed_visit(&store, &p, None, date("2024-01-18"), None).await;

        let visits = upcoming_visits(&store, &reference()).await.unwrap();
        let ids: Vec<&str> = visits.iter().map(|v| v.visit.id.as_str()).collect();
        assert_eq!(ids, vec![first.as_str(), last.as_str()]);
    }

    #[tokio::test]
    async fn timeless_visit_sorts_first() {
        let store = memory_store();
        let p = seed_patient(&store, "100", "Alice", None, None).await;
        seed_visit(&store, &p, None, date("2024-01-12"), Some("09:00:00")).await;
        seed_visit(&store, &p, None, date("2024-01-11"), Some("14:00:00")).await;
        seed_visit(&store, &p, None, date("2024-01-12"), None).await;

        let visits = upcoming_visits(&store, &reference()).await.unwrap();
        let order: Vec<(NaiveDate, Option<NaiveTime>)> = visits
            .iter()
            .map(|v| (v.visit.visit_date, v.visit.visit_time))
            .collect();
        assert_eq!(
            order,
            vec![
                (date("2024-01-11"), NaiveTime::from_hms_opt(14, 0, 0)),
                (date("2024-01-12"), None),
                (date("2024-01-12"), NaiveTime::from_hms_opt(9, 0, 0)),
            ]
        );
    }

    #[tokio::test]
    async fn labels_and_placeholders() {
        let store = memory_store();
        let doctor = seed_doctor(&store, "Dr Mona", true).await;
        let p = seed_patient(&store, "100", "Alice", None, None).await;
        seed_visit(&store, &p, Some(&doctor), date("2024-01-10"), Some("08:00:00")).await;
        seed_visit(&store, &p, None, date("2024-01-10"), Some("10:00:00")).await;

        let visits = upcoming_visits(&store, &reference()).await.unwrap();
        assert_eq!(visits[0].patient_label, "100 • Alice");
        assert_eq!(visits[0].doctor_label, "Dr Mona");
        assert_eq!(visits[1].doctor_label, MISSING_LABEL);
    }
}
