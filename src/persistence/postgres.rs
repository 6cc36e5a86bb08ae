//! PostgreSQL implementation of the persistence layer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use sqlx::postgres::PgPoolOptions;

use super::models::{EventRow, ResponseRow, UserRow};
use super::{DirectoryStore, Registered, SurveyStore};
use crate::channels::CalendarSource;
use crate::config::AppConfig;
use crate::domain::{
    Attendee, AwaitingSlot, Event, EventDetails, EventId, NewEvent, Rating, RsvpStatus,
    SlotPolicy, Stage, SurveyEvent, SurveyResponse, UpsertKind, User, UserId,
};
use crate::error::SurveyError;

const USER_SELECT: &str = "SELECT u.id, u.messaging_id, u.email_address, u.has_opted_out, \
     u.refresh_token, \
     COALESCE(array_agg(a.event_id ORDER BY a.position) FILTER (WHERE a.event_id IS NOT NULL), \
     '{}'::BIGINT[]) AS awaiting \
     FROM users u LEFT JOIN awaiting_responses a ON a.user_id = u.id";

const EVENT_COLUMNS: &str = "id, calendar_event_id, name, organizer_id, organizer_email, \
     start_at, end_at, num_attendees, description, should_send_survey, questions_sent, \
     results_sent";

fn persistence_error(e: sqlx::Error) -> SurveyError {
    SurveyError::Persistence(e.to_string())
}

/// SQL predicate that is true while `stage` is still open.
const fn stage_open_predicate(stage: Stage) -> &'static str {
    match stage {
        Stage::Questions => "should_send_survey AND NOT questions_sent",
        Stage::Results => "questions_sent AND NOT results_sent",
    }
}

/// PostgreSQL-backed store using `sqlx::PgPool`.
///
/// Also serves the attendee snapshots written at ingestion as its
/// [`CalendarSource`].
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::Persistence`] if the database is unreachable.
    pub async fn connect(config: &AppConfig) -> Result<Self, SurveyError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(persistence_error)?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::Persistence`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), SurveyError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SurveyError::Persistence(e.to_string()))
    }

    /// Appends a lifecycle event to the survey log.
    ///
    /// # Errors
    ///
    /// Returns a [`SurveyError::Persistence`] on database failure.
    pub async fn append_log(&self, event: &SurveyEvent) -> Result<i64, SurveyError> {
        let payload = serde_json::to_value(event).map_err(|e| SurveyError::Internal(e.to_string()))?;
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO survey_log (event_id, event_type, payload) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(event.event_id().get())
        .bind(event.event_type_str())
        .bind(&payload)
        .fetch_one(&self.pool)
        .await
        .map_err(persistence_error)
    }

    async fn fetch_user(&self, filter: &str, value: &str) -> Result<Option<User>, SurveyError> {
        let sql = format!("{USER_SELECT} WHERE {filter} GROUP BY u.id");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence_error)?;
        Ok(row.map(User::from))
    }

    async fn event_exists(&self, id: EventId) -> Result<bool, SurveyError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM events WHERE id = $1)")
            .bind(id.get())
            .fetch_one(&self.pool)
            .await
            .map_err(persistence_error)
    }
}

/// Locks the user row for the rest of the transaction and reads its slot.
async fn lock_awaiting(
    tx: &mut Transaction<'_, Postgres>,
    id: UserId,
) -> Result<AwaitingSlot, SurveyError> {
    let locked = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(id.get())
        .fetch_optional(&mut **tx)
        .await
        .map_err(persistence_error)?;
    if locked.is_none() {
        return Err(SurveyError::UserNotFound(id.to_string()));
    }

    let pending = sqlx::query_scalar::<_, i64>(
        "SELECT event_id FROM awaiting_responses WHERE user_id = $1 ORDER BY position",
    )
    .bind(id.get())
    .fetch_all(&mut **tx)
    .await
    .map_err(persistence_error)?;
    Ok(AwaitingSlot::from_pending(
        pending.into_iter().map(EventId::new).collect(),
    ))
}

async fn write_awaiting(
    tx: &mut Transaction<'_, Postgres>,
    id: UserId,
    slot: &AwaitingSlot,
) -> Result<(), SurveyError> {
    let pending: Vec<i64> = slot.pending().iter().map(|e| e.get()).collect();

    sqlx::query("DELETE FROM awaiting_responses WHERE user_id = $1")
        .bind(id.get())
        .execute(&mut **tx)
        .await
        .map_err(persistence_error)?;

    sqlx::query(
        "INSERT INTO awaiting_responses (user_id, event_id, position) \
         SELECT $1, t.event_id, t.position::INTEGER \
         FROM UNNEST($2::BIGINT[]) WITH ORDINALITY AS t(event_id, position)",
    )
    .bind(id.get())
    .bind(&pending)
    .execute(&mut **tx)
    .await
    .map_err(persistence_error)?;
    Ok(())
}

#[async_trait]
impl DirectoryStore for PostgresStore {
    async fn user_by_identity(&self, messaging_id: &str) -> Result<Option<User>, SurveyError> {
        self.fetch_user("u.messaging_id = $1", messaging_id).await
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, SurveyError> {
        let sql = format!("{USER_SELECT} WHERE u.id = $1 GROUP BY u.id");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence_error)?;
        Ok(row.map(User::from))
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, SurveyError> {
        self.fetch_user("u.email_address = lower($1)", email).await
    }

    async fn users_by_emails(&self, emails: &[String]) -> Result<Vec<User>, SurveyError> {
        let lowered: Vec<String> = emails.iter().map(|e| e.to_lowercase()).collect();
        let sql = format!("{USER_SELECT} WHERE u.email_address = ANY($1) GROUP BY u.id ORDER BY u.id");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&lowered)
            .fetch_all(&self.pool)
            .await
            .map_err(persistence_error)?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn insert_user(&self, messaging_id: &str, email: &str) -> Result<bool, SurveyError> {
        let result = sqlx::query(
            "INSERT INTO users (messaging_id, email_address) VALUES ($1, lower($2)) \
             ON CONFLICT DO NOTHING",
        )
        .bind(messaging_id)
        .bind(email)
        .execute(&self.pool)
        .await
        .map_err(persistence_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_opted_out(&self, id: UserId, opted_out: bool) -> Result<(), SurveyError> {
        let result = sqlx::query("UPDATE users SET has_opted_out = $2 WHERE id = $1")
            .bind(id.get())
            .bind(opted_out)
            .execute(&self.pool)
            .await
            .map_err(persistence_error)?;
        if result.rows_affected() == 0 {
            return Err(SurveyError::UserNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn set_credential(&self, email: &str, token: &str) -> Result<bool, SurveyError> {
        let result =
            sqlx::query("UPDATE users SET refresh_token = $2 WHERE email_address = lower($1)")
                .bind(email)
                .bind(token)
                .execute(&self.pool)
                .await
                .map_err(persistence_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn assign_awaiting(
        &self,
        id: UserId,
        event: EventId,
        policy: SlotPolicy,
        capacity: usize,
    ) -> Result<Vec<EventId>, SurveyError> {
        let mut tx = self.pool.begin().await.map_err(persistence_error)?;
        let mut slot = lock_awaiting(&mut tx, id).await?;
        let displaced = slot.assign(event, policy, capacity);
        write_awaiting(&mut tx, id, &slot).await?;
        tx.commit().await.map_err(persistence_error)?;
        Ok(displaced)
    }

    async fn release_awaiting(&self, id: UserId, event: EventId) -> Result<bool, SurveyError> {
        let mut tx = self.pool.begin().await.map_err(persistence_error)?;
        let mut slot = lock_awaiting(&mut tx, id).await?;
        if !slot.release(event) {
            return Ok(false);
        }
        write_awaiting(&mut tx, id, &slot).await?;
        tx.commit().await.map_err(persistence_error)?;
        Ok(true)
    }
}

#[async_trait]
impl SurveyStore for PostgresStore {
    async fn event(&self, id: EventId) -> Result<Option<Event>, SurveyError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence_error)?;
        Ok(row.map(Event::from))
    }

    async fn upsert_event(&self, event: &NewEvent) -> Result<Registered, SurveyError> {
        let num_attendees = i32::try_from(event.attendees.len()).unwrap_or(i32::MAX);
        let (id, created) = sqlx::query_as::<_, (i64, bool)>(
            "INSERT INTO events (calendar_event_id, name, organizer_id, organizer_email, \
             start_at, end_at, num_attendees, description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (calendar_event_id) DO UPDATE SET \
             name = EXCLUDED.name, organizer_id = EXCLUDED.organizer_id, \
             organizer_email = EXCLUDED.organizer_email, start_at = EXCLUDED.start_at, \
             end_at = EXCLUDED.end_at, num_attendees = EXCLUDED.num_attendees, \
             description = EXCLUDED.description \
             RETURNING id, (xmax = 0) AS created",
        )
        .bind(&event.calendar_event_id)
        .bind(&event.name)
        .bind(event.organizer_id.map(UserId::get))
        .bind(&event.organizer_email)
        .bind(event.start_at)
        .bind(event.end_at)
        .bind(num_attendees)
        .bind(&event.description)
        .fetch_one(&self.pool)
        .await
        .map_err(persistence_error)?;

        Ok(Registered {
            event_id: EventId::new(id),
            created,
        })
    }

    async fn save_event_details(
        &self,
        id: EventId,
        details: &EventDetails,
    ) -> Result<(), SurveyError> {
        let emails: Vec<String> = details
            .attendees
            .iter()
            .map(|a| a.email.to_lowercase())
            .collect();
        let statuses: Vec<&str> = details
            .attendees
            .iter()
            .map(|a| a.response_status.as_str())
            .collect();

        let mut tx = self.pool.begin().await.map_err(persistence_error)?;

        let updated = sqlx::query("UPDATE events SET name = $2, description = $3 WHERE id = $1")
            .bind(id.get())
            .bind(&details.title)
            .bind(&details.description)
            .execute(&mut *tx)
            .await
            .map_err(persistence_error)?;
        if updated.rows_affected() == 0 {
            return Err(SurveyError::EventNotFound(id));
        }

        sqlx::query("DELETE FROM event_attendees WHERE event_id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(persistence_error)?;

        sqlx::query(
            "INSERT INTO event_attendees (event_id, email_address, response_status, position) \
             SELECT $1, t.email, t.status, t.position::INTEGER \
             FROM UNNEST($2::TEXT[], $3::TEXT[]) WITH ORDINALITY AS t(email, status, position) \
             ON CONFLICT (event_id, email_address) DO NOTHING",
        )
        .bind(id.get())
        .bind(&emails)
        .bind(&statuses)
        .execute(&mut *tx)
        .await
        .map_err(persistence_error)?;

        tx.commit().await.map_err(persistence_error)
    }

    async fn pending_question_events(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<EventId>, SurveyError> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM events \
             WHERE should_send_survey AND NOT questions_sent AND end_at <= $1 \
             ORDER BY end_at, id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(persistence_error)?;
        Ok(ids.into_iter().map(EventId::new).collect())
    }

    async fn pending_result_events(&self) -> Result<Vec<EventId>, SurveyError> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM events WHERE questions_sent AND NOT results_sent ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(persistence_error)?;
        Ok(ids.into_iter().map(EventId::new).collect())
    }

    async fn claim_event(
        &self,
        id: EventId,
        stage: Stage,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<Event>, SurveyError> {
        let sql = format!(
            "UPDATE events SET claimed_until = $3 \
             WHERE id = $1 AND (claimed_until IS NULL OR claimed_until <= $2) AND {} \
             RETURNING {EVENT_COLUMNS}",
            stage_open_predicate(stage)
        );
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id.get())
            .bind(now)
            .bind(lease_until)
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence_error)?;

        match row {
            Some(row) => Ok(Some(Event::from(row))),
            None if self.event_exists(id).await? => Ok(None),
            None => Err(SurveyError::EventNotFound(id)),
        }
    }

    async fn renew_claim(
        &self,
        id: EventId,
        held_until: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, SurveyError> {
        let result =
            sqlx::query("UPDATE events SET claimed_until = $3 WHERE id = $1 AND claimed_until = $2")
                .bind(id.get())
                .bind(held_until)
                .bind(lease_until)
                .execute(&self.pool)
                .await
                .map_err(persistence_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_claim(
        &self,
        id: EventId,
        held_until: DateTime<Utc>,
    ) -> Result<(), SurveyError> {
        sqlx::query("UPDATE events SET claimed_until = NULL WHERE id = $1 AND claimed_until = $2")
            .bind(id.get())
            .bind(held_until)
            .execute(&self.pool)
            .await
            .map_err(persistence_error)?;
        Ok(())
    }

    async fn finish_stage(&self, id: EventId, stage: Stage) -> Result<(), SurveyError> {
        let flag = match stage {
            Stage::Questions => "questions_sent",
            Stage::Results => "results_sent",
        };
        let sql = format!("UPDATE events SET {flag} = TRUE, claimed_until = NULL WHERE id = $1");
        let result = sqlx::query(&sql)
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(persistence_error)?;
        if result.rows_affected() == 0 {
            return Err(SurveyError::EventNotFound(id));
        }
        Ok(())
    }

    async fn mark_not_surveyable(&self, id: EventId) -> Result<(), SurveyError> {
        let result = sqlx::query(
            "UPDATE events SET should_send_survey = FALSE, claimed_until = NULL WHERE id = $1",
        )
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(persistence_error)?;
        if result.rows_affected() == 0 {
            return Err(SurveyError::EventNotFound(id));
        }
        Ok(())
    }

    async fn upsert_response(
        &self,
        event: EventId,
        user: UserId,
        rating: Rating,
    ) -> Result<UpsertKind, SurveyError> {
        let inserted = sqlx::query_scalar::<_, bool>(
            "INSERT INTO survey_responses (event_id, user_id, response) VALUES ($1, $2, $3) \
             ON CONFLICT (event_id, user_id) DO UPDATE SET \
             response = EXCLUDED.response, updated_at = now() \
             RETURNING (xmax = 0) AS inserted",
        )
        .bind(event.get())
        .bind(user.get())
        .bind(rating.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(persistence_error)?;

        Ok(if inserted {
            UpsertKind::Inserted
        } else {
            UpsertKind::Updated
        })
    }

    async fn responses_for(&self, event: EventId) -> Result<Vec<SurveyResponse>, SurveyError> {
        let rows = sqlx::query_as::<_, ResponseRow>(
            "SELECT event_id, user_id, response, created_at FROM survey_responses \
             WHERE event_id = $1 ORDER BY id",
        )
        .bind(event.get())
        .fetch_all(&self.pool)
        .await
        .map_err(persistence_error)?;
        rows.into_iter().map(SurveyResponse::try_from).collect()
    }

    async fn response_count(&self, event: EventId) -> Result<usize, SurveyError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM survey_responses WHERE event_id = $1",
        )
        .bind(event.get())
        .fetch_one(&self.pool)
        .await
        .map_err(persistence_error)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[async_trait]
impl CalendarSource for PostgresStore {
    async fn event_details(&self, event: &Event) -> Result<EventDetails, SurveyError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT email_address, response_status FROM event_attendees \
             WHERE event_id = $1 ORDER BY position",
        )
        .bind(event.id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SurveyError::Calendar(e.to_string()))?;

        Ok(EventDetails {
            title: event.name.clone(),
            description: event.description.clone(),
            attendees: rows
                .into_iter()
                .map(|(email, status)| Attendee {
                    email,
                    response_status: RsvpStatus::parse_lenient(&status),
                })
                .collect(),
        })
    }
}
