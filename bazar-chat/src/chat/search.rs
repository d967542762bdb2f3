use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Float4, Nullable, Text, Timestamptz, Uuid as SqlUuid};
use serde::Serialize;
use uuid::Uuid;

use bazar_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::Message;

pub const MIN_QUERY_LEN: usize = 3;
pub const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

/// Accent-insensitive match ranked by trigram similarity. Needs both the
/// unaccent and pg_trgm extensions.
const TIER_UNACCENT_RANKED: &str = "\
    SELECT m.*, similarity(m.content, $3) AS rank \
    FROM messages m \
    JOIN participants p ON p.room_id = m.room_id AND p.user_id = $1 \
    WHERE m.message_type = 'TEXT' \
      AND m.is_recalled = FALSE \
      AND unaccent(m.content) ILIKE unaccent($2) \
      AND ($4::uuid IS NULL OR m.room_id = $4) \
      AND ($5::timestamptz IS NULL OR m.created_at < $5) \
    ORDER BY rank DESC, m.created_at DESC \
    LIMIT $6";

/// Ranked but accent-sensitive: pg_trgm without unaccent.
const TIER_PLAIN_RANKED: &str = "\
    SELECT m.*, similarity(m.content, $3) AS rank \
    FROM messages m \
    JOIN participants p ON p.room_id = m.room_id AND p.user_id = $1 \
    WHERE m.message_type = 'TEXT' \
      AND m.is_recalled = FALSE \
      AND m.content ILIKE $2 \
      AND ($4::uuid IS NULL OR m.room_id = $4) \
      AND ($5::timestamptz IS NULL OR m.created_at < $5) \
    ORDER BY rank DESC, m.created_at DESC \
    LIMIT $6";

/// Accent-insensitive without ranking: unaccent without pg_trgm.
const TIER_UNACCENT_PLAIN: &str = "\
    SELECT m.*, 0::float4 AS rank \
    FROM messages m \
    JOIN participants p ON p.room_id = m.room_id AND p.user_id = $1 \
    WHERE m.message_type = 'TEXT' \
      AND m.is_recalled = FALSE \
      AND unaccent(m.content) ILIKE unaccent($2) \
      AND ($3::uuid IS NULL OR m.room_id = $3) \
      AND ($4::timestamptz IS NULL OR m.created_at < $4) \
    ORDER BY m.created_at DESC \
    LIMIT $5";

/// Plain ILIKE, always available.
const TIER_PLAIN: &str = "\
    SELECT m.*, 0::float4 AS rank \
    FROM messages m \
    JOIN participants p ON p.room_id = m.room_id AND p.user_id = $1 \
    WHERE m.message_type = 'TEXT' \
      AND m.is_recalled = FALSE \
      AND m.content ILIKE $2 \
      AND ($3::uuid IS NULL OR m.room_id = $3) \
      AND ($4::timestamptz IS NULL OR m.created_at < $4) \
    ORDER BY m.created_at DESC \
    LIMIT $5";

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub room_id: Option<Uuid>,
    pub cursor: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub message: Message,
    pub rank: f32,
}

#[derive(Debug, Serialize)]
pub struct SearchPage {
    pub items: Vec<SearchHit>,
    pub next_cursor: Option<DateTime<Utc>>,
}

#[derive(QueryableByName)]
struct SearchRow {
    #[diesel(embed)]
    message: Message,
    #[diesel(sql_type = Float4)]
    rank: f32,
}

/// Search messages the user participates in. The richest query runs first;
/// a missing extension function downgrades exactly one tier per probe, any
/// other database error propagates.
pub fn search(
    conn: &mut PgConnection,
    user_id: Uuid,
    query: &str,
    opts: &SearchOptions,
) -> AppResult<SearchPage> {
    let trimmed = validate_query(query)?;

    let pattern = format!("%{}%", escape_like(trimmed));
    let limit = opts.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let fetch = limit + 1;

    let mut rows = run_tiers(conn, user_id, &pattern, trimmed, opts, fetch)?;

    let next_cursor = page_cursor(&rows, limit as usize);
    rows.truncate(limit as usize);

    let items = rows
        .into_iter()
        .map(|r| SearchHit {
            rank: round_rank(r.rank),
            message: r.message,
        })
        .collect();

    Ok(SearchPage { items, next_cursor })
}

fn run_tiers(
    conn: &mut PgConnection,
    user_id: Uuid,
    pattern: &str,
    raw_query: &str,
    opts: &SearchOptions,
    fetch: i64,
) -> AppResult<Vec<SearchRow>> {
    match run_ranked(conn, TIER_UNACCENT_RANKED, user_id, pattern, raw_query, opts, fetch) {
        Ok(rows) => return Ok(rows),
        Err(e) if is_missing_function(&e, "unaccent") || is_missing_function(&e, "similarity") => {
            tracing::debug!("unaccent+similarity search unavailable, downgrading");
        }
        Err(e) => return Err(AppError::Database(e)),
    }

    match run_ranked(conn, TIER_PLAIN_RANKED, user_id, pattern, raw_query, opts, fetch) {
        Ok(rows) => return Ok(rows),
        Err(e) if is_missing_function(&e, "similarity") => {
            tracing::debug!("similarity ranking unavailable, downgrading");
        }
        Err(e) => return Err(AppError::Database(e)),
    }

    match run_plain(conn, TIER_UNACCENT_PLAIN, user_id, pattern, opts, fetch) {
        Ok(rows) => return Ok(rows),
        Err(e) if is_missing_function(&e, "unaccent") => {
            tracing::debug!("unaccent unavailable, falling back to plain ILIKE");
        }
        Err(e) => return Err(AppError::Database(e)),
    }

    run_plain(conn, TIER_PLAIN, user_id, pattern, opts, fetch).map_err(AppError::Database)
}

fn run_ranked(
    conn: &mut PgConnection,
    sql: &str,
    user_id: Uuid,
    pattern: &str,
    raw_query: &str,
    opts: &SearchOptions,
    fetch: i64,
) -> QueryResult<Vec<SearchRow>> {
    diesel::sql_query(sql)
        .bind::<SqlUuid, _>(user_id)
        .bind::<Text, _>(pattern)
        .bind::<Text, _>(raw_query)
        .bind::<Nullable<SqlUuid>, _>(opts.room_id)
        .bind::<Nullable<Timestamptz>, _>(opts.cursor)
        .bind::<BigInt, _>(fetch)
        .load::<SearchRow>(conn)
}

fn run_plain(
    conn: &mut PgConnection,
    sql: &str,
    user_id: Uuid,
    pattern: &str,
    opts: &SearchOptions,
    fetch: i64,
) -> QueryResult<Vec<SearchRow>> {
    diesel::sql_query(sql)
        .bind::<SqlUuid, _>(user_id)
        .bind::<Text, _>(pattern)
        .bind::<Nullable<SqlUuid>, _>(opts.room_id)
        .bind::<Nullable<Timestamptz>, _>(opts.cursor)
        .bind::<BigInt, _>(fetch)
        .load::<SearchRow>(conn)
}

fn validate_query(raw: &str) -> AppResult<&str> {
    let trimmed = raw.trim();
    if trimmed.chars().count() < MIN_QUERY_LEN {
        return Err(AppError::new(
            ErrorCode::SearchQueryTooShort,
            "search query must be at least 3 characters",
        ));
    }
    Ok(trimmed)
}

/// Escape LIKE metacharacters so user input matches literally.
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Postgres reports a missing extension function as undefined_function,
/// e.g. `function unaccent(text) does not exist`.
fn is_missing_function(err: &diesel::result::Error, function: &str) -> bool {
    match err {
        diesel::result::Error::DatabaseError(_, info) => {
            let message = info.message();
            message.contains("does not exist") && message.contains(&format!("function {function}"))
        }
        _ => false,
    }
}

fn round_rank(rank: f32) -> f32 {
    (rank * 10_000.0).round() / 10_000.0
}

/// Cursor for the next page: the timestamp of the first row past the limit,
/// present only when the query spilled past the page.
fn page_cursor(rows: &[SearchRow], limit: usize) -> Option<DateTime<Utc>> {
    rows.get(limit).map(|r| r.message.created_at)
}

#[cfg(test)]
mod tests {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    use super::*;
    use crate::models::test_support::message_in_room;

    fn db_error(message: &str) -> DieselError {
        DieselError::DatabaseError(DatabaseErrorKind::Unknown, Box::new(message.to_string()))
    }

    fn rows_at(room_id: Uuid, offsets: &[i64]) -> Vec<SearchRow> {
        offsets
            .iter()
            .map(|off| SearchRow {
                message: message_in_room(room_id, *off),
                rank: 0.0,
            })
            .collect()
    }

    #[test]
    fn short_queries_are_rejected() {
        assert!(validate_query("ab").is_err());
        assert!(validate_query("  a  ").is_err());
        assert_eq!(validate_query(" abc ").unwrap(), "abc");
        assert!(validate_query("héllo").is_ok());
    }

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn missing_function_detection() {
        let unaccent = db_error("function unaccent(text) does not exist");
        assert!(is_missing_function(&unaccent, "unaccent"));
        assert!(!is_missing_function(&unaccent, "similarity"));

        let similarity = db_error("function similarity(text, unknown) does not exist");
        assert!(is_missing_function(&similarity, "similarity"));

        let other = db_error("relation \"messages\" does not exist");
        assert!(!is_missing_function(&other, "unaccent"));
        assert!(!is_missing_function(&DieselError::NotFound, "unaccent"));
    }

    #[test]
    fn rank_rounds_to_four_decimals() {
        assert_eq!(round_rank(0.123456), 0.1235);
        assert_eq!(round_rank(0.0), 0.0);
        assert_eq!(round_rank(1.0), 1.0);
    }

    #[test]
    fn next_cursor_is_the_first_row_past_the_limit() {
        let room_id = Uuid::new_v4();
        // Newest-first rows, as the tiers return them.
        let rows = rows_at(room_id, &[10, 9, 8]);

        let cursor = page_cursor(&rows, 2);
        assert_eq!(cursor, Some(rows[2].message.created_at));
        // The follow-up page filters created_at strictly below the cursor,
        // so only the rows before the spilled one stay on this page.
        assert!(rows[0].message.created_at > cursor.unwrap());
        assert!(rows[1].message.created_at > cursor.unwrap());
    }

    #[test]
    fn exact_page_has_no_cursor() {
        let room_id = Uuid::new_v4();
        let rows = rows_at(room_id, &[10, 9]);
        assert_eq!(page_cursor(&rows, 2), None);
        assert_eq!(page_cursor(&rows, 3), None);
        assert_eq!(page_cursor(&[], 1), None);
    }
}
