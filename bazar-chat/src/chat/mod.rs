use chrono::{DateTime, Utc};

use bazar_shared::errors::{AppError, AppResult, ErrorCode};

pub mod groups;
pub mod history;
pub mod rooms;
pub mod search;
pub mod store;
pub mod unread;

/// Parse an RFC 3339 pagination cursor.
pub fn parse_cursor(raw: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AppError::new(ErrorCode::InvalidCursor, format!("invalid cursor: {raw}")))
}

/// Drop the probe row of a limit+1 fetch. Returns true when a further page exists.
pub(crate) fn truncate_page<T>(items: &mut Vec<T>, limit: usize) -> bool {
    if items.len() > limit {
        items.truncate(limit);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_accepts_rfc3339() {
        let parsed = parse_cursor("2026-03-01T10:15:00Z").unwrap();
        assert_eq!(parsed.timestamp(), 1772360100);
        assert!(parse_cursor("2026-03-01T10:15:00+02:00").is_ok());
    }

    #[test]
    fn cursor_rejects_garbage() {
        for raw in ["yesterday", "17723601", "2026-13-45T99:00:00Z", ""] {
            let err = parse_cursor(raw).unwrap_err();
            assert_eq!(err.code_str(), ErrorCode::InvalidCursor.code());
        }
    }

    #[test]
    fn page_truncation() {
        let mut items = vec![1, 2, 3, 4];
        assert!(truncate_page(&mut items, 3));
        assert_eq!(items, vec![1, 2, 3]);

        let mut exact = vec![1, 2, 3];
        assert!(!truncate_page(&mut exact, 3));
        assert_eq!(exact.len(), 3);
    }
}
