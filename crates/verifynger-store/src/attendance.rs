use chrono::NaiveDateTime;
use rusqlite::{params, params_from_iter};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{format_timestamp, parse_timestamp, AttendanceLogEntry, LogDateFilter};

const LOG_COLUMNS: &str =
    "log_id, user_id, user_name, check_in_time, match_score, fingerprint_hash";

impl Database {
    /// Append a check-in and return the stored row.
    pub fn insert_attendance(
        &self,
        user_id: i64,
        user_name: &str,
        check_in_time: NaiveDateTime,
        match_score: i64,
        fingerprint_hash: Option<&str>,
    ) -> Result<AttendanceLogEntry> {
        self.conn().execute(
            "INSERT INTO attendance_logs (user_id, user_name, check_in_time, match_score, fingerprint_hash)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id,
                user_name,
                format_timestamp(&check_in_time),
                match_score,
                fingerprint_hash,
            ],
        )?;

        Ok(AttendanceLogEntry {
            log_id: self.conn().last_insert_rowid(),
            user_id,
            user_name: user_name.to_string(),
            check_in_time,
            match_score: Some(match_score),
            fingerprint_hash: fingerprint_hash.map(str::to_string),
        })
    }

    /// Newest first.
    pub fn recent_logs(&self, limit: u32) -> Result<Vec<AttendanceLogEntry>> {
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM attendance_logs
             ORDER BY check_in_time DESC, log_id DESC
             LIMIT ?1"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![limit], row_to_log)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Case-insensitive substring match on the user name or the user id.
    /// An empty keyword lists everything.
    pub fn search_logs(&self, keyword: &str, limit: u32) -> Result<Vec<AttendanceLogEntry>> {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return self.recent_logs(limit);
        }

        let pattern = format!("%{keyword}%");
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM attendance_logs
             WHERE LOWER(user_name) LIKE ?1 OR CAST(user_id AS TEXT) LIKE ?1
             ORDER BY check_in_time DESC, log_id DESC
             LIMIT ?2"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![pattern, limit], row_to_log)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn logs_by_date(
        &self,
        filter: &LogDateFilter,
        limit: u32,
    ) -> Result<Vec<AttendanceLogEntry>> {
        if filter.is_empty() {
            return self.recent_logs(limit);
        }

        let mut sql = format!("SELECT {LOG_COLUMNS} FROM attendance_logs WHERE 1=1");
        let mut args: Vec<String> = Vec::new();

        if let Some(year) = filter.year {
            sql.push_str(" AND strftime('%Y', check_in_time) = ?");
            args.push(format!("{year:04}"));
        }
        if let Some(month) = filter.month {
            sql.push_str(" AND strftime('%m', check_in_time) = ?");
            args.push(format!("{month:02}"));
        }
        if let Some(day) = filter.day {
            sql.push_str(" AND strftime('%d', check_in_time) = ?");
            args.push(format!("{day:02}"));
        }
        sql.push_str(" ORDER BY check_in_time DESC, log_id DESC");
        sql.push_str(&format!(" LIMIT {limit}"));

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), row_to_log)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn count_logs(&self) -> Result<u64> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM attendance_logs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Delete every log row. Returns the number removed.
    pub fn clear_logs(&self) -> Result<usize> {
        let affected = self.conn().execute("DELETE FROM attendance_logs", [])?;
        Ok(affected)
    }
}

fn row_to_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceLogEntry> {
    let ts_str: String = row.get(3)?;

    Ok(AttendanceLogEntry {
        log_id: row.get(0)?,
        user_id: row.get(1)?,
        user_name: row.get(2)?,
        check_in_time: parse_timestamp(3, &ts_str)?,
        match_score: row.get(4)?,
        fingerprint_hash: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        for (id, name, hash) in [(5, "Ana", "AS608_12"), (12, "Budi", "FPM10A_3")] {
            db.insert_user(&User {
                id_user: id,
                name: name.to_string(),
                email: None,
                position: None,
                fingerprint_hash: hash.to_string(),
                created_at: at(2024, 1, 1, 7),
                updated_at: at(2024, 1, 1, 7),
            })
            .unwrap();
        }
        db
    }

    #[test]
    fn insert_returns_monotonic_ids() {
        let db = seeded();
        let first = db
            .insert_attendance(5, "Ana", at(2024, 3, 1, 8), 92, Some("AS608_12"))
            .unwrap();
        let second = db
            .insert_attendance(12, "Budi", at(2024, 3, 1, 9), 80, Some("FPM10A_3"))
            .unwrap();
        assert!(second.log_id > first.log_id);
        assert_eq!(db.count_logs().unwrap(), 2);
    }

    #[test]
    fn recent_is_newest_first() {
        let db = seeded();
        db.insert_attendance(5, "Ana", at(2024, 3, 1, 8), 92, Some("AS608_12"))
            .unwrap();
        db.insert_attendance(12, "Budi", at(2024, 3, 2, 8), 80, Some("FPM10A_3"))
            .unwrap();

        let logs = db.recent_logs(10).unwrap();
        assert_eq!(logs[0].user_name, "Budi");
        assert_eq!(logs[1].match_score, Some(92));
        assert_eq!(db.recent_logs(1).unwrap().len(), 1);
    }

    #[test]
    fn search_matches_name_or_id() {
        let db = seeded();
        db.insert_attendance(5, "Ana", at(2024, 3, 1, 8), 92, None)
            .unwrap();
        db.insert_attendance(12, "Budi", at(2024, 3, 1, 9), 80, None)
            .unwrap();

        assert_eq!(db.search_logs("ANA", 100).unwrap().len(), 1);
        assert_eq!(db.search_logs("12", 100).unwrap()[0].user_name, "Budi");
        assert_eq!(db.search_logs("  ", 100).unwrap().len(), 2);
    }

    #[test]
    fn date_filter_by_components() {
        let db = seeded();
        db.insert_attendance(5, "Ana", at(2024, 3, 1, 8), 92, None)
            .unwrap();
        db.insert_attendance(5, "Ana", at(2024, 4, 1, 8), 91, None)
            .unwrap();
        db.insert_attendance(12, "Budi", at(2025, 3, 15, 8), 88, None)
            .unwrap();

        let march = LogDateFilter {
            month: Some(3),
            ..Default::default()
        };
        assert_eq!(db.logs_by_date(&march, 100).unwrap().len(), 2);

        let exact = LogDateFilter {
            year: Some(2024),
            month: Some(3),
            day: Some(1),
        };
        let logs = db.logs_by_date(&exact, 100).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].match_score, Some(92));

        let all = db.logs_by_date(&LogDateFilter::default(), 2).unwrap();
        assert_eq!(all, db.recent_logs(2).unwrap());
    }

    #[test]
    fn deleting_user_cascades_logs() {
        let db = seeded();
        db.insert_attendance(5, "Ana", at(2024, 3, 1, 8), 92, None)
            .unwrap();
        db.insert_attendance(12, "Budi", at(2024, 3, 1, 9), 80, None)
            .unwrap();

        db.delete_user(5).unwrap();
        let logs = db.recent_logs(10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].user_id, 12);
    }

    #[test]
    fn clear_removes_everything() {
        let db = seeded();
        db.insert_attendance(5, "Ana", at(2024, 3, 1, 8), 92, None)
            .unwrap();
        assert_eq!(db.clear_logs().unwrap(), 1);
        assert_eq!(db.count_logs().unwrap(), 0);
    }
}
