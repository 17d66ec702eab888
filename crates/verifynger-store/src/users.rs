use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{format_timestamp, parse_timestamp, User, UserUpdate};

const USER_COLUMNS: &str =
    "id_user, name, email, position, fingerprint_template, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id_user, name, email, position, fingerprint_template, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id_user,
                user.name,
                user.email,
                user.position,
                user.fingerprint_hash,
                format_timestamp(&user.created_at),
                format_timestamp(&user.updated_at),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_user(&self, id_user: i64) -> Result<User> {
        self.find_user(id_user)?.ok_or(StoreError::NotFound)
    }

    pub fn find_user(&self, id_user: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id_user = ?1");
        let user = self
            .conn()
            .query_row(&sql, params![id_user], row_to_user)
            .optional()?;
        Ok(user)
    }

    /// Exact match on the stored fingerprint hash.
    pub fn find_user_by_hash(&self, fingerprint_hash: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE fingerprint_template = ?1 ORDER BY id_user LIMIT 1"
        );
        let user = self
            .conn()
            .query_row(&sql, params![fingerprint_hash], row_to_user)
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id_user ASC");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([], row_to_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Every stored hash; used to recount per-sensor slot usage.
    pub fn list_fingerprint_hashes(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT fingerprint_template FROM users")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn count_users(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ------------------------------------------------------------------
    // Update / delete
    // ------------------------------------------------------------------

    /// Returns `true` if a row was updated.
    pub fn update_user(
        &self,
        id_user: i64,
        update: &UserUpdate,
        updated_at: NaiveDateTime,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE users SET name = ?1, email = ?2, position = ?3, updated_at = ?4
             WHERE id_user = ?5",
            params![
                update.name,
                update.email,
                update.position,
                format_timestamp(&updated_at),
                id_user,
            ],
        )?;
        Ok(affected > 0)
    }

    // ON DELETE CASCADE: attendance logs go with it
    pub fn delete_user(&self, id_user: i64) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM users WHERE id_user = ?1", params![id_user])?;
        Ok(affected > 0)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let created_str: String = row.get(5)?;
    let updated_str: String = row.get(6)?;

    Ok(User {
        id_user: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        position: row.get(3)?,
        fingerprint_hash: row.get(4)?,
        created_at: parse_timestamp(5, &created_str)?,
        updated_at: parse_timestamp(6, &updated_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn user(id: i64, name: &str, hash: &str) -> User {
        User {
            id_user: id,
            name: name.to_string(),
            email: None,
            position: Some("Staff".to_string()),
            fingerprint_hash: hash.to_string(),
            created_at: at(8, 0),
            updated_at: at(8, 0),
        }
    }

    #[test]
    fn insert_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user(5, "Ana", "AS608_12")).unwrap();

        let by_id = db.get_user(5).unwrap();
        assert_eq!(by_id.name, "Ana");
        assert_eq!(by_id.created_at, at(8, 0));

        let by_hash = db.find_user_by_hash("AS608_12").unwrap().unwrap();
        assert_eq!(by_hash.id_user, 5);
        assert!(db.find_user_by_hash("AS608_13").unwrap().is_none());
        assert!(matches!(db.get_user(6), Err(StoreError::NotFound)));
    }

    #[test]
    fn duplicate_id_is_rejected_by_schema() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user(5, "Ana", "AS608_12")).unwrap();
        assert!(db.insert_user(&user(5, "Budi", "FPM10A_1")).is_err());
        assert_eq!(db.count_users().unwrap(), 1);
    }

    #[test]
    fn update_refreshes_fields() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user(7, "Citra", "ZW101_3")).unwrap();

        let update = UserUpdate {
            name: "Citra Dewi".to_string(),
            email: Some("citra@example.com".to_string()),
            position: None,
        };
        assert!(db.update_user(7, &update, at(9, 30)).unwrap());
        assert!(!db.update_user(8, &update, at(9, 30)).unwrap());

        let stored = db.get_user(7).unwrap();
        assert_eq!(stored.name, "Citra Dewi");
        assert_eq!(stored.position, None);
        assert_eq!(stored.updated_at, at(9, 30));
        assert_eq!(stored.created_at, at(8, 0));
        assert_eq!(stored.fingerprint_hash, "ZW101_3");
    }

    #[test]
    fn list_is_ordered_and_hashes_listed() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user(9, "Dian", "AS608_2")).unwrap();
        db.insert_user(&user(2, "Eko", "FPM10A_4")).unwrap();

        let ids: Vec<i64> = db.list_users().unwrap().iter().map(|u| u.id_user).collect();
        assert_eq!(ids, vec![2, 9]);

        let mut hashes = db.list_fingerprint_hashes().unwrap();
        hashes.sort();
        assert_eq!(hashes, vec!["AS608_2".to_string(), "FPM10A_4".to_string()]);
    }

    #[test]
    fn delete_reports_affected() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user(1, "Fajar", "AS608_1")).unwrap();
        assert!(db.delete_user(1).unwrap());
        assert!(!db.delete_user(1).unwrap());
    }
}
