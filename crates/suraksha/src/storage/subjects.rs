//! Subject and emergency contact persistence.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::{parse_text, to_db_time, Storage};
use crate::error::Result;
use crate::subject::Subject;

impl Storage {
    /// Insert or replace a subject together with its emergency contacts.
    ///
    /// Contacts are stored in the order given; the previous contact list is
    /// replaced atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert_subject(&self, subject: &Subject) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r"
            INSERT INTO subjects (id, name, phone, role, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name, phone = excluded.phone, role = excluded.role
            ",
            params![
                subject.id,
                subject.name,
                subject.phone,
                subject.role.to_string(),
                to_db_time(&Utc::now()),
            ],
        )?;

        tx.execute(
            "DELETE FROM emergency_contacts WHERE subject_id = ?1",
            [subject.id],
        )?;
        for (position, recipient) in (0_i64..).zip(&subject.emergency_contacts) {
            tx.execute(
                "INSERT INTO emergency_contacts (subject_id, position, recipient) VALUES (?1, ?2, ?3)",
                params![subject.id, position, recipient],
            )?;
        }

        tx.commit()?;
        debug!(
            subject_id = subject.id,
            contacts = subject.emergency_contacts.len(),
            "Upserted subject"
        );
        Ok(())
    }

    /// Get a subject and its contacts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_subject(&self, id: i64) -> Result<Option<Subject>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, name, phone, role FROM subjects WHERE id = ?1",
                [id],
                |row| {
                    let role: String = row.get(3)?;
                    Ok(Subject {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        phone: row.get(2)?,
                        role: parse_text(3, &role)?,
                        emergency_contacts: Vec::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut subject) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT recipient FROM emergency_contacts WHERE subject_id = ?1 ORDER BY position ASC",
        )?;
        subject.emergency_contacts = stmt
            .query_map([id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(Some(subject))
    }

    /// Count registered subjects.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_subjects(&self) -> Result<i64> {
        let count = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM subjects", [], |row| row.get(0))?;
        Ok(count)
    }
}
