use chrono::{DateTime, SecondsFormat, Utc};
use eldercare_core::records::{
    Appointment, Doctor, Medication, UserProfile, Vitals, VitalsRecord, WorkflowKind, WorkflowRecord,
    WorkflowStatus,
};
use eldercare_core::{Error, Event, EventType, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::store::{AuditLog, Datastore, EventQuery};

/// SQLite-backed datastore and event trail.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<Mutex<Connection>>,
}

fn storage_err(context: &str) -> impl Fn(rusqlite::Error) -> Error + '_ {
    move |e| Error::Storage(format!("{}: {}", context, e))
}

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_ts(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn parse_enum<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = Error>,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

fn json_list(row: &Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default())
}

fn json_value(row: &Row, idx: usize) -> rusqlite::Result<Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

fn row_to_user(row: &Row) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: row.get(0)?,
        full_name: row.get(1)?,
        role: row.get(2)?,
        age: row.get(3)?,
        conditions: json_list(row, 4)?,
        allergies: json_list(row, 5)?,
        phone: row.get(6)?,
        guardian_id: row.get(7)?,
        guardian_phone: row.get(8)?,
        doctor_id: row.get(9)?,
        city: row.get(10)?,
    })
}

fn row_to_vitals(row: &Row) -> rusqlite::Result<VitalsRecord> {
    Ok(VitalsRecord {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        vitals: Vitals {
            bp_systolic: row.get(2)?,
            bp_diastolic: row.get(3)?,
            heart_rate: row.get(4)?,
            blood_sugar: row.get(5)?,
            weight: row.get(6)?,
            spo2: row.get(7)?,
            temperature: row.get(8)?,
            notes: row.get(9)?,
        },
        recorded_at: parse_ts(row, 10)?,
    })
}

fn row_to_medication(row: &Row) -> rusqlite::Result<Medication> {
    Ok(Medication {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        name: row.get(2)?,
        dosage: row.get(3)?,
        timing: json_list(row, 4)?,
        current_stock: row.get(5)?,
        stock_threshold: row.get(6)?,
    })
}

fn row_to_event(row: &Row) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        source_agent: row.get(1)?,
        target_agent: row.get(2)?,
        event_type: parse_enum::<EventType>(row, 3)?,
        patient_id: row.get(4)?,
        payload: json_value(row, 5)?,
        created_at: parse_ts(row, 6)?,
    })
}

fn row_to_workflow(row: &Row) -> rusqlite::Result<WorkflowRecord> {
    Ok(WorkflowRecord {
        id: row.get(0)?,
        kind: parse_enum::<WorkflowKind>(row, 1)?,
        subject_id: row.get(2)?,
        patient_id: row.get(3)?,
        status: parse_enum::<WorkflowStatus>(row, 4)?,
        data: json_value(row, 5)?,
        created_at: parse_ts(row, 6)?,
        updated_at: parse_ts(row, 7)?,
    })
}

fn row_to_appointment(row: &Row) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        doctor_name: row.get(3)?,
        date: row.get(4)?,
        time: row.get(5)?,
        reason: row.get(6)?,
        status: row.get(7)?,
    })
}

const USER_COLUMNS: &str =
    "id, full_name, role, age, conditions, allergies, phone, guardian_id, guardian_phone, doctor_id, city";
const VITALS_COLUMNS: &str =
    "id, patient_id, bp_systolic, bp_diastolic, heart_rate, blood_sugar, weight, spo2, temperature, notes, recorded_at";
const MEDICATION_COLUMNS: &str = "id, patient_id, name, dosage, timing, current_stock, stock_threshold";
const EVENT_COLUMNS: &str = "id, source_agent, target_agent, event_type, patient_id, payload, created_at";
const WORKFLOW_COLUMNS: &str = "id, kind, subject_id, patient_id, status, data, created_at, updated_at";
const APPOINTMENT_COLUMNS: &str = "id, patient_id, doctor_id, doctor_name, date, time, reason, status";

impl SqliteStore {
    /// Open (or create) the database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create db directory: {}", e)))?;
        }

        let conn = Connection::open(db_path).map_err(storage_err("Failed to open db"))?;

        // WAL keeps readers from blocking on the sweep writers
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        let store = Self {
            inner: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        info!(path = %db_path.display(), "Datastore opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err("Failed to open in-memory db"))?;
        let store = Self {
            inner: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.inner
            .lock()
            .map_err(|e| Error::Storage(format!("Lock error: {}", e)))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                full_name TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'patient',
                age INTEGER,
                conditions TEXT,
                allergies TEXT,
                phone TEXT,
                guardian_id TEXT,
                guardian_phone TEXT,
                doctor_id TEXT,
                city TEXT
            );

            CREATE TABLE IF NOT EXISTS vitals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                patient_id TEXT NOT NULL,
                bp_systolic REAL,
                bp_diastolic REAL,
                heart_rate REAL,
                blood_sugar REAL,
                weight REAL,
                spo2 REAL,
                temperature REAL,
                notes TEXT,
                recorded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_vitals_patient ON vitals(patient_id, recorded_at);

            CREATE TABLE IF NOT EXISTS medications (
                id TEXT PRIMARY KEY,
                patient_id TEXT NOT NULL,
                name TEXT NOT NULL,
                dosage TEXT,
                timing TEXT,
                current_stock INTEGER,
                stock_threshold INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_medications_patient ON medications(patient_id);

            CREATE TABLE IF NOT EXISTS agent_events (
                id TEXT PRIMARY KEY,
                source_agent TEXT NOT NULL,
                target_agent TEXT NOT NULL,
                event_type TEXT NOT NULL,
                patient_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_patient_type ON agent_events(patient_id, event_type, created_at);

            -- No uniqueness on (kind, subject_id): open-workflow checks are read-then-write.
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                patient_id TEXT NOT NULL,
                status TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_workflows_subject ON workflows(kind, subject_id, status);

            CREATE TABLE IF NOT EXISTS doctors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                specialty TEXT
            );

            CREATE TABLE IF NOT EXISTS appointments (
                id TEXT PRIMARY KEY,
                patient_id TEXT NOT NULL,
                doctor_id TEXT NOT NULL,
                doctor_name TEXT NOT NULL,
                date TEXT NOT NULL,
                time TEXT NOT NULL,
                reason TEXT,
                status TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_appointments_slot ON appointments(doctor_id, date);
            ",
        )
        .map_err(storage_err("Failed to init schema"))?;

        debug!("Datastore schema initialized");
        Ok(())
    }
}

impl AuditLog for SqliteStore {
    fn record(&self, event: &Event) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO agent_events ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)", EVENT_COLUMNS),
            params![
                event.id,
                event.source_agent,
                event.target_agent,
                event.event_type.as_str(),
                event.patient_id,
                event.payload.to_string(),
                ts(&event.created_at),
            ],
        )
        .map_err(storage_err("Failed to insert event"))?;
        Ok(())
    }
}

impl Datastore for SqliteStore {
    fn user(&self, id: &str) -> Result<Option<UserProfile>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            row_to_user,
        )
        .optional()
        .map_err(storage_err("Failed to read user"))
    }

    fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                USER_COLUMNS
            ),
            params![
                user.id,
                user.full_name,
                if user.role.is_empty() { "patient" } else { user.role.as_str() },
                user.age,
                serde_json::to_string(&user.conditions)?,
                serde_json::to_string(&user.allergies)?,
                user.phone,
                user.guardian_id,
                user.guardian_phone,
                user.doctor_id,
                user.city,
            ],
        )
        .map_err(storage_err("Failed to upsert user"))?;
        Ok(())
    }

    fn insert_vitals(&self, patient_id: &str, vitals: &Vitals) -> Result<VitalsRecord> {
        let conn = self.conn()?;
        let recorded_at = Utc::now();
        conn.execute(
            "INSERT INTO vitals (patient_id, bp_systolic, bp_diastolic, heart_rate, blood_sugar,
                weight, spo2, temperature, notes, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                patient_id,
                vitals.bp_systolic,
                vitals.bp_diastolic,
                vitals.heart_rate,
                vitals.blood_sugar,
                vitals.weight,
                vitals.spo2,
                vitals.temperature,
                vitals.notes,
                ts(&recorded_at),
            ],
        )
        .map_err(storage_err("Failed to insert vitals"))?;

        Ok(VitalsRecord {
            id: conn.last_insert_rowid(),
            patient_id: patient_id.to_string(),
            vitals: vitals.clone(),
            recorded_at,
        })
    }

    fn recent_vitals(&self, patient_id: &str, limit: usize) -> Result<Vec<VitalsRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM vitals WHERE patient_id = ?1 ORDER BY recorded_at DESC, id DESC LIMIT ?2",
                VITALS_COLUMNS
            ))
            .map_err(storage_err("Failed to prepare vitals query"))?;
        let rows = stmt
            .query_map(params![patient_id, limit as i64], row_to_vitals)
            .map_err(storage_err("Failed to query vitals"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("Failed to read vitals"))
    }

    fn medications(&self, patient_id: &str) -> Result<Vec<Medication>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM medications WHERE patient_id = ?1 ORDER BY name",
                MEDICATION_COLUMNS
            ))
            .map_err(storage_err("Failed to prepare medications query"))?;
        let rows = stmt
            .query_map(params![patient_id], row_to_medication)
            .map_err(storage_err("Failed to query medications"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("Failed to read medications"))
    }

    fn all_medications(&self) -> Result<Vec<Medication>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM medications ORDER BY patient_id, name", MEDICATION_COLUMNS))
            .map_err(storage_err("Failed to prepare medications query"))?;
        let rows = stmt
            .query_map([], row_to_medication)
            .map_err(storage_err("Failed to query medications"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("Failed to read medications"))
    }

    fn upsert_medication(&self, medication: &Medication) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO medications ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                MEDICATION_COLUMNS
            ),
            params![
                medication.id,
                medication.patient_id,
                medication.name,
                medication.dosage,
                serde_json::to_string(&medication.timing)?,
                medication.current_stock,
                medication.stock_threshold,
            ],
        )
        .map_err(storage_err("Failed to upsert medication"))?;
        Ok(())
    }

    fn set_medication_stock(&self, medication_id: &str, stock: i64) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE medications SET current_stock = ?1 WHERE id = ?2",
                params![stock, medication_id],
            )
            .map_err(storage_err("Failed to update stock"))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("medication {}", medication_id)));
        }
        Ok(())
    }

    fn recent_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM agent_events
                 WHERE (?1 IS NULL OR patient_id = ?1) AND (?2 IS NULL OR event_type = ?2)
                 ORDER BY created_at DESC, rowid DESC LIMIT ?3",
                EVENT_COLUMNS
            ))
            .map_err(storage_err("Failed to prepare events query"))?;
        let limit = if query.limit == 0 { 50 } else { query.limit };
        let rows = stmt
            .query_map(
                params![
                    query.patient_id,
                    query.event_type.map(|t| t.as_str()),
                    limit as i64
                ],
                row_to_event,
            )
            .map_err(storage_err("Failed to query events"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("Failed to read events"))
    }

    fn find_open_workflow(&self, kind: WorkflowKind, subject_id: &str) -> Result<Option<WorkflowRecord>> {
        let conn = self.conn()?;
        let open: Vec<&str> = WorkflowStatus::NON_TERMINAL.iter().map(|s| s.as_str()).collect();
        conn.query_row(
            &format!(
                "SELECT {} FROM workflows
                 WHERE kind = ?1 AND subject_id = ?2 AND status IN (?3, ?4, ?5)
                 ORDER BY created_at DESC LIMIT 1",
                WORKFLOW_COLUMNS
            ),
            params![kind.as_str(), subject_id, open[0], open[1], open[2]],
            row_to_workflow,
        )
        .optional()
        .map_err(storage_err("Failed to query open workflow"))
    }

    fn insert_workflow(&self, record: &WorkflowRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO workflows ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                WORKFLOW_COLUMNS
            ),
            params![
                record.id,
                record.kind.as_str(),
                record.subject_id,
                record.patient_id,
                record.status.as_str(),
                record.data.to_string(),
                ts(&record.created_at),
                ts(&record.updated_at),
            ],
        )
        .map_err(storage_err("Failed to insert workflow"))?;
        Ok(())
    }

    fn workflow(&self, id: &str) -> Result<Option<WorkflowRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM workflows WHERE id = ?1", WORKFLOW_COLUMNS),
            params![id],
            row_to_workflow,
        )
        .optional()
        .map_err(storage_err("Failed to read workflow"))
    }

    fn workflows(&self, kind: WorkflowKind, patient_id: Option<&str>) -> Result<Vec<WorkflowRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM workflows WHERE kind = ?1 AND (?2 IS NULL OR patient_id = ?2)
                 ORDER BY created_at DESC",
                WORKFLOW_COLUMNS
            ))
            .map_err(storage_err("Failed to prepare workflows query"))?;
        let rows = stmt
            .query_map(params![kind.as_str(), patient_id], row_to_workflow)
            .map_err(storage_err("Failed to query workflows"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("Failed to read workflows"))
    }

    fn update_workflow(&self, id: &str, status: WorkflowStatus, data: &Value) -> Result<WorkflowRecord> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE workflows SET status = ?1, data = ?2, updated_at = ?3 WHERE id = ?4",
                params![status.as_str(), data.to_string(), ts(&Utc::now()), id],
            )
            .map_err(storage_err("Failed to update workflow"))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("workflow {}", id)));
        }
        conn.query_row(
            &format!("SELECT {} FROM workflows WHERE id = ?1", WORKFLOW_COLUMNS),
            params![id],
            row_to_workflow,
        )
        .map_err(storage_err("Failed to read workflow"))
    }

    fn doctors(&self) -> Result<Vec<Doctor>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, name, specialty FROM doctors ORDER BY name")
            .map_err(storage_err("Failed to prepare doctors query"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Doctor {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    specialty: row.get(2)?,
                })
            })
            .map_err(storage_err("Failed to query doctors"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("Failed to read doctors"))
    }

    fn upsert_doctor(&self, doctor: &Doctor) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO doctors (id, name, specialty) VALUES (?1, ?2, ?3)",
            params![doctor.id, doctor.name, doctor.specialty],
        )
        .map_err(storage_err("Failed to upsert doctor"))?;
        Ok(())
    }

    fn appointments(&self, patient_id: &str) -> Result<Vec<Appointment>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM appointments WHERE patient_id = ?1 ORDER BY date, time",
                APPOINTMENT_COLUMNS
            ))
            .map_err(storage_err("Failed to prepare appointments query"))?;
        let rows = stmt
            .query_map(params![patient_id], row_to_appointment)
            .map_err(storage_err("Failed to query appointments"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("Failed to read appointments"))
    }

    fn appointment(&self, id: &str) -> Result<Option<Appointment>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM appointments WHERE id = ?1", APPOINTMENT_COLUMNS),
            params![id],
            row_to_appointment,
        )
        .optional()
        .map_err(storage_err("Failed to read appointment"))
    }

    fn booked_slots(&self, doctor_id: &str, date: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT time FROM appointments
                 WHERE doctor_id = ?1 AND date = ?2 AND status IN ('pending', 'accepted')",
            )
            .map_err(storage_err("Failed to prepare slots query"))?;
        let rows = stmt
            .query_map(params![doctor_id, date], |row| row.get::<_, String>(0))
            .map_err(storage_err("Failed to query slots"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("Failed to read slots"))
    }

    fn insert_appointment(&self, appointment: &Appointment) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO appointments ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                APPOINTMENT_COLUMNS
            ),
            params![
                appointment.id,
                appointment.patient_id,
                appointment.doctor_id,
                appointment.doctor_name,
                appointment.date,
                appointment.time,
                appointment.reason,
                appointment.status,
            ],
        )
        .map_err(storage_err("Failed to insert appointment"))?;
        Ok(())
    }
}
