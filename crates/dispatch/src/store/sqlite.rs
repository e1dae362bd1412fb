//! SQLite store backend.
//!
//! One database holds hospitals, listings, drivers and transport requests,
//! so a single [`SqliteStore`] implements every store trait. The connection sits
//! behind a mutex; each call is one short statement or transaction.
//!
//! # Schema
//!
//! - `hospitals`: registry, names unique without regard to ASCII case
//! - `organ_listings`: listing fields, statuses as their canonical strings
//! - `drivers`: driver fields plus `active_request_id` (capacity slot)
//! - `transport_requests`: request fields plus `history` (JSON array of
//!   hash-chained transitions)

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use lifelink_core::Clock;
use lifelink_domain::{
    AvailabilityStatus, DispatchError, Driver, DriverContact, DriverId, Hospital, HospitalId,
    ListingId, NewDriver, NewHospital, NewListing, NewTransportRequest, OrganListing, RequestId,
    RequestStatus, Result, StatusTransition, TransportRequest,
};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, info};

use super::{
    ensure_listing_available, lock_error, next_update_stamp, DriverRegistry, HospitalRegistry,
    ListingFilter, ListingStore, RequestLedger, RequestMutator,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS hospitals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    city TEXT NOT NULL,
    state TEXT NOT NULL,
    email TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS organ_listings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    hospital_id INTEGER NOT NULL,
    hospital_name TEXT NOT NULL,
    organ_type TEXT NOT NULL,
    blood_type TEXT NOT NULL,
    donor_age INTEGER NOT NULL,
    donor_weight_kg REAL NOT NULL,
    priority_status TEXT NOT NULL,
    availability_status TEXT NOT NULL,
    city TEXT NOT NULL,
    state TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS drivers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    email TEXT NOT NULL,
    phone TEXT NOT NULL,
    cdl TEXT NOT NULL,
    active_request_id INTEGER
);

CREATE TABLE IF NOT EXISTS transport_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    listing_id INTEGER REFERENCES organ_listings(id),
    hospital TEXT NOT NULL,
    organ_type TEXT NOT NULL,
    origin TEXT NOT NULL,
    destination TEXT NOT NULL,
    contact_phone TEXT NOT NULL,
    notes TEXT NOT NULL,
    priority_status TEXT NOT NULL,
    status TEXT NOT NULL,
    driver_id INTEGER REFERENCES drivers(id),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    history TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_hospitals_name ON hospitals(name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_listings_hospital ON organ_listings(hospital_name);
CREATE INDEX IF NOT EXISTS idx_requests_status ON transport_requests(status);
CREATE INDEX IF NOT EXISTS idx_requests_hospital ON transport_requests(hospital);
CREATE INDEX IF NOT EXISTS idx_requests_driver ON transport_requests(driver_id);
"#;

const LISTING_COLUMNS: &str = "id, hospital_id, hospital_name, organ_type, blood_type, donor_age, \
     donor_weight_kg, priority_status, availability_status, city, state, created_at";

const HOSPITAL_COLUMNS: &str = "id, name, city, state, email";

const DRIVER_COLUMNS: &str = "id, first_name, last_name, email, phone, cdl, active_request_id";

const REQUEST_COLUMNS: &str = "id, listing_id, hospital, organ_type, origin, destination, \
     contact_phone, notes, priority_status, status, driver_id, created_at, updated_at, history";

/// Map rusqlite failures into the dispatch taxonomy
trait SqlResultExt<T> {
    fn storage(self) -> Result<T>;
}

impl<T> SqlResultExt<T> for rusqlite::Result<T> {
    fn storage(self) -> Result<T> {
        self.map_err(|e| DispatchError::Storage(e.to_string()))
    }
}

/// Durable store for all dispatch entities
pub struct SqliteStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Create or open a database file
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening dispatch database");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DispatchError::Storage(e.to_string()))?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .storage()?;

        // WAL for durability with concurrent readers
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .storage()?;
        conn.pragma_update(None, "synchronous", "NORMAL").storage()?;

        Self::init(conn, clock)
    }

    /// Open a private in-memory database (tests, demos)
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open_in_memory().storage()?;
        Self::init(conn, clock)
    }

    fn init(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON").storage()?;
        conn.execute_batch(SCHEMA).storage()?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(lock_error)
    }

    fn load_listing(conn: &Connection, id: ListingId) -> Result<Option<OrganListing>> {
        conn.query_row(
            &format!("SELECT {LISTING_COLUMNS} FROM organ_listings WHERE id = ?1"),
            params![id.get()],
            listing_from_row,
        )
        .optional()
        .storage()
    }

    fn load_hospital(
        conn: &Connection,
        sql: &str,
        arg: &dyn rusqlite::ToSql,
    ) -> Result<Option<Hospital>> {
        conn.query_row(sql, params![arg], hospital_from_row)
            .optional()
            .storage()
    }

    fn load_driver(conn: &Connection, id: DriverId) -> Result<Option<Driver>> {
        conn.query_row(
            &format!("SELECT {DRIVER_COLUMNS} FROM drivers WHERE id = ?1"),
            params![id.get()],
            driver_from_row,
        )
        .optional()
        .storage()
    }

    fn load_request(conn: &Connection, id: RequestId) -> Result<Option<TransportRequest>> {
        conn.query_row(
            &format!("SELECT {REQUEST_COLUMNS} FROM transport_requests WHERE id = ?1"),
            params![id.get()],
            request_from_row,
        )
        .optional()
        .storage()
    }

    fn query_drivers(&self, sql: &str) -> Result<Vec<Driver>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).storage()?;
        let rows = stmt.query_map([], driver_from_row).storage()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().storage()
    }

    fn query_requests(&self, sql: &str, args: &[String]) -> Result<Vec<TransportRequest>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).storage()?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), request_from_row)
            .storage()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().storage()
    }
}

fn parse_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = DispatchError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn hospital_from_row(row: &Row<'_>) -> rusqlite::Result<Hospital> {
    Ok(Hospital {
        id: HospitalId(row.get(0)?),
        name: row.get(1)?,
        city: row.get(2)?,
        state: row.get(3)?,
        email: row.get(4)?,
    })
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<OrganListing> {
    Ok(OrganListing {
        id: ListingId(row.get(0)?),
        hospital_id: HospitalId(row.get(1)?),
        hospital_name: row.get(2)?,
        organ_type: row.get(3)?,
        blood_type: row.get(4)?,
        donor_age: row.get(5)?,
        donor_weight_kg: row.get(6)?,
        priority: parse_text(row, 7)?,
        availability: parse_text(row, 8)?,
        city: row.get(9)?,
        state: row.get(10)?,
        created_at: row.get::<_, i64>(11)? as u64,
    })
}

fn driver_from_row(row: &Row<'_>) -> rusqlite::Result<Driver> {
    Ok(Driver {
        id: DriverId(row.get(0)?),
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        cdl: row.get(5)?,
        active_request: row.get::<_, Option<i64>>(6)?.map(RequestId),
    })
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<TransportRequest> {
    let history_json: String = row.get(13)?;
    let history: Vec<StatusTransition> = serde_json::from_str(&history_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(13, Type::Text, Box::new(e)))?;

    Ok(TransportRequest {
        id: RequestId(row.get(0)?),
        listing_id: row.get::<_, Option<i64>>(1)?.map(ListingId),
        hospital: row.get(2)?,
        organ_type: row.get(3)?,
        origin: row.get(4)?,
        destination: row.get(5)?,
        contact_phone: row.get(6)?,
        notes: row.get(7)?,
        priority: parse_text(row, 8)?,
        status: parse_text(row, 9)?,
        driver_id: row.get::<_, Option<i64>>(10)?.map(DriverId),
        created_at: row.get::<_, i64>(11)? as u64,
        updated_at: row.get::<_, i64>(12)? as u64,
        history,
    })
}

fn history_json(request: &TransportRequest) -> Result<String> {
    serde_json::to_string(&request.history).map_err(|e| DispatchError::Storage(e.to_string()))
}

impl HospitalRegistry for SqliteStore {
    fn register(&self, hospital: NewHospital) -> Result<HospitalId> {
        hospital.validate()?;
        let record = hospital.into_hospital(HospitalId(0));
        let conn = self.conn()?;

        let existing = Self::load_hospital(
            &conn,
            &format!("SELECT {HOSPITAL_COLUMNS} FROM hospitals WHERE name = ?1 COLLATE NOCASE"),
            &record.name,
        )?;
        if existing.is_some() {
            return Err(DispatchError::InvalidRequest(format!(
                "hospital {:?} is already registered",
                record.name
            )));
        }

        conn.execute(
            "INSERT INTO hospitals (name, city, state, email) VALUES (?1, ?2, ?3, ?4)",
            params![record.name, record.city, record.state, record.email],
        )
        .storage()?;

        let id = HospitalId(conn.last_insert_rowid());
        debug!(hospital_id = %id, "Hospital registered");
        Ok(id)
    }

    fn get(&self, id: HospitalId) -> Result<Hospital> {
        let conn = self.conn()?;
        Self::load_hospital(
            &conn,
            &format!("SELECT {HOSPITAL_COLUMNS} FROM hospitals WHERE id = ?1"),
            &id.get(),
        )?
        .ok_or(DispatchError::hospital_not_found(id))
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Hospital>> {
        let conn = self.conn()?;
        Self::load_hospital(
            &conn,
            &format!("SELECT {HOSPITAL_COLUMNS} FROM hospitals WHERE name = ?1 COLLATE NOCASE"),
            &name.trim(),
        )
    }

    fn list(&self) -> Result<Vec<Hospital>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {HOSPITAL_COLUMNS} FROM hospitals ORDER BY lower(name), id"
            ))
            .storage()?;
        let rows = stmt.query_map([], hospital_from_row).storage()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().storage()
    }
}

impl ListingStore for SqliteStore {
    fn publish(&self, listing: NewListing) -> Result<ListingId> {
        listing.validate()?;
        let created_at = self.clock.now();
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO organ_listings (
                hospital_id, hospital_name, organ_type, blood_type, donor_age,
                donor_weight_kg, priority_status, availability_status, city, state, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                listing.hospital_id.get(),
                listing.hospital_name,
                listing.organ_type,
                listing.blood_type,
                listing.donor_age,
                listing.donor_weight_kg,
                listing.priority.as_str(),
                listing.availability.as_str(),
                listing.city,
                listing.state,
                created_at as i64,
            ],
        )
        .storage()?;

        let id = ListingId(conn.last_insert_rowid());
        debug!(listing_id = %id, "Listing published");
        Ok(id)
    }

    fn get(&self, id: ListingId) -> Result<OrganListing> {
        let conn = self.conn()?;
        Self::load_listing(&conn, id)?.ok_or(DispatchError::listing_not_found(id))
    }

    fn set_availability(&self, id: ListingId, status: AvailabilityStatus) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE organ_listings SET availability_status = ?1 WHERE id = ?2",
                params![status.as_str(), id.get()],
            )
            .storage()?;
        if changed == 0 {
            return Err(DispatchError::listing_not_found(id));
        }
        debug!(listing_id = %id, availability = %status, "Listing availability changed");
        Ok(())
    }

    fn list(&self, filter: &ListingFilter) -> Result<Vec<OrganListing>> {
        let mut sql = format!("SELECT {LISTING_COLUMNS} FROM organ_listings WHERE 1=1");
        let mut args: Vec<String> = Vec::new();

        if let Some(organ_type) = &filter.organ_type {
            sql.push_str(" AND lower(organ_type) = ?");
            args.push(organ_type.trim().to_lowercase());
        }
        if let Some(availability) = filter.availability {
            sql.push_str(" AND availability_status = ?");
            args.push(availability.as_str().to_string());
        }
        if let Some(hospital) = &filter.hospital_name {
            sql.push_str(" AND hospital_name = ?");
            args.push(hospital.clone());
        }
        if let Some(query) = filter.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            sql.push_str(
                " AND (lower(organ_type) LIKE ? OR lower(blood_type) LIKE ? \
                 OR lower(hospital_name) LIKE ? OR lower(city) LIKE ? OR lower(state) LIKE ?)",
            );
            let like = format!("%{}%", query.to_lowercase());
            args.extend(std::iter::repeat(like).take(5));
        }

        sql.push_str(
            " ORDER BY CASE priority_status \
               WHEN 'Emergency' THEN 1 \
               WHEN 'Critical' THEN 2 \
               WHEN 'Urgent' THEN 3 \
               ELSE 4 \
             END, created_at DESC, id DESC",
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql).storage()?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), listing_from_row)
            .storage()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().storage()
    }
}

impl DriverRegistry for SqliteStore {
    fn register(&self, driver: NewDriver) -> Result<DriverId> {
        driver.validate()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO drivers (first_name, last_name, email, phone, cdl) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                driver.first_name,
                driver.last_name,
                driver.email,
                driver.phone,
                driver.cdl
            ],
        )
        .storage()?;

        let id = DriverId(conn.last_insert_rowid());
        debug!(driver_id = %id, "Driver registered");
        Ok(id)
    }

    fn get(&self, id: DriverId) -> Result<Driver> {
        let conn = self.conn()?;
        Self::load_driver(&conn, id)?.ok_or(DispatchError::driver_not_found(id))
    }

    fn is_eligible(&self, id: DriverId) -> Result<bool> {
        Ok(DriverRegistry::get(self, id)?.is_eligible())
    }

    fn list_available(&self) -> Result<Vec<Driver>> {
        self.query_drivers(&format!(
            "SELECT {DRIVER_COLUMNS} FROM drivers WHERE active_request_id IS NULL \
             ORDER BY lower(first_name), lower(last_name), id"
        ))
    }

    fn list(&self) -> Result<Vec<Driver>> {
        self.query_drivers(&format!(
            "SELECT {DRIVER_COLUMNS} FROM drivers ORDER BY lower(first_name), lower(last_name), id"
        ))
    }

    fn update_contact(&self, id: DriverId, contact: DriverContact) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE drivers SET email = ?1, phone = ?2 WHERE id = ?3",
                params![contact.email, contact.phone, id.get()],
            )
            .storage()?;
        if changed == 0 {
            return Err(DispatchError::driver_not_found(id));
        }
        Ok(())
    }

    fn claim(&self, id: DriverId, request_id: RequestId) -> Result<()> {
        let conn = self.conn()?;
        // Compare-and-swap on the capacity slot
        let changed = conn
            .execute(
                "UPDATE drivers SET active_request_id = ?2 \
                 WHERE id = ?1 AND (active_request_id IS NULL OR active_request_id = ?2)",
                params![id.get(), request_id.get()],
            )
            .storage()?;
        if changed == 1 {
            return Ok(());
        }
        match Self::load_driver(&conn, id)? {
            Some(_) => Err(DispatchError::DriverUnavailable { driver_id: id }),
            None => Err(DispatchError::driver_not_found(id)),
        }
    }

    fn release(&self, id: DriverId, request_id: RequestId) -> Result<()> {
        let conn = self.conn()?;
        if Self::load_driver(&conn, id)?.is_none() {
            return Err(DispatchError::driver_not_found(id));
        }
        conn.execute(
            "UPDATE drivers SET active_request_id = NULL WHERE id = ?1 AND active_request_id = ?2",
            params![id.get(), request_id.get()],
        )
        .storage()?;
        Ok(())
    }
}

impl RequestLedger for SqliteStore {
    fn create(&self, request: NewTransportRequest) -> Result<RequestId> {
        request.validate()?;
        let created_at = self.clock.now();

        let mut conn = self.conn()?;
        let tx = conn.transaction().storage()?;

        if let Some(listing_id) = request.listing_id {
            let listing =
                Self::load_listing(&tx, listing_id)?.ok_or_else(|| DispatchError::InvalidListing {
                    listing_id,
                    reason: "listing does not exist".into(),
                })?;
            ensure_listing_available(&listing)?;
        }

        tx.execute(
            r#"
            INSERT INTO transport_requests (
                listing_id, hospital, organ_type, origin, destination, contact_phone, notes,
                priority_status, status, driver_id, created_at, updated_at, history
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10, ?10, '[]')
            "#,
            params![
                request.listing_id.map(ListingId::get),
                request.hospital,
                request.organ_type,
                request.origin,
                request.destination,
                request.contact_phone,
                request.notes,
                request.priority.as_str(),
                RequestStatus::Requested.as_str(),
                created_at as i64,
            ],
        )
        .storage()?;
        let id = RequestId(tx.last_insert_rowid());

        // The genesis history entry hashes the assigned id
        let record = TransportRequest::new(id, request, created_at);
        tx.execute(
            "UPDATE transport_requests SET history = ?1 WHERE id = ?2",
            params![history_json(&record)?, id.get()],
        )
        .storage()?;

        tx.commit().storage()?;
        debug!(request_id = %id, "Transport request created");
        Ok(id)
    }

    fn get(&self, id: RequestId) -> Result<TransportRequest> {
        let conn = self.conn()?;
        Self::load_request(&conn, id)?.ok_or(DispatchError::request_not_found(id))
    }

    fn list_by_status(&self, status: RequestStatus) -> Result<Vec<TransportRequest>> {
        self.query_requests(
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM transport_requests WHERE status = ?1 \
                 ORDER BY created_at ASC, id ASC"
            ),
            &[status.as_str().to_string()],
        )
    }

    fn list(&self) -> Result<Vec<TransportRequest>> {
        self.query_requests(
            &format!("SELECT {REQUEST_COLUMNS} FROM transport_requests ORDER BY created_at ASC, id ASC"),
            &[],
        )
    }

    fn update(&self, id: RequestId, mutator: RequestMutator<'_>) -> Result<TransportRequest> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().storage()?;

        let mut request =
            Self::load_request(&tx, id)?.ok_or(DispatchError::request_not_found(id))?;
        let stamp = next_update_stamp(request.updated_at, self.clock.now());
        let created_at = request.created_at;
        mutator(&mut request, stamp)?;
        request.id = id;
        request.created_at = created_at;
        request.updated_at = stamp;

        tx.execute(
            r#"
            UPDATE transport_requests
            SET listing_id = ?1, hospital = ?2, organ_type = ?3, origin = ?4,
                destination = ?5, contact_phone = ?6, notes = ?7, priority_status = ?8,
                status = ?9, driver_id = ?10, updated_at = ?11, history = ?12
            WHERE id = ?13
            "#,
            params![
                request.listing_id.map(ListingId::get),
                request.hospital,
                request.organ_type,
                request.origin,
                request.destination,
                request.contact_phone,
                request.notes,
                request.priority.as_str(),
                request.status.as_str(),
                request.driver_id.map(DriverId::get),
                request.updated_at as i64,
                history_json(&request)?,
                id.get(),
            ],
        )
        .storage()?;
        tx.commit().storage()?;

        debug!(request_id = %id, status = %request.status, "Transport request updated");
        Ok(request)
    }
}
