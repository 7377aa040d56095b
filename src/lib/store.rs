//! SQLite persistence of sample traces.
//!
//! Each site of each draw gets a row in `Sites`; its values are flattened
//! in row-major order into `Samples`, and the shape needed to rebuild the
//! array is kept once per site in `Shapes`. Non-finite values are stored
//! as NULL and read back as NaN.

use std::collections::HashMap;
use std::path::PathBuf;

use indoc::indoc;
use ndarray::{ArrayD, IxDyn};
use rusqlite::ToSql;
use unindent::unindent;

use crate::errors::*;
use crate::trace::{SiteKind, SiteRecord, Trace};

const SITES_SQL: &str = "INSERT INTO Sites VALUES (?,?,?,?);";
const SAMPLES_SQL: &str = "INSERT INTO Samples VALUES (?,?,?,?);";
const SHAPES_SQL: &str = indoc!("
    INSERT OR IGNORE INTO Shapes VALUES (?, ?);
");

/// Tables and columns, in the order `db_table_to_json_object` dumps them.
pub const TABLES: &[(&str, &[&str])] = &[
    ("Meta", &["key", "value"]),
    ("Sites", &["draw", "site", "kind", "log_prob"]),
    ("Samples", &["draw", "site", "idx", "value"]),
    ("Shapes", &["site", "shape"]),
];

/// Opens a new database at `output_path`, which must not exist yet, or an
/// in-memory database.
pub fn open_output(output_path: Option<&str>) -> Result<rusqlite::Connection> {
    match output_path {
        Some(output_path) => {
            let db_path: PathBuf = output_path.into();
            if db_path.exists() {
                return Err(Error::OutputExists(output_path.into()));
            }
            Ok(rusqlite::Connection::open(db_path)?)
        },
        None => Ok(rusqlite::Connection::open_in_memory()?),
    }
}

pub fn create_tables(db_transaction: &rusqlite::Transaction) -> Result<()> {
    db_transaction.execute_batch(&unindent("
        CREATE TABLE Meta (key TEXT, value);
        CREATE TABLE Sites (draw INTEGER, site TEXT, kind TEXT, log_prob REAL);
        CREATE TABLE Samples (draw INTEGER, site TEXT, idx INTEGER, value REAL);
        CREATE TABLE Shapes (site TEXT NOT NULL PRIMARY KEY, shape TEXT);
    "))?;
    Ok(())
}

pub fn write_meta<T: ToSql>(db_transaction: &rusqlite::Transaction, key: &str, value: T) -> Result<()> {
    db_transaction.execute(
        "INSERT INTO Meta VALUES (?, ?);",
        rusqlite::params![key, value]
    )?;
    Ok(())
}

pub fn write_traces(db_transaction: &rusqlite::Transaction, traces: &[Trace]) -> Result<()> {
    let mut insert_site = db_transaction.prepare(SITES_SQL)?;
    let mut insert_sample = db_transaction.prepare(SAMPLES_SQL)?;
    let mut insert_shape = db_transaction.prepare(SHAPES_SQL)?;
    for (draw, trace) in traces.iter().enumerate() {
        let draw = draw as i64;
        for (site, record) in trace.iter() {
            insert_site.execute(
                rusqlite::params![draw, site, record.kind.as_str(), finite(record.log_prob)]
            )?;
            insert_shape.execute(
                rusqlite::params![site, serde_json::to_string(record.value.shape())?]
            )?;
            for (idx, value) in record.value.iter().enumerate() {
                insert_sample.execute(
                    rusqlite::params![draw, site, idx as i64, finite(*value)]
                )?;
            }
        }
    }
    Ok(())
}

fn finite(x: f64) -> Option<f64> {
    if x.is_finite() { Some(x) } else { None }
}

pub fn load_traces(conn: &rusqlite::Connection) -> Result<Vec<Trace>> {
    let mut shapes: HashMap<String, Vec<usize>> = HashMap::new();
    let mut stmt = conn.prepare("SELECT site, shape FROM Shapes;")?;
    let rows = stmt.query_map(rusqlite::params![], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (site, shape) = row?;
        shapes.insert(site, serde_json::from_str(&shape)?);
    }

    let mut values: HashMap<(i64, String), Vec<f64>> = HashMap::new();
    let mut stmt = conn.prepare("SELECT draw, site, value FROM Samples ORDER BY draw, site, idx;")?;
    let rows = stmt.query_map(rusqlite::params![], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, Option<f64>>(2)?))
    })?;
    for row in rows {
        let (draw, site, value) = row?;
        values.entry((draw, site)).or_insert_with(Vec::new).push(value.unwrap_or(f64::NAN));
    }

    let mut traces: Vec<Trace> = vec![];
    let mut stmt = conn.prepare("SELECT draw, site, kind, log_prob FROM Sites ORDER BY rowid;")?;
    let rows = stmt.query_map(rusqlite::params![], |row| {
        Ok((
            row.get::<_, i64>(0)?, row.get::<_, String>(1)?,
            row.get::<_, String>(2)?, row.get::<_, Option<f64>>(3)?,
        ))
    })?;
    for row in rows {
        let (draw, site, kind, log_prob) = row?;
        let kind = SiteKind::parse(&kind).ok_or_else(|| Error::MissingSite(site.clone()))?;
        let shape = shapes.get(&site).ok_or_else(|| Error::MissingSite(site.clone()))?;
        let flat = values.remove(&(draw, site.clone())).unwrap_or_default();
        let value = ArrayD::from_shape_vec(IxDyn(shape), flat).map_err(
            |_| Error::shape_mismatch(&format!("stored site {}", site), shape, &[])
        )?;
        let draw = draw as usize;
        while traces.len() <= draw {
            traces.push(Trace::new());
        }
        traces[draw].insert(&site, SiteRecord {
            kind,
            value,
            log_prob: log_prob.unwrap_or(f64::NEG_INFINITY),
        })?;
    }
    Ok(traces)
}
