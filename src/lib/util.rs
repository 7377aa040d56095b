use crate::errors::*;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use rusqlite::types::ValueRef;
use std::iter::FromIterator;

pub fn read_data_from_stdin() -> Result<String> {
    let mut data = String::new();
    std::io::stdin().read_to_string(&mut data).map_err(
        |_| Error::InputReadFailure
    )?;
    Ok(data)
}

pub fn read_data_from_file(path_str: &str) -> Result<String> {
    let path = Path::new(path_str).canonicalize().map_err(
        |_| Error::InvalidInputPath(path_str.into())
    )?;
    let mut file = File::open(&path).map_err(
        |_| Error::InvalidInputFile(path_str.into())
    )?;
    let mut data = String::new();
    file.read_to_string(&mut data).map_err(
        |_| Error::InputReadFailure
    )?;
    Ok(data)
}

/// Reads JSON input from the file named by the first command-line
/// argument, or from stdin when there is none.
pub fn read_input(args: &[String]) -> Result<String> {
    if args.len() > 1 {
        read_data_from_file(&args[1])
    }
    else {
        read_data_from_stdin()
    }
}

pub fn db_table_to_json_object(
    conn: &rusqlite::Connection, table_name: &str,
    column_names: &[&str]
) -> Result<serde_json::Value> {
    let col_values_pairs = column_names.iter().map(|c| -> Result<(String, serde_json::Value)> {
        let mut stmt = conn.prepare(&format!("SELECT {} FROM {} ORDER BY rowid;", c, table_name))?;
        let values = stmt.query_map(rusqlite::params![], |row| {
            Ok(
                match row.get_raw(0) {
                    ValueRef::Null => {
                        serde_json::Value::Null
                    },
                    ValueRef::Integer(val) => {
                        val.into()
                    },
                    ValueRef::Real(val) => {
                        val.into()
                    },
                    ValueRef::Text(val) => {
                        serde_json::Value::String(String::from_utf8_lossy(val).into_owned())
                    },
                    // never written by the trace store
                    ValueRef::Blob(_) => {
                        serde_json::Value::Null
                    },
                }
            )
        })?.collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((String::from(*c), serde_json::Value::Array(values)))
    }).collect::<Result<Vec<_>>>()?;

    let map = serde_json::Map::from_iter(col_values_pairs);

    Ok(serde_json::Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_dump() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("
            CREATE TABLE T (a, b);
            INSERT INTO T VALUES (1, 'x');
            INSERT INTO T VALUES (2.5, NULL);
        ").unwrap();
        let json = db_table_to_json_object(&conn, "T", &["a", "b"]).unwrap();
        println!("{}", json);
        assert_eq!(json["a"], serde_json::json!([1, 2.5]));
        assert_eq!(json["b"], serde_json::json!(["x", null]));
    }

    #[test]
    fn test_missing_input_file() {
        match read_data_from_file("/nonexistent/seirtools/input.json") {
            Err(Error::InvalidInputPath(path)) => assert_eq!(path, "/nonexistent/seirtools/input.json"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
