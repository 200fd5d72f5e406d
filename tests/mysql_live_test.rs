//! Tests against a real MySQL/MariaDB server.
//!
//! Set TEST_MYSQL_CNF to an option file with a `[client]` group to run them.
//! Example: TEST_MYSQL_CNF=/etc/mysql/test-client.cnf

use mariadb_pool::config::{PluginConfig, ProfileConfig};
use mariadb_pool::db::QueryExecutor;
use mariadb_pool::models::Value;
use mariadb_pool::DbService;

fn start() -> Option<DbService> {
    let cnf = match std::env::var("TEST_MYSQL_CNF") {
        Ok(cnf) => cnf,
        Err(_) => {
            eprintln!("Skipping test: TEST_MYSQL_CNF not set");
            return None;
        }
    };
    // One connection so temporary tables stay visible across calls.
    let config = PluginConfig::single(ProfileConfig {
        cnf: Some(cnf.into()),
        pool_size: Some(1.into()),
        read_timeout: Some(30.into()),
        ..Default::default()
    });
    Some(DbService::start(&config, 1).unwrap())
}

fn query(service: &DbService, sql: &str) -> Value {
    service.mysql_query(&[Value::from(sql)]).unwrap()
}

#[test]
fn test_live_select_one() {
    let Some(service) = start() else { return };

    let value = query(&service, "SELECT 1 AS x");
    assert_eq!(
        serde_json::to_string(&value).unwrap(),
        r#"{"result":[{"x":"1"}],"affected":0}"#
    );

    service.shutdown();
}

#[test]
fn test_live_nulls_and_column_order() {
    let Some(service) = start() else { return };

    let value = query(&service, "SELECT NULL AS b, 'two' AS a, '' AS c");
    let row = value.get("result").and_then(|r| r.index(0)).unwrap();
    let names: Vec<_> = row
        .entries()
        .iter()
        .map(|(k, _)| k.as_str().unwrap())
        .collect();
    assert_eq!(names, ["b", "a", "c"]);
    assert!(row.get("b").unwrap().is_none());
    assert_eq!(row.get("c").and_then(Value::as_bytes), Some(&b""[..]));

    service.shutdown();
}

#[test]
fn test_live_write_and_escape_round_trip() {
    let Some(service) = start() else { return };

    query(
        &service,
        "CREATE TEMPORARY TABLE pool_live (id INT PRIMARY KEY, v VARBINARY(64))",
    );
    let nasty = b"it's \"quoted\" \\ \0 \x1a \n end";
    let escaped = service
        .mysql_escape_string(&[Value::string(nasty.to_vec())])
        .unwrap();

    let mut insert = b"INSERT INTO pool_live VALUES (1, '".to_vec();
    insert.extend_from_slice(escaped.as_bytes().unwrap());
    insert.extend_from_slice(b"')");
    let value = service.mysql_query(&[Value::string(insert)]).unwrap();
    assert_eq!(value.get("affected").and_then(Value::as_number), Some(1.0));

    let value = query(&service, "SELECT v FROM pool_live WHERE id = 1");
    let row = value.get("result").and_then(|r| r.index(0)).unwrap();
    assert_eq!(row.get("v").and_then(Value::as_bytes), Some(&nasty[..]));

    let value = query(&service, "UPDATE pool_live SET v = 'x' WHERE id = 99");
    assert_eq!(value.get("affected").and_then(Value::as_number), Some(0.0));
    assert_eq!(value.get("result").map(Value::len), Some(0));

    service.shutdown();
}

#[test]
fn test_live_syntax_error_shape() {
    let Some(service) = start() else { return };

    let value = query(&service, "SELEC 1");
    assert_eq!(value.get("errno").and_then(Value::as_number), Some(1064.0));
    assert_eq!(value.get("sqlstate").and_then(Value::as_str), Some("42000"));

    // The connection survives the failure.
    let value = query(&service, "SELECT 1 AS x");
    assert!(value.get("result").is_some());

    service.shutdown();
}

#[test]
fn test_live_empty_select_keeps_columns() {
    let Some(service) = start() else { return };
    let entry = service.registry().default_profile().unwrap();

    let outcome = QueryExecutor::new()
        .execute(entry, b"SELECT 1 AS x, 2 AS y FROM DUAL WHERE 1 = 0")
        .unwrap();
    let result = outcome.result_set().unwrap();
    assert_eq!(result.columns, ["x", "y"]);
    assert!(result.rows.is_empty());

    let outcome = QueryExecutor::new().execute(entry, b"DO 1").unwrap();
    assert!(!outcome.result_set().unwrap().has_columns());

    service.shutdown();
}

#[test]
fn test_live_invalid_utf8_keeps_session() {
    let Some(service) = start() else { return };
    let entry = service.registry().default_profile().unwrap();
    let before = entry.pool().stats();

    let outcome = QueryExecutor::new()
        .execute(entry, b"SELECT '\xff'")
        .unwrap();
    assert_eq!(outcome.error().map(|e| e.errno), Some(1300));

    // Same session, nothing repaired.
    let value = query(&service, "SELECT 1 AS x");
    assert!(value.get("result").is_some());
    assert_eq!(entry.pool().stats().repairs, before.repairs);

    service.shutdown();
}
