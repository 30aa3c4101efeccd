use std::{collections::BTreeSet, env, fs, path::PathBuf, thread};

use pretty_assertions::assert_eq;
use procshift::{
    convert, convert_with, segmenter::segment, unit::Stmt, ConversionDirection, Dialect,
    DialectRegistry, EngineConfig, Error,
};
use tracing_subscriber::EnvFilter;

/// Send engine logs to the test harness. Set `RUST_LOG=procshift=debug` to
/// see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const DIALECTS: [Dialect; 3] = [Dialect::SqlServer, Dialect::PostgreSql, Dialect::MySql];

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Every fixture under `tests/fixtures/<dialect>/`, with its dialect.
/// Expected outputs, named `<name>.<target>.sql`, are skipped.
fn fixtures() -> Vec<(Dialect, PathBuf, String)> {
    let root = fixture_root();
    let root = root.to_str().expect("fixture path is not valid UTF-8");
    let mut out = vec![];
    for (dir, dialect) in [
        ("sqlserver", Dialect::SqlServer),
        ("postgresql", Dialect::PostgreSql),
        ("mysql", Dialect::MySql),
    ] {
        for entry in glob::glob(&format!("{}/{}/*.sql", root, dir)).expect("failed to read glob pattern") {
            let path = entry.expect("failed to read glob entry");
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if stem.contains('.') {
                continue;
            }
            let sql = fs::read_to_string(&path).expect("failed to read fixture");
            out.push((dialect, path, sql));
        }
    }
    assert!(out.len() >= 12, "missing fixtures under {}", root);
    out
}

/// Text that every routine written for `target` contains.
fn target_marker(target: Dialect) -> &'static str {
    match target {
        Dialect::SqlServer => "\nAS\nBEGIN\n",
        Dialect::PostgreSql => "LANGUAGE plpgsql",
        Dialect::MySql => "DELIMITER ;",
    }
}

#[test]
fn every_fixture_converts_in_every_direction() {
    init_tracing();
    for (source, path, sql) in fixtures() {
        let unit = segment(&sql, source).unwrap_or_else(|err| {
            err.emit();
            panic!("failed to segment {:?}", path);
        });
        for target in DIALECTS.into_iter().filter(|&d| d != source) {
            println!("Converting {:?} to {}", path, target);
            let result = convert(&sql, source, target)
                .unwrap_or_else(|err| panic!("failed to convert {:?} to {}: {}", path, target, err));
            let text = &result.converted_text;
            assert!(text.contains(target_marker(target)), "{}", text);
            assert!(text.contains(&unit.header.name), "{}", text);
            assert!(text.starts_with("-- Converted from"), "{}", text);
            for warning in &result.warnings {
                assert!(!warning.reason.is_empty());
            }
        }
    }
}

/// Compares each conversion with `tests/fixtures/<source>/<name>.<target>.sql`.
/// Run with `PROCSHIFT_BLESS=1` to rewrite the expected files instead.
#[test]
fn converted_fixtures_match_expected_output() {
    init_tracing();
    let root = fixture_root();
    let pattern = format!("{}/*/*.*.sql", root.to_str().expect("fixture path is not valid UTF-8"));
    let bless = env::var_os("PROCSHIFT_BLESS").is_some();
    let mut covered = BTreeSet::new();
    for entry in glob::glob(&pattern).expect("failed to read glob pattern") {
        let expected_path = entry.expect("failed to read glob entry");
        let source: Dialect = expected_path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .expect("fixture directory is not a dialect")
            .parse()
            .unwrap();
        let stem = expected_path.file_stem().and_then(|s| s.to_str()).unwrap();
        let (name, target) = stem.rsplit_once('.').unwrap();
        let target: Dialect = target.parse().unwrap();
        let source_path = expected_path.with_file_name(format!("{}.sql", name));
        let sql = fs::read_to_string(&source_path)
            .unwrap_or_else(|err| panic!("failed to read {:?}: {}", source_path, err));

        println!("Comparing {:?}", expected_path);
        let result = convert(&sql, source, target)
            .unwrap_or_else(|err| panic!("failed to convert {:?} to {}: {}", source_path, target, err));
        if bless {
            fs::write(&expected_path, &result.converted_text).expect("failed to write expected output");
        } else {
            let expected = fs::read_to_string(&expected_path).expect("failed to read expected output");
            assert_eq!(result.converted_text, expected, "{:?}", expected_path);
        }
        covered.insert(ConversionDirection::new(source, target).unwrap());
    }
    for direction in ConversionDirection::all() {
        assert!(covered.contains(&direction), "no expected output for {}", direction);
    }
}

#[test]
fn conversion_is_deterministic_across_threads() {
    init_tracing();
    let (source, _, sql) = fixtures()
        .into_iter()
        .find(|(d, path, _)| *d == Dialect::SqlServer && path.ends_with("update_order_status.sql"))
        .expect("missing fixture");
    let expected = convert(&sql, source, Dialect::MySql).unwrap();
    let handles = (0..4)
        .map(|_| {
            let sql = sql.clone();
            thread::spawn(move || convert(&sql, source, Dialect::MySql).unwrap())
        })
        .collect::<Vec<_>>();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn select_procedure_becomes_plpgsql_function() {
    init_tracing();
    let result = convert(
        "CREATE PROCEDURE dbo.GetEmployeeById @EmployeeId INT AS BEGIN SELECT * FROM Employees WHERE EmployeeId = @EmployeeId END",
        Dialect::SqlServer,
        Dialect::PostgreSql,
    )
    .unwrap();
    let text = &result.converted_text;
    assert!(text.contains("FUNCTION GetEmployeeById("), "{}", text);
    assert!(text.contains("employee_id integer"), "{}", text);
    assert!(text.contains("RETURN QUERY"), "{}", text);
    assert!(text.contains("AS $$"), "{}", text);
    assert!(text.contains("LANGUAGE plpgsql"), "{}", text);
    assert!(!text.contains("@EmployeeId"), "{}", text);
}

#[test]
fn identity_reads_follow_the_target() {
    init_tracing();
    let sql = "\
CREATE PROCEDURE dbo.CreateProduct
    @Name NVARCHAR(100),
    @ProductId INT OUTPUT
AS
BEGIN
    INSERT INTO Products (Name) VALUES (@Name);
    SET @ProductId = SCOPE_IDENTITY();
END";
    let pg = convert(sql, Dialect::SqlServer, Dialect::PostgreSql).unwrap();
    assert!(pg.converted_text.contains("RETURNING"), "{}", pg.converted_text);
    assert!(!pg.converted_text.contains("SCOPE_IDENTITY"), "{}", pg.converted_text);

    let mysql = convert(sql, Dialect::SqlServer, Dialect::MySql).unwrap();
    assert!(
        mysql.converted_text.contains("SET p_product_id = LAST_INSERT_ID();"),
        "{}",
        mysql.converted_text
    );
    assert!(mysql.converted_text.contains("OUT p_product_id INT"), "{}", mysql.converted_text);
}

#[test]
fn null_coalescing_round_trip_warns_on_nary_coalesce() {
    init_tracing();
    let to_pg = convert(
        "CREATE PROCEDURE p @x INT AS BEGIN SELECT ISNULL(@x, 0) AS v END",
        Dialect::SqlServer,
        Dialect::PostgreSql,
    )
    .unwrap();
    assert!(to_pg.converted_text.contains("COALESCE(x, 0)"), "{}", to_pg.converted_text);

    let sql = "\
CREATE FUNCTION f(a integer, b integer) RETURNS void AS $$
BEGIN
    UPDATE t SET x = COALESCE(a, 0), y = COALESCE(a, b, 0);
END;
$$ LANGUAGE plpgsql;";
    let to_ss = convert(sql, Dialect::PostgreSql, Dialect::SqlServer).unwrap();
    assert!(to_ss.converted_text.contains("ISNULL(@A, 0)"), "{}", to_ss.converted_text);
    assert!(to_ss.converted_text.contains("COALESCE(@A, @B, 0)"), "{}", to_ss.converted_text);
    assert!(
        to_ss
            .warnings
            .iter()
            .any(|w| w.original_fragment.contains("COALESCE(") && w.reason.contains("more than two")),
        "{:#?}",
        to_ss.warnings
    );
}

#[test]
fn one_unsupported_construct_is_a_warning() {
    init_tracing();
    let sql = "\
CREATE PROCEDURE dbo.CloseOrders
AS
BEGIN
    DECLARE order_cursor CURSOR FOR SELECT Id FROM Orders;
    OPEN order_cursor;
    UPDATE Orders SET Closed = 1;
END";
    for target in [Dialect::PostgreSql, Dialect::MySql] {
        let result = convert(sql, Dialect::SqlServer, target).unwrap();
        assert!(!result.converted_text.is_empty());
        assert!(result.converted_text.contains("OPEN order_cursor"), "{}", result.converted_text);
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.original_fragment.contains("order_cursor")),
            "{:#?}",
            result.warnings
        );
    }
}

#[test]
fn identical_or_unregistered_directions_fail() {
    for dialect in DIALECTS {
        assert!(matches!(
            convert("CREATE PROCEDURE p AS SELECT 1", dialect, dialect),
            Err(Error::UnsupportedDirection { .. })
        ));
    }
    let empty = DialectRegistry::empty();
    let err = convert_with(
        "CREATE PROCEDURE p AS SELECT 1",
        Dialect::SqlServer,
        Dialect::MySql,
        &empty,
        &EngineConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnsupportedDirection { .. }));

    let registry = DialectRegistry::builtin();
    assert_eq!(registry.directions().count(), 6);
    for direction in ConversionDirection::all() {
        assert!(registry.resolve(direction).is_ok());
    }
}

#[test]
fn malformed_units_fail() {
    let err = convert("SELECT 1", Dialect::SqlServer, Dialect::PostgreSql).unwrap_err();
    assert!(matches!(err, Error::MalformedUnit(_)));
    let err = convert(
        "CREATE PROCEDURE p() BEGIN BEGIN SELECT 1; END",
        Dialect::MySql,
        Dialect::SqlServer,
    )
    .unwrap_err();
    assert!(err.is_terminal_input_error());
}

/// A routine whose body is `depth` nested blocks around one statement,
/// followed by a second statement at the top level.
fn nested(dialect: Dialect, depth: usize) -> String {
    let (open, close, inner, outer) = match dialect {
        Dialect::SqlServer => ("BEGIN ", "END ", "SET @x = 1 ", "SET @y = 2 "),
        Dialect::PostgreSql => ("BEGIN ", "END; ", "x := 1; ", "y := 2; "),
        Dialect::MySql => ("BEGIN ", "END; ", "SET x = 1; ", "SET y = 2; "),
    };
    let body = format!("{}{}{}{}", open.repeat(depth), inner, close.repeat(depth), outer);
    match dialect {
        Dialect::SqlServer => format!("CREATE PROCEDURE p AS BEGIN {}END", body),
        Dialect::PostgreSql => format!(
            "CREATE FUNCTION p() RETURNS void AS $$ BEGIN {}END; $$ LANGUAGE plpgsql;",
            body
        ),
        Dialect::MySql => format!("CREATE PROCEDURE p() BEGIN {}END", body),
    }
}

#[test]
fn body_ends_at_the_outermost_end() {
    for dialect in DIALECTS {
        for depth in 0..=5 {
            let sql = nested(dialect, depth);
            let unit = segment(&sql, dialect).unwrap_or_else(|err| panic!("{}: {}", sql, err));
            assert_eq!(unit.body.len(), 2, "{}", sql);
            let mut stmt = &unit.body[0];
            let mut seen = 0;
            while let Stmt::Block(inner) = stmt {
                assert_eq!(inner.len(), 1, "{}", sql);
                stmt = &inner[0];
                seen += 1;
            }
            assert_eq!(seen, depth, "{}", sql);
            assert!(matches!(stmt, Stmt::Simple(_)), "{}", sql);
            assert!(matches!(&unit.body[1], Stmt::Simple(f) if f.text.contains('y')), "{}", sql);
        }
    }
}

/// A routine that only reads rows, written for `dialect`.
fn select_only(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::SqlServer => {
            "CREATE PROCEDURE GetEmployee @EmployeeId INT AS BEGIN SELECT Name FROM Employees WHERE Id = @EmployeeId END"
        }
        Dialect::PostgreSql => {
            "CREATE FUNCTION GetEmployee(employee_id integer) RETURNS TABLE (name text) AS $$ BEGIN RETURN QUERY SELECT e.name FROM employees e WHERE e.id = employee_id; END; $$ LANGUAGE plpgsql;"
        }
        Dialect::MySql => {
            "CREATE PROCEDURE GetEmployee(IN employee_id INT) BEGIN SELECT name FROM employees WHERE id = employee_id; END"
        }
    }
}

/// Parameter names without sigils, prefixes or case.
fn plain(name: &str) -> String {
    let name = name.trim_start_matches('@').to_ascii_lowercase();
    let name = name.strip_prefix("p_").unwrap_or(&name);
    name.replace('_', "")
}

#[test]
fn round_trips_keep_the_header() {
    init_tracing();
    for a in DIALECTS {
        let original = segment(select_only(a), a).unwrap();
        for b in DIALECTS.into_iter().filter(|&d| d != a) {
            let there = convert(select_only(a), a, b).unwrap();
            let back = convert(&there.converted_text, b, a)
                .unwrap_or_else(|err| panic!("{} -> {}:\n{}\n{}", a, b, there.converted_text, err));
            let unit = segment(&back.converted_text, a)
                .unwrap_or_else(|err| panic!("{} -> {} -> {}:\n{}\n{}", a, b, a, back.converted_text, err));
            let context = format!("{} -> {} -> {}:\n{}", a, b, a, back.converted_text);
            assert!(unit.header.name.eq_ignore_ascii_case(&original.header.name), "{}", context);
            assert_eq!(unit.parameters.len(), original.parameters.len(), "{}", context);
            for (got, want) in unit.parameters.iter().zip(&original.parameters) {
                assert_eq!(plain(&got.name), plain(&want.name), "{}", context);
                assert_eq!(
                    got.data_type.to_ascii_uppercase(),
                    want.data_type.to_ascii_uppercase(),
                    "{}",
                    context
                );
            }
        }
    }
}

#[test]
fn leaving_the_body_label_returns_early() {
    init_tracing();
    let (_, _, sql) = fixtures()
        .into_iter()
        .find(|(d, path, _)| *d == Dialect::MySql && path.ends_with("update_order_status.sql"))
        .expect("missing fixture");
    let pg = convert(&sql, Dialect::MySql, Dialect::PostgreSql).unwrap();
    assert!(!pg.converted_text.contains("LEAVE"), "{}", pg.converted_text);
    assert!(pg.converted_text.contains("RETURN;"), "{}", pg.converted_text);
    let ss = convert(&sql, Dialect::MySql, Dialect::SqlServer).unwrap();
    assert!(!ss.converted_text.contains("LEAVE"), "{}", ss.converted_text);
}
