//! Dialect-aware optimization suggestions for a routine.
//!
//! The advisor never changes code. Each check is a detector over the source
//! with its string and comment contents blanked out, so byte offsets in the
//! blanked text are byte offsets in the source.

use std::{collections::HashMap, ops::Range};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::{
    dialect::Dialect,
    tokenizer::{tokenize, TokenKind},
    util::{matching_paren, split_top_level, squish},
};

/// What a suggestion is about.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Indexing,
    ExecutionPlan,
    Parameterization,
    Concurrency,
    DialectSpecific,
}

/// How much a suggestion matters. Sorts most important first.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OptimizationSuggestion {
    pub category: Category,
    pub priority: Priority,
    pub message: String,
    /// Where in the input the problem is, if it's anywhere in particular.
    pub source_span: Option<Range<usize>>,
}

/// The text a detector looks at.
struct Scan<'a> {
    sql: &'a str,
    /// `sql` with comments and string contents replaced by spaces.
    blank: String,
}

enum Detect {
    /// Report the first match.
    Pattern(&'static str),
    Custom(fn(&Scan<'_>) -> Option<Range<usize>>),
}

struct Check {
    /// `None` for checks that apply to every dialect.
    dialect: Option<Dialect>,
    category: Category,
    priority: Priority,
    detect: Detect,
    message: &'static str,
}

static CHECKS: &[Check] = &[
    Check {
        dialect: None,
        category: Category::Indexing,
        priority: Priority::Medium,
        detect: Detect::Pattern(r"(?i)\bSELECT\s+(?:DISTINCT\s+|TOP\s*\(?\s*\d+\s*\)?\s+)?\*"),
        message: "SELECT * reads every column and prevents covering indexes; list the columns you need",
    },
    Check {
        dialect: None,
        category: Category::Indexing,
        priority: Priority::High,
        detect: Detect::Pattern(r"(?i)\bLIKE\s+[NE]?'%"),
        message: "a LIKE pattern that starts with a wildcard cannot use an index seek",
    },
    Check {
        dialect: None,
        category: Category::Indexing,
        priority: Priority::Medium,
        detect: Detect::Pattern(
            r"(?i)\bWHERE\b[^;]*?\b(?:UPPER|LOWER|LTRIM|RTRIM|TRIM|SUBSTRING|SUBSTR|LEFT|RIGHT|YEAR|MONTH|DAY|DATE|CONVERT|CAST|ISNULL|IFNULL|COALESCE|DATEPART|DATE_FORMAT|TO_CHAR)\s*\(\s*[A-Za-z_][\w.]*\s*[,)]",
        ),
        message: "a function wrapped around a column in WHERE prevents index use; compare the bare column instead",
    },
    Check {
        dialect: None,
        category: Category::ExecutionPlan,
        priority: Priority::Low,
        detect: Detect::Pattern(r"(?i)\bWHERE\b[^;]*?\bOR\b[^;]*?\bOR\b"),
        message: "long OR chains in a predicate often force a scan; consider IN (...) or UNION ALL",
    },
    Check {
        dialect: None,
        category: Category::Concurrency,
        priority: Priority::High,
        detect: Detect::Custom(unbounded_write),
        message: "UPDATE or DELETE without WHERE changes every row and locks the whole table",
    },
    Check {
        dialect: None,
        category: Category::ExecutionPlan,
        priority: Priority::Medium,
        detect: Detect::Pattern(r"(?i)\bCURSOR\b[^;]*?\bFOR\b|\bFETCH\s+(?:NEXT\s+FROM\s+)?\w+\s+INTO\b"),
        message: "row-by-row cursor processing is slow; prefer one set-based statement",
    },
    // SQL Server
    Check {
        dialect: Some(Dialect::SqlServer),
        category: Category::DialectSpecific,
        priority: Priority::Low,
        detect: Detect::Custom(missing_nocount),
        message: "add SET NOCOUNT ON to stop row-count messages being sent to the client",
    },
    Check {
        dialect: Some(Dialect::SqlServer),
        category: Category::Concurrency,
        priority: Priority::Medium,
        detect: Detect::Pattern(r"(?i)\bNOLOCK\b|\bREADUNCOMMITTED\b"),
        message: "NOLOCK reads uncommitted data; consider READ COMMITTED SNAPSHOT isolation instead",
    },
    Check {
        dialect: Some(Dialect::SqlServer),
        category: Category::Parameterization,
        priority: Priority::High,
        detect: Detect::Pattern(r"(?i)\bEXEC(?:UTE)?\s*\(\s*[@'N]"),
        message: "EXEC of a built string is open to injection and gets no plan reuse; use sp_executesql with parameters",
    },
    Check {
        dialect: Some(Dialect::SqlServer),
        category: Category::ExecutionPlan,
        priority: Priority::Medium,
        detect: Detect::Custom(executesql_in_loop),
        message: "sp_executesql inside a WHILE loop runs once per iteration; build one set-based statement instead",
    },
    Check {
        dialect: Some(Dialect::SqlServer),
        category: Category::ExecutionPlan,
        priority: Priority::High,
        detect: Detect::Custom(optional_parameter),
        message: "an optional-parameter predicate (@p IS NULL OR col = @p) defeats parameter sniffing; add OPTION (RECOMPILE)",
    },
    Check {
        dialect: Some(Dialect::SqlServer),
        category: Category::Concurrency,
        priority: Priority::High,
        detect: Detect::Custom(transaction_without_try),
        message: "wrap explicit transactions in TRY/CATCH so they are rolled back on error",
    },
    // PostgreSQL
    Check {
        dialect: Some(Dialect::PostgreSql),
        category: Category::DialectSpecific,
        priority: Priority::Low,
        detect: Detect::Custom(missing_volatility),
        message: "declare the function IMMUTABLE, STABLE or VOLATILE so the planner can optimize calls to it",
    },
    Check {
        dialect: Some(Dialect::PostgreSql),
        category: Category::DialectSpecific,
        priority: Priority::Medium,
        detect: Detect::Pattern(r"(?i)\bjson\b"),
        message: "use jsonb instead of json: it is faster to query and can be indexed",
    },
    Check {
        dialect: Some(Dialect::PostgreSql),
        category: Category::Indexing,
        priority: Priority::Low,
        detect: Detect::Pattern(r"(?i)=\s*ANY\s*\("),
        message: "= ANY(array) may not use an index; consider joining against unnest(...)",
    },
    Check {
        dialect: Some(Dialect::PostgreSql),
        category: Category::ExecutionPlan,
        priority: Priority::Low,
        detect: Detect::Pattern(r"(?i)\bPARALLEL\s+UNSAFE\b"),
        message: "PARALLEL UNSAFE prevents parallel plans; mark the function PARALLEL SAFE if it has no side effects",
    },
    Check {
        dialect: Some(Dialect::PostgreSql),
        category: Category::ExecutionPlan,
        priority: Priority::Medium,
        detect: Detect::Custom(cursor_rows),
        message: "returning refcursors or rows one at a time is slow; prefer RETURN QUERY with RETURNS TABLE",
    },
    Check {
        dialect: Some(Dialect::PostgreSql),
        category: Category::ExecutionPlan,
        priority: Priority::Low,
        detect: Detect::Custom(postgres_joins),
        message: "check this multi-way join with EXPLAIN (ANALYZE, BUFFERS)",
    },
    // MySQL
    Check {
        dialect: Some(Dialect::MySql),
        category: Category::ExecutionPlan,
        priority: Priority::Medium,
        detect: Detect::Custom(repeated_json_extract),
        message: "the same JSON_EXTRACT path is read more than once; extract it once into a variable or generated column",
    },
    Check {
        dialect: Some(Dialect::MySql),
        category: Category::Indexing,
        priority: Priority::High,
        detect: Detect::Pattern(r"(?i)\bFIND_IN_SET\s*\("),
        message: "FIND_IN_SET cannot use an index; store the list as rows in a table",
    },
    Check {
        dialect: Some(Dialect::MySql),
        category: Category::DialectSpecific,
        priority: Priority::Low,
        detect: Detect::Pattern(r"(?:^|[^@\w])@[A-Za-z_]\w*"),
        message: "session @variables outlive the call; use DECLARE for local variables",
    },
    Check {
        dialect: Some(Dialect::MySql),
        category: Category::ExecutionPlan,
        priority: Priority::Low,
        detect: Detect::Custom(mysql_joins),
        message: "for a many-way join, check EXPLAIN FORMAT=JSON and consider STRAIGHT_JOIN to fix the join order",
    },
    Check {
        dialect: Some(Dialect::MySql),
        category: Category::ExecutionPlan,
        priority: Priority::Medium,
        detect: Detect::Custom(select_into_without_limit),
        message: "SELECT ... INTO fails if the query returns more than one row; add LIMIT 1 or aggregate",
    },
];

/// `CHECKS` patterns, compiled.
static PATTERNS: Lazy<Vec<Option<Regex>>> = Lazy::new(|| {
    CHECKS
        .iter()
        .map(|check| match check.detect {
            Detect::Pattern(pattern) => Some(Regex::new(pattern).unwrap()),
            Detect::Custom(_) => None,
        })
        .collect()
});

/// Suggest optimizations for `sql`, most important first.
#[instrument(level = "debug", skip(sql))]
pub fn analyze(sql: &str, dialect: Dialect) -> Vec<OptimizationSuggestion> {
    let scan = Scan {
        sql,
        blank: blank(sql, dialect),
    };
    let mut suggestions = vec![];
    for (check, pattern) in CHECKS.iter().zip(PATTERNS.iter()) {
        if check.dialect.map_or(false, |d| d != dialect) {
            continue;
        }
        let span = match (&check.detect, pattern) {
            (Detect::Pattern(_), Some(re)) => re.find(&scan.blank).map(|m| m.range()),
            (Detect::Custom(detect), _) => detect(&scan),
            _ => None,
        };
        if let Some(span) = span {
            suggestions.push(OptimizationSuggestion {
                category: check.category,
                priority: check.priority,
                message: check.message.to_owned(),
                source_span: Some(trim_span(&scan.blank, span)),
            });
        }
    }
    suggestions.sort_by_key(|s| (s.priority, s.source_span.as_ref().map_or(usize::MAX, |r| r.start)));
    debug!(count = suggestions.len(), "analyzed");
    suggestions
}

/// Replace comments and the contents of strings with spaces, keeping every
/// byte offset. Strings keep their opening quote and first character, so
/// `LIKE '%x'` is still visible. Dollar-quoted strings are routine bodies,
/// and are blanked recursively.
fn blank(sql: &str, dialect: Dialect) -> String {
    let Ok(tokens) = tokenize(sql, dialect) else {
        return sql.to_owned();
    };
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for token in tokens {
        let keep = match token.kind {
            TokenKind::Comment => 0,
            TokenKind::String => token
                .text
                .find(|c| c == '\'' || c == '"')
                .map_or(0, |q| q + 1 + token.text[q + 1..].chars().next().map_or(0, char::len_utf8)),
            TokenKind::DollarString => {
                if let Some(body) = token.dollar_body_span() {
                    out.push_str(&sql[last..body.start]);
                    out.push_str(&blank(&sql[body.clone()], dialect));
                    last = body.end;
                }
                continue;
            }
            _ => continue,
        };
        out.push_str(&sql[last..token.span.start]);
        let keep = keep.min(token.text.len());
        out.push_str(&token.text[..keep]);
        for c in token.text[keep..].chars() {
            if c == '\n' {
                out.push('\n');
            } else {
                out.extend(std::iter::repeat(' ').take(c.len_utf8()));
            }
        }
        last = token.span.end;
    }
    out.push_str(&sql[last..]);
    out
}

/// Drop leading whitespace and separators from a match.
fn trim_span(text: &str, span: Range<usize>) -> Range<usize> {
    let matched = &text[span.clone()];
    let skipped = matched.len() - matched.trim_start_matches(|c: char| !c.is_alphanumeric() && c != '@' && c != '*' && c != '=').len();
    span.start + skipped..span.end
}

static HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:CREATE|ALTER)\b[^(;]*?\b(?:PROC|PROCEDURE|FUNCTION)\b").unwrap());

fn header(scan: &Scan<'_>) -> Option<Range<usize>> {
    HEADER.find(&scan.blank).map(|m| m.range())
}

fn find(re: &Regex, scan: &Scan<'_>) -> Option<Range<usize>> {
    re.find(&scan.blank).map(|m| m.range())
}

/// Keywords that start a new statement, for dialects where `;` is optional.
static STATEMENT_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:INSERT|UPDATE|DELETE|MERGE|IF|WHILE|END|RETURN|COMMIT|ROLLBACK|EXEC|EXECUTE|CALL|DECLARE|BEGIN|SET\s+@)\b|;")
        .unwrap()
});

fn unbounded_write(scan: &Scan<'_>) -> Option<Range<usize>> {
    static WRITE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(?:UPDATE|DELETE)\b").unwrap());
    static WHERE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(?:WHERE|CURRENT\s+OF)\b").unwrap());
    static NOT_A_WRITE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\b(?:FOR|KEY|ON|BEFORE|AFTER|OF)\s*$").unwrap());
    for m in WRITE.find_iter(&scan.blank) {
        if NOT_A_WRITE.is_match(&scan.blank[..m.start()]) {
            continue;
        }
        let rest = &scan.blank[m.end()..];
        let end = STATEMENT_START.find(rest).map_or(rest.len(), |s| s.start());
        if !WHERE.is_match(&rest[..end]) {
            return Some(m.start()..m.end() + end);
        }
    }
    None
}

fn missing_nocount(scan: &Scan<'_>) -> Option<Range<usize>> {
    static NOCOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bSET\s+NOCOUNT\s+ON\b").unwrap());
    static PROCEDURE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bPROC(?:EDURE)?\b").unwrap());
    let header = header(scan)?;
    if PROCEDURE.is_match(&scan.blank[header.clone()]) && !NOCOUNT.is_match(&scan.blank) {
        Some(header)
    } else {
        None
    }
}

fn executesql_in_loop(scan: &Scan<'_>) -> Option<Range<usize>> {
    static IN_LOOP: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?is)\bWHILE\b.*?\b(sp_executesql)\b").unwrap());
    IN_LOOP
        .captures(&scan.blank)
        .and_then(|caps| caps.get(1))
        .map(|m| m.range())
}

fn optional_parameter(scan: &Scan<'_>) -> Option<Range<usize>> {
    static OPTIONAL: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)(@\w+)\s+IS\s+NULL\s+OR\s+[\w.\[\]]+\s*=\s*(@\w+)").unwrap()
    });
    static RECOMPILE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\bOPTION\s*\([^)]*\bRECOMPILE\b").unwrap());
    if RECOMPILE.is_match(&scan.blank) {
        return None;
    }
    OPTIONAL
        .captures_iter(&scan.blank)
        .find(|caps| caps[1].eq_ignore_ascii_case(&caps[2]))
        .and_then(|caps| caps.get(0))
        .map(|m| m.range())
}

fn transaction_without_try(scan: &Scan<'_>) -> Option<Range<usize>> {
    static BEGIN_TRAN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\bBEGIN\s+(?:DISTRIBUTED\s+)?TRAN(?:SACTION)?\b").unwrap());
    static BEGIN_TRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bBEGIN\s+TRY\b").unwrap());
    let tran = find(&BEGIN_TRAN, scan)?;
    if BEGIN_TRY.is_match(&scan.blank) {
        None
    } else {
        Some(tran)
    }
}

fn missing_volatility(scan: &Scan<'_>) -> Option<Range<usize>> {
    static FUNCTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bFUNCTION\b").unwrap());
    static VOLATILITY: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\b(?:IMMUTABLE|STABLE|VOLATILE)\b").unwrap());
    let header = header(scan)?;
    if FUNCTION.is_match(&scan.blank[header.clone()]) && !VOLATILITY.is_match(&scan.blank) {
        Some(header)
    } else {
        None
    }
}

fn cursor_rows(scan: &Scan<'_>) -> Option<Range<usize>> {
    static REFCURSOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\brefcursor\b").unwrap());
    static RETURN_NEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bRETURN\s+NEXT\b").unwrap());
    let next = find(&RETURN_NEXT, scan)?;
    if REFCURSOR.is_match(&scan.blank) {
        Some(next)
    } else {
        None
    }
}

/// The `n`th `JOIN`, if there are that many.
fn nth_join(scan: &Scan<'_>, n: usize) -> Option<Range<usize>> {
    static JOIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bJOIN\b").unwrap());
    JOIN.find_iter(&scan.blank).nth(n - 1).map(|m| m.range())
}

fn postgres_joins(scan: &Scan<'_>) -> Option<Range<usize>> {
    nth_join(scan, 3)
}

fn mysql_joins(scan: &Scan<'_>) -> Option<Range<usize>> {
    static STRAIGHT_JOIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bSTRAIGHT_JOIN\b").unwrap());
    if STRAIGHT_JOIN.is_match(&scan.blank) {
        return None;
    }
    nth_join(scan, 4)
}

/// Calls are compared on their original text, since paths are strings.
fn repeated_json_extract(scan: &Scan<'_>) -> Option<Range<usize>> {
    static CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bJSON_EXTRACT\s*\(").unwrap());
    let mut seen: HashMap<String, usize> = HashMap::new();
    for m in CALL.find_iter(&scan.blank) {
        let open = m.end() - 1;
        let Some(close) = matching_paren(&scan.blank, open) else {
            continue;
        };
        let args = split_top_level(&scan.sql[open + 1..close], ',')
            .into_iter()
            .map(|a| squish(a).to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join(",");
        let count = seen.entry(args).or_default();
        *count += 1;
        if *count == 2 {
            return Some(m.start()..close + 1);
        }
    }
    None
}

fn select_into_without_limit(scan: &Scan<'_>) -> Option<Range<usize>> {
    static SELECT_INTO: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\bSELECT\b[^;]*?\bINTO\b[^;]*").unwrap());
    static SAFE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\bLIMIT\s+1\b|\b(?:COUNT|SUM|MIN|MAX|AVG|GROUP_CONCAT)\s*\(|\bINTO\s+(?:OUTFILE|DUMPFILE)\b").unwrap()
    });
    static INSERT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(?:INSERT|REPLACE)\s*$").unwrap());
    SELECT_INTO
        .find_iter(&scan.blank)
        .find(|m| !SAFE.is_match(m.as_str()) && !INSERT.is_match(&scan.blank[..m.start()]))
        .map(|m| m.range())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn messages(sql: &str, dialect: Dialect) -> Vec<String> {
        analyze(sql, dialect).into_iter().map(|s| s.message).collect()
    }

    fn has(sql: &str, dialect: Dialect, needle: &str) -> bool {
        messages(sql, dialect).iter().any(|m| m.contains(needle))
    }

    #[test]
    fn clean_input_has_no_suggestions() {
        let sql = "CREATE PROCEDURE GetName @Id INT AS BEGIN SET NOCOUNT ON; SELECT Name FROM Customers WHERE Id = @Id END";
        assert_eq!(messages(sql, Dialect::SqlServer), Vec::<String>::new());
    }

    #[test]
    fn blanking_keeps_offsets() {
        let sql = "SELECT 'a * b' -- SELECT *\nFROM t";
        let blanked = blank(sql, Dialect::SqlServer);
        assert_eq!(blanked.len(), sql.len());
        assert!(!blanked.contains('*'));
        assert_eq!(blank("WHERE x LIKE '%ab'", Dialect::MySql), "WHERE x LIKE '%   ");
    }

    #[test]
    fn common_checks() {
        let sql = "CREATE PROCEDURE p AS BEGIN SET NOCOUNT ON; SELECT * FROM t WHERE UPPER(name) LIKE '%x'; DELETE FROM t END";
        let suggestions = analyze(sql, Dialect::SqlServer);
        let priorities = suggestions.iter().map(|s| s.priority).collect::<Vec<_>>();
        assert_eq!(
            priorities,
            vec![Priority::High, Priority::High, Priority::Medium, Priority::Medium]
        );
        let delete = &suggestions[1];
        assert!(delete.message.contains("without WHERE"));
        let span = delete.source_span.clone().unwrap();
        assert_eq!(&sql[span], "DELETE FROM t ");
        assert!(!has("UPDATE t SET a = 1 WHERE id = 2", Dialect::MySql, "without WHERE"));
        assert!(!has("SELECT a FROM t FOR UPDATE", Dialect::PostgreSql, "without WHERE"));
    }

    #[test]
    fn sqlserver_checks() {
        let sql = "CREATE PROCEDURE p @Name NVARCHAR(50) = NULL AS BEGIN
            BEGIN TRANSACTION
            SELECT Id FROM Customers WITH (NOLOCK) WHERE @Name IS NULL OR Name = @Name
            EXEC('SELECT 1')
            COMMIT
        END";
        for needle in ["NOCOUNT", "NOLOCK", "EXEC of a built string", "OPTION (RECOMPILE)", "TRY/CATCH"] {
            assert!(has(sql, Dialect::SqlServer, needle), "missing {}", needle);
        }
        assert!(!has(sql, Dialect::MySql, "NOLOCK"));
    }

    #[test]
    fn postgres_checks() {
        let sql = "CREATE FUNCTION f(ids integer[]) RETURNS SETOF refcursor AS $$
        DECLARE c refcursor; doc json;
        BEGIN
            OPEN c FOR SELECT a.id FROM a JOIN b ON a.id = b.id JOIN c ON c.id = a.id JOIN d ON d.id = a.id WHERE a.id = ANY(ids);
            RETURN NEXT c;
        END; $$ LANGUAGE plpgsql PARALLEL UNSAFE";
        for needle in ["IMMUTABLE, STABLE", "jsonb", "ANY(array)", "PARALLEL SAFE", "refcursors", "EXPLAIN (ANALYZE"] {
            assert!(has(sql, Dialect::PostgreSql, needle), "missing {}", needle);
        }
        assert!(!has("CREATE FUNCTION f() RETURNS jsonb STABLE AS $$ SELECT 1 $$", Dialect::PostgreSql, "jsonb"));
    }

    #[test]
    fn mysql_checks() {
        let sql = "CREATE PROCEDURE p(IN p_doc JSON)
        BEGIN
            DECLARE v_name VARCHAR(50);
            SELECT name INTO v_name FROM users WHERE FIND_IN_SET(id, @ids);
            SELECT JSON_EXTRACT(p_doc, '$.a'), JSON_EXTRACT(p_doc, '$.a');
        END";
        for needle in ["JSON_EXTRACT", "FIND_IN_SET", "session @variables", "LIMIT 1"] {
            assert!(has(sql, Dialect::MySql, needle), "missing {}", needle);
        }
        assert!(!has("SELECT JSON_EXTRACT(d, '$.a'), JSON_EXTRACT(d, '$.b')", Dialect::MySql, "JSON_EXTRACT"));
        assert!(!has("SELECT COUNT(*) INTO v FROM t", Dialect::MySql, "LIMIT 1"));
    }
}
