//! Parser for the MySQL dump subset that Wikimedia SQL dumps contain.
//!
//! A table dump is a sequence of `SET` statements, one `CREATE TABLE`
//! (preceded by `DROP TABLE IF EXISTS`), `LOCK`/`UNLOCK TABLES`, and bulk
//! `INSERT` statements, with mysqldump's `/*!NNNNN ... */` version comments
//! sprinkled in between. Only the shapes needed to recover column names and
//! row tuples are parsed; everything else is recognized and skipped.

use nom::bytes::complete::{tag, tag_no_case};
use nom::character::complete::{multispace0, multispace1};
use nom::combinator::{eof, opt};
use nom::multi::{separated_list0, separated_list1};
use nom::sequence::tuple;
use nom::IResult;
use serde_json::{Map, Number, Value};

use crate::errors::{snippet, Error, Result};
use crate::text::{nfc, repair_utf8};

/// One parsed dump statement.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlStatement {
    Set,
    DropTable,
    AlterTable,
    LockTables,
    UnlockTables,
    /// Ordered column names of the table being dumped.
    CreateTable(Vec<String>),
    /// Row tuples of a bulk insert.
    Insert(Vec<Vec<SqlValue>>),
}

/// Scalar value of one inserted column.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    /// Raw string bytes after unescaping; may not be valid UTF-8.
    Bytes(Vec<u8>),
}

/// Parse one complete statement as emitted by the record tokenizer.
pub(crate) fn parse_statement(raw: &[u8]) -> Result<SqlStatement> {
    let mut stmt = trim(raw);
    stmt = strip_terminator(stmt);
    if let Some(inner) = unwrap_version_comment(stmt) {
        stmt = strip_terminator(trim(inner));
    }

    let keyword = leading_keyword(stmt);
    match keyword.as_str() {
        "SET" => Ok(SqlStatement::Set),
        "DROP" => Ok(SqlStatement::DropTable),
        "ALTER" => Ok(SqlStatement::AlterTable),
        "LOCK" => Ok(SqlStatement::LockTables),
        "UNLOCK" => Ok(SqlStatement::UnlockTables),
        "CREATE" => create_table(stmt)
            .map(|(_, cols)| SqlStatement::CreateTable(cols))
            .map_err(|_| sql_error("malformed CREATE TABLE", raw)),
        "INSERT" => insert(stmt)
            .map(|(_, rows)| SqlStatement::Insert(rows))
            .map_err(|_| sql_error("malformed INSERT", raw)),
        _ => Err(Error::UnexpectedType(format!(
            "unsupported SQL statement: {}",
            snippet(raw)
        ))),
    }
}

/// Convert one insert row into a JSON object keyed by column name.
///
/// String values are repaired to valid UTF-8 without changing their byte
/// length so that byte-length-prefixed payloads (PHP-serialized
/// `img_metadata`) survive the trip through JSON.
pub(crate) fn row_to_json(columns: &[String], row: &[SqlValue]) -> Result<Map<String, Value>> {
    if columns.len() != row.len() {
        return Err(Error::UnexpectedType(format!(
            "insert row has {} values for {} columns",
            row.len(),
            columns.len()
        )));
    }
    let mut object = Map::with_capacity(row.len());
    for (column, value) in columns.iter().zip(row) {
        let json = match value {
            SqlValue::Null => Value::Null,
            SqlValue::Int(n) => Value::Number(Number::from(*n)),
            SqlValue::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| Error::InvalidValue(format!("non-finite SQL number: {f}")))?,
            SqlValue::Bytes(bytes) => Value::String(repair_utf8(bytes)),
        };
        object.insert(column.clone(), json);
    }
    Ok(object)
}

fn sql_error(detail: &str, raw: &[u8]) -> Error {
    Error::SqlParse {
        detail: detail.to_owned(),
        row: snippet(raw),
    }
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &bytes[start..end]
}

/// Remove one trailing `;` plus surrounding whitespace.
fn strip_terminator(stmt: &[u8]) -> &[u8] {
    let stmt = trim(stmt);
    match stmt.last() {
        Some(b';') => trim(&stmt[..stmt.len() - 1]),
        _ => stmt,
    }
}

/// `/*!40101 SET ... */` → `SET ...`
fn unwrap_version_comment(stmt: &[u8]) -> Option<&[u8]> {
    let rest = stmt.strip_prefix(b"/*!")?;
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    rest[digits..].strip_suffix(b"*/")
}

fn leading_keyword(stmt: &[u8]) -> String {
    stmt.iter()
        .take_while(|b| b.is_ascii_alphabetic())
        .map(|b| b.to_ascii_uppercase() as char)
        .collect()
}

// --- CREATE TABLE ---------------------------------------------------------

fn create_table(input: &[u8]) -> IResult<&[u8], Vec<String>> {
    let (input, _) = multispace0(input)?;
    let (input, _) = tag_no_case("CREATE")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = tag_no_case("TABLE")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = opt(tuple((
        tag_no_case("IF"),
        multispace1,
        tag_no_case("NOT"),
        multispace1,
        tag_no_case("EXISTS"),
        multispace1,
    )))(input)?;
    let (input, _) = identifier(input)?;
    let (input, _) = multispace0(input)?;
    let (mut input, _) = tag("(")(input)?;

    let mut columns = Vec::new();
    loop {
        let (rest, _) = multispace0(input)?;
        // Column definitions start with a backtick-quoted name; everything
        // else at this position is an index or constraint entry.
        let rest = if rest.first() == Some(&b'`') {
            let (rest, name) = backtick_identifier(rest)?;
            columns.push(nfc(name));
            skip_definition(rest)?
        } else {
            skip_definition(rest)?
        };
        let (rest, _) = multispace0(rest)?;
        match rest.first() {
            Some(b',') => input = &rest[1..],
            Some(b')') => {
                input = &rest[1..];
                break;
            }
            _ => return fail(rest),
        }
    }
    // Table options (`ENGINE=...`) trail the closing paren; not interpreted.
    Ok((input, columns))
}

/// Consume one column/constraint definition up to the `,` or `)` that closes
/// it at parenthesis depth zero, honoring quoted strings and identifiers.
fn skip_definition(
    input: &[u8],
) -> std::result::Result<&[u8], nom::Err<nom::error::Error<&[u8]>>> {
    let mut depth = 0usize;
    let mut pos = 0usize;
    while pos < input.len() {
        match input[pos] {
            b'(' => {
                depth += 1;
                pos += 1;
            }
            b')' if depth == 0 => break,
            b')' => {
                depth -= 1;
                pos += 1;
            }
            b',' if depth == 0 => break,
            quote @ (b'\'' | b'"' | b'`') => match skip_quoted(input, pos, quote) {
                Some(next) => pos = next,
                None => return Err(unbalanced(input)),
            },
            _ => pos += 1,
        }
    }
    if pos >= input.len() {
        return Err(unbalanced(input));
    }
    Ok(&input[pos..])
}

/// Advance past a quoted region starting at `start`. Backslash escapes apply
/// inside `'` and `"` but not inside backticks.
fn skip_quoted(input: &[u8], start: usize, quote: u8) -> Option<usize> {
    let mut pos = start + 1;
    while pos < input.len() {
        match input[pos] {
            b'\\' if quote != b'`' => pos += 2,
            b if b == quote => return Some(pos + 1),
            _ => pos += 1,
        }
    }
    None
}

fn identifier(input: &[u8]) -> IResult<&[u8], String> {
    if input.first() == Some(&b'`') {
        backtick_identifier(input)
    } else {
        let len = input
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
            .count();
        if len == 0 {
            return fail(input);
        }
        Ok((
            &input[len..],
            String::from_utf8_lossy(&input[..len]).into_owned(),
        ))
    }
}

fn backtick_identifier(input: &[u8]) -> IResult<&[u8], String> {
    let (mut rest, _) = tag("`")(input)?;
    let mut name = Vec::new();
    loop {
        match rest.first() {
            Some(b'`') if rest.get(1) == Some(&b'`') => {
                name.push(b'`');
                rest = &rest[2..];
            }
            Some(b'`') => return Ok((&rest[1..], String::from_utf8_lossy(&name).into_owned())),
            Some(b) => {
                name.push(*b);
                rest = &rest[1..];
            }
            None => return fail(rest),
        }
    }
}

// --- INSERT ---------------------------------------------------------------

fn insert(input: &[u8]) -> IResult<&[u8], Vec<Vec<SqlValue>>> {
    let (input, _) = multispace0(input)?;
    let (input, _) = tag_no_case("INSERT")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = opt(tuple((tag_no_case("IGNORE"), multispace1)))(input)?;
    let (input, _) = tag_no_case("INTO")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = identifier(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = opt(column_list)(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = tag_no_case("VALUES")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, rows) = separated_list1(list_comma, row_tuple)(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = eof(input)?;
    Ok((input, rows))
}

fn list_comma(input: &[u8]) -> IResult<&[u8], ()> {
    let (input, _) = multispace0(input)?;
    let (input, _) = tag(",")(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, ()))
}

fn column_list(input: &[u8]) -> IResult<&[u8], Vec<String>> {
    let (input, _) = tag("(")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, names) = separated_list1(list_comma, identifier)(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = tag(")")(input)?;
    Ok((input, names))
}

fn row_tuple(input: &[u8]) -> IResult<&[u8], Vec<SqlValue>> {
    let (input, _) = tag("(")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, values) = separated_list0(list_comma, sql_value)(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = tag(")")(input)?;
    Ok((input, values))
}

fn sql_value(input: &[u8]) -> IResult<&[u8], SqlValue> {
    match input.first() {
        Some(b'\'') => string_literal(input),
        Some(b'N') | Some(b'n') => {
            let (rest, _) = tag_no_case("NULL")(input)?;
            Ok((rest, SqlValue::Null))
        }
        Some(b) if b.is_ascii_digit() || *b == b'-' || *b == b'+' || *b == b'.' => number(input),
        _ => fail(input),
    }
}

fn number(input: &[u8]) -> IResult<&[u8], SqlValue> {
    let len = input
        .iter()
        .take_while(|b| {
            b.is_ascii_digit() || matches!(**b, b'-' | b'+' | b'.' | b'e' | b'E')
        })
        .count();
    if len == 0 {
        return fail(input);
    }
    let text = match std::str::from_utf8(&input[..len]) {
        Ok(text) => text,
        Err(_) => return fail(input),
    };
    let rest = &input[len..];
    if !text.contains(['.', 'e', 'E']) {
        if let Ok(n) = text.parse::<i64>() {
            return Ok((rest, SqlValue::Int(n)));
        }
    }
    match text.parse::<f64>() {
        Ok(f) => Ok((rest, SqlValue::Float(f))),
        Err(_) => fail(input),
    }
}

/// Single-quoted MySQL string with backslash escapes and `''` doubling.
fn string_literal(input: &[u8]) -> IResult<&[u8], SqlValue> {
    let (mut rest, _) = tag("'")(input)?;
    let mut bytes = Vec::new();
    loop {
        match rest.first() {
            Some(b'\\') => {
                let Some(escaped) = rest.get(1) else {
                    return fail(rest);
                };
                bytes.push(match escaped {
                    b'0' => 0,
                    b'b' => 0x08,
                    b'n' => b'\n',
                    b'r' => b'\r',
                    b't' => b'\t',
                    b'Z' => 0x1a,
                    other => *other,
                });
                rest = &rest[2..];
            }
            Some(b'\'') if rest.get(1) == Some(&b'\'') => {
                bytes.push(b'\'');
                rest = &rest[2..];
            }
            Some(b'\'') => return Ok((&rest[1..], SqlValue::Bytes(bytes))),
            Some(b) => {
                bytes.push(*b);
                rest = &rest[1..];
            }
            None => return fail(rest),
        }
    }
}

fn fail<T>(input: &[u8]) -> IResult<&[u8], T> {
    Err(unbalanced(input))
}

fn unbalanced(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Fail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_ignored_statements() {
        assert_eq!(
            parse_statement(b"SET NAMES utf8mb4;\n").unwrap(),
            SqlStatement::Set
        );
        assert_eq!(
            parse_statement(b"DROP TABLE IF EXISTS `image`;\n").unwrap(),
            SqlStatement::DropTable
        );
        assert_eq!(
            parse_statement(b"ALTER TABLE `image` ENABLE KEYS;\n").unwrap(),
            SqlStatement::AlterTable
        );
        assert_eq!(
            parse_statement(b"LOCK TABLES `image` WRITE;\n").unwrap(),
            SqlStatement::LockTables
        );
        assert_eq!(
            parse_statement(b"UNLOCK TABLES;\n").unwrap(),
            SqlStatement::UnlockTables
        );
    }

    #[test]
    fn unwraps_version_comments() {
        assert_eq!(
            parse_statement(b"/*!40101 SET @saved_cs_client = @@character_set_client */;\n")
                .unwrap(),
            SqlStatement::Set
        );
        assert_eq!(
            parse_statement(b"/*!40000 ALTER TABLE `image` DISABLE KEYS */;\n").unwrap(),
            SqlStatement::AlterTable
        );
    }

    #[test]
    fn rejects_unsupported_statements() {
        let err = parse_statement(b"SELECT 1;\n").unwrap_err();
        assert!(matches!(err, Error::UnexpectedType(_)));
    }

    #[test]
    fn extracts_create_table_columns() {
        let stmt = b"CREATE TABLE `image` (\n\
            `img_name` varbinary(255) NOT NULL DEFAULT '',\n\
            `img_size` int(8) unsigned NOT NULL DEFAULT 0,\n\
            `img_metadata` mediumblob NOT NULL,\n\
            `img_media_type` enum('UNKNOWN','BITMAP','DRAWING') DEFAULT NULL,\n\
            PRIMARY KEY (`img_name`),\n\
            KEY `img_size` (`img_size`)\n\
            ) ENGINE=InnoDB DEFAULT CHARSET=binary;\n";
        match parse_statement(stmt).unwrap() {
            SqlStatement::CreateTable(columns) => {
                assert_eq!(
                    columns,
                    vec!["img_name", "img_size", "img_metadata", "img_media_type"]
                );
            }
            other => panic!("expected CreateTable, got {other:?}"),
        }
    }

    #[test]
    fn enum_values_with_commas_do_not_split_definitions() {
        let stmt = b"CREATE TABLE `t` (`a` enum('x,y','z(,)') NOT NULL, `b` int);";
        match parse_statement(stmt).unwrap() {
            SqlStatement::CreateTable(columns) => assert_eq!(columns, vec!["a", "b"]),
            other => panic!("expected CreateTable, got {other:?}"),
        }
    }

    #[test]
    fn parses_insert_rows() {
        let stmt = b"INSERT INTO `image` VALUES ('File.png',123,NULL),('Other.jpg',-4,7.5);\n";
        match parse_statement(stmt).unwrap() {
            SqlStatement::Insert(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(
                    rows[0],
                    vec![
                        SqlValue::Bytes(b"File.png".to_vec()),
                        SqlValue::Int(123),
                        SqlValue::Null,
                    ]
                );
                assert_eq!(rows[1][1], SqlValue::Int(-4));
                assert_eq!(rows[1][2], SqlValue::Float(7.5));
            }
            other => panic!("expected Insert, got {other:?}"),
        }
    }

    #[test]
    fn unescapes_string_values() {
        let stmt = b"INSERT INTO `t` VALUES ('a\\'b','c''d','line\\nbreak','back\\\\slash');";
        match parse_statement(stmt).unwrap() {
            SqlStatement::Insert(rows) => {
                assert_eq!(rows[0][0], SqlValue::Bytes(b"a'b".to_vec()));
                assert_eq!(rows[0][1], SqlValue::Bytes(b"c'd".to_vec()));
                assert_eq!(rows[0][2], SqlValue::Bytes(b"line\nbreak".to_vec()));
                assert_eq!(rows[0][3], SqlValue::Bytes(b"back\\slash".to_vec()));
            }
            other => panic!("expected Insert, got {other:?}"),
        }
    }

    #[test]
    fn strings_may_hold_arbitrary_bytes() {
        let stmt = b"INSERT INTO `t` VALUES ('a\xff\xfeb');";
        match parse_statement(stmt).unwrap() {
            SqlStatement::Insert(rows) => {
                assert_eq!(rows[0][0], SqlValue::Bytes(b"a\xff\xfeb".to_vec()));
            }
            other => panic!("expected Insert, got {other:?}"),
        }
    }

    #[test]
    fn row_to_json_maps_columns_in_order() {
        let columns = vec!["name".to_owned(), "size".to_owned(), "note".to_owned()];
        let row = vec![
            SqlValue::Bytes(b"File.png".to_vec()),
            SqlValue::Int(9),
            SqlValue::Null,
        ];
        let object = row_to_json(&columns, &row).unwrap();
        assert_eq!(object["name"], Value::String("File.png".to_owned()));
        assert_eq!(object["size"], Value::Number(9.into()));
        assert_eq!(object["note"], Value::Null);
    }

    #[test]
    fn row_to_json_repairs_invalid_utf8_without_resizing() {
        let columns = vec!["data".to_owned()];
        let row = vec![SqlValue::Bytes(b"a\xffb".to_vec())];
        let object = row_to_json(&columns, &row).unwrap();
        let Value::String(s) = &object["data"] else {
            panic!("expected string");
        };
        assert_eq!(s.len(), 3);
        assert_eq!(s, "a\0b");
    }

    #[test]
    fn row_to_json_rejects_column_count_mismatch() {
        let columns = vec!["only".to_owned()];
        let row = vec![SqlValue::Int(1), SqlValue::Int(2)];
        assert!(matches!(
            row_to_json(&columns, &row),
            Err(Error::UnexpectedType(_))
        ));
    }
}
