//! The inevitable grab-bag of utility functions.

/// Is `s` a valid C identifier?
pub fn is_c_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        None => false,
        Some(c) if !c.is_ascii_alphabetic() && c != '_' => false,
        _ => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
    }
}

/// Collapse all runs of whitespace to a single space, and trim the ends.
pub fn squish(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split an identifier into lowercase words, using `_` and case changes as
/// boundaries. `EmployeeID` becomes `["employee", "id"]`.
fn ident_words(s: &str) -> Vec<String> {
    let chars = s.chars().collect::<Vec<_>>();
    let mut words = vec![];
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map_or(false, |n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Convert an identifier to `snake_case`.
pub fn snake_case(s: &str) -> String {
    ident_words(s).join("_")
}

/// Convert an identifier to `PascalCase`.
pub fn pascal_case(s: &str) -> String {
    ident_words(s)
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Given `s[open]` is an opening paren, return the index of the matching
/// closing paren.
pub fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split `s` on `sep` where it is not nested inside parentheses or a
/// single-quoted string. Pieces are trimmed.
pub fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut pieces = vec![];
    let mut depth = 0i32;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            _ if quoted => {}
            '(' => depth += 1,
            ')' => depth -= 1,
            c if c == sep && depth == 0 => {
                pieces.push(s[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(s[start..].trim());
    pieces
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn case_conversions() {
        assert_eq!(snake_case("EmployeeId"), "employee_id");
        assert_eq!(snake_case("EmployeeID"), "employee_id");
        assert_eq!(snake_case("HTTPStatus"), "http_status");
        assert_eq!(snake_case("p_product_id"), "p_product_id");
        assert_eq!(pascal_case("product_id"), "ProductId");
        assert_eq!(pascal_case("EmployeeId"), "EmployeeId");
    }

    #[test]
    fn top_level_splitting() {
        assert_eq!(
            split_top_level("a, f(b, c), d", ','),
            vec!["a", "f(b, c)", "d"]
        );
        assert_eq!(split_top_level("x = 'a,b', y", ','), vec!["x = 'a,b'", "y"]);
        assert_eq!(matching_paren("f(a(b)c)d", 1), Some(7));
        assert_eq!(matching_paren("f(a", 1), None);
    }

    #[test]
    fn squish_whitespace() {
        assert_eq!(squish("  CREATE\n   PROCEDURE  x "), "CREATE PROCEDURE x");
        assert!(is_c_ident("order_id"));
        assert!(!is_c_ident("order id"));
    }
}
