//! Minimal CSV record encoding: one record per line, RFC 4180 quoting.

/// Encode one record. Line breaks inside fields become spaces so every
/// record stays on one line.
pub fn encode_record<S: AsRef<str>>(fields: &[S]) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let field = field.as_ref().replace(['\r', '\n'], " ");
        if field.contains([',', '"']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(&field);
        }
    }
    out
}

/// Decode one line. `None` on an unterminated quote.
pub fn decode_record(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        match (quoted, c) {
            (true, '"') if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            (true, '"') => quoted = false,
            (false, '"') if field.is_empty() => quoted = true,
            (false, ',') => fields.push(std::mem::take(&mut field)),
            (_, c) => field.push(c),
        }
    }
    if quoted {
        return None;
    }
    fields.push(field);
    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fields_are_unquoted() {
        assert_eq!(encode_record(&["a", "1", "2.5"]), "a,1,2.5");
    }

    #[test]
    fn special_fields_are_quoted() {
        let line = encode_record(&["say \"hi\"", "a,b", "multi\nline"]);
        assert_eq!(line, "\"say \"\"hi\"\"\",\"a,b\",multi line");
        assert_eq!(
            decode_record(&line).expect("test"),
            vec!["say \"hi\"", "a,b", "multi line"]
        );
    }

    #[test]
    fn empty_fields_survive() {
        assert_eq!(decode_record(",x,").expect("test"), vec!["", "x", ""]);
    }

    #[test]
    fn unterminated_quote_is_rejected() {
        assert!(decode_record("\"open,1").is_none());
    }
}
