use crate::InsError;

/// A parameter value as it appears in an instruction file, with any trailing
/// comment removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionParameter {
    raw: String,
}

impl InstructionParameter {
    pub fn new(value: &str) -> Self {
        Self {
            raw: strip_comment(value).trim().to_string(),
        }
    }

    /// The value exactly as it is written back to the file.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_quoted(&self) -> bool {
        self.raw.len() >= 2 && self.raw.starts_with('"') && self.raw.ends_with('"')
    }

    /// The value with surrounding quotes removed.
    pub fn as_str(&self) -> &str {
        if self.is_quoted() {
            &self.raw[1..self.raw.len() - 1]
        } else {
            &self.raw
        }
    }

    pub fn as_f64(&self) -> Result<f64, InsError> {
        self.raw.parse::<f64>().map_err(|_| self.value_error("a number"))
    }

    pub fn as_i64(&self) -> Result<i64, InsError> {
        self.raw
            .parse::<i64>()
            .map_err(|_| self.value_error("an integer"))
    }

    pub fn as_f64_array(&self) -> Result<Vec<f64>, InsError> {
        self.as_str()
            .split_whitespace()
            .map(|part| {
                part.parse::<f64>()
                    .map_err(|_| self.value_error("a list of numbers"))
            })
            .collect()
    }

    fn value_error(&self, expected: &str) -> InsError {
        InsError::Value {
            value: self.raw.clone(),
            expected: expected.to_string(),
        }
    }
}

/// Cuts `text` at the first `!` that is not inside double quotes.
pub(crate) fn strip_comment(text: &str) -> &str {
    match find_comment(text) {
        Some(index) => &text[..index],
        None => text,
    }
}

pub(crate) fn find_comment(text: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (index, ch) in text.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '!' if !in_quotes => return Some(index),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_comment() {
        let param = InstructionParameter::new("0.161   ! stomatal conductance");
        assert_eq!(param.raw(), "0.161");
        assert!((param.as_f64().expect("number") - 0.161).abs() < 1e-12);
    }

    #[test]
    fn keeps_bang_inside_quotes() {
        let param = InstructionParameter::new("\"Hello! World!\" ! greeting");
        assert!(param.is_quoted());
        assert_eq!(param.as_str(), "Hello! World!");
    }

    #[test]
    fn typed_accessors_report_bad_values() {
        let param = InstructionParameter::new("\"c3\"");
        assert!(matches!(param.as_f64(), Err(InsError::Value { .. })));
        assert!(matches!(param.as_i64(), Err(InsError::Value { .. })));
    }

    #[test]
    fn parses_number_lists() {
        let param = InstructionParameter::new("0.5 0.25   1");
        assert_eq!(param.as_f64_array().expect("array"), vec![0.5, 0.25, 1.0]);
        assert_eq!(InstructionParameter::new("3").as_i64().expect("int"), 3);
    }
}
