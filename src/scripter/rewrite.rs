use crate::error::{Result, SkwError};

/// One parsed rewrite rule.
///
/// The single-line form is `X<D>find<D>replace<D>` where `X` selects the
/// mode (`s` = literal substring, `r` = regular expression) and `<D>` is
/// any character. There is no escape mechanism: the delimiter must not
/// appear literally inside find or replace, and the rule must contain
/// exactly three delimiter occurrences, ending with the third.
///
/// Regex replacements use the `$1` / `${name}` capture syntax.
#[derive(Debug)]
pub enum RewriteRule {
    Literal { find: String, replace: String },
    Regex { find: regex::Regex, replace: String },
}

impl RewriteRule {
    pub fn parse(rule: &str) -> Result<Self> {
        let mut chars = rule.chars();
        let mode = chars
            .next()
            .ok_or_else(|| SkwError::RuleMalformed("empty rule".to_string()))?;
        let delimiter = chars
            .next()
            .ok_or_else(|| SkwError::RuleMalformed(format!("'{}': missing delimiter", rule)))?;

        let body = &rule[mode.len_utf8() + delimiter.len_utf8()..];
        let parts: Vec<&str> = body.split(delimiter).collect();
        if parts.len() != 3 || !parts[2].is_empty() {
            return Err(SkwError::RuleMalformed(format!(
                "'{}': expected {}find{}replace{} with no stray delimiters",
                rule, delimiter, delimiter, delimiter
            )));
        }
        let (find, replace) = (parts[0], parts[1]);
        if find.is_empty() {
            return Err(SkwError::RuleMalformed(format!("'{}': empty find pattern", rule)));
        }

        match mode {
            's' => Ok(Self::Literal {
                find: find.to_string(),
                replace: replace.to_string(),
            }),
            'r' => Ok(Self::Regex {
                find: regex::Regex::new(find).map_err(|e| {
                    SkwError::RuleMalformed(format!("'{}': {}", rule, e))
                })?,
                replace: replace.to_string(),
            }),
            other => Err(SkwError::RuleMalformed(format!(
                "'{}': unknown mode '{}' (expected 's' or 'r')",
                rule, other
            ))),
        }
    }

    /// Replace every non-overlapping occurrence, top to bottom.
    pub fn apply(&self, text: &str) -> String {
        match self {
            Self::Literal { find, replace } => text.replace(find, replace),
            Self::Regex { find, replace } => find.replace_all(text, replace.as_str()).into_owned(),
        }
    }
}
