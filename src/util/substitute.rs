use std::collections::HashMap;

/// Substitute `${key}` patterns in `text` with values from the vars map.
/// Unrecognized `${...}` sequences are left untouched.
pub fn substitute(text: &str, vars: &HashMap<String, String>) -> String {
    let mut result = text.to_string();
    for (key, value) in vars {
        let pattern = format!("${{{}}}", key);
        result = result.replace(&pattern, value);
    }
    result
}

/// Build the variable map shared by every config path and XPath expansion.
pub fn context_variables(book: &str, profile: &str, build_dir: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("book".to_string(), book.to_string());
    vars.insert("profile".to_string(), profile.to_string());
    vars.insert("build_dir".to_string(), build_dir.to_string());
    vars
}
