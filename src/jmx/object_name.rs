// Object names - typed identities of manageable objects
//
// An object name is `domain:key=value[,key=value...]`. Query patterns may
// use `*`/`?` in the domain and a trailing `*` element that matches any
// additional key properties.

use std::collections::BTreeMap;
use std::fmt;

use super::JmxError;

/// Identity of a manageable object (or a pattern matching several)
///
/// Key properties are kept sorted, so two names that differ only in the
/// order of their properties compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectName {
    domain: String,
    properties: BTreeMap<String, String>,
    property_pattern: bool,
}

impl ObjectName {
    /// Parses an object name or object name pattern
    ///
    /// # Errors
    /// Returns `JmxError::MalformedObjectName` when the text is missing the
    /// domain separator, has an empty or duplicated key, an illegal character
    /// in a key or unquoted value, or no key properties at all.
    pub fn parse(text: &str) -> Result<Self, JmxError> {
        let malformed = |reason: &str| JmxError::MalformedObjectName {
            name: text.to_string(),
            reason: reason.to_string(),
        };

        let (domain, key_list) = text
            .split_once(':')
            .ok_or_else(|| malformed("missing ':' after the domain"))?;

        let mut properties = BTreeMap::new();
        let mut property_pattern = false;

        for element in split_key_list(key_list).map_err(malformed)? {
            if element == "*" {
                if property_pattern {
                    return Err(malformed("more than one '*' in the key property list"));
                }
                property_pattern = true;
                continue;
            }

            let (key, value) = element
                .split_once('=')
                .ok_or_else(|| malformed("key property without '='"))?;
            validate_key(key).map_err(malformed)?;
            validate_value(value).map_err(malformed)?;

            if properties.insert(key.to_string(), value.to_string()).is_some() {
                return Err(malformed("duplicate key"));
            }
        }

        if properties.is_empty() && !property_pattern {
            return Err(malformed("no key properties"));
        }

        Ok(ObjectName {
            domain: domain.to_string(),
            properties,
            property_pattern,
        })
    }

    /// Builds the query pattern `<domain_matcher>:type=<type_name>,*`
    pub fn type_pattern(domain_matcher: &str, type_name: &str) -> Result<Self, JmxError> {
        Self::parse(&format!("{}:type={},*", domain_matcher, type_name))
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    #[cfg(test)]
    pub fn key_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub fn key_properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// True if the property list ends in `*`
    #[cfg(test)]
    pub fn is_property_pattern(&self) -> bool {
        self.property_pattern
    }

    /// Key properties sorted by key, without the wildcard element
    pub fn canonical_key_properties(&self) -> String {
        self.properties
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// `domain:` followed by the sorted key properties, plus `,*` for patterns
    pub fn canonical_name(&self) -> String {
        let mut name = format!("{}:{}", self.domain, self.canonical_key_properties());
        if self.property_pattern {
            if !self.properties.is_empty() {
                name.push(',');
            }
            name.push('*');
        }
        name
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

/// Splits a key property list on commas that are not inside quotes
fn split_key_list(key_list: &str) -> Result<Vec<&str>, &'static str> {
    let mut elements = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (index, ch) in key_list.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                elements.push(&key_list[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }

    if in_quotes {
        return Err("unterminated quoted value");
    }
    elements.push(&key_list[start..]);

    if elements.iter().any(|element| element.is_empty()) {
        return Err("empty key property");
    }
    Ok(elements)
}

fn validate_key(key: &str) -> Result<(), &'static str> {
    if key.is_empty() {
        return Err("empty key");
    }
    if key.contains([':', '=', ',', '*', '?', '"', '\n']) {
        return Err("illegal character in key");
    }
    Ok(())
}

fn validate_value(value: &str) -> Result<(), &'static str> {
    if value.starts_with('"') {
        if value.len() < 2 || !value.ends_with('"') {
            return Err("quoted value must end with '\"'");
        }
        return Ok(());
    }
    if value.is_empty() {
        return Err("empty value");
    }
    if value.contains([',', '=', ':', '"', '*', '?', '\n']) {
        return Err("illegal character in unquoted value");
    }
    Ok(())
}
