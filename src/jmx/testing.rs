// In-memory management server used by the pipeline tests
//
// Holds a fixed set of objects and attributes, can be told to refuse
// connections or fail specific calls, and counts every call it receives.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use super::{
    AttributeInfo, AttributeValue, JmxError, ManagementConnector, ManagementSession, ObjectName,
};
use crate::config::ServerEndpoint;

/// Snapshot of the calls a `FakeServer` has received
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub connects: usize,
    pub closes: usize,
    pub queries: usize,
    pub introspections: usize,
    pub reads: usize,
}

#[derive(Default)]
struct FakeState {
    objects: BTreeMap<ObjectName, Vec<(String, AttributeValue)>>,
    unreachable: bool,
    failing_patterns: HashSet<String>,
    broken_objects: HashSet<ObjectName>,
    unreadable: HashSet<(ObjectName, String)>,
    calls: Calls,
}

#[derive(Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<FakeState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, name: &str, attributes: &[(&str, AttributeValue)]) -> Self {
        let name = ObjectName::parse(name).unwrap();
        let attributes = attributes
            .iter()
            .map(|(attribute, value)| (attribute.to_string(), value.clone()))
            .collect();
        self.state.lock().unwrap().objects.insert(name, attributes);
        self
    }

    /// Every connect attempt fails
    pub fn unreachable(self) -> Self {
        self.state.lock().unwrap().unreachable = true;
        self
    }

    /// Queries for this pattern fail with an I/O style error
    pub fn failing_query(self, pattern: &str) -> Self {
        let canonical = ObjectName::parse(pattern).unwrap().canonical_name();
        self.state.lock().unwrap().failing_patterns.insert(canonical);
        self
    }

    /// Introspection of this object fails
    pub fn broken_object(self, name: &str) -> Self {
        let name = ObjectName::parse(name).unwrap();
        self.state.lock().unwrap().broken_objects.insert(name);
        self
    }

    /// Reading this one attribute fails
    pub fn unreadable_attribute(self, name: &str, attribute: &str) -> Self {
        let name = ObjectName::parse(name).unwrap();
        self.state
            .lock()
            .unwrap()
            .unreadable
            .insert((name, attribute.to_string()));
        self
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().unwrap().calls
    }
}

#[async_trait]
impl ManagementConnector for FakeServer {
    async fn connect(
        &self,
        endpoint: &ServerEndpoint,
    ) -> Result<Box<dyn ManagementSession>, JmxError> {
        let mut state = self.state.lock().unwrap();
        state.calls.connects += 1;
        if state.unreachable {
            return Err(JmxError::Connection {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(Box::new(FakeSession {
            server: self.clone(),
            open: true,
        }))
    }
}

struct FakeSession {
    server: FakeServer,
    open: bool,
}

impl FakeSession {
    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.server.state.lock().unwrap()
    }
}

#[async_trait]
impl ManagementSession for FakeSession {
    async fn query_names(&self, pattern: &ObjectName) -> Result<Vec<ObjectName>, JmxError> {
        let mut state = self.state();
        state.calls.queries += 1;
        if state.failing_patterns.contains(&pattern.canonical_name()) {
            return Err(JmxError::InvalidResponse(format!("query {} failed", pattern)));
        }
        Ok(state
            .objects
            .keys()
            .filter(|name| matches_pattern(name, pattern))
            .cloned()
            .collect())
    }

    async fn attribute_info(&self, name: &ObjectName) -> Result<Vec<AttributeInfo>, JmxError> {
        let mut state = self.state();
        state.calls.introspections += 1;
        if state.broken_objects.contains(name) {
            return Err(JmxError::Remote {
                status: 500,
                error_type: "javax.management.IntrospectionException".to_string(),
                message: name.to_string(),
            });
        }
        let attributes = state.objects.get(name).ok_or_else(|| JmxError::Remote {
            status: 404,
            error_type: "javax.management.InstanceNotFoundException".to_string(),
            message: name.to_string(),
        })?;
        Ok(attributes
            .iter()
            .map(|(attribute, value)| {
                let type_name = match value {
                    AttributeValue::Integer(_) => "long",
                    AttributeValue::Float(_) => "double",
                    AttributeValue::Other(_) => "java.lang.Object",
                };
                AttributeInfo::new(attribute, type_name)
            })
            .collect())
    }

    async fn read_attribute(
        &self,
        name: &ObjectName,
        attribute: &str,
    ) -> Result<AttributeValue, JmxError> {
        let mut state = self.state();
        state.calls.reads += 1;
        if state.unreadable.contains(&(name.clone(), attribute.to_string())) {
            return Err(JmxError::Remote {
                status: 500,
                error_type: "javax.management.ReflectionException".to_string(),
                message: attribute.to_string(),
            });
        }
        state
            .objects
            .get(name)
            .and_then(|attributes| attributes.iter().find(|(a, _)| a == attribute))
            .map(|(_, value)| value.clone())
            .ok_or_else(|| JmxError::Remote {
                status: 404,
                error_type: "javax.management.AttributeNotFoundException".to_string(),
                message: attribute.to_string(),
            })
    }

    async fn close(&mut self) -> Result<(), JmxError> {
        if !self.open {
            return Err(JmxError::Closed);
        }
        self.open = false;
        self.state().calls.closes += 1;
        Ok(())
    }
}

/// Pattern semantics of the management protocol: glob on the domain,
/// exact key properties unless the pattern ends in `*`
fn matches_pattern(name: &ObjectName, pattern: &ObjectName) -> bool {
    if !glob_matches(pattern.domain(), name.domain()) {
        return false;
    }
    let required = pattern.key_properties();
    let all_present = required
        .iter()
        .all(|(key, value)| name.key_property(key) == Some(value.as_str()));
    if pattern.is_property_pattern() {
        all_present
    } else {
        all_present && required.len() == name.key_properties().len()
    }
}

fn glob_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    fn inner(pattern: &[char], text: &[char]) -> bool {
        match pattern.split_first() {
            None => text.is_empty(),
            Some(('*', rest)) => (0..=text.len()).any(|skip| inner(rest, &text[skip..])),
            Some(('?', rest)) => !text.is_empty() && inner(rest, &text[1..]),
            Some((ch, rest)) => text.first() == Some(ch) && inner(rest, &text[1..]),
        }
    }

    inner(&pattern, &text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        let name = ObjectName::parse("Mule.default:type=Flow,name=orders").unwrap();

        for (pattern, expected) in [
            ("Mule.default:type=Flow,*", true),
            ("Mule.*:type=Flow,*", true),
            ("Mule.?efault:*", true),
            ("Mule.default:type=Flow", false),
            ("Mule.default:name=orders,type=Flow", true),
            ("Mule.default:type=Application,*", false),
            ("Other:type=Flow,*", false),
        ] {
            let pattern = ObjectName::parse(pattern).unwrap();
            assert_eq!(matches_pattern(&name, &pattern), expected, "{}", pattern);
        }
    }
}
