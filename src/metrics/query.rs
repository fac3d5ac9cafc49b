// Object query - discovers the objects matching one configured type

use std::collections::BTreeSet;
use tracing::debug;

use crate::jmx::{JmxError, ManagementSession, ObjectName};

/// Returns the objects matching `<domain_matcher>:type=<type_name>,*`
///
/// # Errors
/// * `JmxError::MalformedObjectName` - the matcher or type builds an invalid
///   pattern; nothing is sent to the server
/// * any transport or remote error raised by the search itself
pub async fn query_objects(
    session: &dyn ManagementSession,
    domain_matcher: &str,
    type_name: &str,
) -> Result<BTreeSet<ObjectName>, JmxError> {
    let pattern = ObjectName::type_pattern(domain_matcher, type_name)?;
    debug!("Querying objects matching {}", pattern);

    let names = session.query_names(&pattern).await?;
    Ok(names.into_iter().collect())
}
