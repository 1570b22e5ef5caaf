use p256::pkcs8::LineEnding;

use crate::duration::Duration;

/// The default CA validity time span, ten years.
pub const DEFAULT_CA_VALIDITY: Duration = Duration::from_days_unchecked(3650);

/// The default leaf certificate validity time span, one year.
pub const DEFAULT_CERTIFICATE_VALIDITY: Duration = Duration::from_days_unchecked(365);

/// The root CA subject name containing only the common name.
pub const CLUSTER_ROOT_CA_SUBJECT: &str = "CN=Cluster Internal CA";

pub const PEM_LINE_ENDING: LineEnding = LineEnding::LF;
